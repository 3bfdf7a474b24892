// ABOUTME: Walks the preprocessor directives of one file in source order.
// ABOUTME: Branches whose condition cannot be decided are kept, so includes over-approximate.
use super::arguments::MacroFlag;
use std::collections::HashMap;
use tree_sitter::{Node, Tree, TreeCursor};

/// One `#include` directive as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IncludeDirective {
    pub target: String,
    /// `"file.h"` rather than `<file.h>`
    pub quoted: bool,
    /// Zero-based line of the directive.
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Macro {
    /// Integer value when the replacement list is a single integer literal.
    Defined(Option<i64>),
    /// Touched inside a branch that may or may not have been taken.
    Unknown,
}

/// Macro definitions visible at the current point of a translation unit.
#[derive(Debug, Clone, Default)]
pub(crate) struct MacroTable {
    macros: HashMap<String, Macro>,
}

impl MacroTable {
    pub fn from_flags(flags: &[MacroFlag]) -> Self {
        let mut table = Self::default();
        for flag in flags {
            match flag {
                MacroFlag::Define { name, value } => table.define(name, value, true),
                MacroFlag::Undefine(name) => table.undefine(name, true),
            }
        }
        table
    }

    pub fn define(&mut self, name: &str, replacement: &str, certain: bool) {
        let state = if certain {
            Macro::Defined(parse_integer(replacement))
        } else {
            Macro::Unknown
        };
        self.macros.insert(name.to_string(), state);
    }

    pub fn undefine(&mut self, name: &str, certain: bool) {
        if certain {
            self.macros.remove(name);
        } else {
            self.macros.insert(name.to_string(), Macro::Unknown);
        }
    }

    /// `None` when the answer depends on an undecided branch.
    pub fn is_defined(&self, name: &str) -> Option<bool> {
        match self.macros.get(name) {
            None => Some(false),
            Some(Macro::Defined(_)) => Some(true),
            Some(Macro::Unknown) => None,
        }
    }

    /// Value of an identifier inside `#if`: undefined names are `0`.
    fn value(&self, name: &str) -> Option<i64> {
        match self.macros.get(name) {
            None => Some(0),
            Some(Macro::Defined(value)) => *value,
            Some(Macro::Unknown) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    fn from_value(value: Option<i64>) -> Self {
        match value {
            Some(0) => Self::False,
            Some(_) => Self::True,
            None => Self::Unknown,
        }
    }

    fn from_defined(defined: Option<bool>, negated: bool) -> Self {
        match defined {
            Some(defined) if defined != negated => Self::True,
            Some(_) => Self::False,
            None => Self::Unknown,
        }
    }
}

struct Pending<'t> {
    node: Node<'t>,
    /// Every enclosing branch is known to be taken.
    certain: bool,
    /// An earlier branch of the same conditional may have been taken.
    after_undecided: bool,
}

/// Visit the `#include`s reached in source order, updating `macros` on the way.
///
/// `on_include` receives the table as it stands at the directive so it can walk the
/// included file before the rest of this one. Returns whether the file declared
/// `#pragma once` outside any undecided branch.
pub(crate) fn walk_active_directives<F, E>(
    tree: &Tree,
    source: &[u8],
    macros: &mut MacroTable,
    on_include: &mut F,
) -> Result<bool, E>
where
    F: FnMut(&IncludeDirective, &mut MacroTable) -> Result<(), E>,
{
    let mut pragma_once = false;
    let mut cursor = tree.walk();
    let mut stack = vec![Pending {
        node: tree.root_node(),
        certain: true,
        after_undecided: false,
    }];

    while let Some(pending) = stack.pop() {
        let node = pending.node;
        match node.kind() {
            "preproc_include" => {
                if let Some(directive) = include_directive(&node, source) {
                    on_include(&directive, macros)?;
                }
            }
            "preproc_def" | "preproc_function_def" => {
                if let Some(name) = field_text(&node, "name", source) {
                    // Function-like macros never have an integer value.
                    let value = match node.kind() {
                        "preproc_def" => field_text(&node, "value", source).unwrap_or(""),
                        _ => "",
                    };
                    macros.define(name, value, pending.certain);
                }
            }
            "preproc_call" => {
                let directive = field_text(&node, "directive", source).unwrap_or("");
                let argument = field_text(&node, "argument", source).unwrap_or("").trim();
                match directive.trim_start_matches('#').trim() {
                    "undef" => {
                        if let Some(name) = argument.split_whitespace().next() {
                            macros.undefine(name, pending.certain);
                        }
                    }
                    "pragma" if pending.certain && argument == "once" => pragma_once = true,
                    _ => {}
                }
            }
            "preproc_if" | "preproc_elif" | "preproc_ifdef" | "preproc_elifdef"
            | "preproc_else" => {
                let truth = branch_truth(&node, source, macros);
                if truth != Truth::True {
                    if let Some(alternative) = node.child_by_field_name("alternative") {
                        stack.push(Pending {
                            node: alternative,
                            certain: pending.certain,
                            after_undecided: pending.after_undecided || truth == Truth::Unknown,
                        });
                    }
                }
                if truth != Truth::False {
                    let certain =
                        pending.certain && !pending.after_undecided && truth == Truth::True;
                    push_branch_body(&mut stack, &node, &mut cursor, certain);
                }
            }
            _ => {
                let children: Vec<Node> = node.named_children(&mut cursor).collect();
                stack.extend(children.into_iter().rev().map(|child| Pending {
                    node: child,
                    certain: pending.certain,
                    after_undecided: false,
                }));
            }
        }
    }

    Ok(pragma_once)
}

fn branch_truth(node: &Node, source: &[u8], macros: &MacroTable) -> Truth {
    match node.kind() {
        "preproc_else" => Truth::True,
        "preproc_ifdef" | "preproc_elifdef" => {
            let negated = node
                .child(0)
                .is_some_and(|keyword| keyword.kind().ends_with("ndef"));
            match field_text(node, "name", source) {
                Some(name) => Truth::from_defined(macros.is_defined(name), negated),
                None => Truth::Unknown,
            }
        }
        _ => match node.child_by_field_name("condition") {
            Some(condition) => Truth::from_value(evaluate(condition, source, macros)),
            None => Truth::Unknown,
        },
    }
}

/// Push the directives and declarations of a branch, leaving out its condition and chain.
fn push_branch_body<'t>(
    stack: &mut Vec<Pending<'t>>,
    node: &Node<'t>,
    cursor: &mut TreeCursor<'t>,
    certain: bool,
) {
    let excluded: Vec<usize> = ["condition", "name", "alternative"]
        .iter()
        .filter_map(|field| node.child_by_field_name(field))
        .map(|child| child.id())
        .collect();

    let body: Vec<Node<'t>> = node
        .named_children(cursor)
        .filter(|child| !excluded.contains(&child.id()))
        .collect();
    stack.extend(body.into_iter().rev().map(|child| Pending {
        node: child,
        certain,
        after_undecided: false,
    }));
}

/// Value of an `#if` expression, `None` when it cannot be decided.
fn evaluate(node: Node, source: &[u8], macros: &MacroTable) -> Option<i64> {
    match node.kind() {
        "number_literal" => parse_integer(node.utf8_text(source).ok()?),
        "true" => Some(1),
        "false" => Some(0),
        "identifier" => match node.utf8_text(source).ok()? {
            "true" => Some(1),
            "false" => Some(0),
            name => macros.value(name),
        },
        "preproc_defined" => {
            let name = node.named_child(0)?.utf8_text(source).ok()?;
            macros.is_defined(name).map(i64::from)
        }
        "parenthesized_expression" => evaluate(node.named_child(0)?, source, macros),
        "unary_expression" => {
            let operand = evaluate(node.child_by_field_name("argument")?, source, macros);
            match node.child_by_field_name("operator")?.kind() {
                "!" | "not" => operand.map(|value| i64::from(value == 0)),
                "-" => operand.and_then(i64::checked_neg),
                "+" => operand,
                "~" | "compl" => operand.map(|value| !value),
                _ => None,
            }
        }
        "binary_expression" => evaluate_binary(node, source, macros),
        _ => None,
    }
}

fn evaluate_binary(node: Node, source: &[u8], macros: &MacroTable) -> Option<i64> {
    let operator = node.child_by_field_name("operator")?.kind();
    let left = evaluate(node.child_by_field_name("left")?, source, macros);
    let right = evaluate(node.child_by_field_name("right")?, source, macros);

    match operator {
        "&&" | "and" => match (left, right) {
            (Some(0), _) | (_, Some(0)) => Some(0),
            (Some(_), Some(_)) => Some(1),
            _ => None,
        },
        "||" | "or" => match (left, right) {
            (Some(l), _) if l != 0 => Some(1),
            (_, Some(r)) if r != 0 => Some(1),
            (Some(_), Some(_)) => Some(0),
            _ => None,
        },
        _ => {
            let (l, r) = (left?, right?);
            match operator {
                "==" => Some(i64::from(l == r)),
                "!=" | "not_eq" => Some(i64::from(l != r)),
                "<" => Some(i64::from(l < r)),
                ">" => Some(i64::from(l > r)),
                "<=" => Some(i64::from(l <= r)),
                ">=" => Some(i64::from(l >= r)),
                "+" => l.checked_add(r),
                "-" => l.checked_sub(r),
                "*" => l.checked_mul(r),
                "/" => l.checked_div(r),
                "%" => l.checked_rem(r),
                "&" | "bitand" => Some(l & r),
                "|" | "bitor" => Some(l | r),
                "^" | "xor" => Some(l ^ r),
                "<<" => u32::try_from(r).ok().and_then(|shift| l.checked_shl(shift)),
                ">>" => u32::try_from(r).ok().and_then(|shift| l.checked_shr(shift)),
                _ => None,
            }
        }
    }
}

/// Integer literal with optional `u`/`l` suffixes, in any C radix.
fn parse_integer(text: &str) -> Option<i64> {
    let digits = text
        .trim()
        .trim_end_matches(|c: char| matches!(c, 'u' | 'U' | 'l' | 'L'))
        .replace('\'', "");

    let (radix, body) = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (16, hex)
    } else if let Some(binary) = digits
        .strip_prefix("0b")
        .or_else(|| digits.strip_prefix("0B"))
    {
        (2, binary)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits.as_str())
    };

    i64::from_str_radix(body, radix).ok()
}

fn field_text<'s>(node: &Node, field: &str, source: &'s [u8]) -> Option<&'s str> {
    node.child_by_field_name(field)?.utf8_text(source).ok()
}

fn include_directive(node: &Node, source: &[u8]) -> Option<IncludeDirective> {
    let path_node = node.child_by_field_name("path")?;
    let text = path_node.utf8_text(source).ok()?.trim();

    let quoted = match path_node.kind() {
        "string_literal" => true,
        "system_lib_string" => false,
        _ => return None,
    };
    let target = text.trim_matches(|c| c == '<' || c == '>' || c == '"').trim();
    if target.is_empty() {
        return None;
    }

    Some(IncludeDirective {
        target: target.to_string(),
        quoted,
        line: node.start_position().row,
    })
}
