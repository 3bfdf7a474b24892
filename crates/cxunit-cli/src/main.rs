mod logging;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cxunit_core::{
    normalize_path, ConfigManager, DependencySet, ProjectId, UnsavedFiles, UpdateMode,
    UpdateRequest,
};
use cxunit_parser::{IndexRegistry, TranslationUnit, TreeSitterBackend, UpdaterConfig};
use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Parser)]
#[command(
    name = "cxunit",
    version,
    about = "CXUnit - translation unit parsing and dependency tracking",
    long_about = "CXUnit parses C and C++ translation units with tree-sitter, keeps them \
                  up to date with unsaved edits and reports the files every unit depends on."
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(
        long,
        global = true,
        help = "Echo backend arguments and display parser diagnostics"
    )]
    verbose_lib: bool,

    #[arg(long, global = true, help = "Configuration file path")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(
        about = "Parse files and print their dependencies as JSON",
        long_about = "Parse every file in parallel against one shared index per project.\n\
                      Compiler arguments follow `--`, e.g.\n\
                      `cxunit deps a.cpp b.cpp -- -Iinclude -std=c++17`."
    )]
    Deps {
        #[arg(required = true, help = "Source files to parse")]
        files: Vec<PathBuf>,

        #[arg(short, long, default_value = "default", help = "Project identifier")]
        project: String,

        #[arg(last = true, help = "Compiler arguments shared by every file")]
        args: Vec<String>,
    },

    #[command(about = "Parse a file, then reparse it with edited contents")]
    Reparse {
        #[arg(help = "Source file to parse")]
        file: PathBuf,

        #[arg(long, help = "File holding the unsaved contents of FILE")]
        overlay: PathBuf,

        #[arg(short, long, default_value = "default", help = "Project identifier")]
        project: String,

        #[arg(last = true, help = "Compiler arguments")]
        args: Vec<String>,
    },

    #[command(about = "Configuration management")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    #[command(about = "Show the effective configuration")]
    Show {
        #[arg(long, help = "Output as JSON")]
        json: bool,
    },

    #[command(about = "Write a default configuration file")]
    Init {
        #[arg(long, help = "Target path (defaults to ~/.cxunit/config.toml)")]
        path: Option<PathBuf>,

        #[arg(short, long, help = "Overwrite an existing file")]
        force: bool,
    },
}

#[derive(Serialize)]
struct FileReport {
    file: PathBuf,
    reparsed: bool,
    dependencies: DependencySet,
    elapsed_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct DepsReport {
    project: ProjectId,
    files: Vec<FileReport>,
}

#[derive(Serialize)]
struct ReparseReport {
    file: PathBuf,
    parsed: DependencySet,
    reparsed: DependencySet,
    added: Vec<PathBuf>,
    removed: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::from_path(path),
        None => ConfigManager::load(),
    }
    .context("Failed to load configuration")?;
    let config = manager.config();
    let verbose_lib = cli.verbose_lib || config.backend.verbose;

    logging::init(&config.logging, verbose_lib)?;

    let updater_config = UpdaterConfig {
        verbose: verbose_lib,
    };

    match cli.command {
        Commands::Deps {
            files,
            project,
            args,
        } => handle_deps(updater_config, files, project.into(), args),
        Commands::Reparse {
            file,
            overlay,
            project,
            args,
        } => handle_reparse(updater_config, file, overlay, project.into(), args),
        Commands::Config { action } => handle_config(&manager, action),
    }
}

fn handle_deps(
    config: UpdaterConfig,
    files: Vec<PathBuf>,
    project: ProjectId,
    args: Vec<String>,
) -> Result<()> {
    let backend = Arc::new(TreeSitterBackend::new());
    let registry = Arc::new(IndexRegistry::new());

    info!("Parsing {} files for project {}", files.len(), project);

    let reports: Vec<FileReport> = files
        .par_iter()
        .map(|file| {
            let mut unit = TranslationUnit::with_shared_index(
                Arc::clone(&backend),
                Arc::clone(&registry),
                config,
            );
            let request = UpdateRequest::new(file, project.clone())
                .with_project_arguments(args.iter().cloned());

            let started = Instant::now();
            let outcome = unit.update(&request, UpdateMode::AsNeeded);
            let elapsed_ms = started.elapsed().as_millis();

            match outcome {
                Ok(result) => FileReport {
                    file: normalize_path(file),
                    reparsed: result.reparsed,
                    dependencies: result.dependencies,
                    elapsed_ms,
                    error: None,
                },
                Err(e) => FileReport {
                    file: normalize_path(file),
                    reparsed: false,
                    dependencies: DependencySet::new(),
                    elapsed_ms,
                    error: Some(e.to_string()),
                },
            }
        })
        .collect();
    debug!("Released {} semantic indexes", registry.release_unused());

    let failed = reports.iter().filter(|report| report.error.is_some()).count();
    let total = reports.len();
    let report = DepsReport {
        project,
        files: reports,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if failed > 0 {
        bail!("{} of {} files failed to parse", failed, total);
    }
    Ok(())
}

fn handle_reparse(
    config: UpdaterConfig,
    file: PathBuf,
    overlay: PathBuf,
    project: ProjectId,
    args: Vec<String>,
) -> Result<()> {
    let contents = std::fs::read(&overlay)
        .with_context(|| format!("Failed to read overlay {}", overlay.display()))?;

    let mut unit = TranslationUnit::new(Arc::new(TreeSitterBackend::new()), config);
    let request = UpdateRequest::new(&file, project).with_project_arguments(args);

    let parsed = unit
        .update(&request, UpdateMode::AsNeeded)
        .context("Initial parse failed")?;
    debug!("Initial parse found {} dependencies", parsed.dependencies.len());

    let mut unsaved = UnsavedFiles::new();
    unsaved.insert(&file, contents);
    let edited = request.with_unsaved_files(unsaved).with_content_changed(true);

    let reparsed = unit
        .update(&edited, UpdateMode::AsNeeded)
        .context("Reparse with overlay failed")?;

    let added = reparsed
        .dependencies
        .iter()
        .filter(|path| !parsed.dependencies.contains(path))
        .cloned()
        .collect();
    let removed = parsed
        .dependencies
        .iter()
        .filter(|path| !reparsed.dependencies.contains(path))
        .cloned()
        .collect();

    let report = ReparseReport {
        file: normalize_path(&file),
        parsed: parsed.dependencies,
        reparsed: reparsed.dependencies,
        added,
        removed,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn handle_config(manager: &ConfigManager, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { json } => {
            let config = manager.config();
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration:");
                match manager.config_path() {
                    Some(path) => println!("  Config file: {}", path.display()),
                    None => println!("  Config file: none (defaults)"),
                }
                println!("  Verbose backend: {}", config.backend.verbose);
                println!("  Log level: {}", config.logging.level);
                println!("  Log format: {}", config.logging.format);
            }
        }
        ConfigAction::Init { path, force } => {
            let path = match path {
                Some(path) => path,
                None => ConfigManager::user_config_path()
                    .context("Could not determine home directory")?,
            };

            if path.exists() && !force {
                bail!(
                    "{} already exists, use --force to overwrite",
                    path.display()
                );
            }

            ConfigManager::create_default_config(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✓ Created {}", path.display());
        }
    }
    Ok(())
}
