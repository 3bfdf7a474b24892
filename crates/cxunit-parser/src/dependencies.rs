use crate::SemanticBackend;
use cxunit_core::{normalize_path, DependencySet};
use std::path::Path;
use tracing::debug;

/// Rebuild the dependency set of a freshly parsed or reparsed unit.
///
/// The set always starts empty, so files dropped from the include graph disappear.
pub fn collect_dependencies<B>(backend: &B, unit: &B::Unit, primary_file: &Path) -> DependencySet
where
    B: SemanticBackend + ?Sized,
{
    let mut dependencies = DependencySet::new();
    dependencies.insert(normalize_path(primary_file));

    backend.visit_inclusions(unit, &mut |included| {
        dependencies.insert(normalize_path(included));
    });

    debug!(
        "Collected {} dependencies for {}",
        dependencies.len(),
        primary_file.display()
    );
    dependencies
}
