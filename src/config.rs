use std::path::PathBuf;

use crate::CatalogFormat;

/// Formula tag type used when none is configured.
pub const DEFAULT_ANNOTATION: &str = "cz.cuni.mff.d3s.spl.SPLFormula";

/// Catalog location in the conventional build layout.
pub const DEFAULT_CATALOG: &str = "target/classes/META-INF/BenchmarkList";

/// Compiled classes in the conventional build layout.
pub const DEFAULT_CLASS_DIR: &str = "target/classes";

/// Mapping file location in the conventional build layout.
pub const DEFAULT_OUTPUT: &str = "target/classes/META-INF/SPLFormulas";

/// Inputs and outputs of one extraction run.
#[derive(Clone, Debug)]
pub struct ExtractConfig {
    /// Benchmark catalog written by the harness.
    pub catalog: PathBuf,
    pub catalog_format: CatalogFormat,
    /// Directories and jars searched for compiled classes, in order.
    pub class_path: Vec<PathBuf>,
    /// Mapping file to (re)write. Its directory must exist.
    pub output: PathBuf,
    /// Dotted type name of the formula annotation.
    pub annotation: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            catalog: PathBuf::from(DEFAULT_CATALOG),
            catalog_format: CatalogFormat::Auto,
            class_path: vec![PathBuf::from(DEFAULT_CLASS_DIR)],
            output: PathBuf::from(DEFAULT_OUTPUT),
            annotation: DEFAULT_ANNOTATION.to_string(),
        }
    }
}

impl ExtractConfig {
    /// Default layout rooted at a project directory instead of the cwd.
    pub fn for_project(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let defaults = Self::default();
        Self {
            catalog: root.join(defaults.catalog),
            class_path: defaults.class_path.iter().map(|p| root.join(p)).collect(),
            output: root.join(defaults.output),
            ..defaults
        }
    }
}
