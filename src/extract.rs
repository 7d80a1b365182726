//! One extraction run: catalog, class path, resolution, mapping file.

use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::catalog::{read_catalog, Catalog};
use crate::classpath::ClassPath;
use crate::config::ExtractConfig;
use crate::error::ExtractError;
use crate::mapping::{write_mapping, FormulaMapping};
use crate::metadata::{Introspector, MetadataSource};
use crate::report::{ExtractReport, RunMeta};
use crate::resolve::resolve;

#[derive(Debug)]
pub struct ExtractSummary {
    pub benchmarks: usize,
    /// Classes loaded successfully.
    pub classes_loaded: usize,
    /// Load attempts, failed ones included.
    pub load_attempts: usize,
    pub mapping: FormulaMapping,
    pub warnings: Vec<ExtractError>,
    pub mapping_sha256: String,
}

impl ExtractSummary {
    pub fn resolved(&self) -> usize {
        self.mapping.len()
    }

    pub fn to_report(&self, run: RunMeta) -> ExtractReport {
        ExtractReport {
            run,
            benchmarks: self.benchmarks,
            resolved: self.resolved(),
            classes_loaded: self.classes_loaded,
            load_attempts: self.load_attempts,
            warnings: self.warnings.iter().map(ToString::to_string).collect(),
            mapping_sha256: self.mapping_sha256.clone(),
        }
    }
}

/// Run the whole pipeline described by `config`.
///
/// Fails only if the catalog cannot be read or the mapping cannot be written.
pub fn extract(config: &ExtractConfig) -> Result<ExtractSummary, ExtractError> {
    let catalog = read_catalog(&config.catalog, config.catalog_format)?;

    for entry in &config.class_path {
        if !entry.exists() {
            warn!(
                event = "ClassPath",
                phase = "Entry",
                path = %entry.display(),
                "class path entry does not exist"
            );
        }
    }
    let class_path = ClassPath::new(config.class_path.iter().cloned(), &config.annotation);

    extract_with(catalog, class_path, &config.output)
}

/// Resolve `catalog` against any metadata source and write the mapping.
pub fn extract_with<S: MetadataSource>(
    catalog: Catalog,
    source: S,
    output: &Path,
) -> Result<ExtractSummary, ExtractError> {
    let mut introspector = Introspector::new(source);
    let resolution = resolve(catalog, &mut introspector);

    let text = write_mapping(&resolution.mapping, output)?;
    let mapping_sha256 = hex_digest(Sha256::digest(text.as_bytes()).into());

    info!(
        event = "Extract",
        phase = "Summary",
        benchmarks = resolution.benchmarks,
        resolved = resolution.mapping.len(),
        classes_loaded = introspector.cached_classes(),
        load_attempts = introspector.loads(),
        warnings = resolution.warnings.len(),
        output = %output.display()
    );

    Ok(ExtractSummary {
        benchmarks: resolution.benchmarks,
        classes_loaded: introspector.cached_classes(),
        load_attempts: introspector.loads(),
        mapping: resolution.mapping,
        warnings: resolution.warnings,
        mapping_sha256,
    })
}

fn hex_digest(d: [u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in d {
        s.push_str(&format!("{:02x}", b));
    }
    s
}
