use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub tool_version: String,
    pub timestamp_utc: String,
    pub catalog: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractReport {
    pub run: RunMeta,

    /// Catalog entries that reached resolution.
    pub benchmarks: usize,
    pub resolved: usize,
    pub classes_loaded: usize,
    pub load_attempts: usize,

    pub warnings: Vec<String>,

    /// SHA-256 of the mapping file bytes, lowercase hex.
    pub mapping_sha256: String,
}
