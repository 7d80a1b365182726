//! Benchmark-to-formula mapping file.
//!
//! One record per line, `<benchmark>:<formula>\n`, UTF-8. Benchmark names
//! never contain `:`, so a record is split on its first `:` and formulas
//! may contain further colons.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::{Builder, NamedTempFile};
use tracing::debug;

use crate::error::ExtractError;

const SEPARATOR: char = ':';

/// One mapping record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedFormula {
    /// `owner.method`.
    pub benchmark: String,
    pub formula: String,
}

/// Benchmark names to formulas, in insertion order.
///
/// Re-inserting a benchmark replaces its formula but keeps its position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormulaMapping {
    entries: Vec<ResolvedFormula>,
    index: HashMap<String, usize>,
}

impl FormulaMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite; returns the formula that was replaced.
    pub fn insert(&mut self, benchmark: impl Into<String>, formula: impl Into<String>) -> Option<String> {
        let benchmark = benchmark.into();
        let formula = formula.into();
        match self.index.get(&benchmark) {
            Some(&pos) => Some(std::mem::replace(&mut self.entries[pos].formula, formula)),
            None => {
                self.index.insert(benchmark.clone(), self.entries.len());
                self.entries.push(ResolvedFormula { benchmark, formula });
                None
            }
        }
    }

    pub fn get(&self, benchmark: &str) -> Option<&str> {
        self.index
            .get(benchmark)
            .map(|&pos| self.entries[pos].formula.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedFormula> {
        self.entries.iter()
    }

    /// Serialize every record, failing before producing any output if one
    /// of them cannot be represented.
    pub fn to_text(&self) -> Result<String, ExtractError> {
        let mut out = String::new();
        for entry in &self.entries {
            validate(entry)?;
            out.push_str(&entry.benchmark);
            out.push(SEPARATOR);
            out.push_str(&entry.formula);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn parse(text: &str) -> Result<Self, ExtractError> {
        let mut mapping = Self::new();
        for (idx, raw) in text.lines().enumerate() {
            let record = raw.trim_end_matches('\r');
            if record.is_empty() {
                continue;
            }
            let (benchmark, formula) =
                record
                    .split_once(SEPARATOR)
                    .ok_or_else(|| ExtractError::MalformedRecord {
                        line: idx + 1,
                        reason: format!("missing '{SEPARATOR}' separator"),
                    })?;
            mapping.insert(benchmark, formula);
        }
        Ok(mapping)
    }
}

impl<'a> IntoIterator for &'a FormulaMapping {
    type Item = &'a ResolvedFormula;
    type IntoIter = std::slice::Iter<'a, ResolvedFormula>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormulaMapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut mapping = Self::new();
        for (k, v) in iter {
            mapping.insert(k, v);
        }
        mapping
    }
}

fn validate(entry: &ResolvedFormula) -> Result<(), ExtractError> {
    let invalid = |reason: &str| ExtractError::InvalidRecord {
        key: entry.benchmark.clone(),
        reason: reason.to_string(),
    };

    if entry.benchmark.is_empty() {
        return Err(invalid("empty benchmark name"));
    }
    if entry.benchmark.contains([SEPARATOR, '\n', '\r']) {
        return Err(invalid("benchmark name contains ':' or a line break"));
    }
    if entry.formula.contains(['\n', '\r']) {
        return Err(invalid("formula contains a line break"));
    }
    Ok(())
}

/// Write `mapping` to `path` atomically and return the bytes written.
///
/// The records go to a temporary file next to `path` which then replaces
/// it, so readers see either the old file or the complete new one. The
/// parent directory must already exist. A replaced file keeps its
/// permissions; a new one gets the usual `0666 & !umask`.
pub fn write_mapping<P: AsRef<Path>>(mapping: &FormulaMapping, path: P) -> Result<String, ExtractError> {
    let path = path.as_ref();
    let text = mapping.to_text()?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = temp_file_in(dir)?;
    tmp.write_all(text.as_bytes())?;
    if let Ok(existing) = fs::metadata(path) {
        tmp.as_file().set_permissions(existing.permissions())?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| ExtractError::Io(e.error))?;

    debug!(
        event = "Mapping",
        phase = "Written",
        path = %path.display(),
        records = mapping.len()
    );
    Ok(text)
}

#[cfg(unix)]
fn temp_file_in(dir: &Path) -> std::io::Result<NamedTempFile> {
    use std::os::unix::fs::PermissionsExt;
    Builder::new()
        .prefix(".spl-formulas")
        .permissions(fs::Permissions::from_mode(0o666))
        .tempfile_in(dir)
}

#[cfg(not(unix))]
fn temp_file_in(dir: &Path) -> std::io::Result<NamedTempFile> {
    Builder::new().prefix(".spl-formulas").tempfile_in(dir)
}

pub fn read_mapping<P: AsRef<Path>>(path: P) -> Result<FormulaMapping, ExtractError> {
    let text = fs::read_to_string(path)?;
    FormulaMapping::parse(&text)
}
