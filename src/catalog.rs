//! Benchmark catalog reader.
//!
//! A catalog lists the benchmarks the harness discovered. Two record
//! encodings are understood:
//!
//! ```text
//! JMH S 10 pkg.BenchA S 35 pkg.generated.BenchA_run_jmhTest S 3 run S 10 Throughput E E ...
//! pkg.BenchA pkg.BenchA.run
//! ```
//!
//! The first is the harness's own `BenchmarkList` line: a `JMH ` magic followed
//! by tagged tokens, where `S <len> <text>` is a string whose length is counted
//! in UTF-16 units. Only the leading owner class, generated class and method
//! strings are read. The second is a plain `<owner> <identifier>` pair.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::ExtractError;
use crate::CatalogFormat;

const JMH_MAGIC: &str = "JMH ";

/// One discovered benchmark, split into its owner class and method name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BenchmarkDescriptor {
    pub owner_class: String,
    pub short_name: String,
    /// 1-based line of the catalog record this came from.
    pub line: usize,
}

impl BenchmarkDescriptor {
    /// Split a harness identifier by stripping `owner.` from its front.
    pub fn from_identifier(
        owner: &str,
        identifier: &str,
        line: usize,
    ) -> Result<Self, ExtractError> {
        let short = identifier
            .strip_prefix(owner)
            .and_then(|rest| rest.strip_prefix('.'))
            .filter(|short| !owner.is_empty() && !short.is_empty());

        match short {
            Some(short) => Ok(Self {
                owner_class: owner.to_string(),
                short_name: short.to_string(),
                line,
            }),
            None => Err(ExtractError::MalformedIdentifier {
                line,
                owner: owner.to_string(),
                identifier: identifier.to_string(),
            }),
        }
    }

    /// `owner.method`, the key used in the mapping file.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.owner_class, self.short_name)
    }
}

/// Descriptors in catalog order plus the entries that had to be skipped.
#[derive(Debug, Default)]
pub struct Catalog {
    pub descriptors: Vec<BenchmarkDescriptor>,
    pub warnings: Vec<ExtractError>,
}

impl Catalog {
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Read and parse a catalog file.
///
/// A missing file is fatal (`CatalogNotFound`); bad records are not.
pub fn read_catalog<P: AsRef<Path>>(
    path: P,
    format: CatalogFormat,
) -> Result<Catalog, ExtractError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ExtractError::CatalogNotFound {
            path: path.to_path_buf(),
        },
        _ => ExtractError::Io(e),
    })?;

    let catalog = parse_catalog(&text, format);
    debug!(
        event = "Catalog",
        phase = "Read",
        path = %path.display(),
        benchmarks = catalog.descriptors.len(),
        skipped = catalog.warnings.len()
    );
    Ok(catalog)
}

/// Parse catalog text. Never fails as a whole; bad lines become warnings.
pub fn parse_catalog(text: &str, format: CatalogFormat) -> Catalog {
    let mut catalog = Catalog::default();

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let record = raw.trim_end_matches('\r');
        if record.trim().is_empty() || record.trim_start().starts_with('#') {
            continue;
        }

        match parse_record(record, line, format) {
            Ok(descriptor) => catalog.descriptors.push(descriptor),
            Err(err) => {
                warn!(event = "Catalog", phase = "Skip", line, error = %err);
                catalog.warnings.push(err);
            }
        }
    }

    catalog
}

fn parse_record(
    record: &str,
    line: usize,
    format: CatalogFormat,
) -> Result<BenchmarkDescriptor, ExtractError> {
    let jmh = match format {
        CatalogFormat::Jmh => true,
        CatalogFormat::Pairs => false,
        CatalogFormat::Auto => record.starts_with(JMH_MAGIC),
    };

    let (owner, identifier) = if jmh {
        parse_jmh_record(record)
    } else {
        parse_pair_record(record)
    }
    .map_err(|reason| ExtractError::MalformedRecord { line, reason })?;

    BenchmarkDescriptor::from_identifier(&owner, &identifier, line)
}

fn parse_pair_record(record: &str) -> Result<(String, String), String> {
    let fields: Vec<&str> = record.split_whitespace().collect();
    match fields.as_slice() {
        [owner, identifier] => Ok((owner.to_string(), identifier.to_string())),
        _ => Err(format!(
            "expected '<owner> <identifier>', found {} fields",
            fields.len()
        )),
    }
}

fn parse_jmh_record(record: &str) -> Result<(String, String), String> {
    let mut rest = record
        .strip_prefix(JMH_MAGIC)
        .ok_or_else(|| "missing 'JMH' magic".to_string())?;

    // owner class, generated class, benchmark method
    let mut strings: Vec<&str> = Vec::with_capacity(3);
    while strings.len() < 3 {
        rest = rest.trim_start_matches(' ');
        let body = rest
            .strip_prefix("S ")
            .ok_or_else(|| format!("expected string token {}", strings.len() + 1))?;
        let (len, body) = body
            .split_once(' ')
            .ok_or_else(|| "string token without a value".to_string())?;
        let len: usize = len
            .parse()
            .map_err(|_| format!("bad string token length '{len}'"))?;
        let (value, tail) = split_utf16(body, len)
            .ok_or_else(|| format!("string token shorter than its length {len}"))?;
        strings.push(value);
        rest = tail;
    }

    let owner = strings[0];
    let method = strings[2];
    Ok((owner.to_string(), format!("{owner}.{method}")))
}

/// Split `s` after `units` UTF-16 code units.
fn split_utf16(s: &str, units: usize) -> Option<(&str, &str)> {
    let mut seen = 0usize;
    for (idx, c) in s.char_indices() {
        if seen == units {
            return Some(s.split_at(idx));
        }
        seen += c.len_utf16();
        if seen > units {
            return None;
        }
    }
    (seen == units).then_some((s, ""))
}
