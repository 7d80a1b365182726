use clap::ValueEnum;

pub mod catalog;
pub mod classfile;
pub mod classpath;
pub mod config;
pub mod error;
pub mod extract;
pub mod mapping;
pub mod metadata;
pub mod report;
pub mod resolve;

#[cfg(test)]
mod test_support;

pub use catalog::{read_catalog, BenchmarkDescriptor, Catalog};
pub use classpath::ClassPath;
pub use config::ExtractConfig;
pub use error::ExtractError;
pub use extract::{extract, ExtractSummary};
pub use mapping::{read_mapping, write_mapping, FormulaMapping, ResolvedFormula};
pub use metadata::{Introspector, MetadataSource, StaticMetadata};
pub use resolve::{resolve, Resolution};

/// Record encoding of the benchmark catalog.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum CatalogFormat {
    /// Decide per line: `JMH ` records, otherwise owner/identifier pairs.
    #[default]
    Auto,
    /// The harness's `BenchmarkList` line encoding.
    Jmh,
    /// `<owner-class> <benchmark-identifier>` per line.
    Pairs,
}
