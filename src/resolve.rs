//! Formula resolution: catalog + metadata into a mapping.
//!
//! A method-level formula always wins over the class-level one. Benchmarks
//! with neither are left out of the mapping without a warning.

use tracing::{debug, trace, warn};

use crate::catalog::Catalog;
use crate::error::ExtractError;
use crate::mapping::FormulaMapping;
use crate::metadata::{Introspector, MetadataSource};

/// Outcome of one resolution run.
#[derive(Debug, Default)]
pub struct Resolution {
    pub mapping: FormulaMapping,
    /// Catalog warnings first, then resolution warnings in catalog order.
    pub warnings: Vec<ExtractError>,
    /// Descriptors that reached resolution.
    pub benchmarks: usize,
}

/// Resolve every benchmark of `catalog`, consuming it.
///
/// Unloadable classes are reported once and all of their benchmarks are
/// skipped; a missing method skips just that benchmark.
pub fn resolve<S: MetadataSource>(catalog: Catalog, introspector: &mut Introspector<S>) -> Resolution {
    let Catalog {
        descriptors,
        mut warnings,
    } = catalog;
    let mut mapping = FormulaMapping::new();

    for descriptor in &descriptors {
        let name = descriptor.qualified_name();

        if introspector.has_failed(&descriptor.owner_class) {
            trace!(event = "Resolve", phase = "Skip", benchmark = name.as_str());
            continue;
        }

        let entry = match introspector.lookup_class_metadata(&descriptor.owner_class) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(event = "Resolve", phase = "ClassLoad", benchmark = name.as_str(), error = %err);
                warnings.push(err);
                continue;
            }
        };

        let method_formula = match introspector.lookup_method_formula(&entry, &descriptor.short_name) {
            Ok(formula) => formula,
            Err(err) => {
                warn!(event = "Resolve", phase = "Method", benchmark = name.as_str(), error = %err);
                warnings.push(err);
                continue;
            }
        };

        match method_formula.or_else(|| entry.class_formula.clone()) {
            Some(formula) => {
                debug!(
                    event = "Resolve",
                    phase = "Formula",
                    benchmark = name.as_str(),
                    formula = formula.as_str()
                );
                mapping.insert(name, formula);
            }
            None => trace!(event = "Resolve", phase = "NoFormula", benchmark = name.as_str()),
        }
    }

    Resolution {
        mapping,
        warnings,
        benchmarks: descriptors.len(),
    }
}
