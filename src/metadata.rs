//! Formula metadata lookup with a per-run class cache.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::error::ExtractError;

/// Where class and method formula tags come from.
///
/// [`crate::classpath::ClassPath`] reads compiled class files;
/// [`StaticMetadata`] is an in-memory table.
pub trait MetadataSource {
    /// Handle to a loaded class, produced once per class and cached.
    type Class;

    fn load_class(&self, class_name: &str) -> Result<Self::Class, ExtractError>;

    fn class_formula(&self, class: &Self::Class) -> Option<String>;

    /// Formula tag of the unique method `method`, `MethodNotFound` if the
    /// class exposes no such method.
    fn method_formula(
        &self,
        class: &Self::Class,
        method: &str,
    ) -> Result<Option<String>, ExtractError>;
}

/// Cached result of loading one class.
#[derive(Debug)]
pub struct ClassMetadataEntry<C> {
    pub class: C,
    pub class_formula: Option<String>,
}

/// Memoizing front of a [`MetadataSource`], alive for a single run.
///
/// Each class name is loaded at most once. Failed loads are remembered as
/// well, so an unloadable class costs one attempt no matter how many of its
/// benchmarks are in the catalog.
pub struct Introspector<S: MetadataSource> {
    source: S,
    cache: HashMap<String, Rc<ClassMetadataEntry<S::Class>>>,
    failures: HashMap<String, String>,
    loads: usize,
}

impl<S: MetadataSource> Introspector<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: HashMap::new(),
            failures: HashMap::new(),
            loads: 0,
        }
    }

    pub fn lookup_class_metadata(
        &mut self,
        class_name: &str,
    ) -> Result<Rc<ClassMetadataEntry<S::Class>>, ExtractError> {
        if let Some(entry) = self.cache.get(class_name) {
            return Ok(Rc::clone(entry));
        }
        if let Some(reason) = self.failures.get(class_name) {
            return Err(ExtractError::ClassLoad {
                class: class_name.to_string(),
                reason: reason.clone(),
            });
        }

        self.loads += 1;
        match self.source.load_class(class_name) {
            Ok(class) => {
                let class_formula = self.source.class_formula(&class);
                debug!(
                    event = "Introspect",
                    phase = "ClassLoaded",
                    class = class_name,
                    formula = class_formula.as_deref().unwrap_or("")
                );
                let entry = Rc::new(ClassMetadataEntry {
                    class,
                    class_formula,
                });
                self.cache.insert(class_name.to_string(), Rc::clone(&entry));
                Ok(entry)
            }
            Err(err) => {
                let reason = match err {
                    ExtractError::ClassLoad { reason, .. } => reason,
                    other => other.to_string(),
                };
                self.failures.insert(class_name.to_string(), reason.clone());
                Err(ExtractError::ClassLoad {
                    class: class_name.to_string(),
                    reason,
                })
            }
        }
    }

    pub fn lookup_method_formula(
        &self,
        entry: &ClassMetadataEntry<S::Class>,
        method: &str,
    ) -> Result<Option<String>, ExtractError> {
        self.source.method_formula(&entry.class, method)
    }

    /// Whether `class_name` already failed to load in this run.
    pub fn has_failed(&self, class_name: &str) -> bool {
        self.failures.contains_key(class_name)
    }

    /// Number of load attempts made against the source.
    pub fn loads(&self) -> usize {
        self.loads
    }

    pub fn cached_classes(&self) -> usize {
        self.cache.len()
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

/// One class of a [`StaticMetadata`] table.
#[derive(Clone, Debug, Default)]
pub struct StaticClass {
    pub formula: Option<String>,
    /// Methods in declaration order with their optional formula.
    pub methods: Vec<(String, Option<String>)>,
}

/// In-memory metadata: class and method names mapped straight to formulas.
#[derive(Debug, Default)]
pub struct StaticMetadata {
    classes: HashMap<String, StaticClass>,
    loads: Cell<usize>,
}

impl StaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `class`, optionally with a class-level formula.
    pub fn with_class(mut self, class: &str, formula: Option<&str>) -> Self {
        self.classes.entry(class.to_string()).or_default().formula = formula.map(str::to_string);
        self
    }

    /// Declare `method` on `class` (declaring the class if needed).
    pub fn with_method(mut self, class: &str, method: &str, formula: Option<&str>) -> Self {
        self.classes
            .entry(class.to_string())
            .or_default()
            .methods
            .push((method.to_string(), formula.map(str::to_string)));
        self
    }

    /// Number of times any class was loaded from this table.
    pub fn loads(&self) -> usize {
        self.loads.get()
    }
}

impl MetadataSource for StaticMetadata {
    type Class = (String, StaticClass);

    fn load_class(&self, class_name: &str) -> Result<Self::Class, ExtractError> {
        self.loads.set(self.loads.get() + 1);
        self.classes
            .get(class_name)
            .map(|class| (class_name.to_string(), class.clone()))
            .ok_or_else(|| ExtractError::ClassLoad {
                class: class_name.to_string(),
                reason: "not declared".to_string(),
            })
    }

    fn class_formula(&self, class: &Self::Class) -> Option<String> {
        class.1.formula.clone()
    }

    fn method_formula(
        &self,
        class: &Self::Class,
        method: &str,
    ) -> Result<Option<String>, ExtractError> {
        let (name, class) = class;
        class
            .methods
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, formula)| formula.clone())
            .ok_or_else(|| ExtractError::MethodNotFound {
                class: name.clone(),
                method: method.to_string(),
            })
    }
}
