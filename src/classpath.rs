//! Compiled-class search path.
//!
//! An ordered list of entries holding `.class` files laid out by package.
//! A directory entry is searched on disk, a file entry is read as a zip
//! archive (a jar). The first entry containing a class wins.

use std::collections::{HashSet, VecDeque};
use std::ffi::OsStr;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::classfile::{binary_to_path, Annotation, ClassFile, MethodInfo};
use crate::error::ExtractError;
use crate::metadata::MetadataSource;

#[derive(Clone, Debug)]
pub struct ClassPath {
    entries: Vec<PathBuf>,
    annotation: String,
}

/// Where a class file was found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassLocation {
    File(PathBuf),
    /// `entry` is the `/`-separated member name inside `archive`.
    Archive { archive: PathBuf, entry: String },
}

impl fmt::Display for ClassLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassLocation::File(path) => write!(f, "{}", path.display()),
            ClassLocation::Archive { archive, entry } => write!(f, "{}!/{entry}", archive.display()),
        }
    }
}

/// A class together with the ancestors found on the class path, in
/// breadth-first order (super class before interfaces).
#[derive(Clone, Debug)]
pub struct LoadedClass {
    pub class: ClassFile,
    pub ancestors: Vec<ClassFile>,
}

impl LoadedClass {
    /// The class itself followed by its ancestors.
    pub fn hierarchy(&self) -> impl Iterator<Item = &ClassFile> {
        std::iter::once(&self.class).chain(self.ancestors.iter())
    }

    /// The first public, non-bridge method called `name`.
    pub fn find_method(&self, name: &str) -> Option<&MethodInfo> {
        self.hierarchy()
            .flat_map(|class| class.methods.iter())
            .find(|m| m.name == name && m.is_public() && !m.is_bridge())
    }
}

/// A formula tag found while scanning the class path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TaggedElement {
    pub class: String,
    /// `None` for a class-level tag.
    pub method: Option<String>,
    pub formula: String,
}

impl ClassPath {
    /// `annotation` is the dotted type name of the formula tag.
    pub fn new<I, P>(entries: I, annotation: &str) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
            annotation: annotation.to_string(),
        }
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn annotation(&self) -> &str {
        &self.annotation
    }

    /// Find the class file for a dotted class name.
    ///
    /// Nested classes may be named with dots (`pkg.Outer.Inner`); when the
    /// plain path does not exist the trailing dots are tried as `$`.
    pub fn locate(&self, class_name: &str) -> Result<Option<ClassLocation>, ExtractError> {
        Ok(self
            .find(&binary_name_candidates(class_name))?
            .map(|(location, _)| location))
    }

    /// First entry holding any of `binary_names`, trying the names in order
    /// within each entry. Returns the location and the raw class bytes.
    fn find(&self, binary_names: &[String]) -> Result<Option<(ClassLocation, Vec<u8>)>, ExtractError> {
        let relative: Vec<String> = binary_names.iter().map(|n| binary_to_path(n)).collect();

        for root in &self.entries {
            if root.is_dir() {
                if let Some(path) = relative.iter().map(|r| root.join(r)).find(|p| p.is_file()) {
                    let bytes = std::fs::read(&path)?;
                    return Ok(Some((ClassLocation::File(path), bytes)));
                }
            } else if root.is_file() {
                let mut archive = open_archive(root)?;
                for entry in &relative {
                    if let Some(bytes) = read_member(&mut archive, root, entry)? {
                        let location = ClassLocation::Archive {
                            archive: root.clone(),
                            entry: entry.clone(),
                        };
                        return Ok(Some((location, bytes)));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Read a class by exact binary name. `Ok(None)` if it is not on the path.
    fn read_binary(&self, binary_name: &str) -> Result<Option<ClassFile>, ExtractError> {
        match self.find(&[binary_name.to_string()])? {
            Some((_, bytes)) => ClassFile::parse(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Load a class and the part of its hierarchy present on the class path.
    pub fn load(&self, class_name: &str) -> Result<LoadedClass, ExtractError> {
        let load_error = |reason: String| ExtractError::ClassLoad {
            class: class_name.to_string(),
            reason,
        };

        let (location, bytes) = self
            .find(&binary_name_candidates(class_name))
            .map_err(|e| load_error(e.to_string()))?
            .ok_or_else(|| load_error("not found on class path".to_string()))?;
        let class = ClassFile::parse(&bytes).map_err(|e| load_error(format!("{location}: {e}")))?;
        if class.name != class_name && class.name.replace('$', ".") != class_name {
            return Err(load_error(format!("{location} declares class {}", class.name)));
        }

        let mut seen: HashSet<String> = HashSet::from([class.name.clone()]);
        let mut queue: VecDeque<String> = parents(&class).collect();
        let mut ancestors = Vec::new();

        while let Some(name) = queue.pop_front() {
            if !seen.insert(name.clone()) {
                continue;
            }
            match self.read_binary(&name) {
                Ok(Some(ancestor)) => {
                    queue.extend(parents(&ancestor));
                    ancestors.push(ancestor);
                }
                Ok(None) => debug!(
                    event = "ClassPath",
                    phase = "Ancestor",
                    class = class_name,
                    ancestor = name.as_str(),
                    "ancestor outside class path"
                ),
                Err(e) => return Err(load_error(format!("ancestor {name}: {e}"))),
            }
        }

        Ok(LoadedClass { class, ancestors })
    }

    fn formula_of(&self, annotations: &[Annotation]) -> Option<String> {
        annotations
            .iter()
            .find(|a| a.type_name == self.annotation)
            .and_then(|a| a.string_element("value"))
            .map(str::to_string)
    }

    /// Every formula tag declared by classes on the class path, sorted.
    ///
    /// Class files that fail to parse are skipped with a warning. An
    /// unreadable archive fails the scan.
    pub fn scan(&self) -> Result<Vec<TaggedElement>, ExtractError> {
        let mut found = Vec::new();

        for root in &self.entries {
            if root.is_file() {
                let mut archive = open_archive(root)?;
                for index in 0..archive.len() {
                    let mut member = archive.by_index(index).map_err(|e| archive_error(root, e))?;
                    if member.is_dir() || !member.name().ends_with(".class") {
                        continue;
                    }
                    let location = ClassLocation::Archive {
                        archive: root.clone(),
                        entry: member.name().to_string(),
                    };
                    let mut bytes = Vec::new();
                    member.read_to_end(&mut bytes)?;
                    self.collect_tags(&location, ClassFile::parse(&bytes), &mut found);
                }
                continue;
            }

            for entry in WalkDir::new(root).follow_links(false) {
                let entry = entry.map_err(io::Error::from)?;
                if !entry.file_type().is_file() || entry.path().extension() != Some(OsStr::new("class")) {
                    continue;
                }
                let location = ClassLocation::File(entry.path().to_path_buf());
                self.collect_tags(&location, ClassFile::read(entry.path()), &mut found);
            }
        }

        found.sort();
        found.dedup();
        Ok(found)
    }

    fn collect_tags(
        &self,
        location: &ClassLocation,
        class: Result<ClassFile, ExtractError>,
        found: &mut Vec<TaggedElement>,
    ) {
        let class = match class {
            Ok(class) => class,
            Err(e) => {
                warn!(
                    event = "ClassPath",
                    phase = "Scan",
                    path = %location,
                    error = %e
                );
                return;
            }
        };

        if let Some(formula) = self.formula_of(&class.annotations) {
            found.push(TaggedElement {
                class: class.name.clone(),
                method: None,
                formula,
            });
        }
        for method in &class.methods {
            if let Some(formula) = self.formula_of(&method.annotations) {
                found.push(TaggedElement {
                    class: class.name.clone(),
                    method: Some(method.name.clone()),
                    formula,
                });
            }
        }
    }
}

fn archive_error(path: &Path, source: ZipError) -> ExtractError {
    ExtractError::Archive {
        path: path.to_path_buf(),
        source,
    }
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>, ExtractError> {
    ZipArchive::new(File::open(path)?).map_err(|e| archive_error(path, e))
}

/// Bytes of member `name`, or `None` if the archive has no such member.
fn read_member(
    archive: &mut ZipArchive<File>,
    path: &Path,
    name: &str,
) -> Result<Option<Vec<u8>>, ExtractError> {
    let mut member = match archive.by_name(name) {
        Ok(member) => member,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(archive_error(path, e)),
    };
    let mut bytes = Vec::new();
    member.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

impl MetadataSource for ClassPath {
    type Class = LoadedClass;

    fn load_class(&self, class_name: &str) -> Result<LoadedClass, ExtractError> {
        self.load(class_name)
    }

    fn class_formula(&self, class: &LoadedClass) -> Option<String> {
        self.formula_of(&class.class.annotations)
    }

    fn method_formula(&self, class: &LoadedClass, method: &str) -> Result<Option<String>, ExtractError> {
        class
            .find_method(method)
            .map(|m| self.formula_of(&m.annotations))
            .ok_or_else(|| ExtractError::MethodNotFound {
                class: class.class.name.clone(),
                method: method.to_string(),
            })
    }
}

fn parents(class: &ClassFile) -> impl Iterator<Item = String> + '_ {
    class.super_name.iter().chain(class.interfaces.iter()).cloned()
}

/// `a.b.C.D`, `a.b.C$D`, `a.b$C$D`, ... in that order.
fn binary_name_candidates(class_name: &str) -> Vec<String> {
    let mut candidates = vec![class_name.to_string()];
    let mut current = class_name.to_string();
    while let Some(dot) = current.rfind('.') {
        current.replace_range(dot..=dot, "$");
        candidates.push(current.clone());
    }
    candidates
}
