//! Builds real class files for tests.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::classfile::{binary_to_path, ACC_INTERFACE, ACC_PUBLIC, MAGIC};

pub const FORMULA: &str = "cz.cuni.mff.d3s.spl.SPLFormula";

const ACC_SUPER: u16 = 0x0020;
const ACC_ABSTRACT: u16 = 0x0400;

#[derive(Clone, Debug)]
pub enum Element {
    Str(&'static str),
    Owned(String),
    Int(i32),
    Long(i64),
    Enum(&'static str, &'static str),
    Array(Vec<Element>),
}

#[derive(Clone, Debug)]
struct AnnotationDef {
    type_name: String,
    elements: Vec<(String, Element)>,
}

#[derive(Clone, Debug)]
struct MethodSpec {
    name: String,
    access: u16,
    annotations: Vec<AnnotationDef>,
}

#[derive(Clone, Debug)]
pub struct ClassFileBuilder {
    name: String,
    access: u16,
    super_name: Option<String>,
    interfaces: Vec<String>,
    annotations: Vec<AnnotationDef>,
    methods: Vec<MethodSpec>,
    raw_utf8: Vec<Vec<u8>>,
}

fn formula_annotation(type_name: &str, value: &str) -> AnnotationDef {
    AnnotationDef {
        type_name: type_name.to_string(),
        elements: vec![("value".to_string(), Element::Owned(value.to_string()))],
    }
}

impl ClassFileBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            access: ACC_PUBLIC | ACC_SUPER,
            super_name: Some("java.lang.Object".to_string()),
            interfaces: Vec::new(),
            annotations: Vec::new(),
            methods: vec![MethodSpec {
                name: "<init>".to_string(),
                access: ACC_PUBLIC,
                annotations: Vec::new(),
            }],
            raw_utf8: Vec::new(),
        }
    }

    /// Add an unreferenced utf8 constant holding `bytes` verbatim.
    pub fn raw_utf8_constant(mut self, bytes: &[u8]) -> Self {
        self.raw_utf8.push(bytes.to_vec());
        self
    }

    pub fn interface(mut self) -> Self {
        self.access = ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT;
        self.methods.retain(|m| m.name != "<init>");
        self
    }

    pub fn extends(mut self, super_name: &str) -> Self {
        self.super_name = Some(super_name.to_string());
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    pub fn annotated(mut self, type_name: &str, value: &str) -> Self {
        self.annotations.push(formula_annotation(type_name, value));
        self
    }

    pub fn annotated_with(mut self, type_name: &str, elements: Vec<(&str, Element)>) -> Self {
        self.annotations.push(AnnotationDef {
            type_name: type_name.to_string(),
            elements: elements
                .into_iter()
                .map(|(n, e)| (n.to_string(), e))
                .collect(),
        });
        self
    }

    pub fn method(self, name: &str) -> Self {
        self.method_with(name, ACC_PUBLIC, None)
    }

    pub fn annotated_method(self, name: &str, type_name: &str, value: &str) -> Self {
        self.method_with(name, ACC_PUBLIC, Some((type_name, value)))
    }

    pub fn method_with(mut self, name: &str, access: u16, tag: Option<(&str, &str)>) -> Self {
        self.methods.push(MethodSpec {
            name: name.to_string(),
            access,
            annotations: tag.map(|(t, v)| formula_annotation(t, v)).into_iter().collect(),
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = PoolBuilder::default();
        let mut body = Vec::new();
        for bytes in &self.raw_utf8 {
            pool.raw_utf8(bytes);
        }

        put_u2(&mut body, self.access);
        put_u2(&mut body, pool.class(&self.name));
        let super_index = self.super_name.as_deref().map_or(0, |s| pool.class(s));
        put_u2(&mut body, super_index);
        put_u2(&mut body, self.interfaces.len() as u16);
        for interface in &self.interfaces {
            put_u2(&mut body, pool.class(interface));
        }

        // One constant long field so two-slot constants are exercised.
        put_u2(&mut body, 1);
        put_u2(&mut body, 0x0002 | 0x0008 | 0x0010);
        put_u2(&mut body, pool.utf8("SEED"));
        put_u2(&mut body, pool.utf8("J"));
        put_u2(&mut body, 1);
        put_u2(&mut body, pool.utf8("ConstantValue"));
        put_u4(&mut body, 2);
        put_u2(&mut body, pool.long(42));

        put_u2(&mut body, self.methods.len() as u16);
        for method in &self.methods {
            put_u2(&mut body, method.access);
            put_u2(&mut body, pool.utf8(&method.name));
            put_u2(&mut body, pool.utf8("()V"));
            write_annotations(&mut body, &mut pool, &method.annotations);
        }

        // Class attributes: a SourceFile to skip plus the annotations.
        let has_annotations = !self.annotations.is_empty();
        put_u2(&mut body, 1 + u16::from(has_annotations));
        put_u2(&mut body, pool.utf8("SourceFile"));
        put_u4(&mut body, 2);
        put_u2(&mut body, pool.utf8("Bench.java"));
        if has_annotations {
            write_annotation_attribute(&mut body, &mut pool, &self.annotations);
        }

        let mut out = Vec::with_capacity(body.len() + pool.bytes.len() + 10);
        put_u4(&mut out, MAGIC);
        put_u2(&mut out, 0);
        put_u2(&mut out, 52);
        put_u2(&mut out, pool.next);
        out.extend_from_slice(&pool.bytes);
        out.extend_from_slice(&body);
        out
    }

    /// Write the class under `root` at its class-file path and return that path.
    pub fn write_to(&self, root: &Path) -> PathBuf {
        let path = root.join(binary_to_path(&self.name));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, self.build()).unwrap();
        path
    }
}

/// Write a jar at `path` holding `classes` plus a manifest.
pub fn write_jar(path: &Path, classes: &[&ClassFileBuilder]) {
    let mut jar = ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default();
    jar.add_directory("META-INF/", options).unwrap();
    jar.start_file("META-INF/MANIFEST.MF", options).unwrap();
    jar.write_all(b"Manifest-Version: 1.0\r\n").unwrap();
    for class in classes {
        jar.start_file(binary_to_path(&class.name), options).unwrap();
        jar.write_all(&class.build()).unwrap();
    }
    jar.finish().unwrap();
}

fn write_annotations(out: &mut Vec<u8>, pool: &mut PoolBuilder, annotations: &[AnnotationDef]) {
    if annotations.is_empty() {
        put_u2(out, 0);
    } else {
        put_u2(out, 1);
        write_annotation_attribute(out, pool, annotations);
    }
}

fn write_annotation_attribute(out: &mut Vec<u8>, pool: &mut PoolBuilder, annotations: &[AnnotationDef]) {
    let mut attr = Vec::new();
    put_u2(&mut attr, annotations.len() as u16);
    for annotation in annotations {
        write_annotation(&mut attr, pool, annotation);
    }
    put_u2(out, pool.utf8("RuntimeVisibleAnnotations"));
    put_u4(out, attr.len() as u32);
    out.extend_from_slice(&attr);
}

fn write_annotation(out: &mut Vec<u8>, pool: &mut PoolBuilder, annotation: &AnnotationDef) {
    put_u2(out, pool.utf8(&descriptor(&annotation.type_name)));
    put_u2(out, annotation.elements.len() as u16);
    for (name, element) in &annotation.elements {
        put_u2(out, pool.utf8(name));
        write_element(out, pool, element);
    }
}

fn write_element(out: &mut Vec<u8>, pool: &mut PoolBuilder, element: &Element) {
    match element {
        Element::Str(s) => {
            out.push(b's');
            put_u2(out, pool.utf8(s));
        }
        Element::Owned(s) => {
            out.push(b's');
            put_u2(out, pool.utf8(s));
        }
        Element::Int(v) => {
            out.push(b'I');
            put_u2(out, pool.int(*v));
        }
        Element::Long(v) => {
            out.push(b'J');
            put_u2(out, pool.long(*v));
        }
        Element::Enum(type_name, constant) => {
            out.push(b'e');
            put_u2(out, pool.utf8(&descriptor(type_name)));
            put_u2(out, pool.utf8(constant));
        }
        Element::Array(values) => {
            out.push(b'[');
            put_u2(out, values.len() as u16);
            for value in values {
                write_element(out, pool, value);
            }
        }
    }
}

fn descriptor(type_name: &str) -> String {
    format!("L{};", type_name.replace('.', "/"))
}

fn put_u2(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_u4(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

struct PoolBuilder {
    bytes: Vec<u8>,
    next: u16,
    utf8: HashMap<String, u16>,
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self {
            bytes: Vec::new(),
            next: 1,
            utf8: HashMap::new(),
        }
    }
}

impl PoolBuilder {
    fn utf8(&mut self, s: &str) -> u16 {
        if let Some(&index) = self.utf8.get(s) {
            return index;
        }
        self.bytes.push(1);
        put_u2(&mut self.bytes, s.len() as u16);
        self.bytes.extend_from_slice(s.as_bytes());
        let index = self.bump(1);
        self.utf8.insert(s.to_string(), index);
        index
    }

    fn raw_utf8(&mut self, bytes: &[u8]) -> u16 {
        self.bytes.push(1);
        put_u2(&mut self.bytes, bytes.len() as u16);
        self.bytes.extend_from_slice(bytes);
        self.bump(1)
    }

    fn class(&mut self, binary_name: &str) -> u16 {
        let name = self.utf8(&binary_name.replace('.', "/"));
        self.bytes.push(7);
        put_u2(&mut self.bytes, name);
        self.bump(1)
    }

    fn int(&mut self, v: i32) -> u16 {
        self.bytes.push(3);
        self.bytes.extend_from_slice(&v.to_be_bytes());
        self.bump(1)
    }

    fn long(&mut self, v: i64) -> u16 {
        self.bytes.push(5);
        self.bytes.extend_from_slice(&v.to_be_bytes());
        self.bump(2)
    }

    fn bump(&mut self, slots: u16) -> u16 {
        let index = self.next;
        self.next += slots;
        index
    }
}
