#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use jarremap::{Attribute, ClassFile, Constant, ConstantPool, Member};
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

/// `max_stack 1, max_locals 1, return`
const CODE: &[u8] = &[0, 1, 0, 1, 0, 0, 0, 1, 0xb1, 0, 0, 0, 0];

/// Assembles class files, sharing constants the way javac does.
pub struct ClassBuilder {
    pool: ConstantPool,
    utf8s: HashMap<String, u16>,
    classes: HashMap<String, u16>,
    name_and_types: HashMap<(String, String), u16>,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<Member>,
    methods: Vec<Member>,
}

impl ClassBuilder {
    pub fn new(name: &str, super_name: Option<&str>) -> Self {
        let mut builder = Self {
            pool: ConstantPool::default(),
            utf8s: HashMap::new(),
            classes: HashMap::new(),
            name_and_types: HashMap::new(),
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        };
        builder.this_class = builder.class(name);
        if let Some(super_name) = super_name {
            builder.super_class = builder.class(super_name);
        }
        builder
    }

    fn utf8(&mut self, value: &str) -> u16 {
        if let Some(index) = self.utf8s.get(value) {
            return *index;
        }
        let index = self.pool.push(Constant::Utf8(value.into())).unwrap();
        self.utf8s.insert(value.into(), index);
        index
    }

    fn class(&mut self, name: &str) -> u16 {
        if let Some(index) = self.classes.get(name) {
            return *index;
        }
        let name_index = self.utf8(name);
        let index = self.pool.push(Constant::Class { name_index }).unwrap();
        self.classes.insert(name.into(), index);
        index
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let key = (name.to_owned(), descriptor.to_owned());
        if let Some(index) = self.name_and_types.get(&key) {
            return *index;
        }
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let index = self
            .pool
            .push(Constant::NameAndType {
                name_index,
                descriptor_index,
            })
            .unwrap();
        self.name_and_types.insert(key, index);
        index
    }

    pub fn interface(mut self, name: &str) -> Self {
        let index = self.class(name);
        self.interfaces.push(index);
        self
    }

    pub fn field(mut self, name: &str, descriptor: &str) -> Self {
        let member = Member {
            access_flags: 0x0001,
            name_index: self.utf8(name),
            descriptor_index: self.utf8(descriptor),
            attributes: vec![],
        };
        self.fields.push(member);
        self
    }

    pub fn method(mut self, name: &str, descriptor: &str) -> Self {
        let member = Member {
            access_flags: 0x0001,
            name_index: self.utf8(name),
            descriptor_index: self.utf8(descriptor),
            attributes: vec![Attribute {
                name_index: self.utf8("Code"),
                info: CODE.to_vec(),
            }],
        };
        self.methods.push(member);
        self
    }

    pub fn field_ref(mut self, owner: &str, name: &str, descriptor: &str) -> Self {
        let class_index = self.class(owner);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.pool
            .push(Constant::FieldRef {
                class_index,
                name_and_type_index,
            })
            .unwrap();
        self
    }

    pub fn method_ref(mut self, owner: &str, name: &str, descriptor: &str) -> Self {
        let class_index = self.class(owner);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.pool
            .push(Constant::MethodRef {
                class_index,
                name_and_type_index,
            })
            .unwrap();
        self
    }

    pub fn string(mut self, value: &str) -> Self {
        let string_index = self.utf8(value);
        self.pool.push(Constant::String { string_index }).unwrap();
        self
    }

    pub fn long(mut self, value: u64) -> Self {
        self.pool.push(Constant::Long(value)).unwrap();
        self
    }

    pub fn build(self) -> Vec<u8> {
        ClassFile {
            minor_version: 0,
            major_version: 52,
            constant_pool: self.pool,
            access_flags: 0x0021,
            this_class: self.this_class,
            super_class: self.super_class,
            interfaces: self.interfaces,
            fields: self.fields,
            methods: self.methods,
            attributes: vec![],
        }
        .write()
        .unwrap()
    }
}

/// `(owner, name, descriptor)` of every field and method reference.
pub fn member_refs(class: &ClassFile) -> Vec<(String, String, String)> {
    let pool = &class.constant_pool;
    pool.iter()
        .filter_map(|(_, constant)| match *constant {
            Constant::FieldRef {
                class_index,
                name_and_type_index,
            }
            | Constant::MethodRef {
                class_index,
                name_and_type_index,
            } => {
                let owner = pool.class_name(class_index).unwrap();
                let (name, desc) = pool.name_and_type(name_and_type_index).unwrap();
                Some((owner.to_owned(), name.to_owned(), desc.to_owned()))
            }
            _ => None,
        })
        .collect()
}

/// `(name, descriptor)` of every declared field and method.
pub fn declarations(class: &ClassFile) -> Vec<(String, String)> {
    class
        .fields
        .iter()
        .chain(&class.methods)
        .map(|member| {
            let (name, desc) = class.member_signature(member).unwrap();
            (name.to_owned(), desc.to_owned())
        })
        .collect()
}

pub fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
    let mut writer = ZipWriter::new(File::create(path).unwrap());
    for (name, bytes) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, FileOptions::default()).unwrap();
        } else {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(bytes).unwrap();
        }
    }
    writer.finish().unwrap();
}

pub fn read_jar(path: &Path) -> Vec<(String, Vec<u8>)> {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|index| {
            let mut file = archive.by_index(index).unwrap();
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes).unwrap();
            (file.name().to_owned(), bytes)
        })
        .collect()
}

/// Creates `<mcp>/conf/<file_name>`.
pub fn write_conf(mcp_dir: &Path, file_name: &str, contents: &str) {
    let conf = mcp_dir.join("conf");
    fs::create_dir_all(&conf).unwrap();
    fs::write(conf.join(file_name), contents).unwrap();
}
