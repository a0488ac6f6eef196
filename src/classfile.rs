//! Reading and writing of JVM class files.
//!
//! Only the symbol tables are modelled: the constant pool, the class header
//! and the field and method declarations. Attribute contents are kept as
//! opaque bytes and written back unchanged.

use std::borrow::Cow;

use thiserror::Error;

const MAGIC: u32 = 0xCAFE_BABE;

/// Errors when reading or writing a class file.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClassFileError {
    /// The data ended in the middle of a structure.
    #[error("unexpected end of class file")]
    UnexpectedEof,
    /// The data does not start with `0xCAFEBABE`.
    #[error("invalid class file magic header")]
    InvalidMagic,
    /// The constant pool contains an unknown tag.
    #[error("unsupported constant pool tag {tag}")]
    UnsupportedConstant {
        /// The unknown tag.
        tag: u8,
    },
    /// An index does not point at a constant of the expected kind.
    #[error("invalid constant pool index {index}")]
    InvalidConstantIndex {
        /// The offending index.
        index: u16,
    },
    /// A `CONSTANT_Utf8` entry is not valid modified UTF-8.
    #[error("invalid modified UTF-8 in constant {index}")]
    InvalidUtf8 {
        /// The offending index.
        index: u16,
    },
    /// A string is too long for a `CONSTANT_Utf8` entry.
    #[error("string of {len} bytes does not fit a constant")]
    StringTooLong {
        /// The encoded length.
        len: usize,
    },
    /// Adding constants would exceed 65535 slots.
    #[error("constant pool overflow")]
    ConstantPoolOverflow,
    /// An attribute body does not match its layout.
    #[error("malformed attribute body")]
    MalformedAttribute,
    /// Data follows the last class attribute.
    #[error("{0} trailing bytes after class file")]
    TrailingBytes(usize),
}

/// One constant pool slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    /// Slot 0 and the slot following a long or double.
    Unusable,
    /// A string from the symbol table.
    Utf8(String),
    /// A `CONSTANT_Utf8` that is not a valid Rust string, for example a
    /// string literal holding an unpaired surrogate. Kept as its original
    /// modified UTF-8 bytes.
    RawUtf8(Vec<u8>),
    /// A 32-bit integer.
    Integer(u32),
    /// A 32-bit float, as raw bits.
    Float(u32),
    /// A 64-bit integer.
    Long(u64),
    /// A 64-bit float, as raw bits.
    Double(u64),
    /// A class reference.
    Class {
        /// Index of the internal name or array descriptor.
        name_index: u16,
    },
    /// A string literal.
    String {
        /// Index of the literal's contents.
        string_index: u16,
    },
    /// A field reference.
    FieldRef {
        /// Index of the owning class.
        class_index: u16,
        /// Index of the name and type.
        name_and_type_index: u16,
    },
    /// A method reference on a class.
    MethodRef {
        /// Index of the owning class.
        class_index: u16,
        /// Index of the name and type.
        name_and_type_index: u16,
    },
    /// A method reference on an interface.
    InterfaceMethodRef {
        /// Index of the owning interface.
        class_index: u16,
        /// Index of the name and type.
        name_and_type_index: u16,
    },
    /// A member name paired with its descriptor.
    NameAndType {
        /// Index of the member name.
        name_index: u16,
        /// Index of the descriptor.
        descriptor_index: u16,
    },
    /// A method handle.
    MethodHandle {
        /// The handle's reference kind.
        reference_kind: u8,
        /// Index of the referenced member.
        reference_index: u16,
    },
    /// A method type.
    MethodType {
        /// Index of the method descriptor.
        descriptor_index: u16,
    },
    /// A dynamically computed constant.
    Dynamic {
        /// Index into the bootstrap methods attribute.
        bootstrap_method_attr_index: u16,
        /// Index of the name and type.
        name_and_type_index: u16,
    },
    /// A dynamically computed call site.
    InvokeDynamic {
        /// Index into the bootstrap methods attribute.
        bootstrap_method_attr_index: u16,
        /// Index of the name and type.
        name_and_type_index: u16,
    },
    /// A module.
    Module {
        /// Index of the module name.
        name_index: u16,
    },
    /// A package.
    Package {
        /// Index of the package name.
        name_index: u16,
    },
}

impl Constant {
    /// Long and double constants take up two slots.
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// The constant pool of a class file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self {
            entries: vec![Constant::Unusable],
        }
    }
}

impl ConstantPool {
    /// The `constant_pool_count` as written in the class file.
    pub fn count(&self) -> u16 {
        // `push` keeps this below u16::MAX
        self.entries.len() as u16
    }

    /// The constant at `index`.
    pub fn get(&self, index: u16) -> Result<&Constant, ClassFileError> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => Err(ClassFileError::InvalidConstantIndex { index }),
            Some(constant) => Ok(constant),
        }
    }

    pub(crate) fn get_mut(&mut self, index: u16) -> Result<&mut Constant, ClassFileError> {
        match self.entries.get_mut(index as usize) {
            Some(Constant::Unusable) | None => Err(ClassFileError::InvalidConstantIndex { index }),
            Some(constant) => Ok(constant),
        }
    }

    /// Iterates over all usable slots with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, constant)| !matches!(constant, Constant::Unusable))
            .map(|(index, constant)| (index as u16, constant))
    }

    /// Appends a constant and returns its index.
    pub fn push(&mut self, constant: Constant) -> Result<u16, ClassFileError> {
        let slots = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + slots > u16::MAX as usize {
            return Err(ClassFileError::ConstantPoolOverflow);
        }
        let index = self.entries.len() as u16;
        self.entries.push(constant);
        if slots == 2 {
            self.entries.push(Constant::Unusable);
        }
        Ok(index)
    }

    /// The string stored at `index`.
    ///
    /// Fails with [`ClassFileError::InvalidUtf8`] for a [`Constant::RawUtf8`].
    pub fn utf8(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value),
            Constant::RawUtf8(_) => Err(ClassFileError::InvalidUtf8 { index }),
            _ => Err(ClassFileError::InvalidConstantIndex { index }),
        }
    }

    /// The internal name (or array descriptor) of the class at `index`.
    pub fn class_name(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => Err(ClassFileError::InvalidConstantIndex { index }),
        }
    }

    /// The name and descriptor of the `NameAndType` at `index`.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str), ClassFileError> {
        match self.get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => Err(ClassFileError::InvalidConstantIndex { index }),
        }
    }

    fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ClassFileError> {
        let count = reader.read_u2()? as usize;
        if count == 0 {
            return Err(ClassFileError::InvalidConstantIndex { index: 0 });
        }
        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable); // index 0 unused

        while entries.len() < count {
            let index = entries.len() as u16;
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let length = reader.read_u2()? as usize;
                    let bytes = reader.read_slice(length)?;
                    match decode_modified_utf8(bytes) {
                        Some(string) => Constant::Utf8(string.into_owned()),
                        None if decode_utf16_units(bytes).is_some() => Constant::RawUtf8(bytes.to_vec()),
                        None => return Err(ClassFileError::InvalidUtf8 { index }),
                    }
                }
                3 => Constant::Integer(reader.read_u4()?),
                4 => Constant::Float(reader.read_u4()?),
                5 => Constant::Long(reader.read_u8()?),
                6 => Constant::Double(reader.read_u8()?),
                7 => Constant::Class {
                    name_index: reader.read_u2()?,
                },
                8 => Constant::String {
                    string_index: reader.read_u2()?,
                },
                9 => Constant::FieldRef {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                10 => Constant::MethodRef {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                11 => Constant::InterfaceMethodRef {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                12 => Constant::NameAndType {
                    name_index: reader.read_u2()?,
                    descriptor_index: reader.read_u2()?,
                },
                15 => Constant::MethodHandle {
                    reference_kind: reader.read_u1()?,
                    reference_index: reader.read_u2()?,
                },
                16 => Constant::MethodType {
                    descriptor_index: reader.read_u2()?,
                },
                17 => Constant::Dynamic {
                    bootstrap_method_attr_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap_method_attr_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                19 => Constant::Module {
                    name_index: reader.read_u2()?,
                },
                20 => Constant::Package {
                    name_index: reader.read_u2()?,
                },
                other => return Err(ClassFileError::UnsupportedConstant { tag: other }),
            };

            let wide = entry.is_wide();
            entries.push(entry);
            if wide {
                entries.push(Constant::Unusable);
            }
        }
        if entries.len() > count {
            // a long or double claimed the last slot
            return Err(ClassFileError::InvalidConstantIndex {
                index: (count - 1) as u16,
            });
        }

        Ok(Self { entries })
    }

    fn write(&self, writer: &mut ClassWriter) -> Result<(), ClassFileError> {
        writer.put_u2(self.count());
        for constant in &self.entries {
            match *constant {
                Constant::Unusable => {}
                Constant::Utf8(ref value) => {
                    let bytes = encode_modified_utf8(value);
                    let len = u16::try_from(bytes.len())
                        .map_err(|_| ClassFileError::StringTooLong { len: bytes.len() })?;
                    writer.put_u1(1);
                    writer.put_u2(len);
                    writer.put_slice(&bytes);
                }
                Constant::RawUtf8(ref bytes) => {
                    let len = u16::try_from(bytes.len())
                        .map_err(|_| ClassFileError::StringTooLong { len: bytes.len() })?;
                    writer.put_u1(1);
                    writer.put_u2(len);
                    writer.put_slice(bytes);
                }
                Constant::Integer(value) => {
                    writer.put_u1(3);
                    writer.put_u4(value);
                }
                Constant::Float(value) => {
                    writer.put_u1(4);
                    writer.put_u4(value);
                }
                Constant::Long(value) => {
                    writer.put_u1(5);
                    writer.put_u8(value);
                }
                Constant::Double(value) => {
                    writer.put_u1(6);
                    writer.put_u8(value);
                }
                Constant::Class { name_index } => {
                    writer.put_u1(7);
                    writer.put_u2(name_index);
                }
                Constant::String { string_index } => {
                    writer.put_u1(8);
                    writer.put_u2(string_index);
                }
                Constant::FieldRef {
                    class_index,
                    name_and_type_index,
                } => {
                    writer.put_u1(9);
                    writer.put_u2(class_index);
                    writer.put_u2(name_and_type_index);
                }
                Constant::MethodRef {
                    class_index,
                    name_and_type_index,
                } => {
                    writer.put_u1(10);
                    writer.put_u2(class_index);
                    writer.put_u2(name_and_type_index);
                }
                Constant::InterfaceMethodRef {
                    class_index,
                    name_and_type_index,
                } => {
                    writer.put_u1(11);
                    writer.put_u2(class_index);
                    writer.put_u2(name_and_type_index);
                }
                Constant::NameAndType {
                    name_index,
                    descriptor_index,
                } => {
                    writer.put_u1(12);
                    writer.put_u2(name_index);
                    writer.put_u2(descriptor_index);
                }
                Constant::MethodHandle {
                    reference_kind,
                    reference_index,
                } => {
                    writer.put_u1(15);
                    writer.put_u1(reference_kind);
                    writer.put_u2(reference_index);
                }
                Constant::MethodType { descriptor_index } => {
                    writer.put_u1(16);
                    writer.put_u2(descriptor_index);
                }
                Constant::Dynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => {
                    writer.put_u1(17);
                    writer.put_u2(bootstrap_method_attr_index);
                    writer.put_u2(name_and_type_index);
                }
                Constant::InvokeDynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => {
                    writer.put_u1(18);
                    writer.put_u2(bootstrap_method_attr_index);
                    writer.put_u2(name_and_type_index);
                }
                Constant::Module { name_index } => {
                    writer.put_u1(19);
                    writer.put_u2(name_index);
                }
                Constant::Package { name_index } => {
                    writer.put_u1(20);
                    writer.put_u2(name_index);
                }
            }
        }
        Ok(())
    }
}

/// An attribute, kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Index of the attribute's name.
    pub name_index: u16,
    /// The attribute's contents.
    pub info: Vec<u8>,
}

/// A field or method declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Access flags.
    pub access_flags: u16,
    /// Index of the member name.
    pub name_index: u16,
    /// Index of the descriptor.
    pub descriptor_index: u16,
    /// The member's attributes.
    pub attributes: Vec<Attribute>,
}

/// A parsed class file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    /// Minor format version.
    pub minor_version: u16,
    /// Major format version.
    pub major_version: u16,
    /// The constant pool.
    pub constant_pool: ConstantPool,
    /// Class access flags.
    pub access_flags: u16,
    /// Index of this class.
    pub this_class: u16,
    /// Index of the superclass, 0 for `java/lang/Object`.
    pub super_class: u16,
    /// Indices of the direct superinterfaces.
    pub interfaces: Vec<u16>,
    /// Declared fields.
    pub fields: Vec<Member>,
    /// Declared methods.
    pub methods: Vec<Member>,
    /// Class attributes.
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Parses a complete class file.
    pub fn parse(bytes: &[u8]) -> Result<Self, ClassFileError> {
        let mut reader = ClassReader::new(bytes);
        if reader.read_u4()? != MAGIC {
            return Err(ClassFileError::InvalidMagic);
        }
        let minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        let constant_pool = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u2()?;
        let this_class = reader.read_u2()?;
        let super_class = reader.read_u2()?;

        let interfaces_count = reader.read_u2()?;
        let mut interfaces = Vec::with_capacity(interfaces_count as usize);
        for _ in 0..interfaces_count {
            interfaces.push(reader.read_u2()?);
        }

        let fields = read_members(&mut reader)?;
        let methods = read_members(&mut reader)?;
        let attributes = read_attributes(&mut reader)?;

        if reader.remaining() != 0 {
            return Err(ClassFileError::TrailingBytes(reader.remaining()));
        }

        let class = Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        };
        class.validate()?;
        Ok(class)
    }

    /// Checks that every index outside of attributes points at a constant
    /// of the right kind.
    fn validate(&self) -> Result<(), ClassFileError> {
        let pool = &self.constant_pool;
        for (_, constant) in pool.iter() {
            match *constant {
                Constant::Class { name_index } | Constant::Module { name_index } | Constant::Package { name_index } => {
                    pool.utf8(name_index)?;
                }
                Constant::String { string_index } => {
                    pool.utf8(string_index)?;
                }
                Constant::FieldRef {
                    class_index,
                    name_and_type_index,
                }
                | Constant::MethodRef {
                    class_index,
                    name_and_type_index,
                }
                | Constant::InterfaceMethodRef {
                    class_index,
                    name_and_type_index,
                } => {
                    pool.class_name(class_index)?;
                    pool.name_and_type(name_and_type_index)?;
                }
                Constant::NameAndType {
                    name_index,
                    descriptor_index,
                } => {
                    pool.utf8(name_index)?;
                    pool.utf8(descriptor_index)?;
                }
                Constant::MethodType { descriptor_index } => {
                    pool.utf8(descriptor_index)?;
                }
                Constant::Dynamic {
                    name_and_type_index,
                    ..
                }
                | Constant::InvokeDynamic {
                    name_and_type_index,
                    ..
                } => {
                    pool.name_and_type(name_and_type_index)?;
                }
                Constant::MethodHandle {
                    reference_index, ..
                } => {
                    pool.get(reference_index)?;
                }
                _ => {}
            }
        }

        pool.class_name(self.this_class)?;
        if self.super_class != 0 {
            pool.class_name(self.super_class)?;
        }
        for interface in &self.interfaces {
            pool.class_name(*interface)?;
        }
        for member in self.fields.iter().chain(&self.methods) {
            pool.utf8(member.name_index)?;
            pool.utf8(member.descriptor_index)?;
        }
        Ok(())
    }

    /// Serializes the class file.
    pub fn write(&self) -> Result<Vec<u8>, ClassFileError> {
        let mut writer = ClassWriter::default();
        writer.put_u4(MAGIC);
        writer.put_u2(self.minor_version);
        writer.put_u2(self.major_version);
        self.constant_pool.write(&mut writer)?;
        writer.put_u2(self.access_flags);
        writer.put_u2(self.this_class);
        writer.put_u2(self.super_class);
        writer.put_len(self.interfaces.len())?;
        for interface in &self.interfaces {
            writer.put_u2(*interface);
        }
        write_members(&mut writer, &self.fields)?;
        write_members(&mut writer, &self.methods)?;
        write_attributes(&mut writer, &self.attributes)?;
        Ok(writer.into_inner())
    }

    /// The internal name of this class.
    pub fn name(&self) -> Result<&str, ClassFileError> {
        self.constant_pool.class_name(self.this_class)
    }

    /// The internal name of the superclass, `None` for `java/lang/Object`.
    pub fn super_name(&self) -> Result<Option<&str>, ClassFileError> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name(self.super_class).map(Some)
    }

    /// The internal names of the direct superinterfaces.
    pub fn interface_names(&self) -> Result<Vec<&str>, ClassFileError> {
        self.interfaces
            .iter()
            .map(|index| self.constant_pool.class_name(*index))
            .collect()
    }

    /// The name and descriptor of a field or method.
    pub fn member_signature(&self, member: &Member) -> Result<(&str, &str), ClassFileError> {
        Ok((
            self.constant_pool.utf8(member.name_index)?,
            self.constant_pool.utf8(member.descriptor_index)?,
        ))
    }
}

fn read_members(reader: &mut ClassReader<'_>) -> Result<Vec<Member>, ClassFileError> {
    let count = reader.read_u2()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        members.push(Member {
            access_flags: reader.read_u2()?,
            name_index: reader.read_u2()?,
            descriptor_index: reader.read_u2()?,
            attributes: read_attributes(reader)?,
        });
    }
    Ok(members)
}

fn read_attributes(reader: &mut ClassReader<'_>) -> Result<Vec<Attribute>, ClassFileError> {
    let count = reader.read_u2()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        attributes.push(Attribute {
            name_index,
            info: reader.read_slice(length)?.to_vec(),
        });
    }
    Ok(attributes)
}

fn write_members(writer: &mut ClassWriter, members: &[Member]) -> Result<(), ClassFileError> {
    writer.put_len(members.len())?;
    for member in members {
        writer.put_u2(member.access_flags);
        writer.put_u2(member.name_index);
        writer.put_u2(member.descriptor_index);
        write_attributes(writer, &member.attributes)?;
    }
    Ok(())
}

fn write_attributes(writer: &mut ClassWriter, attributes: &[Attribute]) -> Result<(), ClassFileError> {
    writer.put_len(attributes.len())?;
    for attribute in attributes {
        writer.put_u2(attribute.name_index);
        let len = u32::try_from(attribute.info.len())
            .map_err(|_| ClassFileError::StringTooLong { len: attribute.info.len() })?;
        writer.put_u4(len);
        writer.put_slice(&attribute.info);
    }
    Ok(())
}

/// `Utf8` constants referenced from inside attribute bodies.
#[derive(Debug, Default)]
pub(crate) struct AttributeStrings {
    /// Indices read out of attribute names and known attribute layouts.
    pub(crate) utf8s: Vec<u16>,
    /// Set when some attribute could not be inspected and may point at
    /// further constants.
    pub(crate) opaque: bool,
}

impl ClassFile {
    /// Collects the `Utf8` constants used by the attributes of the class
    /// and of its fields and methods, nested attributes included.
    pub(crate) fn attribute_strings(&self) -> AttributeStrings {
        let mut strings = AttributeStrings::default();
        let attributes = self
            .attributes
            .iter()
            .chain(self.fields.iter().flat_map(|field| &field.attributes))
            .chain(self.methods.iter().flat_map(|method| &method.attributes));
        for attribute in attributes {
            strings.scan(&self.constant_pool, attribute.name_index, &attribute.info);
        }
        strings
    }
}

impl AttributeStrings {
    fn scan(&mut self, pool: &ConstantPool, name_index: u16, info: &[u8]) {
        self.utf8s.push(name_index);
        let Ok(name) = pool.utf8(name_index) else {
            self.opaque = true;
            return;
        };
        let mut reader = ClassReader::new(info);
        match self.scan_body(pool, name, &mut reader) {
            Ok(true) if reader.remaining() == 0 => {}
            _ => self.opaque = true,
        }
    }

    /// Returns `false` for attributes of unknown layout.
    fn scan_body(
        &mut self,
        pool: &ConstantPool,
        name: &str,
        reader: &mut ClassReader<'_>,
    ) -> Result<bool, ClassFileError> {
        match name {
            "SourceFile" | "Signature" => self.utf8s.push(reader.read_u2()?),
            "InnerClasses" => {
                for _ in 0..reader.read_u2()? {
                    reader.read_slice(4)?;
                    self.push_optional(reader.read_u2()?);
                    reader.read_u2()?;
                }
            }
            "LocalVariableTable" | "LocalVariableTypeTable" => {
                for _ in 0..reader.read_u2()? {
                    reader.read_slice(4)?;
                    self.utf8s.push(reader.read_u2()?);
                    self.utf8s.push(reader.read_u2()?);
                    reader.read_u2()?;
                }
            }
            "MethodParameters" => {
                for _ in 0..reader.read_u1()? {
                    self.push_optional(reader.read_u2()?);
                    reader.read_u2()?;
                }
            }
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                for _ in 0..reader.read_u2()? {
                    self.annotation(reader)?;
                }
            }
            "RuntimeVisibleParameterAnnotations" | "RuntimeInvisibleParameterAnnotations" => {
                for _ in 0..reader.read_u1()? {
                    for _ in 0..reader.read_u2()? {
                        self.annotation(reader)?;
                    }
                }
            }
            "RuntimeVisibleTypeAnnotations" | "RuntimeInvisibleTypeAnnotations" => {
                for _ in 0..reader.read_u2()? {
                    skip_type_annotation_target(reader)?;
                    self.annotation(reader)?;
                }
            }
            "AnnotationDefault" => self.element_value(reader)?,
            "Code" => {
                reader.read_slice(4)?;
                let code_length = reader.read_u4()? as usize;
                reader.read_slice(code_length)?;
                let handlers = reader.read_u2()? as usize;
                reader.read_slice(handlers * 8)?;
                for _ in 0..reader.read_u2()? {
                    self.nested(pool, reader)?;
                }
            }
            "Record" => {
                for _ in 0..reader.read_u2()? {
                    self.utf8s.push(reader.read_u2()?);
                    self.utf8s.push(reader.read_u2()?);
                    for _ in 0..reader.read_u2()? {
                        self.nested(pool, reader)?;
                    }
                }
            }
            // no direct Utf8 indices
            "ConstantValue" | "Exceptions" | "EnclosingMethod" | "Synthetic" | "Deprecated"
            | "StackMapTable" | "BootstrapMethods" | "NestHost" | "NestMembers"
            | "PermittedSubclasses" | "LineNumberTable" | "SourceDebugExtension"
            | "ModulePackages" | "ModuleMainClass" => {
                let rest = reader.remaining();
                reader.read_slice(rest)?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn nested(&mut self, pool: &ConstantPool, reader: &mut ClassReader<'_>) -> Result<(), ClassFileError> {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let info = reader.read_slice(length)?;
        self.scan(pool, name_index, info);
        Ok(())
    }

    fn push_optional(&mut self, index: u16) {
        if index != 0 {
            self.utf8s.push(index);
        }
    }

    fn annotation(&mut self, reader: &mut ClassReader<'_>) -> Result<(), ClassFileError> {
        self.utf8s.push(reader.read_u2()?);
        for _ in 0..reader.read_u2()? {
            self.utf8s.push(reader.read_u2()?);
            self.element_value(reader)?;
        }
        Ok(())
    }

    fn element_value(&mut self, reader: &mut ClassReader<'_>) -> Result<(), ClassFileError> {
        match reader.read_u1()? {
            b's' | b'c' => self.utf8s.push(reader.read_u2()?),
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => {
                reader.read_u2()?;
            }
            b'e' => {
                self.utf8s.push(reader.read_u2()?);
                self.utf8s.push(reader.read_u2()?);
            }
            b'@' => self.annotation(reader)?,
            b'[' => {
                for _ in 0..reader.read_u2()? {
                    self.element_value(reader)?;
                }
            }
            _ => return Err(ClassFileError::MalformedAttribute),
        }
        Ok(())
    }
}

fn skip_type_annotation_target(reader: &mut ClassReader<'_>) -> Result<(), ClassFileError> {
    let len = match reader.read_u1()? {
        0x13..=0x15 => 0,
        0x00 | 0x01 | 0x16 => 1,
        0x10..=0x12 | 0x17 | 0x42..=0x46 => 2,
        0x47..=0x4B => 3,
        0x40 | 0x41 => reader.read_u2()? as usize * 6,
        _ => return Err(ClassFileError::MalformedAttribute),
    };
    reader.read_slice(len)?;
    let path_length = reader.read_u1()? as usize;
    reader.read_slice(path_length * 2)?;
    Ok(())
}

/// Decodes the JVM's modified UTF-8.
///
/// Differs from standard UTF-8 in encoding NUL as `C0 80` and
/// supplementary characters as two 3-byte surrogates. Returns `None` for
/// malformed data and for unpaired surrogates, which Rust strings cannot
/// hold.
fn decode_modified_utf8(bytes: &[u8]) -> Option<Cow<'_, str>> {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return Some(Cow::Borrowed(s));
    }
    String::from_utf16(&decode_utf16_units(bytes)?).ok().map(Cow::Owned)
}

/// The UTF-16 code units of modified UTF-8, surrogates left unpaired.
fn decode_utf16_units(bytes: &[u8]) -> Option<Vec<u16>> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let (unit, len) = if b & 0x80 == 0 {
            (b as u16, 1)
        } else if b & 0xE0 == 0xC0 {
            let b2 = *bytes.get(i + 1)?;
            if b2 & 0xC0 != 0x80 {
                return None;
            }
            ((((b & 0x1F) as u16) << 6) | (b2 & 0x3F) as u16, 2)
        } else if b & 0xF0 == 0xE0 {
            let b2 = *bytes.get(i + 1)?;
            let b3 = *bytes.get(i + 2)?;
            if b2 & 0xC0 != 0x80 || b3 & 0xC0 != 0x80 {
                return None;
            }
            (
                (((b & 0x0F) as u16) << 12) | (((b2 & 0x3F) as u16) << 6) | (b3 & 0x3F) as u16,
                3,
            )
        } else {
            return None;
        };
        units.push(unit);
        i += len;
    }
    Some(units)
}

fn encode_modified_utf8(s: &str) -> Cow<'_, [u8]> {
    if !s.chars().any(|c| c == '\0' || c as u32 > 0xFFFF) {
        return Cow::Borrowed(s.as_bytes());
    }

    let mut out = Vec::with_capacity(s.len() + 8);
    for unit in s.encode_utf16() {
        match unit {
            0 => out.extend_from_slice(&[0xC0, 0x80]),
            0x01..=0x7F => out.push(unit as u8),
            0x80..=0x7FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    Cow::Owned(out)
}

struct ClassReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], ClassFileError> {
        if len > self.remaining() {
            return Err(ClassFileError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ClassFileError> {
        let mut array = [0; N];
        array.copy_from_slice(self.read_slice(N)?);
        Ok(array)
    }

    fn read_u1(&mut self) -> Result<u8, ClassFileError> {
        Ok(self.read_array::<1>()?[0])
    }

    fn read_u2(&mut self) -> Result<u16, ClassFileError> {
        self.read_array().map(u16::from_be_bytes)
    }

    fn read_u4(&mut self) -> Result<u32, ClassFileError> {
        self.read_array().map(u32::from_be_bytes)
    }

    fn read_u8(&mut self) -> Result<u64, ClassFileError> {
        self.read_array().map(u64::from_be_bytes)
    }
}

#[derive(Default)]
struct ClassWriter {
    data: Vec<u8>,
}

impl ClassWriter {
    fn put_u1(&mut self, value: u8) {
        self.data.push(value);
    }

    fn put_u2(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    fn put_u4(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    fn put_u8(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    fn put_slice(&mut self, slice: &[u8]) {
        self.data.extend_from_slice(slice);
    }

    fn put_len(&mut self, len: usize) -> Result<(), ClassFileError> {
        let len = u16::try_from(len).map_err(|_| ClassFileError::ConstantPoolOverflow)?;
        self.put_u2(len);
        Ok(())
    }

    fn into_inner(self) -> Vec<u8> {
        self.data
    }
}
