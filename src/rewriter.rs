//! Renaming the symbols of a single class file.
//!
//! Every symbolic reference in a class file ends in a `CONSTANT_Utf8` slot,
//! and bytecode only ever points at constants, never at strings directly.
//! Renaming therefore only has to touch the constant pool and the field and
//! method declarations.
//!
//! Slots are shared freely: the same `Utf8` may be the name of a field and a
//! string literal, and the same `NameAndType` may be used by references to
//! members of different classes. A shared slot is rewritten in place only if
//! all of its users want the same new value. Otherwise it is left alone and
//! the users that need a different value are pointed at appended slots, so
//! existing indices stay valid.
//!
//! Attribute bodies index `Utf8` slots as well. Those uses keep their value.
//! When a class carries an attribute of unknown layout, no slot is rewritten
//! in place at all.

use std::collections::{BTreeMap, HashMap};

use crate::classfile::{ClassFile, ClassFileError, Constant};
use crate::descriptor::remap_class_reference;
use crate::resolver::SymbolResolver;

/// A structure field holding the index of a `Utf8` constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Site {
    ClassName(u16),
    NameAndTypeName(u16),
    NameAndTypeDescriptor(u16),
    MethodTypeDescriptor(u16),
    FieldName(usize),
    FieldDescriptor(usize),
    MethodName(usize),
    MethodDescriptor(usize),
    /// A use whose value has to stay as it is.
    Pinned,
}

#[derive(Debug)]
struct Use {
    site: Site,
    utf8: u16,
    /// The new value, `None` to keep the current one.
    desired: Option<String>,
}

#[derive(Debug)]
struct Plan {
    uses: Vec<Use>,
    /// Whether slots may be rewritten in place.
    in_place: bool,
}

impl Plan {
    fn push(&mut self, site: Site, utf8: u16, current: &str, desired: String) {
        let desired = (desired != current).then_some(desired);
        self.uses.push(Use {
            site,
            utf8,
            desired,
        });
    }

    fn pin(&mut self, utf8: u16) {
        self.uses.push(Use {
            site: Site::Pinned,
            utf8,
            desired: None,
        });
    }

    /// Applies all planned renames, returning whether anything changed.
    fn apply(self, class: &mut ClassFile) -> Result<bool, ClassFileError> {
        let mut by_utf8: BTreeMap<u16, Vec<&Use>> = BTreeMap::new();
        for u in &self.uses {
            by_utf8.entry(u.utf8).or_default().push(u);
        }

        let mut changed = false;
        let mut appended: HashMap<&str, u16> = HashMap::new();
        for (utf8, uses) in by_utf8 {
            let first = &uses[0].desired;
            if uses.iter().all(|u| u.desired == *first) {
                match first {
                    None => continue,
                    Some(value) if self.in_place => {
                        *class.constant_pool.get_mut(utf8)? = Constant::Utf8(value.clone());
                        changed = true;
                        continue;
                    }
                    Some(_) => {}
                }
            }

            for u in uses {
                let Some(value) = u.desired.as_deref() else {
                    continue;
                };
                let index = match appended.get(value) {
                    Some(index) => *index,
                    None => {
                        let index = class.constant_pool.push(Constant::Utf8(value.to_owned()))?;
                        appended.insert(value, index);
                        index
                    }
                };
                repoint(class, u.site, index)?;
                changed = true;
            }
        }
        Ok(changed)
    }
}

fn repoint(class: &mut ClassFile, site: Site, utf8: u16) -> Result<(), ClassFileError> {
    match site {
        Site::ClassName(index) => match class.constant_pool.get_mut(index)? {
            Constant::Class { name_index } => *name_index = utf8,
            _ => return Err(ClassFileError::InvalidConstantIndex { index }),
        },
        Site::NameAndTypeName(index) => match class.constant_pool.get_mut(index)? {
            Constant::NameAndType { name_index, .. } => *name_index = utf8,
            _ => return Err(ClassFileError::InvalidConstantIndex { index }),
        },
        Site::NameAndTypeDescriptor(index) => match class.constant_pool.get_mut(index)? {
            Constant::NameAndType {
                descriptor_index, ..
            } => *descriptor_index = utf8,
            _ => return Err(ClassFileError::InvalidConstantIndex { index }),
        },
        Site::MethodTypeDescriptor(index) => match class.constant_pool.get_mut(index)? {
            Constant::MethodType { descriptor_index } => *descriptor_index = utf8,
            _ => return Err(ClassFileError::InvalidConstantIndex { index }),
        },
        Site::FieldName(i) => class.fields[i].name_index = utf8,
        Site::FieldDescriptor(i) => class.fields[i].descriptor_index = utf8,
        Site::MethodName(i) => class.methods[i].name_index = utf8,
        Site::MethodDescriptor(i) => class.methods[i].descriptor_index = utf8,
        Site::Pinned => {}
    }
    Ok(())
}

/// Renames all symbols of a class file according to `resolver`.
///
/// Class names are rewritten wherever they occur in the constant pool,
/// descriptors included. Field and method references are renamed after
/// resolving them through the inheritance hierarchy, and so are the class's
/// own field and method declarations. Attributes are copied unchanged.
///
/// When nothing needs renaming the input is returned as is.
pub fn rewrite(bytes: &[u8], resolver: &SymbolResolver<'_>) -> Result<Vec<u8>, ClassFileError> {
    let mut class = ClassFile::parse(bytes)?;

    let (split, name_and_types) = split_name_and_types(&mut class, resolver)?;
    let plan = plan_renames(&class, resolver, name_and_types)?;
    let changed = plan.apply(&mut class)?;

    if !changed && !split {
        return Ok(bytes.to_vec());
    }
    class.write()
}

/// The new `(name, descriptor)` of a `NameAndType`.
type Target = (String, String);

/// Works out the target of every member reference and gives references
/// with different targets their own `NameAndType`.
///
/// Returns whether any `NameAndType` was added, and the target of each
/// referenced `NameAndType`.
fn split_name_and_types(
    class: &mut ClassFile,
    resolver: &SymbolResolver<'_>,
) -> Result<(bool, Vec<(u16, Target)>), ClassFileError> {
    let pool = &class.constant_pool;

    // name and type -> distinct targets with the references wanting them
    let mut groups: BTreeMap<u16, Vec<(Target, Vec<u16>)>> = BTreeMap::new();
    for (index, constant) in pool.iter() {
        let (name_and_type, target) = match *constant {
            Constant::FieldRef {
                class_index,
                name_and_type_index,
            } => {
                let owner = pool.class_name(class_index)?;
                let (name, desc) = pool.name_and_type(name_and_type_index)?;
                let new_name = match resolver.resolve_field(owner, name) {
                    Some(rule) => rule.new_name,
                    None => name.to_owned(),
                };
                (name_and_type_index, (new_name, resolver.map_descriptor(desc)))
            }
            Constant::MethodRef {
                class_index,
                name_and_type_index,
            }
            | Constant::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => {
                let owner = pool.class_name(class_index)?;
                let (name, desc) = pool.name_and_type(name_and_type_index)?;
                let new_name = match resolver.resolve_method(owner, name, desc) {
                    Some(rule) => rule.new_name,
                    None => name.to_owned(),
                };
                (name_and_type_index, (new_name, resolver.map_descriptor(desc)))
            }
            // the name of a call site is chosen by its bootstrap method
            Constant::Dynamic {
                name_and_type_index,
                ..
            }
            | Constant::InvokeDynamic {
                name_and_type_index,
                ..
            } => {
                let (name, desc) = pool.name_and_type(name_and_type_index)?;
                (
                    name_and_type_index,
                    (name.to_owned(), resolver.map_descriptor(desc)),
                )
            }
            _ => continue,
        };

        let targets = groups.entry(name_and_type).or_default();
        match targets.iter_mut().find(|(existing, _)| *existing == target) {
            Some((_, users)) => users.push(index),
            None => targets.push((target, vec![index])),
        }
    }

    let mut split = false;
    let mut name_and_types = Vec::with_capacity(groups.len());
    for (name_and_type, targets) in groups {
        let original = class.constant_pool.get(name_and_type)?.clone();
        for (i, (target, users)) in targets.into_iter().enumerate() {
            if i == 0 {
                name_and_types.push((name_and_type, target));
                continue;
            }
            let copy = class.constant_pool.push(original.clone())?;
            for user in users {
                set_name_and_type(class.constant_pool.get_mut(user)?, copy);
            }
            name_and_types.push((copy, target));
            split = true;
        }
    }
    Ok((split, name_and_types))
}

fn set_name_and_type(constant: &mut Constant, index: u16) {
    match constant {
        Constant::FieldRef {
            name_and_type_index,
            ..
        }
        | Constant::MethodRef {
            name_and_type_index,
            ..
        }
        | Constant::InterfaceMethodRef {
            name_and_type_index,
            ..
        }
        | Constant::Dynamic {
            name_and_type_index,
            ..
        }
        | Constant::InvokeDynamic {
            name_and_type_index,
            ..
        } => *name_and_type_index = index,
        _ => {}
    }
}

/// Collects the desired value of every known `Utf8` use.
fn plan_renames(
    class: &ClassFile,
    resolver: &SymbolResolver<'_>,
    name_and_types: Vec<(u16, Target)>,
) -> Result<Plan, ClassFileError> {
    let pool = &class.constant_pool;
    let strings = class.attribute_strings();
    let mut plan = Plan {
        uses: Vec::new(),
        in_place: !strings.opaque,
    };
    for utf8 in strings.utf8s {
        plan.pin(utf8);
    }

    for (index, constant) in pool.iter() {
        match *constant {
            Constant::Class { name_index } => {
                let name = pool.utf8(name_index)?;
                let desired = match remap_class_reference(name, |c| resolver.resolve_class(c)) {
                    Some(mapped) => mapped.into_owned(),
                    None => name.to_owned(),
                };
                plan.push(Site::ClassName(index), name_index, name, desired);
            }
            Constant::MethodType { descriptor_index } => {
                let desc = pool.utf8(descriptor_index)?;
                plan.push(
                    Site::MethodTypeDescriptor(index),
                    descriptor_index,
                    desc,
                    resolver.map_descriptor(desc),
                );
            }
            Constant::String { string_index: utf8 }
            | Constant::Module { name_index: utf8 }
            | Constant::Package { name_index: utf8 } => plan.pin(utf8),
            _ => {}
        }
    }

    for (index, (new_name, new_desc)) in name_and_types {
        let (name_index, descriptor_index) = match *pool.get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => (name_index, descriptor_index),
            _ => return Err(ClassFileError::InvalidConstantIndex { index }),
        };
        plan.push(
            Site::NameAndTypeName(index),
            name_index,
            pool.utf8(name_index)?,
            new_name,
        );
        plan.push(
            Site::NameAndTypeDescriptor(index),
            descriptor_index,
            pool.utf8(descriptor_index)?,
            new_desc,
        );
    }

    let this_name = class.name()?;
    for (i, field) in class.fields.iter().enumerate() {
        let (name, desc) = class.member_signature(field)?;
        let new_name = match resolver.resolve_field(this_name, name) {
            Some(rule) => rule.new_name,
            None => name.to_owned(),
        };
        plan.push(Site::FieldName(i), field.name_index, name, new_name);
        plan.push(
            Site::FieldDescriptor(i),
            field.descriptor_index,
            desc,
            resolver.map_descriptor(desc),
        );
    }
    for (i, method) in class.methods.iter().enumerate() {
        let (name, desc) = class.member_signature(method)?;
        let new_name = match resolver.resolve_method(this_name, name, desc) {
            Some(rule) => rule.new_name,
            None => name.to_owned(),
        };
        plan.push(Site::MethodName(i), method.name_index, name, new_name);
        plan.push(
            Site::MethodDescriptor(i),
            method.descriptor_index,
            desc,
            resolver.map_descriptor(desc),
        );
    }

    Ok(plan)
}
