//! Resolution of member references through the inheritance hierarchy.

use std::collections::HashSet;

use crate::classpath::ClasspathIndex;
use crate::table::{MappingTable, RenameRule};

/// Finds the rename rule that applies to a symbol reference.
///
/// A reference names the type it was compiled against, which is often a
/// subtype of the type whose member is renamed. The resolver walks up from
/// the referenced owner until it finds a type with a matching rule.
#[derive(Clone, Copy, Debug)]
pub struct SymbolResolver<'a> {
    table: &'a MappingTable,
    index: &'a ClasspathIndex,
}

impl<'a> SymbolResolver<'a> {
    /// Creates a resolver over a mapping table and a classpath.
    pub fn new(table: &'a MappingTable, index: &'a ClasspathIndex) -> Self {
        Self { table, index }
    }

    /// The mapping table rules are looked up in.
    pub fn table(&self) -> &'a MappingTable {
        self.table
    }

    /// Returns the new internal name of a class, `None` to keep it.
    ///
    /// Classes never inherit renames.
    pub fn resolve_class(&self, name: &str) -> Option<String> {
        self.table.map_class(name)
    }

    /// Rewrites the class names inside a descriptor.
    pub fn map_descriptor(&self, descriptor: &str) -> String {
        self.table.map_descriptor(descriptor)
    }

    /// Resolves a field reference `owner.name`.
    ///
    /// Follows field lookup order: the owner itself, its superinterfaces and
    /// then its superclass. The walk stops at the first type that declares
    /// the field, since a field of a subtype hides the inherited one.
    pub fn resolve_field(&self, owner: &str, name: &str) -> Option<RenameRule> {
        let mut visited = HashSet::new();
        self.walk_field(owner, name, &mut visited)
    }

    fn walk_field(&self, owner: &str, name: &str, visited: &mut HashSet<String>) -> Option<RenameRule> {
        if !visited.insert(owner.to_owned()) {
            return None;
        }
        if let Some(new_name) = self.table.field(owner, name) {
            return Some(RenameRule::field(owner, name, new_name));
        }

        let ty = self.index.declared_type(owner);
        if ty.is_unknown() || ty.declares_field(name) {
            return None;
        }
        for interface in &ty.interfaces {
            if let Some(rule) = self.walk_field(interface, name, visited) {
                return Some(rule);
            }
        }
        let super_name = ty.super_name.as_deref()?;
        self.walk_field(super_name, name, visited)
    }

    /// Resolves a method reference `owner.name descriptor`.
    ///
    /// Searches the superclass chain first and then the superinterfaces.
    /// Declarations along the way do not stop the walk: an override has to
    /// follow the rename of the method it overrides.
    pub fn resolve_method(&self, owner: &str, name: &str, descriptor: &str) -> Option<RenameRule> {
        if let Some(new_name) = self.table.method(owner, name, descriptor) {
            return Some(RenameRule::method(owner, name, descriptor, new_name));
        }
        // constructors and initializers are never inherited
        if name.starts_with('<') {
            return None;
        }

        let mut visited = HashSet::from([owner.to_owned()]);
        let ty = self.index.declared_type(owner);
        let supertypes = ty.super_name.iter().chain(&ty.interfaces);
        for supertype in supertypes {
            if let Some(rule) = self.walk_method(supertype, name, descriptor, &mut visited) {
                return Some(rule);
            }
        }
        None
    }

    fn walk_method(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
        visited: &mut HashSet<String>,
    ) -> Option<RenameRule> {
        if !visited.insert(owner.to_owned()) {
            return None;
        }
        if let Some(new_name) = self.table.method(owner, name, descriptor) {
            return Some(RenameRule::method(owner, name, descriptor, new_name));
        }

        let ty = self.index.declared_type(owner);
        if ty.is_unknown() {
            return None;
        }
        if let Some(super_name) = &ty.super_name {
            if let Some(rule) = self.walk_method(super_name, name, descriptor, visited) {
                return Some(rule);
            }
        }
        for interface in &ty.interfaces {
            if let Some(rule) = self.walk_method(interface, name, descriptor, visited) {
                return Some(rule);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classpath::TypeDescriptor;

    fn index() -> ClasspathIndex {
        ClasspathIndex::from_types([
            TypeDescriptor::new("Root", None)
                .with_field("x")
                .with_method("foo", "()V"),
            TypeDescriptor::new("Mid", Some("Root".into())).with_interface("Iface"),
            TypeDescriptor::new("Leaf", Some("Mid".into())).with_field("x"),
            TypeDescriptor::new("Iface", None).with_method("bar", "(I)V"),
        ])
    }

    fn table() -> MappingTable {
        [
            RenameRule::field("Root", "x", "rootX"),
            RenameRule::method("Root", "foo", "()V", "renamedFoo"),
            RenameRule::method("Iface", "bar", "(I)V", "renamedBar"),
            RenameRule::class("Root", "net/Root"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn methods_resolve_through_chain() {
        let (table, index) = (table(), index());
        let resolver = SymbolResolver::new(&table, &index);

        let direct = resolver.resolve_method("Root", "foo", "()V").unwrap();
        let inherited = resolver.resolve_method("Leaf", "foo", "()V").unwrap();
        assert_eq!(direct, inherited);
        assert_eq!(inherited.owner, "Root");
        assert_eq!(inherited.new_name, "renamedFoo");

        assert_eq!(resolver.resolve_method("Leaf", "foo", "(I)V"), None);
        assert_eq!(
            resolver.resolve_method("Leaf", "bar", "(I)V").unwrap().new_name,
            "renamedBar"
        );
    }

    #[test]
    fn fields_stop_at_hiding_declaration() {
        let (table, index) = (table(), index());
        let resolver = SymbolResolver::new(&table, &index);

        assert_eq!(resolver.resolve_field("Mid", "x").unwrap().new_name, "rootX");
        assert_eq!(resolver.resolve_field("Leaf", "x"), None);
    }

    #[test]
    fn unknown_types_end_the_walk() {
        let (table, index) = (table(), index());
        let resolver = SymbolResolver::new(&table, &index);

        assert_eq!(resolver.resolve_method("java/util/ArrayList", "foo", "()V"), None);
        assert_eq!(resolver.resolve_field("Unknown", "x"), None);
        assert_eq!(resolver.resolve_class("Root").as_deref(), Some("net/Root"));
        assert_eq!(resolver.resolve_class("java/lang/Object"), None);
    }

    #[test]
    fn constructors_are_not_inherited() {
        let table: MappingTable = [RenameRule::method("Root", "<init>", "()V", "bogus")]
            .into_iter()
            .collect();
        let index = index();
        let resolver = SymbolResolver::new(&table, &index);
        assert_eq!(resolver.resolve_method("Leaf", "<init>", "()V"), None);
    }

    #[test]
    fn cyclic_hierarchies_terminate() {
        let index = ClasspathIndex::from_types([
            TypeDescriptor::new("A", Some("B".into())),
            TypeDescriptor::new("B", Some("A".into())),
        ]);
        let table = MappingTable::new();
        let resolver = SymbolResolver::new(&table, &index);
        assert_eq!(resolver.resolve_method("A", "m", "()V"), None);
        assert_eq!(resolver.resolve_field("A", "f"), None);
    }
}
