//! The in-memory rename table built from parsed mapping records.

use std::collections::HashMap;
use std::fmt;

use crate::descriptor::remap_descriptor;
use crate::mapping::{MappingRecord, MappingSource, ParseError};

/// The kind of symbol a [`RenameRule`] applies to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// A class (or interface) name.
    Class,
    /// A field name.
    Field,
    /// A method name.
    Method,
}

/// One rename rule.
///
/// Classes are keyed by `owner` alone, fields by `(owner, member)` and
/// methods by `(owner, member, descriptor)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RenameRule {
    /// The kind of symbol being renamed.
    pub kind: RuleKind,
    /// The original internal name of the class, or of the member's owner.
    pub owner: String,
    /// The original member name, for fields and methods.
    pub member: Option<String>,
    /// The original method descriptor, for methods.
    pub descriptor: Option<String>,
    /// The new simple name (members) or internal name (classes).
    pub new_name: String,
}

impl RenameRule {
    /// Creates a class rule.
    pub fn class(owner: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            kind: RuleKind::Class,
            owner: owner.into(),
            member: None,
            descriptor: None,
            new_name: new_name.into(),
        }
    }

    /// Creates a field rule.
    pub fn field(
        owner: impl Into<String>,
        member: impl Into<String>,
        new_name: impl Into<String>,
    ) -> Self {
        Self {
            kind: RuleKind::Field,
            owner: owner.into(),
            member: Some(member.into()),
            descriptor: None,
            new_name: new_name.into(),
        }
    }

    /// Creates a method rule.
    pub fn method(
        owner: impl Into<String>,
        member: impl Into<String>,
        descriptor: impl Into<String>,
        new_name: impl Into<String>,
    ) -> Self {
        Self {
            kind: RuleKind::Method,
            owner: owner.into(),
            member: Some(member.into()),
            descriptor: Some(descriptor.into()),
            new_name: new_name.into(),
        }
    }
}

impl fmt::Display for RenameRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, &self.member, &self.descriptor) {
            (RuleKind::Class, _, _) => write!(f, "{} -> {}", self.owner, self.new_name),
            (_, Some(member), Some(descriptor)) => write!(
                f,
                "{}.{}{} -> {}",
                self.owner, member, descriptor, self.new_name
            ),
            (_, Some(member), None) => {
                write!(f, "{}.{} -> {}", self.owner, member, self.new_name)
            }
            (_, None, _) => write!(f, "{}.? -> {}", self.owner, self.new_name),
        }
    }
}

#[derive(Clone, Debug, Default)]
struct OwnerRules {
    // field name -> new name
    fields: HashMap<String, String>,
    // method name -> [(descriptor, new name)]
    methods: HashMap<String, Vec<(String, String)>>,
}

/// Class, field and method rename rules.
///
/// The table is built once and then only read, so it can be shared freely
/// between threads.
#[derive(Clone, Debug, Default)]
pub struct MappingTable {
    classes: HashMap<String, String>,
    packages: HashMap<String, String>,
    members: HashMap<String, OwnerRules>,
    conflicts: usize,
}

impl MappingTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from a single mapping source, failing on the first
    /// malformed line.
    ///
    /// # Examples
    ///
    /// ```
    /// use jarremap::{MappingSource, MappingSyntax, MappingTable};
    ///
    /// let source = MappingSource::new(
    ///     b"CL: a net/Block\nMD: a/b (La;)V net/Block/func_1 (Lnet/Block;)V",
    ///     MappingSyntax::Srg,
    /// );
    /// let table = MappingTable::parse(&source).unwrap();
    /// assert_eq!(table.class("a"), Some("net/Block"));
    /// assert_eq!(table.method("a", "b", "(La;)V"), Some("func_1"));
    /// ```
    pub fn parse<'s>(source: &MappingSource<'s>) -> Result<Self, ParseError<'s>> {
        let mut table = Self::new();
        for record in source.iter() {
            table.insert_record(&record?);
        }
        Ok(table)
    }

    /// Adds a parsed mapping line to the table.
    pub fn insert_record(&mut self, record: &MappingRecord<'_>) {
        match *record {
            MappingRecord::Package { original, renamed } => {
                self.packages.insert(original.into(), renamed.into());
            }
            MappingRecord::Class { original, renamed } => {
                self.insert(RenameRule::class(original, renamed));
            }
            MappingRecord::Field {
                owner,
                original,
                renamed,
            } => {
                self.insert(RenameRule::field(owner, original, renamed));
            }
            MappingRecord::Method {
                owner,
                original,
                descriptor,
                renamed,
            } => {
                self.insert(RenameRule::method(owner, original, descriptor, renamed));
            }
        }
    }

    /// Adds a rule, replacing any rule with the same key.
    ///
    /// Returns the previous target if it differed from the new one. Such
    /// disagreeing duplicates are logged and counted, the last one wins.
    pub fn insert(&mut self, rule: RenameRule) -> Option<String> {
        let RenameRule {
            kind,
            owner,
            member,
            descriptor,
            new_name,
        } = rule;

        let previous = match (kind, member, descriptor) {
            (RuleKind::Class, _, _) => self.classes.insert(owner.clone(), new_name.clone()),
            (RuleKind::Field, Some(member), _) => self
                .members
                .entry(owner.clone())
                .or_default()
                .fields
                .insert(member, new_name.clone()),
            (RuleKind::Method, Some(member), Some(descriptor)) => {
                let overloads = self
                    .members
                    .entry(owner.clone())
                    .or_default()
                    .methods
                    .entry(member)
                    .or_default();
                match overloads.iter_mut().find(|(desc, _)| *desc == descriptor) {
                    Some((_, target)) => Some(std::mem::replace(target, new_name.clone())),
                    None => {
                        overloads.push((descriptor, new_name.clone()));
                        None
                    }
                }
            }
            // a member rule without its key parts cannot be looked up
            _ => return None,
        };

        match previous {
            Some(previous) if previous != new_name => {
                tracing::warn!(
                    owner = %owner,
                    previous = %previous,
                    new = %new_name,
                    "conflicting duplicate mapping, keeping the later one"
                );
                self.conflicts += 1;
                Some(previous)
            }
            _ => None,
        }
    }

    /// The direct class rule for `class`, if any.
    pub fn class(&self, class: &str) -> Option<&str> {
        self.classes.get(class).map(String::as_str)
    }

    /// The direct field rule for `owner.name`, if any.
    pub fn field(&self, owner: &str, name: &str) -> Option<&str> {
        self.members
            .get(owner)?
            .fields
            .get(name)
            .map(String::as_str)
    }

    /// The direct method rule for `owner.name descriptor`, if any.
    pub fn method(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        self.members
            .get(owner)?
            .methods
            .get(name)?
            .iter()
            .find(|(desc, _)| desc == descriptor)
            .map(|(_, target)| target.as_str())
    }

    /// Returns the new internal name of `class`, if it changes.
    ///
    /// Class rules take precedence; otherwise a package rule for the class's
    /// own package moves it.
    pub fn map_class(&self, class: &str) -> Option<String> {
        if let Some(renamed) = self.classes.get(class) {
            return Some(renamed.clone());
        }

        let (package, simple) = match class.rsplit_once('/') {
            Some((package, simple)) => (package, simple),
            None => ("", class),
        };
        match self.packages.get(package) {
            Some(renamed) if renamed != package => Some(if renamed.is_empty() {
                simple.to_string()
            } else {
                format!("{renamed}/{simple}")
            }),
            _ => None,
        }
    }

    /// Rewrites all class names inside a descriptor.
    ///
    /// Malformed descriptors are returned unchanged.
    pub fn map_descriptor(&self, descriptor: &str) -> String {
        match remap_descriptor(descriptor, |class| self.map_class(class)) {
            Some(mapped) => mapped.into_owned(),
            None => descriptor.to_string(),
        }
    }

    /// Replaces member targets through a secondary name table.
    ///
    /// MCP maps obfuscated names to unique intermediate names first, which
    /// `fields.csv` and `methods.csv` then give readable names.
    pub fn rename_members(&mut self, fields: &HashMap<String, String>, methods: &HashMap<String, String>) {
        for rules in self.members.values_mut() {
            for target in rules.fields.values_mut() {
                if let Some(name) = fields.get(target.as_str()) {
                    target.clone_from(name);
                }
            }
            for (_, target) in rules.methods.values_mut().flatten() {
                if let Some(name) = methods.get(target.as_str()) {
                    target.clone_from(name);
                }
            }
        }
    }

    /// Builds the table that undoes this one.
    ///
    /// Member rules of the inverse are keyed on the renamed owner, renamed
    /// name and renamed descriptor. Rules are inverted in sorted order, so
    /// collisions always resolve the same way. An identity package rule
    /// never displaces a package move to the same target.
    pub fn inverse(&self) -> Self {
        let mut inverse = Self::new();

        let mut packages: Vec<_> = self.packages.iter().collect();
        packages.sort_unstable();
        for (original, renamed) in packages {
            match inverse.packages.get(renamed) {
                Some(existing) if original == renamed && existing != renamed => continue,
                Some(existing) if existing != renamed => {
                    tracing::warn!(
                        package = %renamed,
                        previous = %existing,
                        new = %original,
                        "conflicting inverse package mapping, keeping the later one"
                    );
                    inverse.conflicts += 1;
                }
                _ => {}
            }
            inverse.packages.insert(renamed.clone(), original.clone());
        }

        let mut classes: Vec<_> = self.classes.iter().collect();
        classes.sort_unstable();
        for (original, renamed) in classes {
            inverse.insert(RenameRule::class(renamed, original));
        }

        let mut owners: Vec<_> = self.members.iter().collect();
        owners.sort_unstable_by(|a, b| a.0.cmp(b.0));
        for (owner, rules) in owners {
            let renamed_owner = self.map_class(owner).unwrap_or_else(|| owner.clone());
            let mut fields: Vec<_> = rules.fields.iter().collect();
            fields.sort_unstable();
            for (name, target) in fields {
                inverse.insert(RenameRule::field(&renamed_owner, target, name));
            }
            let mut methods: Vec<_> = rules.methods.iter().collect();
            methods.sort_unstable();
            for (name, overloads) in methods {
                for (descriptor, target) in overloads {
                    inverse.insert(RenameRule::method(
                        &renamed_owner,
                        target,
                        self.map_descriptor(descriptor),
                        name,
                    ));
                }
            }
        }
        inverse
    }

    /// Iterates over all rules in no particular order.
    pub fn rules(&self) -> impl Iterator<Item = RenameRule> + '_ {
        let classes = self
            .classes
            .iter()
            .map(|(owner, target)| RenameRule::class(owner, target));
        let members = self.members.iter().flat_map(|(owner, rules)| {
            let fields = rules
                .fields
                .iter()
                .map(move |(name, target)| RenameRule::field(owner, name, target));
            let methods = rules.methods.iter().flat_map(move |(name, overloads)| {
                overloads
                    .iter()
                    .map(move |(desc, target)| RenameRule::method(owner, name, desc, target))
            });
            fields.chain(methods)
        });
        classes.chain(members)
    }

    /// The number of class, field and method rules.
    pub fn len(&self) -> usize {
        self.classes.len()
            + self
                .members
                .values()
                .map(|rules| rules.fields.len() + rules.methods.values().map(Vec::len).sum::<usize>())
                .sum::<usize>()
    }

    /// Whether the table has no rules at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.packages.is_empty()
    }

    /// The number of duplicate keys whose targets disagreed.
    pub fn conflicts(&self) -> usize {
        self.conflicts
    }
}

impl FromIterator<RenameRule> for MappingTable {
    fn from_iter<T: IntoIterator<Item = RenameRule>>(iter: T) -> Self {
        let mut table = Self::new();
        for rule in iter {
            table.insert(rule);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappingSyntax;

    const SRG: &[u8] = b"PK: . net/minecraft/src
CL: a net/minecraft/src/Block
CL: b net/minecraft/src/World
FD: a/c net/minecraft/src/Block/field_1
MD: a/d (Lb;)La; net/minecraft/src/Block/func_2 (Lnet/minecraft/src/World;)Lnet/minecraft/src/Block;
MD: a/d (I)V net/minecraft/src/Block/func_3 (I)V
";

    fn table() -> MappingTable {
        MappingTable::parse(&MappingSource::new(SRG, MappingSyntax::Srg)).unwrap()
    }

    #[test]
    fn lookups() {
        let table = table();
        assert_eq!(table.class("a"), Some("net/minecraft/src/Block"));
        assert_eq!(table.field("a", "c"), Some("field_1"));
        assert_eq!(table.method("a", "d", "(Lb;)La;"), Some("func_2"));
        assert_eq!(table.method("a", "d", "(I)V"), Some("func_3"));
        assert_eq!(table.method("a", "d", "()V"), None);
        assert_eq!(table.field("b", "c"), None);
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn map_class_uses_package_rules() {
        let table = table();
        assert_eq!(table.map_class("mod_Foo").as_deref(), Some("net/minecraft/src/mod_Foo"));
        assert_eq!(table.map_class("java/lang/Object"), None);
    }

    #[test]
    fn duplicate_keys_last_one_wins() {
        let mut table = MappingTable::new();
        assert_eq!(table.insert(RenameRule::class("a", "Foo")), None);
        assert_eq!(table.insert(RenameRule::class("a", "Foo")), None);
        assert_eq!(table.conflicts(), 0);
        assert_eq!(table.insert(RenameRule::class("a", "Bar")).as_deref(), Some("Foo"));
        assert_eq!(table.class("a"), Some("Bar"));
        assert_eq!(table.conflicts(), 1);
    }

    #[test]
    fn inverse_restores_names() {
        let table = table();
        let inverse = table.inverse();
        assert_eq!(inverse.class("net/minecraft/src/Block"), Some("a"));
        assert_eq!(inverse.field("net/minecraft/src/Block", "field_1"), Some("c"));
        assert_eq!(
            inverse.method(
                "net/minecraft/src/Block",
                "func_2",
                "(Lnet/minecraft/src/World;)Lnet/minecraft/src/Block;"
            ),
            Some("d")
        );
        assert_eq!(inverse.map_class("net/minecraft/src/mod_Foo").as_deref(), Some("mod_Foo"));
    }

    #[test]
    fn inverse_prefers_package_moves_over_identities() {
        for srg in [
            &b"PK: . net/minecraft/src\nPK: net/minecraft/src net/minecraft/src"[..],
            &b"PK: net/minecraft/src net/minecraft/src\nPK: . net/minecraft/src"[..],
        ] {
            // fresh tables hash differently
            for _ in 0..32 {
                let table = MappingTable::parse(&MappingSource::new(srg, MappingSyntax::Srg)).unwrap();
                let inverse = table.inverse();
                assert_eq!(inverse.map_class("net/minecraft/src/mod_Foo").as_deref(), Some("mod_Foo"));
                assert_eq!(inverse.conflicts(), 0);
            }
        }
    }

    #[test]
    fn inverse_package_collisions_are_counted() {
        let srg = b"PK: a net/pkg\nPK: b net/pkg";
        let inverse = MappingTable::parse(&MappingSource::new(srg, MappingSyntax::Srg))
            .unwrap()
            .inverse();
        assert_eq!(inverse.map_class("net/pkg/Foo").as_deref(), Some("b/Foo"));
        assert_eq!(inverse.conflicts(), 1);
    }

    #[test]
    fn rename_members_through_names() {
        let mut table = table();
        let fields = HashMap::from([("field_1".to_string(), "blockID".to_string())]);
        let methods = HashMap::from([("func_3".to_string(), "setTickRandomly".to_string())]);
        table.rename_members(&fields, &methods);
        assert_eq!(table.field("a", "c"), Some("blockID"));
        assert_eq!(table.method("a", "d", "(I)V"), Some("setTickRandomly"));
        assert_eq!(table.method("a", "d", "(Lb;)La;"), Some("func_2"));
    }

    #[test]
    fn rules_iterates_everything() {
        let rules: Vec<_> = table().rules().collect();
        assert_eq!(rules.len(), 5);
        assert!(rules.contains(&RenameRule::field("a", "c", "field_1")));
    }
}
