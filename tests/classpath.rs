use std::fs;

use jarremap::{ClasspathIndex, MappingTable, RenameRule, SymbolResolver};

mod common;
use common::{write_jar, ClassBuilder};

fn table() -> MappingTable {
    [
        RenameRule::method("A", "m", "()V", "fromA"),
        RenameRule::method("B", "m", "()V", "fromB"),
    ]
    .into_iter()
    .collect()
}

#[test]
fn test_earlier_entries_shadow_later_ones() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.jar");
    let second = dir.path().join("second.jar");
    let extends_a = ClassBuilder::new("S", Some("A")).build();
    let extends_b = ClassBuilder::new("S", Some("B")).build();
    write_jar(&first, &[("S.class", &extends_a[..])]);
    write_jar(&second, &[("S.class", &extends_b[..])]);
    let table = table();

    let index = ClasspathIndex::open([&first, &second]);
    assert_eq!(index.declared_type("S").super_name.as_deref(), Some("A"));
    let resolver = SymbolResolver::new(&table, &index);
    assert_eq!(resolver.resolve_method("S", "m", "()V").unwrap().new_name, "fromA");

    let index = ClasspathIndex::open([&second, &first]);
    assert_eq!(index.declared_type("S").super_name.as_deref(), Some("B"));
    let resolver = SymbolResolver::new(&table, &index);
    assert_eq!(resolver.resolve_method("S", "m", "()V").unwrap().new_name, "fromB");
}

#[test]
fn test_class_directories() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("net/minecraft")).unwrap();
    let class = ClassBuilder::new("net/minecraft/Block", Some("java/lang/Object"))
        .interface("net/minecraft/Tickable")
        .field("id", "I")
        .method("tick", "()V")
        .build();
    fs::write(dir.path().join("net/minecraft/Block.class"), class).unwrap();

    let index = ClasspathIndex::open([dir.path()]);
    let ty = index.declared_type("net/minecraft/Block");
    assert!(!ty.is_unknown());
    assert_eq!(ty.super_name.as_deref(), Some("java/lang/Object"));
    assert_eq!(ty.interfaces, vec!["net/minecraft/Tickable".to_owned()]);
    assert!(ty.declares_field("id"));
    assert!(ty.declares_method("tick", "()V"));
    assert!(index.declared_type("net/minecraft/Tickable").is_unknown());
}

#[test]
fn test_unresolved_entries_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let jar = dir.path().join("lib.jar");
    let class = ClassBuilder::new("S", Some("A")).build();
    write_jar(&jar, &[("S.class", &class[..]), ("Broken.class", &b"\xca\xfe"[..])]);
    let not_a_zip = dir.path().join("notes.txt");
    fs::write(&not_a_zip, "not a jar").unwrap();

    let index = ClasspathIndex::open([
        dir.path().join("missing.jar"),
        not_a_zip,
        jar,
    ]);
    assert_eq!(index.unresolved().len(), 2);
    assert_eq!(index.declared_type("S").super_name.as_deref(), Some("A"));
    assert!(index.declared_type("Broken").is_unknown());
}
