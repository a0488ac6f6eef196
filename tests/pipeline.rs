use std::path::Path;

use jarremap::{
    ArchivePipeline, CancelToken, ClassFile, ClasspathIndex, Direction, Error, MappingSyntax,
    MappingTable, ProgressEvent, RenameRule, RunRequest, Side, SymbolResolver,
};

mod common;
use common::{declarations, read_jar, write_conf, write_jar, ClassBuilder};

const SRG: &str = "CL: a net/Block
FD: a/b net/Block/blockID
";

fn request(dir: &Path, inputs: Vec<std::path::PathBuf>) -> RunRequest {
    write_conf(dir, "joined.srg", SRG);
    RunRequest {
        inputs,
        output: dir.join("out.jar"),
        mapping_dir: dir.to_path_buf(),
        side: Side::Universal,
        direction: Direction::Deobfuscate,
        classpath: vec![],
        syntax: MappingSyntax::Srg,
        threads: Some(2),
    }
}

fn unit(i: usize) -> Vec<u8> {
    ClassBuilder::new(&format!("u{i}"), Some("java/lang/Object"))
        .field("block", "La;")
        .field_ref("a", "b", "I")
        .build()
}

#[test]
fn test_corrupt_unit_does_not_abort_run() {
    let dir = tempfile::tempdir().unwrap();
    let jar = dir.path().join("mod.jar");

    let corrupt = b"\xca\xfe\xba\xbe\x00\x00\x00\x32junk".to_vec();
    let mut entries: Vec<(String, Vec<u8>)> = (0..100)
        .map(|i| {
            let bytes = if i == 50 { corrupt.clone() } else { unit(i) };
            (format!("u{i}.class"), bytes)
        })
        .collect();
    entries.push(("META-INF/MANIFEST.MF".into(), b"Manifest-Version: 1.0\r\n".to_vec()));
    let borrowed: Vec<_> = entries
        .iter()
        .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
        .collect();
    write_jar(&jar, &borrowed);

    let request = request(dir.path(), vec![jar]);
    let (sender, receiver) = crossbeam_channel::unbounded();
    let report = jarremap::run(&request, &sender).unwrap();

    assert_eq!(report.units, 99);
    assert_eq!(report.copied, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].entry, "u50.class");
    assert!(!report.is_clean());

    let output = read_jar(&request.output);
    let names: Vec<_> = output.iter().map(|(name, _)| name.as_str()).collect();
    let expected: Vec<_> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, expected);

    for (i, (_, bytes)) in output.iter().take(100).enumerate() {
        if i == 50 {
            assert_eq!(bytes, &corrupt);
            continue;
        }
        let class = ClassFile::parse(bytes).unwrap();
        assert_eq!(
            declarations(&class),
            vec![("block".to_owned(), "Lnet/Block;".to_owned())]
        );
    }
    assert_eq!(output[100].1, entries[100].1);

    let events: Vec<_> = receiver.try_iter().collect();
    assert_eq!(
        events[0],
        ProgressEvent::Start {
            max: 100,
            label: "Remapping".into()
        }
    );
    let sets: Vec<_> = events[1..]
        .iter()
        .map(|event| match event {
            ProgressEvent::Set(processed) => *processed,
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(sets, (1..=100).collect::<Vec<_>>());
}

#[test]
fn test_units_move_with_their_class() {
    let dir = tempfile::tempdir().unwrap();
    let jar = dir.path().join("mod.jar");
    let block = ClassBuilder::new("a", Some("java/lang/Object"))
        .field("b", "I")
        .build();
    let main = ClassBuilder::new("com/example/Main", Some("java/lang/Object"))
        .field_ref("a", "b", "I")
        .build();
    write_jar(
        &jar,
        &[
            ("com/", &b""[..]),
            ("com/example/", &b""[..]),
            ("com/example/Main.class", &main[..]),
            ("a.class", &block[..]),
        ],
    );

    let request = request(dir.path(), vec![jar]);
    let report = jarremap::run(&request, &()).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.units, 2);

    let output = read_jar(&request.output);
    let names: Vec<_> = output.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        vec!["com/", "com/example/", "com/example/Main.class", "net/Block.class"]
    );
    let block = ClassFile::parse(&output[3].1).unwrap();
    assert_eq!(block.name().unwrap(), "net/Block");
    assert_eq!(declarations(&block), vec![("blockID".to_owned(), "I".to_owned())]);
}

#[test]
fn test_later_inputs_win() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.jar");
    let second = dir.path().join("second");
    write_jar(&first, &[("pack.mcmeta", &b"first"[..]), ("assets/logo.png", &b"png"[..])]);
    std::fs::create_dir_all(second.join("assets")).unwrap();
    std::fs::write(second.join("pack.mcmeta"), "second").unwrap();
    std::fs::write(second.join("assets/sound.ogg"), "ogg").unwrap();

    let request = request(dir.path(), vec![first, second]);
    let report = jarremap::run(&request, &()).unwrap();
    assert_eq!(report.copied, 3);
    assert_eq!(report.shadowed, 1);

    let output = read_jar(&request.output);
    assert_eq!(
        output,
        vec![
            ("assets/logo.png".to_owned(), b"png".to_vec()),
            ("assets/sound.ogg".to_owned(), b"ogg".to_vec()),
            ("pack.mcmeta".to_owned(), b"second".to_vec()),
        ]
    );
}

#[test]
fn test_cancelled_run_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let jar = dir.path().join("mod.jar");
    let block = unit(0);
    write_jar(&jar, &[("u0.class", &block[..])]);
    let output = dir.path().join("out.jar");

    let table: MappingTable = [RenameRule::class("a", "net/Block")].into_iter().collect();
    let index = ClasspathIndex::default();
    let cancel = CancelToken::new();
    cancel.cancel();
    let pipeline = ArchivePipeline::new(SymbolResolver::new(&table, &index)).with_cancel_token(cancel);

    assert!(matches!(
        pipeline.run(&[&jar], &output, &()),
        Err(Error::Cancelled)
    ));
    assert!(!output.exists());
}

#[test]
fn test_spawned_run() {
    let dir = tempfile::tempdir().unwrap();
    let jar = dir.path().join("mod.jar");
    let block = unit(7);
    write_jar(&jar, &[("u7.class", &block[..])]);

    let request = request(dir.path(), vec![jar]);
    let (sender, receiver) = crossbeam_channel::bounded(1);
    let handle = jarremap::spawn_run(request.clone(), sender);
    let events: Vec<_> = receiver.iter().collect();
    let report = handle.join().unwrap();

    assert_eq!(report.units, 1);
    assert_eq!(report.output, request.output);
    assert!(matches!(events[0], ProgressEvent::Start { max: 1, .. }));
}
