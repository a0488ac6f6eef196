use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jarremap::{
    rewrite, ClasspathIndex, MappingSource, MappingSyntax, MappingTable, SymbolResolver,
    TypeDescriptor,
};

#[path = "../tests/common/mod.rs"]
mod common;
use common::ClassBuilder;

static MAPPING: &[u8] = include_bytes!("../tests/res/joined.srg");

fn block_subclass() -> Vec<u8> {
    let mut builder = ClassBuilder::new("bly", Some("amq"))
        .field("a", "Lyc;")
        .method("g", "(Lyc;III)V")
        .method("b", "(Lyc;III)Z")
        .method_ref("amq", "g", "(Lyc;III)V")
        .method_ref("yc", "a", "(III)I")
        .field_ref("amq", "cm", "I")
        .string("tile.example");
    for i in 0..200 {
        builder = builder
            .method_ref(&format!("com/example/Helper{i}"), "run", "(Lyc;)V")
            .field_ref("bly", &format!("f{i}"), "I");
    }
    builder.build()
}

fn criterion_benchmark(c: &mut Criterion) {
    let table = MappingTable::parse(&MappingSource::new(MAPPING, MappingSyntax::Srg)).unwrap();
    let index = ClasspathIndex::from_types([
        TypeDescriptor::new("amq", Some("java/lang/Object".into()))
            .with_method("g", "(Lyc;III)V")
            .with_method("b", "(Lyc;III)Z"),
        TypeDescriptor::new("bly", Some("amq".into())),
    ]);
    let resolver = SymbolResolver::new(&table, &index);
    let unit = block_subclass();
    let unmapped = ClassBuilder::new("com/example/Main", Some("java/lang/Object"))
        .method("run", "()V")
        .method_ref("java/io/PrintStream", "println", "(Ljava/lang/String;)V")
        .build();

    let mut group = c.benchmark_group("Unit Rewriting");
    group.bench_function("Mapped", |b| b.iter(|| rewrite(black_box(&unit), &resolver)));
    group.bench_function("Unmapped", |b| {
        b.iter(|| rewrite(black_box(&unmapped), &resolver))
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
