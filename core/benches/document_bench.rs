use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use textsync_core::crdt::{Document, Operation, Point};

fn type_chars(doc: &mut Document, count: u32) -> Vec<Operation> {
    let mut operations = Vec::new();
    for column in 0..count {
        let position = Point::new(0, column);
        operations.extend(doc.set_text_in_range(position, position, "a").unwrap());
    }
    operations
}

/// Benchmark sequential typing (simulates real user typing)
fn bench_sequential_typing(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_sequential_typing");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut doc = Document::new(1).unwrap();
                black_box(type_chars(&mut doc, size));
            });
        });
    }

    group.finish();
}

/// Benchmark typing in the middle of a large document
fn bench_random_access_edits(c: &mut Criterion) {
    c.bench_function("document_1000_edits_in_10k_doc", |b| {
        b.iter_batched(
            || {
                let mut doc = Document::new(1).unwrap();
                doc.set_text_in_range(Point::ZERO, Point::ZERO, &"a".repeat(10000))
                    .unwrap();
                doc
            },
            |mut doc| {
                for i in 0..1000u32 {
                    let column = (i * 7919) % 10000;
                    let position = Point::new(0, column);
                    black_box(doc.set_text_in_range(position, position, "b").unwrap());
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

/// Benchmark integrating another site's typing
fn bench_remote_integration(c: &mut Criterion) {
    let mut source = Document::new(1).unwrap();
    let operations = type_chars(&mut source, 1000);

    c.bench_function("document_integrate_1000_remote_ops", |b| {
        b.iter(|| {
            let mut doc = Document::new(2).unwrap();
            black_box(doc.integrate_operations(operations.clone()).unwrap());
        });
    });
}

/// Benchmark integrating a site's operations in reverse (worst-case deferral)
fn bench_reversed_integration(c: &mut Criterion) {
    let mut source = Document::new(1).unwrap();
    let mut operations = type_chars(&mut source, 1000);
    operations.reverse();

    c.bench_function("document_integrate_1000_reversed_ops", |b| {
        b.iter(|| {
            let mut doc = Document::new(2).unwrap();
            black_box(doc.integrate_operations(operations.clone()).unwrap());
        });
    });
}

/// Benchmark concurrent edits convergence
fn bench_concurrent_convergence(c: &mut Criterion) {
    c.bench_function("document_concurrent_3way_convergence", |b| {
        b.iter(|| {
            let mut docs: Vec<Document> = (1..=3).map(|site| Document::new(site).unwrap()).collect();
            let batches: Vec<Vec<Operation>> =
                docs.iter_mut().map(|doc| type_chars(doc, 100)).collect();

            for (i, doc) in docs.iter_mut().enumerate() {
                for (j, batch) in batches.iter().enumerate() {
                    if i != j {
                        doc.integrate_operations(batch.clone()).unwrap();
                    }
                }
            }

            let result = docs[0].get_text();
            assert_eq!(docs[1].get_text(), result);
            assert_eq!(docs[2].get_text(), result);
        });
    });
}

/// Benchmark undo/redo of many transactions
fn bench_undo_redo(c: &mut Criterion) {
    c.bench_function("document_undo_redo_1000", |b| {
        b.iter_batched(
            || {
                let mut doc = Document::new(1).unwrap();
                type_chars(&mut doc, 1000);
                doc
            },
            |mut doc| {
                while doc.undo().is_some() {}
                while doc.redo().is_some() {}
                black_box(doc.get_text());
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

/// Benchmark binary encoding of operations
#[cfg(feature = "protocol-binary")]
fn bench_serialization(c: &mut Criterion) {
    use textsync_core::protocol::{deserialize_operation, serialize_operation};

    let mut doc = Document::new(1).unwrap();
    let operations = type_chars(&mut doc, 1000);

    c.bench_function("document_encode_decode_1000_ops", |b| {
        b.iter(|| {
            for operation in &operations {
                let bytes = serialize_operation(operation).unwrap();
                black_box(deserialize_operation(&bytes).unwrap());
            }
        });
    });
}

#[cfg(not(feature = "protocol-binary"))]
fn bench_serialization(_c: &mut Criterion) {}

criterion_group!(
    benches,
    bench_sequential_typing,
    bench_random_access_edits,
    bench_remote_integration,
    bench_reversed_integration,
    bench_concurrent_convergence,
    bench_undo_redo,
    bench_serialization,
);

criterion_main!(benches);
