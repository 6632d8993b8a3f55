use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ldpipe::rdf::{Graph, NamedNode, RdfPredicate, RdfSubject, Triple};

fn sample_graph(size: usize, offset: usize) -> Graph {
    let mut graph = Graph::new();
    for i in offset..offset + size {
        let triple = Triple::new(
            RdfSubject::NamedNode(NamedNode::new(format!("http://ex/item/{i}")).unwrap()),
            RdfPredicate::new("http://purl.org/dc/terms/title").unwrap(),
            NamedNode::new(format!("http://ex/value/{i}")).unwrap().into(),
        );
        graph.insert(triple);
    }
    graph
}

/// Diffing two graphs is the hot path every import-engine patch and every
/// update-engine validation dry-run runs once per resource.
fn bench_create_repo_changeset(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_repo_changeset");
    for size in [100, 1_000, 10_000].iter() {
        let existing = sample_graph(*size, 0);
        let updated = sample_graph(*size, size / 2);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let changeset = ldpipe::rdf::create_repo_changeset(&existing, &updated);
                black_box(changeset.deletes.len() + changeset.inserts.len());
            });
        });
    }
    group.finish();
}

fn bench_build_sparql_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_sparql_update");
    for size in [100, 1_000, 10_000].iter() {
        let graph = sample_graph(*size, 0);
        let triples: Vec<Triple> = graph.iter().cloned().collect();
        let (deletes, inserts) = triples.split_at(triples.len() / 2);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(ldpipe::rdf::build_sparql_update(deletes, inserts)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_create_repo_changeset, bench_build_sparql_update);
criterion_main!(benches);
