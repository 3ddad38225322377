use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use reel::fingerprint::fingerprint_request;
use reel::RecordedRequest;

fn bench_fingerprint_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");

    for size in [100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let request = RecordedRequest {
                method: "POST".to_string(),
                url: "https://example.test/api/items?b=2&a=1".to_string(),
                headers: vec![("Content-Type".to_string(), "application/json".to_string())],
                body: vec![b'x'; size],
                form: vec![],
            };

            b.iter(|| fingerprint_request(black_box(&request)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fingerprint_sizes);
criterion_main!(benches);
