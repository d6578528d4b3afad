use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rift_mock::expectation::ExpectationStore;
use rift_mock::matcher::CompiledRequestMatcher;
use rift_mock::model::{Action, BodyMatcher, Expectation, HttpRequest, HttpResponse, MatchType, RequestMatcher};
use serde_json::json;

fn endpoint_expectations(count: usize, regex: bool) -> Vec<Expectation> {
    (0..count)
        .map(|i| {
            let path = if regex {
                format!("/api/v\\d+/endpoint{i}")
            } else {
                format!("/api/v1/endpoint{i}")
            };
            Expectation::new(
                RequestMatcher::new().with_method("GET").with_path(path),
                Action::Response(HttpResponse::ok()),
            )
        })
        .collect()
}

fn bench_store_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_matching");

    for count in [10, 100, 1000] {
        let store = ExpectationStore::new();
        store.upsert(endpoint_expectations(count, false)).unwrap();
        let last = HttpRequest::new("GET", format!("/api/v1/endpoint{}", count - 1));
        let miss = HttpRequest::new("GET", "/nowhere");

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("last_match", count), &last, |b, request| {
            b.iter(|| store.match_request(black_box(request)))
        });
        group.bench_with_input(BenchmarkId::new("no_match", count), &miss, |b, request| {
            b.iter(|| store.match_request(black_box(request)))
        });
    }
    group.finish();
}

fn bench_regex_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("regex_paths");

    for count in [10, 100] {
        let store = ExpectationStore::new();
        store.upsert(endpoint_expectations(count, true)).unwrap();
        let request = HttpRequest::new("GET", format!("/api/v2/endpoint{}", count / 2));

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("middle_match", count), &request, |b, request| {
            b.iter(|| store.match_request(black_box(request)))
        });
    }
    group.finish();
}

fn bench_single_matcher(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_matcher");
    let matcher = CompiledRequestMatcher::compile(
        &RequestMatcher::new()
            .with_method("POST")
            .with_path("/orders/{id}")
            .with_header("Content-Type", "application/json.*")
            .with_body(BodyMatcher::json(json!({"status": "open"}), MatchType::OnlyMatchingFields)),
    )
    .unwrap();
    let request = HttpRequest::new("POST", "/orders/42")
        .with_header("Content-Type", "application/json; charset=utf-8")
        .with_body(r#"{"status": "open", "items": [1, 2, 3], "total": 12.5}"#);

    group.throughput(Throughput::Elements(1));
    group.bench_function("json_body_match", |b| b.iter(|| matcher.matches(black_box(&request))));
    group.finish();
}

criterion_group!(benches, bench_store_matching, bench_regex_paths, bench_single_matcher);
criterion_main!(benches);
