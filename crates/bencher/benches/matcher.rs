use bencher::{TestCase, TestRoute};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use micro_dispatch::selector::{RequestTarget, Selector};
use std::hint::black_box;

static STATIC_ROUTE: TestRoute = TestRoute::new("GET /api/v1/users/me", "get", "api.example.com", "/api/v1/users/me");
static CAPTURE_ROUTE: TestRoute =
    TestRoute::new("GET, POST /api/{version}/users/{id}-{slug}", "post", "api.example.com", "/api/v1/users/42-ada");
static REST_ROUTE: TestRoute =
    TestRoute::new("* api.example.com /assets/{*}", "get", "api.example.com", "/assets/js/app.js");

fn create_test_cases() -> Vec<TestCase> {
    vec![
        TestCase::literal("literal_path", STATIC_ROUTE),
        TestCase::capture("captured_segments", CAPTURE_ROUTE),
        TestCase::rest("rest_placeholder", REST_ROUTE),
    ]
}

fn benchmark_selector_parse(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("selector_parse");

    for case in create_test_cases() {
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), &case, |b, case| {
            b.iter(|| black_box(Selector::parse([case.route().selector()])));
        });
    }

    group.finish();
}

fn benchmark_selector_match(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("selector_match");

    for case in create_test_cases() {
        let route = case.route();
        let selector = Selector::parse([route.selector()]);
        let target = RequestTarget::new(route.method(), route.host(), route.path());

        group.bench_with_input(BenchmarkId::new(format!("{:?}", case.group()), case.name()), &case, |b, _case| {
            b.iter(|| black_box(selector.matches(black_box(&target))));
        });
    }

    group.finish();
}

criterion_group!(matcher, benchmark_selector_parse, benchmark_selector_match);
criterion_main!(matcher);
