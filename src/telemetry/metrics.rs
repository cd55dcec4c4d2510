use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
};
use std::sync::LazyLock;

pub static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("swot-analyzer"));

// --- Pipeline Metrics ---

pub static ANALYSIS_REQUESTS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("analysis.requests")
        .with_description("Analysis requests by final outcome")
        .with_unit("{request}")
        .build()
});

pub static PIPELINE_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("analysis.pipeline.duration")
        .with_description("End-to-end duration of one analysis request in seconds")
        .with_unit("s")
        .build()
});

pub static ENGINE_RUN_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("analysis.engine.duration")
        .with_description("Duration of one engine invocation in seconds")
        .with_unit("s")
        .build()
});

pub static ENGINE_FAILURES: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("analysis.engine.failures")
        .with_description("Number of failed engine invocations")
        .with_unit("{failure}")
        .build()
});

pub static ARTIFACTS_UPLOADED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("analysis.artifacts.uploaded")
        .with_description("Number of files published to blob storage")
        .with_unit("{file}")
        .build()
});

pub static REPORT_SAMPLES: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("analysis.report.samples")
        .with_description("Number of input samples per assembled report")
        .with_unit("{sample}")
        .build()
});

pub static CLEANUP_FAILURES: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("analysis.cleanup.failures")
        .with_description("Staging paths that could not be removed")
        .with_unit("{path}")
        .build()
});

// --- HTTP Metrics ---

pub static HTTP_REQUESTS_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("http.requests.total")
        .with_description("Total number of HTTP requests")
        .with_unit("{request}")
        .build()
});

pub static HTTP_REQUEST_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("http.request.duration")
        .with_description("HTTP request duration in milliseconds")
        .with_unit("ms")
        .with_boundaries(vec![
            1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
        ])
        .build()
});
