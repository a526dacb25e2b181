//! Compiler metrics and tracing spans.
//!
//! Counters and histograms are registered on the global OpenTelemetry meter;
//! the application decides which exporter (if any) is installed.

#[cfg(feature = "metrics")]
pub use self::otel::{QueryMetrics, METRICS};

#[cfg(feature = "metrics")]
mod otel {
    use once_cell::sync::Lazy;
    use opentelemetry::{
        global,
        metrics::{Counter, Histogram},
    };
    use std::time::Duration;

    pub static METRICS: Lazy<QueryMetrics> = Lazy::new(QueryMetrics::init);

    pub struct QueryMetrics {
        pub filters_compiled: Counter<u64>,
        pub compile_failures: Counter<u64>,
        pub aggregate_rows_decoded: Counter<u64>,
        pub batch_wait_duration: Histogram<f64>,
    }

    impl QueryMetrics {
        pub fn init() -> Self {
            let meter = global::meter("querygraph");

            let filters_compiled = meter
                .u64_counter("querygraph_filters_compiled_total")
                .with_description("Filters compiled into predicates")
                .build();

            let compile_failures = meter
                .u64_counter("querygraph_compile_failures_total")
                .with_description("Filters rejected by the operator mapper")
                .build();

            let aggregate_rows_decoded = meter
                .u64_counter("querygraph_aggregate_rows_decoded_total")
                .with_description("Aggregate result rows decoded")
                .build();

            let batch_wait_duration = meter
                .f64_histogram("querygraph_batch_wait_seconds")
                .with_description("Time spent waiting for per-entity batch coroutines")
                .build();

            Self {
                filters_compiled,
                compile_failures,
                aggregate_rows_decoded,
                batch_wait_duration,
            }
        }

        pub fn record_compile(&self, ok: bool) {
            if ok {
                self.filters_compiled.add(1, &[]);
            } else {
                self.compile_failures.add(1, &[]);
            }
        }

        pub fn record_decoded_rows(&self, rows: usize) {
            self.aggregate_rows_decoded.add(rows as u64, &[]);
        }

        pub fn observe_batch_wait(&self, duration: Duration) {
            self.batch_wait_duration.record(duration.as_secs_f64(), &[]);
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn compile_filter_span(fields: usize) -> Span {
        info_span!("querygraph.compile_filter", fields)
    }

    pub fn decode_aggregate_span(rows: usize) -> Span {
        info_span!("querygraph.decode_aggregate", rows)
    }

    pub fn batch_dispatch_span(relation: &str, sources: usize) -> Span {
        info_span!("querygraph.batch_dispatch", relation, sources)
    }
}
