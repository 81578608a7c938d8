use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter, UpDownCounter};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::sync::Arc;

pub mod labels {
    pub const ERROR_TYPE: &str = "error_type";
    pub const ROUTE: &str = "route";
    pub const PROTOCOL: &str = "protocol";
    pub const STATUS_CODE: &str = "status_code";
    pub const METHOD: &str = "method";
    pub const BACKEND_ADDRESS: &str = "backend_address";
    pub const POLICY: &str = "policy";
    pub const PHASE: &str = "phase";
    pub const OUTCOME: &str = "outcome";
    pub const VERSION: &str = "version";
    pub const RUST_VERSION: &str = "rust_version";
}

pub mod values {
    pub const OUTCOME_CONTINUE: &str = "continue";
    pub const OUTCOME_INTERRUPT: &str = "interrupt";
    pub const ERROR_POLICY_INTERRUPT: &str = "policy_interrupt";
}

#[derive(Clone)]
pub struct Metrics {
    pub connections_total: Counter<u64>,
    pub connections_active: UpDownCounter<i64>,

    pub requests_total: Counter<u64>,
    pub requests_duration_seconds: Histogram<f64>,

    pub backend_requests_total: Counter<u64>,
    pub backend_errors_total: Counter<u64>,
    pub backend_duration_seconds: Histogram<f64>,

    pub policy_executions_total: Counter<u64>,

    pub errors_total: Counter<u64>,

    pub build_info: Gauge<u64>,
}

impl Metrics {
    fn new(meter: Meter) -> Self {
        Self {
            connections_total: meter
                .u64_counter("header_gate_connections_total")
                .with_description("Total number of connections established")
                .build(),
            connections_active: meter
                .i64_up_down_counter("header_gate_connections_active")
                .with_description("Number of active connections")
                .build(),

            requests_total: meter
                .u64_counter("header_gate_requests_total")
                .with_description("Total number of requests processed")
                .build(),
            requests_duration_seconds: meter
                .f64_histogram("header_gate_requests_duration_seconds")
                .with_description("Request duration in seconds")
                .build(),

            backend_requests_total: meter
                .u64_counter("header_gate_backend_requests_total")
                .with_description("Total number of requests to backends")
                .build(),
            backend_errors_total: meter
                .u64_counter("header_gate_backend_errors_total")
                .with_description("Total number of backend errors")
                .build(),
            backend_duration_seconds: meter
                .f64_histogram("header_gate_backend_duration_seconds")
                .with_description("Backend request duration in seconds")
                .build(),

            policy_executions_total: meter
                .u64_counter("header_gate_policy_executions_total")
                .with_description("Policy chain executions by phase and outcome")
                .build(),

            errors_total: meter
                .u64_counter("header_gate_errors_total")
                .with_description("Total number of errors by type")
                .build(),

            build_info: meter
                .u64_gauge("header_gate_build_info")
                .with_description("Build information (version, rust version)")
                .build(),
        }
    }

    pub fn set_build_info(&self) {
        let version = env!("CARGO_PKG_VERSION");
        let rust_version = env!("CARGO_PKG_RUST_VERSION");

        self.build_info.record(
            1,
            &[
                KeyValue::new(labels::VERSION, version),
                KeyValue::new(labels::RUST_VERSION, rust_version),
            ],
        );
    }

    pub fn record_connection_opened(&self) {
        self.connections_total.add(1, &[]);
        self.connections_active.add(1, &[]);
    }

    pub fn record_connection_closed(&self) {
        self.connections_active.add(-1, &[]);
    }

    pub fn record_request(&self, method: &str, status_code: u16, protocol: &str, route: &str) {
        self.requests_total.add(
            1,
            &[
                KeyValue::new(labels::METHOD, method.to_string()),
                KeyValue::new(labels::STATUS_CODE, status_code.to_string()),
                KeyValue::new(labels::PROTOCOL, protocol.to_string()),
                KeyValue::new(labels::ROUTE, route.to_string()),
            ],
        );
    }

    pub fn record_request_duration(
        &self,
        duration: f64,
        method: &str,
        status_code: u16,
        protocol: &str,
        route: &str,
    ) {
        self.requests_duration_seconds.record(
            duration,
            &[
                KeyValue::new(labels::METHOD, method.to_string()),
                KeyValue::new(labels::STATUS_CODE, status_code.to_string()),
                KeyValue::new(labels::PROTOCOL, protocol.to_string()),
                KeyValue::new(labels::ROUTE, route.to_string()),
            ],
        );
    }

    pub fn record_backend_request(&self, backend: &str, status_code: u16, route: &str, duration: f64) {
        let attrs = [
            KeyValue::new(labels::BACKEND_ADDRESS, backend.to_string()),
            KeyValue::new(labels::STATUS_CODE, status_code.to_string()),
            KeyValue::new(labels::ROUTE, route.to_string()),
        ];
        self.backend_requests_total.add(1, &attrs);
        self.backend_duration_seconds.record(duration, &attrs);
    }

    pub fn record_backend_error(&self, backend: &str, error_type: &str, route: &str) {
        self.backend_errors_total.add(
            1,
            &[
                KeyValue::new(labels::BACKEND_ADDRESS, backend.to_string()),
                KeyValue::new(labels::ERROR_TYPE, error_type.to_string()),
                KeyValue::new(labels::ROUTE, route.to_string()),
            ],
        );
    }

    /// Record one policy hook run; `outcome` is `continue` or `interrupt`
    pub fn record_policy_execution(&self, policy: &str, phase: &str, outcome: &str, route: &str) {
        self.policy_executions_total.add(
            1,
            &[
                KeyValue::new(labels::POLICY, policy.to_string()),
                KeyValue::new(labels::PHASE, phase.to_string()),
                KeyValue::new(labels::OUTCOME, outcome.to_string()),
                KeyValue::new(labels::ROUTE, route.to_string()),
            ],
        );
    }

    pub fn record_error(&self, error_type: &str) {
        self.errors_total
            .add(1, &[KeyValue::new(labels::ERROR_TYPE, error_type.to_string())]);
    }
}

pub fn init_metrics() -> Result<(Arc<Metrics>, Registry), Box<dyn std::error::Error + Send + Sync>>
{
    let registry = Registry::default();

    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()?;

    let meter_provider = SdkMeterProvider::builder().with_reader(exporter).build();

    global::set_meter_provider(meter_provider);

    let meter = global::meter("header-gate");
    let metrics = Arc::new(Metrics::new(meter));

    metrics.set_build_info();

    Ok((metrics, registry))
}
