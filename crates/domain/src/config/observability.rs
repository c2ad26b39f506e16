use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Observability
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Diagnostics for the agent itself: log filtering and optional
/// OpenTelemetry export of the agent's own spans.
///
/// This is the host's diagnostic channel, not the telemetry the agent
/// ships on behalf of the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "d_log_filter")]
    pub log_filter: String,

    /// Emit logs as JSON lines instead of human-readable text.
    #[serde(default = "d_true")]
    pub json_logs: bool,

    /// OTLP gRPC endpoint (e.g. `http://localhost:4317`).  `None` disables
    /// export.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// The `service.name` resource attribute reported to the collector.
    #[serde(default = "d_service_name")]
    pub service_name: String,

    /// Trace sampling ratio, `0.0` to `1.0`.
    #[serde(default = "d_sample_rate")]
    pub sample_rate: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: d_log_filter(),
            json_logs: true,
            otlp_endpoint: None,
            service_name: d_service_name(),
            sample_rate: d_sample_rate(),
        }
    }
}

fn d_log_filter() -> String {
    "info,tm_sessions=debug".into()
}

fn d_true() -> bool {
    true
}

fn d_service_name() -> String {
    "tidemark".into()
}

fn d_sample_rate() -> f64 {
    1.0
}
