use serde::{Deserialize, Serialize};

/// Trace export settings.
///
/// Without `otlp_endpoint` logs stay local. With it, the `query`,
/// `llm.call` and `tool.call` spans are shipped to an OTLP/gRPC collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// e.g. `http://localhost:4317`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp_endpoint: Option<String>,

    /// The `service.name` resource attribute reported to the collector.
    #[serde(default = "d_service_name")]
    pub service_name: String,

    /// Fraction of queries traced, applied per trace id.
    #[serde(default = "d_sample_rate")]
    pub sample_rate: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            service_name: d_service_name(),
            sample_rate: d_sample_rate(),
        }
    }
}

impl ObservabilityConfig {
    /// Sampling rate clamped to `0.0..=1.0`.
    pub fn effective_sample_rate(&self) -> f64 {
        self.sample_rate.clamp(0.0, 1.0)
    }
}

fn d_service_name() -> String {
    "toolbridge".into()
}

fn d_sample_rate() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_disabled_unless_endpoint_set() {
        let cfg: ObservabilityConfig = toml::from_str("").unwrap();
        assert!(cfg.otlp_endpoint.is_none());
        assert_eq!(cfg.service_name, "toolbridge");
        assert_eq!(cfg.effective_sample_rate(), 1.0);
    }

    #[test]
    fn collector_settings_parse_and_clamp() {
        let cfg: ObservabilityConfig = toml::from_str(
            r#"
            otlp_endpoint = "http://collector:4317"
            service_name = "toolbridge-ci"
            sample_rate = -0.25
            "#,
        )
        .unwrap();
        assert_eq!(cfg.otlp_endpoint.as_deref(), Some("http://collector:4317"));
        assert_eq!(cfg.service_name, "toolbridge-ci");
        assert_eq!(cfg.effective_sample_rate(), 0.0);
    }
}
