use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ConfigError;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Logging & span export
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Log filter and OTLP export for `chatrelay serve`.
///
/// `RUST_LOG` wins over `log_filter`. Spans leave the process only when
/// `otlp_endpoint` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default `EnvFilter` directives.
    #[serde(default = "d_log_filter")]
    pub log_filter: String,

    /// OTLP/gRPC collector, e.g. `http://localhost:4317`.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    #[serde(default = "d_service_name")]
    pub service_name: String,

    /// Reported as `deployment.environment`.
    #[serde(default)]
    pub environment: Option<String>,

    /// Fraction of job traces exported, `0.0..=1.0`.
    #[serde(default = "d_sample_rate")]
    pub sample_rate: f64,

    /// Extra resource attributes, e.g. `{ region = "eu-west" }`.
    #[serde(default)]
    pub resource: BTreeMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: d_log_filter(),
            otlp_endpoint: None,
            service_name: d_service_name(),
            environment: None,
            sample_rate: d_sample_rate(),
            resource: BTreeMap::new(),
        }
    }
}

impl ObservabilityConfig {
    /// Resource attributes attached to every exported span, besides
    /// `service.name`.
    pub fn resource_attributes(&self) -> Vec<(String, String)> {
        let mut attrs = vec![(
            "service.version".to_owned(),
            env!("CARGO_PKG_VERSION").to_owned(),
        )];
        if let Some(env) = &self.environment {
            attrs.push(("deployment.environment".to_owned(), env.clone()));
        }
        attrs.extend(self.resource.iter().map(|(k, v)| (k.clone(), v.clone())));
        attrs
    }

    pub(super) fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if !(0.0..=1.0).contains(&self.sample_rate) {
            errors.push(ConfigError::error(
                "observability.sample_rate",
                "must be between 0.0 and 1.0",
            ));
        }
        if self.service_name.trim().is_empty() {
            errors.push(ConfigError::error(
                "observability.service_name",
                "must not be empty",
            ));
        }
        if let Some(endpoint) = &self.otlp_endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                errors.push(ConfigError::error(
                    "observability.otlp_endpoint",
                    format!("'{endpoint}' is not an http(s) URL"),
                ));
            }
            if self.sample_rate == 0.0 {
                errors.push(ConfigError::warning(
                    "observability.sample_rate",
                    "exporter configured but sampling is off; no spans will be sent",
                ));
            }
        }
        errors
    }
}

fn d_log_filter() -> String {
    "info,cr_gateway=debug".into()
}

fn d_service_name() -> String {
    "chatrelay".into()
}

fn d_sample_rate() -> f64 {
    1.0
}
