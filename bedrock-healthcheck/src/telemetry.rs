//! OpenTelemetry metrics, exposed in the Prometheus text format
//!
//! Instruments are registered on a private `SdkMeterProvider` whose only
//! reader is a Prometheus exporter. Every scrape gathers the registry,
//! which runs the observable-gauge callbacks against [`HealthState`], so
//! the gauges are always exactly as fresh as the last completed probe.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, MeterProvider as _, ObservableGauge};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};

use crate::probes::{ProbeProtocol, Target};
use crate::state::HealthState;

const METER_NAME: &str = "bedrock-healthcheck";

pub const HEALTHY_GAUGE: &str = "minecraft_healthcheck_healthy";
pub const UNHEALTHY_GAUGE: &str = "minecraft_healthcheck_unhealthy";
pub const LAST_CHECK_GAUGE: &str = "minecraft_healthcheck_last_check_timestamp_seconds";
/// The exporter appends `_total` when serving.
pub const ATTEMPT_COUNTER: &str = "minecraft_healthcheck_attempts";

/// Handle the probe loop uses to record attempts.
#[derive(Clone)]
pub struct HealthcheckMetrics {
    attempts: Counter<u64>,
    attrs: Arc<[KeyValue]>,
}

impl HealthcheckMetrics {
    pub fn mark_attempt(&self) {
        self.attempts.add(1, &self.attrs);
    }
}

pub struct Telemetry {
    provider: SdkMeterProvider,
    registry: Registry,
    metrics: HealthcheckMetrics,
    _gauges: (ObservableGauge<u64>, ObservableGauge<u64>, ObservableGauge<f64>),
}

impl Telemetry {
    pub fn new(target: &Target, protocol: ProbeProtocol, state: Arc<HealthState>) -> Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .without_scope_info()
            .without_target_info()
            .build()
            .context("Failed to create Prometheus exporter")?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter(METER_NAME);

        let attrs: Arc<[KeyValue]> = Arc::from(vec![
            KeyValue::new("host", target.host.clone()),
            KeyValue::new("port", target.port as i64),
            KeyValue::new("protocol", protocol.as_str()),
        ]);

        let attempts = meter
            .u64_counter(ATTEMPT_COUNTER)
            .with_description("Number of attempted healthchecks.")
            .build();

        let healthy = {
            let state = state.clone();
            let attrs = attrs.clone();
            meter
                .u64_observable_gauge(HEALTHY_GAUGE)
                .with_description("1 if the server is healthy. 0 if the server is unhealthy or not checked.")
                .with_callback(move |observer| {
                    observer.observe(state.status().healthy_value(), &attrs);
                })
                .build()
        };

        let unhealthy = {
            let state = state.clone();
            let attrs = attrs.clone();
            meter
                .u64_observable_gauge(UNHEALTHY_GAUGE)
                .with_description("1 if the server is unhealthy. 0 if the server is healthy or not checked.")
                .with_callback(move |observer| {
                    observer.observe(state.status().unhealthy_value(), &attrs);
                })
                .build()
        };

        let last_check = {
            let attrs = attrs.clone();
            meter
                .f64_observable_gauge(LAST_CHECK_GAUGE)
                .with_description("Unix time of the last completed healthcheck.")
                .with_callback(move |observer| {
                    if let Some(at) = state.last_check() {
                        observer.observe(at.timestamp_millis() as f64 / 1000.0, &attrs);
                    }
                })
                .build()
        };

        info!("Metrics initialized for {} ({})", target, protocol);

        Ok(Self {
            provider,
            registry,
            metrics: HealthcheckMetrics { attempts, attrs },
            _gauges: (healthy, unhealthy, last_check),
        })
    }

    pub fn metrics(&self) -> HealthcheckMetrics {
        self.metrics.clone()
    }

    /// Current metric set in the Prometheus text format, with its content type.
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .context("Failed to encode metrics")?;
        Ok((encoder.format_type().to_string(), buffer))
    }

    pub fn shutdown(&self) {
        info!("Shutting down metrics...");
        if let Err(e) = self.provider.shutdown() {
            warn!("Failed to shutdown MeterProvider: {}", e);
        }
    }
}

/// Value of the first sample of `name` in a text exposition, if present.
#[cfg(test)]
pub(crate) fn sample_value(exposition: &str, name: &str) -> Option<f64> {
    exposition
        .lines()
        .filter(|line| !line.starts_with('#'))
        .find(|line| {
            line.strip_prefix(name)
                .is_some_and(|rest| rest.starts_with('{') || rest.starts_with(' '))
        })
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}
