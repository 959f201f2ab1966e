//! Prometheus metric families, one series per target.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use prometheus::{Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, Opts, TextEncoder};

use plugpoll_core::error::AppError;
use plugpoll_core::models::Metrics;
use plugpoll_core::traits::MetricsSink;

const TARGET_LABEL: &str = "target";

/// Series of one target, resolved once when the target is added.
struct TargetSeries {
    voltage: Gauge,
    power: Gauge,
    current: Gauge,
    temperature_c: Gauge,
    temperature_f: Gauge,
    last_updated: Gauge,
    successes: IntCounter,
    errors: IntCounter,
}

/// Stores the latest readings of every target and renders them in the
/// Prometheus text format.
///
/// Implements [`MetricsSink`], so it can be handed straight to the poller.
pub struct Registry {
    registry: prometheus::Registry,
    voltage: GaugeVec,
    power: GaugeVec,
    current: GaugeVec,
    temperature_c: GaugeVec,
    temperature_f: GaugeVec,
    last_updated: GaugeVec,
    successes: IntCounterVec,
    errors: IntCounterVec,
    targets: RwLock<HashMap<String, TargetSeries>>,
}

impl Registry {
    pub fn new() -> Result<Self, AppError> {
        let registry = prometheus::Registry::new();
        Ok(Self {
            voltage: register_gauge(
                &registry,
                "shelly_voltage",
                "Last observed voltage of the target",
            )?,
            power: register_gauge(
                &registry,
                "shelly_apower",
                "Last observed power of the target",
            )?,
            current: register_gauge(
                &registry,
                "shelly_current",
                "Last observed current of the target",
            )?,
            temperature_c: register_gauge(
                &registry,
                "shelly_temp_c",
                "Last observed temperature of the target in degrees Celsius",
            )?,
            temperature_f: register_gauge(
                &registry,
                "shelly_temp_f",
                "Last observed temperature of the target in degrees Fahrenheit",
            )?,
            last_updated: register_gauge(
                &registry,
                "shelly_last_updated",
                "Unix time of the most recent successful update for this target",
            )?,
            successes: register_counter(
                &registry,
                "shelly_success_counter",
                "Number of successful metrics queries for the target",
            )?,
            errors: register_counter(
                &registry,
                "shelly_error_counter",
                "Number of failed metrics queries for the target",
            )?,
            targets: RwLock::new(HashMap::new()),
            registry,
        })
    }

    /// Create every series for `name`. Rejects names already added.
    pub fn add_target(&self, name: &str) -> Result<(), AppError> {
        let mut targets = self.targets.write().unwrap_or_else(PoisonError::into_inner);
        if targets.contains_key(name) {
            return Err(AppError::InvalidInput(format!(
                "Duplicate target name \"{name}\""
            )));
        }

        let labels = [name];
        let series = TargetSeries {
            voltage: self.voltage.with_label_values(&labels),
            power: self.power.with_label_values(&labels),
            current: self.current.with_label_values(&labels),
            temperature_c: self.temperature_c.with_label_values(&labels),
            temperature_f: self.temperature_f.with_label_values(&labels),
            last_updated: self.last_updated.with_label_values(&labels),
            successes: self.successes.with_label_values(&labels),
            errors: self.errors.with_label_values(&labels),
        };
        targets.insert(name.to_string(), series);
        Ok(())
    }

    pub fn target_count(&self) -> usize {
        self.targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Encode every family in the text exposition format.
    pub fn render(&self) -> Result<String, AppError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| AppError::Internal(format!("Failed to encode metrics: {e}")))?;
        String::from_utf8(buffer)
            .map_err(|e| AppError::Internal(format!("Metrics are not valid UTF-8: {e}")))
    }

    /// Content type of [`render`](Self::render) output.
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    fn with_series(&self, name: &str, update: impl FnOnce(&TargetSeries)) {
        let targets = self.targets.read().unwrap_or_else(PoisonError::into_inner);
        match targets.get(name) {
            Some(series) => update(series),
            None => tracing::error!(target = %name, "Unknown target"),
        }
    }
}

impl MetricsSink for Registry {
    fn on_success(&self, target: &str, metrics: &Metrics) {
        self.with_series(target, |series| {
            series.voltage.set(metrics.voltage);
            series.power.set(metrics.power);
            series.current.set(metrics.current);
            series.temperature_c.set(metrics.temperature_c);
            series.temperature_f.set(metrics.temperature_f);
            series.successes.inc();
            series
                .last_updated
                .set(chrono::Utc::now().timestamp_millis() as f64 / 1000.0);
        });
    }

    fn on_error(&self, target: &str, _error: &AppError) {
        self.with_series(target, |series| series.errors.inc());
    }
}

fn register_gauge(
    registry: &prometheus::Registry,
    name: &str,
    help: &str,
) -> Result<GaugeVec, AppError> {
    let gauge = GaugeVec::new(Opts::new(name, help), &[TARGET_LABEL])
        .map_err(|e| AppError::Internal(format!("Failed to create metric {name}: {e}")))?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(|e| AppError::Internal(format!("Failed to register metric {name}: {e}")))?;
    Ok(gauge)
}

fn register_counter(
    registry: &prometheus::Registry,
    name: &str,
    help: &str,
) -> Result<IntCounterVec, AppError> {
    let counter = IntCounterVec::new(Opts::new(name, help), &[TARGET_LABEL])
        .map_err(|e| AppError::Internal(format!("Failed to create metric {name}: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| AppError::Internal(format!("Failed to register metric {name}: {e}")))?;
    Ok(counter)
}
