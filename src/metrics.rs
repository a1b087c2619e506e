//! Per-attempt telemetry.
//!
//! The retry loop reports one observation per attempt to a [`MetricsSink`].
//! Recording is fire-and-forget: sink errors and panics are logged and dropped.

use anyhow::Result;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Destination for per-attempt latency and outcome.
#[cfg_attr(test, mockall::automock)]
pub trait MetricsSink: Send + Sync {
    fn record_llm_call(
        &self,
        provider: &str,
        model: &str,
        latency: Duration,
        is_error: bool,
    ) -> Result<()>;
}

/// Discards every observation.
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_llm_call(&self, _: &str, _: &str, _: Duration, _: bool) -> Result<()> {
        Ok(())
    }
}

/// One recorded attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub provider: String,
    pub model: String,
    pub latency: Duration,
    pub is_error: bool,
}

/// Aggregate for one `(provider, model)` pair.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallStats {
    pub provider: String,
    pub model: String,
    pub calls: u64,
    pub errors: u64,
    pub total_latency: Duration,
    pub max_latency: Duration,
}

impl CallStats {
    pub fn mean_latency(&self) -> Duration {
        match u32::try_from(self.calls) {
            Ok(0) => Duration::ZERO,
            Ok(calls) => self.total_latency / calls,
            Err(_) => Duration::from_secs_f64(self.total_latency.as_secs_f64() / self.calls as f64),
        }
    }
}

impl fmt::Display for CallStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}: {} calls, {} errors, mean {:.3}s, max {:.3}s",
            self.provider,
            self.model,
            self.calls,
            self.errors,
            self.mean_latency().as_secs_f64(),
            self.max_latency.as_secs_f64()
        )
    }
}

/// Thread-safe in-process collector.
#[derive(Default)]
pub struct InMemoryMetrics {
    observations: Mutex<Vec<Observation>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.observations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn summary(&self) -> Vec<CallStats> {
        let observations = self.observations.lock().unwrap_or_else(|e| e.into_inner());
        let mut stats: BTreeMap<(&str, &str), CallStats> = BTreeMap::new();

        for obs in observations.iter() {
            let entry = stats
                .entry((obs.provider.as_str(), obs.model.as_str()))
                .or_insert_with(|| CallStats {
                    provider: obs.provider.clone(),
                    model: obs.model.clone(),
                    ..Default::default()
                });
            entry.calls += 1;
            if obs.is_error {
                entry.errors += 1;
            }
            entry.total_latency += obs.latency;
            entry.max_latency = entry.max_latency.max(obs.latency);
        }

        stats.into_values().collect()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record_llm_call(
        &self,
        provider: &str,
        model: &str,
        latency: Duration,
        is_error: bool,
    ) -> Result<()> {
        self.observations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Observation {
                provider: provider.to_string(),
                model: model.to_string(),
                latency,
                is_error,
            });
        Ok(())
    }
}

/// Records one observation; never fails and never panics.
pub fn record_safely(
    sink: &dyn MetricsSink,
    provider: &str,
    model: &str,
    latency: Duration,
    is_error: bool,
) {
    let result = catch_unwind(AssertUnwindSafe(|| {
        sink.record_llm_call(provider, model, latency, is_error)
    }));

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Failed to record {} call metrics: {:#}", provider, e),
        Err(_) => warn!("Metrics sink panicked while recording {} call", provider),
    }
}

/// Times one attempt and reports it when dropped.
///
/// Dropping without [`AttemptRecorder::succeeded`] records an error, which
/// also covers attempts whose future was cancelled mid-flight.
pub struct AttemptRecorder<'a> {
    sink: &'a dyn MetricsSink,
    provider: &'a str,
    model: &'a str,
    started: Instant,
    is_error: bool,
}

impl<'a> AttemptRecorder<'a> {
    pub fn start(sink: &'a dyn MetricsSink, provider: &'a str, model: &'a str) -> Self {
        Self {
            sink,
            provider,
            model,
            started: Instant::now(),
            is_error: true,
        }
    }

    pub fn succeeded(&mut self) {
        self.is_error = false;
    }
}

impl Drop for AttemptRecorder<'_> {
    fn drop(&mut self) {
        let latency = self.started.elapsed();
        record_safely(self.sink, self.provider, self.model, latency, self.is_error);
        debug!(
            "{} call complete: latency={:.3}s, error={}",
            self.provider,
            latency.as_secs_f64(),
            self.is_error
        );
    }
}
