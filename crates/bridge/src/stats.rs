//! Contadores em memória do pipeline. Zeram só ao reiniciar o processo.

use crate::pipeline::PipelineState;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct Stats {
    received: AtomicU64,
    sent: AtomicU64,
    errors: AtomicU64,
    /// Linhas de ruído, estouros de buffer e pares inválidos
    anomalies: AtomicU64,
    started: Instant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub received: u64,
    pub sent: u64,
    pub errors: u64,
    pub anomalies: u64,
    pub uptime_secs: u64,
    /// `sent / received × 100`; 0 sem frames recebidos
    pub success_rate: f64,
    pub state: PipelineState,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            anomalies: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_anomalies(&self, count: u64) {
        self.anomalies.fetch_add(count, Ordering::Relaxed);
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn anomalies(&self) -> u64 {
        self.anomalies.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, state: PipelineState) -> StatsSnapshot {
        let received = self.received();
        let sent = self.sent();
        let success_rate = if received == 0 {
            0.0
        } else {
            sent as f64 / received as f64 * 100.0
        };
        StatsSnapshot {
            received,
            sent,
            errors: self.errors(),
            anomalies: self.anomalies(),
            uptime_secs: self.started.elapsed().as_secs(),
            success_rate,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_is_zero_without_frames() {
        let stats = Stats::new();
        assert_eq!(stats.snapshot(PipelineState::Streaming).success_rate, 0.0);
    }

    #[test]
    fn success_rate_from_counters() {
        let stats = Stats::new();
        for _ in 0..4 {
            stats.record_received();
        }
        stats.record_sent();
        stats.record_sent();
        stats.record_sent();
        stats.record_error();
        stats.record_anomalies(2);

        let snap = stats.snapshot(PipelineState::SimulatedFallback);
        assert_eq!(snap.received, 4);
        assert_eq!(snap.sent, 3);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.anomalies, 2);
        assert_eq!(snap.success_rate, 75.0);
        assert_eq!(snap.state, PipelineState::SimulatedFallback);
    }
}
