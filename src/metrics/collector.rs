//! # Collector de Métricas
//! src/metrics/collector.rs
//!
//! Recolecta y agrega métricas del servidor en tiempo real.

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Latencias que se guardan para calcular percentiles
const LATENCY_WINDOW: usize = 10_000;

/// Collector de métricas thread-safe
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsData>>,
    start_time: Instant,
}

struct MetricsData {
    total_requests: u64,

    /// Requests por código de estado
    status_codes: BTreeMap<u16, u64>,

    /// Últimas latencias en microsegundos, la más vieja al frente
    latencies: VecDeque<u64>,

    active_connections: u64,
    total_connections: u64,
    bytes_sent: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsData {
                total_requests: 0,
                status_codes: BTreeMap::new(),
                latencies: VecDeque::with_capacity(LATENCY_WINDOW),
                active_connections: 0,
                total_connections: 0,
                bytes_sent: 0,
            })),
            start_time: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetricsData> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registra un request respondido
    ///
    /// `latency` va desde que se enmarcó el request hasta que terminó la
    /// escritura; `bytes` es el tamaño de la respuesta completa.
    pub fn record_request(&self, status_code: u16, latency: Duration, bytes: usize) {
        let mut data = self.lock();

        data.total_requests += 1;
        *data.status_codes.entry(status_code).or_insert(0) += 1;
        data.bytes_sent += bytes as u64;

        if data.latencies.len() >= LATENCY_WINDOW {
            data.latencies.pop_front();
        }
        data.latencies
            .push_back(u64::try_from(latency.as_micros()).unwrap_or(u64::MAX));
    }

    pub fn connection_opened(&self) {
        let mut data = self.lock();
        data.active_connections += 1;
        data.total_connections += 1;
    }

    pub fn connection_closed(&self) {
        let mut data = self.lock();
        data.active_connections = data.active_connections.saturating_sub(1);
    }

    pub fn active_connections(&self) -> u64 {
        self.lock().active_connections
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let data = self.lock();
        let latency = LatencySummary::from_samples(&data.latencies);

        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            total_requests: data.total_requests,
            status_codes: data.status_codes.clone(),
            active_connections: data.active_connections,
            total_connections: data.total_connections,
            bytes_sent: data.bytes_sent,
            latency_us: latency,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentiles sobre la ventana de latencias, en microsegundos
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub avg: u64,
    pub stddev: f64,
    pub samples: usize,
}

impl LatencySummary {
    fn from_samples(latencies: &VecDeque<u64>) -> Self {
        if latencies.is_empty() {
            return Self::default();
        }

        let mut sorted: Vec<u64> = latencies.iter().copied().collect();
        sorted.sort_unstable();

        let len = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let avg = sum / len as u64;

        let variance = sorted
            .iter()
            .map(|&x| {
                let diff = x as f64 - avg as f64;
                diff * diff
            })
            .sum::<f64>()
            / len as f64;

        Self {
            p50: sorted[len * 50 / 100],
            p95: sorted[len * 95 / 100],
            p99: sorted[len * 99 / 100],
            avg,
            stddev: variance.sqrt(),
            samples: len,
        }
    }
}

/// Snapshot serializable de las métricas
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub total_requests: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub active_connections: u64,
    pub total_connections: u64,
    pub bytes_sent: u64,
    pub latency_us: LatencySummary,
}
