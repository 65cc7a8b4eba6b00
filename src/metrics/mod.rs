//! # Sistema de Métricas
//! src/metrics/mod.rs
//!
//! Recolección y agregación de métricas del servidor:
//! - Requests por código de estado
//! - Latencias (p50, p95, p99)
//! - Conexiones activas y bytes enviados

pub mod collector;

pub use collector::{LatencySummary, MetricsCollector, MetricsSnapshot};
