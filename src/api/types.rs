//! JSON response shapes mirroring `metrics.k8s.io/v1beta1` closely enough
//! for any client that already speaks that API to parse our output.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub creation_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Usage {
    pub cpu: String,
    pub memory: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeMetrics {
    pub metadata: ObjectMeta,
    pub timestamp: DateTime<Utc>,
    pub window: String,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerMetrics {
    pub name: String,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize)]
pub struct PodMetrics {
    pub metadata: ObjectMeta,
    pub timestamp: DateTime<Utc>,
    pub window: String,
    pub containers: Vec<ContainerMetrics>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct NodeMetricsList {
    pub items: Vec<NodeMetrics>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct PodMetricsList {
    pub items: Vec<PodMetrics>,
}

/// Renders a rate-window duration the way the real API does: seconds, to
/// millisecond precision.
pub fn format_window(window: Duration) -> String {
    format!("{:.3}s", window.as_secs_f64())
}
