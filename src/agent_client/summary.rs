//! Wire shape of the node agent's `/stats/summary` response. Only the
//! fields the core consumes are modelled; everything else in the real
//! payload is ignored by `serde`'s default "unknown fields are dropped"
//! behaviour.

use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct StatsSummary {
    pub node: NodeStats,
    #[serde(default)]
    pub pods: Vec<PodStats>,
}

#[derive(Debug, Deserialize)]
pub struct NodeStats {
    #[serde(rename = "nodeName")]
    pub node_name: String,
    #[serde(default)]
    pub cpu: Option<CpuStats>,
    #[serde(default)]
    pub memory: Option<MemoryStats>,
    #[serde(rename = "startTime", default)]
    pub start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct PodStats {
    #[serde(rename = "podRef")]
    pub pod_ref: PodReference,
    #[serde(default)]
    pub containers: Vec<ContainerStats>,
}

#[derive(Debug, Deserialize)]
pub struct PodReference {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub uid: String,
}

#[derive(Debug, Deserialize)]
pub struct ContainerStats {
    pub name: String,
    #[serde(default)]
    pub cpu: Option<CpuStats>,
    #[serde(default)]
    pub memory: Option<MemoryStats>,
    #[serde(rename = "startTime", default)]
    pub start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CpuStats {
    pub time: DateTime<Utc>,
    #[serde(rename = "usageNanoCores", default)]
    pub usage_nano_cores: Option<u64>,
    #[serde(rename = "usageCoreNanoSeconds", default)]
    pub usage_core_nano_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct MemoryStats {
    pub time: DateTime<Utc>,
    #[serde(rename = "workingSetBytes", default)]
    pub working_set_bytes: Option<u64>,
}
