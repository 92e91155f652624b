//! Converts a node object into an HTTPS request against the node agent's
//! summary endpoint, decodes the response into canonical metric points.

pub mod summary;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Certificate, Identity};
use secrecy::ExposeSecret;

use crate::address::{self, AddressType, NodeAddress};
use crate::config::{Config, TlsMode};
use crate::error::{Error, Result};
use crate::store::scaled::ScaledNanos;
use crate::store::{MetricsBatch, MetricsPoint, PodKey, PodMetricsPoint};

use summary::{ContainerStats, CpuStats, MemoryStats, StatsSummary};

/// Everything the client needs to know about one node in order to scrape it.
#[derive(Debug, Clone)]
pub struct NodeTarget {
    pub name: String,
    pub uid: String,
    pub addresses: Vec<NodeAddress>,
    pub reported_port: Option<u16>,
}

#[async_trait]
pub trait NodeAgentClient: Send + Sync {
    async fn get_metrics(&self, node: &NodeTarget) -> Result<MetricsBatch>;
}

pub struct HttpNodeAgentClient {
    http: reqwest::Client,
    default_port: u16,
    use_node_status_port: bool,
    address_priority: Vec<AddressType>,
    scheme: &'static str,
    bearer_token: Option<String>,
}

impl HttpNodeAgentClient {
    pub fn new(config: &Config, bearer_token: Option<String>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.scrape_timeout);
        let scheme = match &config.tls {
            TlsMode::CompletelyInsecure => "http",
            TlsMode::Https { ca_file, insecure_skip_verify, client_cert } => {
                if *insecure_skip_verify {
                    builder = builder.danger_accept_invalid_certs(true);
                }
                if let Some(path) = ca_file {
                    let pem = std::fs::read(path)?;
                    builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
                }
                if let Some((cert_path, key_path)) = client_cert {
                    let mut pem = std::fs::read(cert_path)?;
                    pem.extend_from_slice(&std::fs::read(key_path)?);
                    builder = builder.identity(Identity::from_pem(&pem)?);
                }
                "https"
            }
        };
        let bearer_token = match &config.tls {
            TlsMode::CompletelyInsecure => None,
            TlsMode::Https { .. } => bearer_token,
        };

        Ok(HttpNodeAgentClient {
            http: builder.build()?,
            default_port: config.kubelet_port,
            use_node_status_port: config.kubelet_use_node_status_port,
            address_priority: config.address_priority.clone(),
            scheme,
            bearer_token,
        })
    }

    /// Reads the bearer token from the same credential source the cluster
    /// client already resolved, so the node-agent client authenticates the
    /// same way the API-server client does by default.
    pub fn bearer_token_from_kube_config(kube_config: &kube::Config) -> Option<String> {
        kube_config
            .auth_info
            .token
            .as_ref()
            .map(|t| t.expose_secret().to_string())
    }

    fn port_for(&self, node: &NodeTarget) -> u16 {
        if self.use_node_status_port {
            if let Some(p) = node.reported_port {
                if p != 0 {
                    return p;
                }
            }
        }
        self.default_port
    }
}

#[async_trait]
impl NodeAgentClient for HttpNodeAgentClient {
    async fn get_metrics(&self, node: &NodeTarget) -> Result<MetricsBatch> {
        let host = address::resolve(&node.addresses, &self.address_priority)
            .ok_or_else(|| Error::NoAddress(node.name.clone()))?;
        let port = self.port_for(node);
        let url = format!(
            "{}://{}:{}/stats/summary?only_cpu_and_memory=true",
            self.scheme, host, port
        );

        let mut request = self.http.get(&url);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|source| Error::AgentUnreachable {
            node: node.name.clone(),
            source,
        })?;

        if response.status().as_u16() == 404 {
            return Err(Error::AgentNotFound { node: node.name.clone() });
        }
        if !response.status().is_success() {
            return Err(Error::AgentStatus { node: node.name.clone(), status: response.status().as_u16() });
        }

        let summary: StatsSummary = response.json().await.map_err(|source| Error::DecodeInvalid {
            node: node.name.clone(),
            source,
        })?;

        Ok(decode_summary(summary))
    }
}

fn point_from(cpu: Option<&CpuStats>, memory: Option<&MemoryStats>, start_time: Option<DateTime<Utc>>) -> Option<MetricsPoint> {
    let cpu = cpu?;
    let memory = memory?;
    let cumulative = cpu.usage_core_nano_seconds?;
    let working_set = memory.working_set_bytes?;
    let timestamp = cpu.time.min(memory.time);
    if timestamp == DateTime::<Utc>::MIN_UTC {
        return None;
    }
    Some(MetricsPoint {
        timestamp,
        cumulative_cpu: ScaledNanos::from_raw(cumulative),
        memory_working_set_bytes: working_set,
        start_time: start_time.unwrap_or(timestamp),
    })
}

/// Builds one [`MetricsBatch`] from a decoded summary. A pod is dropped
/// whole if any of its containers lacks CPU or working-set data; the node
/// point is `None` under the same rule.
pub fn decode_summary(summary: StatsSummary) -> MetricsBatch {
    let node_point = point_from(summary.node.cpu.as_ref(), summary.node.memory.as_ref(), summary.node.start_time);
    let node = node_point.map(|p| (summary.node.node_name, p));

    let mut pods: HashMap<PodKey, PodMetricsPoint> = HashMap::new();
    for pod in summary.pods {
        let mut containers = HashMap::new();
        let mut complete = true;
        for container in &pod.containers {
            match point_from(container.cpu.as_ref(), container.memory.as_ref(), container.start_time) {
                Some(point) => {
                    containers.insert(container.name.clone(), point);
                }
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if !complete || containers.is_empty() {
            continue;
        }
        let key: PodKey = (pod.pod_ref.namespace.clone(), pod.pod_ref.name.clone());
        pods.insert(
            key,
            PodMetricsPoint { namespace: pod.pod_ref.namespace, name: pod.pod_ref.name, containers },
        );
    }

    MetricsBatch { node, pods }
}

#[cfg(test)]
mod tests {
    use super::*;
    use summary::{NodeStats, PodReference, PodStats};

    fn cpu(secs: i64, ns: u64) -> CpuStats {
        CpuStats { time: DateTime::from_timestamp(secs, 0).unwrap(), usage_nano_cores: None, usage_core_nano_seconds: Some(ns) }
    }

    fn mem(secs: i64, bytes: u64) -> MemoryStats {
        MemoryStats { time: DateTime::from_timestamp(secs, 0).unwrap(), working_set_bytes: Some(bytes) }
    }

    #[test]
    fn node_with_valid_stats_decodes() {
        let summary = StatsSummary {
            node: NodeStats {
                node_name: "n1".into(),
                cpu: Some(cpu(10, 1_000_000_000)),
                memory: Some(mem(10, 123)),
                start_time: None,
            },
            pods: vec![],
        };
        let batch = decode_summary(summary);
        let (name, point) = batch.node.expect("node point");
        assert_eq!(name, "n1");
        assert_eq!(point.memory_working_set_bytes, 123);
    }

    #[test]
    fn node_missing_memory_yields_no_node_point() {
        let summary = StatsSummary {
            node: NodeStats { node_name: "n1".into(), cpu: Some(cpu(10, 1)), memory: None, start_time: None },
            pods: vec![],
        };
        assert!(decode_summary(summary).node.is_none());
    }

    #[test]
    fn scrape_with_no_pods_still_yields_node_point() {
        let summary = StatsSummary {
            node: NodeStats { node_name: "n1".into(), cpu: Some(cpu(0, 1)), memory: Some(mem(0, 1)), start_time: None },
            pods: vec![],
        };
        let batch = decode_summary(summary);
        assert!(batch.node.is_some());
        assert!(batch.pods.is_empty());
    }

    #[test]
    fn pod_with_one_incomplete_container_is_dropped_whole() {
        let summary = StatsSummary {
            node: NodeStats { node_name: "n1".into(), cpu: Some(cpu(0, 1)), memory: Some(mem(0, 1)), start_time: None },
            pods: vec![PodStats {
                pod_ref: PodReference { name: "p".into(), namespace: "ns".into(), uid: "u".into() },
                containers: vec![
                    ContainerStats { name: "c1".into(), cpu: Some(cpu(0, 1)), memory: Some(mem(0, 1)), start_time: None },
                    ContainerStats { name: "c2".into(), cpu: None, memory: Some(mem(0, 1)), start_time: None },
                ],
            }],
        };
        let batch = decode_summary(summary);
        assert!(batch.pods.is_empty());
    }

    #[test]
    fn pod_with_all_containers_complete_is_kept() {
        let summary = StatsSummary {
            node: NodeStats { node_name: "n1".into(), cpu: Some(cpu(0, 1)), memory: Some(mem(0, 1)), start_time: None },
            pods: vec![PodStats {
                pod_ref: PodReference { name: "p".into(), namespace: "ns".into(), uid: "u".into() },
                containers: vec![ContainerStats {
                    name: "c1".into(),
                    cpu: Some(cpu(0, 1)),
                    memory: Some(mem(0, 1)),
                    start_time: None,
                }],
            }],
        };
        let batch = decode_summary(summary);
        let key: PodKey = ("ns".to_string(), "p".to_string());
        assert!(batch.pods.contains_key(&key));
    }

    #[test]
    fn missing_ca_file_surfaces_as_a_build_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing_ca = dir.path().join("ca.pem");

        let config = Config {
            metric_resolution: Duration::from_secs(10),
            scrape_timeout: Duration::from_secs(9),
            kubelet_port: 10250,
            kubelet_use_node_status_port: false,
            address_priority: crate::address::default_priority(),
            tls: TlsMode::Https {
                ca_file: Some(missing_ca.to_string_lossy().into_owned()),
                insecure_skip_verify: false,
                client_cert: None,
            },
            kubeconfig: None,
            bind_address: "127.0.0.1:0".to_string(),
        };

        assert!(HttpNodeAgentClient::new(&config, None).is_err());
    }

    #[test]
    fn completely_insecure_mode_sends_no_bearer_token() {
        let config = Config {
            metric_resolution: Duration::from_secs(10),
            scrape_timeout: Duration::from_secs(9),
            kubelet_port: 10250,
            kubelet_use_node_status_port: false,
            address_priority: crate::address::default_priority(),
            tls: TlsMode::CompletelyInsecure,
            kubeconfig: None,
            bind_address: "127.0.0.1:0".to_string(),
        };

        let client = HttpNodeAgentClient::new(&config, Some("super-secret-token".to_string())).unwrap();
        assert!(client.bearer_token.is_none());
        assert_eq!(client.scheme, "http");
    }
}
