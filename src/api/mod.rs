//! The read side: projects `Store` samples, joined with informer-cached
//! object metadata, into the `NodeMetrics`/`PodMetrics` shapes. Never
//! blocks on scraping and never starts one.

pub mod server;
pub mod types;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::runtime::reflector;

use crate::error::{Error, Result};
use crate::store::{PodKey, ResourceUsage, Store, TimeInfo};
use crate::utils::resource_quantity::{format_cpu_cores, format_memory_bytes};

use types::{format_window, ContainerMetrics, NodeMetrics, NodeMetricsList, ObjectMeta, PodMetrics, PodMetricsList, Usage};

pub struct MetricsSurface {
    nodes: reflector::Store<Node>,
    pods: reflector::Store<Pod>,
    store: Arc<Store>,
}

impl MetricsSurface {
    pub fn new(nodes: reflector::Store<Node>, pods: reflector::Store<Pod>, store: Arc<Store>) -> Self {
        MetricsSurface { nodes, pods, store }
    }

    pub fn list_node_metrics(&self, selector: Option<&str>) -> NodeMetricsList {
        let matcher = LabelMatcher::parse(selector);
        let mut candidates: Vec<Arc<Node>> = self
            .nodes
            .state()
            .into_iter()
            .filter(|n| matcher.matches(&labels_of(&n.metadata)))
            .collect();
        candidates.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));

        let names: Vec<String> = candidates.iter().map(|n| n.metadata.name.clone().unwrap_or_default()).collect();
        let projections = self.store.get_node_metrics(&names);

        let items = candidates
            .iter()
            .zip(projections)
            .filter_map(|(node, projection)| projection.map(|(ti, usage)| node_metrics_dto(node, ti, usage)))
            .collect();
        NodeMetricsList { items }
    }

    pub fn get_node_metrics(&self, name: &str) -> Result<NodeMetrics> {
        let node = self
            .nodes
            .state()
            .into_iter()
            .find(|n| n.metadata.name.as_deref() == Some(name))
            .ok_or_else(|| Error::EntityUnknown { kind: "node", name: name.to_string() })?;

        let projection = self.store.get_node_metrics(std::slice::from_ref(&name.to_string()));
        let (time_info, usage) = projection
            .into_iter()
            .next()
            .flatten()
            .ok_or_else(|| Error::NotReadyYet { kind: "node", name: name.to_string() })?;

        Ok(node_metrics_dto(&node, time_info, usage))
    }

    pub fn list_pod_metrics(&self, namespace: Option<&str>, selector: Option<&str>) -> PodMetricsList {
        let matcher = LabelMatcher::parse(selector);
        let mut candidates: Vec<Arc<Pod>> = self
            .pods
            .state()
            .into_iter()
            .filter(|p| namespace.map_or(true, |ns| p.metadata.namespace.as_deref() == Some(ns)))
            .filter(|p| matcher.matches(&labels_of(&p.metadata)))
            .collect();
        candidates.sort_by(|a, b| {
            (a.metadata.namespace.as_deref(), a.metadata.name.as_deref())
                .cmp(&(b.metadata.namespace.as_deref(), b.metadata.name.as_deref()))
        });

        let keys: Vec<PodKey> = candidates.iter().map(|p| pod_key(p)).collect();
        let projections = self.store.get_pod_metrics(&keys);

        let items = candidates
            .iter()
            .zip(projections)
            .filter_map(|(pod, projection)| projection.and_then(|containers| pod_metrics_dto(pod, containers)))
            .collect();
        PodMetricsList { items }
    }

    pub fn get_pod_metrics(&self, namespace: &str, name: &str) -> Result<PodMetrics> {
        let qualified = format!("{namespace}/{name}");
        let pod = self
            .pods
            .state()
            .into_iter()
            .find(|p| p.metadata.namespace.as_deref() == Some(namespace) && p.metadata.name.as_deref() == Some(name))
            .ok_or_else(|| Error::EntityUnknown { kind: "pod", name: qualified.clone() })?;

        let key = pod_key(&pod);
        let containers = self
            .store
            .get_pod_metrics(std::slice::from_ref(&key))
            .into_iter()
            .next()
            .flatten()
            .ok_or_else(|| Error::NotReadyYet { kind: "pod", name: qualified.clone() })?;

        pod_metrics_dto(&pod, containers).ok_or(Error::NotReadyYet { kind: "pod", name: qualified })
    }
}

fn pod_key(pod: &Pod) -> PodKey {
    (pod.metadata.namespace.clone().unwrap_or_default(), pod.metadata.name.clone().unwrap_or_default())
}

fn labels_of(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> BTreeMap<String, String> {
    meta.labels.clone().unwrap_or_default()
}

fn node_metrics_dto(node: &Node, time_info: TimeInfo, usage: ResourceUsage) -> NodeMetrics {
    NodeMetrics {
        metadata: ObjectMeta {
            name: node.metadata.name.clone().unwrap_or_default(),
            namespace: None,
            labels: labels_of(&node.metadata),
            creation_timestamp: node.metadata.creation_timestamp.clone().map(|t| t.0).unwrap_or_else(Utc::now),
        },
        timestamp: time_info.timestamp,
        window: format_window(time_info.window),
        usage: Usage { cpu: format_cpu_cores(usage.cpu_cores), memory: format_memory_bytes(usage.memory_bytes) },
    }
}

/// Projects the store's per-container samples through the pod's declared
/// `spec.containers` list: containers with no sample are omitted, in
/// `spec.containers` order; containers the store has but the pod's current
/// spec no longer names (e.g. after a container rename) are dropped. Returns
/// `None` if that leaves nothing — the pod has samples for containers it no
/// longer has, which the caller treats the same as "not ready yet".
fn pod_metrics_dto(pod: &Pod, containers: Vec<(String, TimeInfo, ResourceUsage)>) -> Option<PodMetrics> {
    let mut by_name: HashMap<String, (TimeInfo, ResourceUsage)> =
        containers.into_iter().map(|(name, ti, usage)| (name, (ti, usage))).collect();

    let declared = pod.spec.as_ref().map(|s| s.containers.as_slice()).unwrap_or(&[]);
    let ordered: Vec<(String, TimeInfo, ResourceUsage)> = declared
        .iter()
        .filter_map(|c| by_name.remove(&c.name).map(|(ti, usage)| (c.name.clone(), ti, usage)))
        .collect();

    let (timestamp, window) = ordered.first().map(|(_, ti, _)| (ti.timestamp, format_window(ti.window)))?;

    Some(PodMetrics {
        metadata: ObjectMeta {
            name: pod.metadata.name.clone().unwrap_or_default(),
            namespace: pod.metadata.namespace.clone(),
            labels: labels_of(&pod.metadata),
            creation_timestamp: pod.metadata.creation_timestamp.clone().map(|t| t.0).unwrap_or_else(Utc::now),
        },
        timestamp,
        window,
        containers: ordered
            .into_iter()
            .map(|(name, _, usage)| ContainerMetrics {
                name,
                usage: Usage { cpu: format_cpu_cores(usage.cpu_cores), memory: format_memory_bytes(usage.memory_bytes) },
            })
            .collect(),
    })
}

#[derive(Debug)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    Exists(String),
    NotExists(String),
}

/// A minimal equality/existence label-selector matcher, covering the
/// subset of `kubectl`-style selector syntax ("env=prod,tier!=edge,!beta")
/// that the aggregated API's clients actually send.
struct LabelMatcher(Vec<Requirement>);

impl LabelMatcher {
    fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return LabelMatcher(Vec::new());
        };

        let mut requirements = Vec::new();
        for term in raw.split(',') {
            let term = term.trim();
            if let Some(key) = term.strip_prefix('!') {
                requirements.push(Requirement::NotExists(key.trim().to_string()));
            } else if let Some((k, v)) = term.split_once("!=") {
                requirements.push(Requirement::NotEquals(k.trim().to_string(), v.trim().to_string()));
            } else if let Some((k, v)) = term.split_once("==") {
                requirements.push(Requirement::Equals(k.trim().to_string(), v.trim().to_string()));
            } else if let Some((k, v)) = term.split_once('=') {
                requirements.push(Requirement::Equals(k.trim().to_string(), v.trim().to_string()));
            } else {
                requirements.push(Requirement::Exists(term.to_string()));
            }
        }
        LabelMatcher(requirements)
    }

    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.0.iter().all(|req| match req {
            Requirement::Equals(k, v) => labels.get(k).map_or(false, |have| have == v),
            Requirement::NotEquals(k, v) => labels.get(k).map_or(true, |have| have != v),
            Requirement::Exists(k) => labels.contains_key(k),
            Requirement::NotExists(k) => !labels.contains_key(k),
        })
    }
}
