//! The two-sample in-memory time-series cache.
//!
//! Keeps exactly `previous` and `latest` per entity — nodes by name, pod
//! containers by `(namespace, name, container)` — and derives a CPU rate
//! from the gap between them. This is not a generalized ring buffer: the
//! rate window calculation genuinely only needs these two points.

pub mod scaled;

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use scaled::ScaledNanos;

/// Canonical sample for one entity (a node, or one container of a pod).
///
/// All three time-dependent fields are set together or the point does not
/// exist — there is no partially-populated `MetricsPoint`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsPoint {
    pub timestamp: DateTime<Utc>,
    pub cumulative_cpu: ScaledNanos,
    pub memory_working_set_bytes: u64,
    pub start_time: DateTime<Utc>,
}

/// Container name -> point, plus the pod's own key, for one scrape of one pod.
#[derive(Debug, Clone)]
pub struct PodMetricsPoint {
    pub namespace: String,
    pub name: String,
    pub containers: HashMap<String, MetricsPoint>,
}

pub type PodKey = (String, String);

/// Output of one scrape of one node.
///
/// `node` is `None` when the node's own stats were invalid — the batch is
/// still returned (so the Manager can log which node failed) but carries
/// no data for the Store to keep.
#[derive(Debug, Clone, Default)]
pub struct MetricsBatch {
    pub node: Option<(String, MetricsPoint)>,
    pub pods: HashMap<PodKey, PodMetricsPoint>,
}

#[derive(Debug, Clone)]
struct EntitySlot {
    previous: Option<MetricsPoint>,
    latest: MetricsPoint,
}

impl EntitySlot {
    fn new(point: MetricsPoint) -> Self {
        EntitySlot { previous: None, latest: point }
    }
}

/// `(timestamp of latest sample, window between samples)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeInfo {
    pub timestamp: DateTime<Utc>,
    pub window: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
    pub cpu_cores: f64,
    pub memory_bytes: u64,
}

/// The rate window within which a `previous`/`latest` pair is considered
/// usable: a closed interval, both `min` and `max` inclusive.
#[derive(Debug, Clone, Copy)]
pub struct RateWindow {
    pub min: Duration,
    pub max: Duration,
}

impl RateWindow {
    pub fn for_resolution(resolution: Duration) -> Self {
        RateWindow { min: resolution, max: resolution * 3 }
    }

    fn accepts(&self, gap: Duration) -> bool {
        gap >= self.min && gap <= self.max
    }
}

struct Maps {
    nodes: HashMap<String, EntitySlot>,
    pods: HashMap<PodKey, HashMap<String, EntitySlot>>,
    cycle_completed: bool,
}

/// The cluster-wide two-sample cache. All operations take a single
/// read-write lock; `Store`/`Discard` write, `Get*`/`Ready` read. The lock
/// is never held across I/O — callers hand in already-decoded batches.
pub struct Store {
    window: RateWindow,
    maps: RwLock<Maps>,
}

impl Store {
    pub fn new(window: RateWindow) -> Self {
        Store {
            window,
            maps: RwLock::new(Maps {
                nodes: HashMap::new(),
                pods: HashMap::new(),
                cycle_completed: false,
            }),
        }
    }

    /// Marks that every currently-tracked node has completed at least one
    /// scrape attempt. Called by the scrape orchestration once, after the
    /// first pass over all nodes known at start-up.
    pub fn mark_cycle_complete(&self) {
        self.maps.write().unwrap_or_else(|e| e.into_inner()).cycle_completed = true;
    }

    pub fn ready(&self) -> bool {
        let maps = self.maps.read().unwrap_or_else(|e| e.into_inner());
        if !maps.cycle_completed {
            return false;
        }
        let any_node_has_two = maps.nodes.values().any(|s| s.previous.is_some());
        let any_pod_has_two = maps
            .pods
            .values()
            .any(|containers| containers.values().any(|s| s.previous.is_some()));
        any_node_has_two || any_pod_has_two
    }

    pub fn store(&self, batch: MetricsBatch) {
        let Some((node_name, node_point)) = batch.node else {
            warn!("discarding batch with no valid node point");
            return;
        };

        let mut maps = self.maps.write().unwrap_or_else(|e| e.into_inner());
        apply_update(&mut maps.nodes, node_name.clone(), node_point);

        for (key, pod) in batch.pods {
            let containers = maps.pods.entry(key).or_default();
            for (cname, point) in pod.containers {
                apply_update(containers, cname, point);
            }
        }
    }

    pub fn get_node_metrics(&self, names: &[String]) -> Vec<Option<(TimeInfo, ResourceUsage)>> {
        let maps = self.maps.read().unwrap_or_else(|e| e.into_inner());
        names
            .iter()
            .map(|name| maps.nodes.get(name).and_then(|slot| self.project(slot)))
            .collect()
    }

    pub fn get_pod_metrics(
        &self,
        keys: &[PodKey],
    ) -> Vec<Option<Vec<(String, TimeInfo, ResourceUsage)>>> {
        let maps = self.maps.read().unwrap_or_else(|e| e.into_inner());
        keys.iter()
            .map(|key| {
                let containers = maps.pods.get(key)?;
                let mut out = Vec::new();
                for (cname, slot) in containers {
                    if let Some((time_info, usage)) = self.project(slot) {
                        out.push((cname.clone(), time_info, usage));
                    }
                }
                if out.is_empty() {
                    None
                } else {
                    out.sort_by(|a, b| a.0.cmp(&b.0));
                    Some(out)
                }
            })
            .collect()
    }

    pub fn discard_node(&self, name: &str) {
        let mut maps = self.maps.write().unwrap_or_else(|e| e.into_inner());
        maps.nodes.remove(name);
    }

    pub fn discard_pods(&self, keys: &[PodKey]) {
        let mut maps = self.maps.write().unwrap_or_else(|e| e.into_inner());
        for key in keys {
            maps.pods.remove(key);
        }
    }

    fn project(&self, slot: &EntitySlot) -> Option<(TimeInfo, ResourceUsage)> {
        let previous = slot.previous.as_ref()?;
        let gap = (slot.latest.timestamp - previous.timestamp)
            .to_std()
            .ok()?;
        if !self.window.accepts(gap) {
            return None;
        }
        let delta = slot.latest.cumulative_cpu.checked_sub(previous.cumulative_cpu);
        let cpu_cores = delta.approx_ns() / gap.as_nanos() as f64;
        Some((
            TimeInfo { timestamp: slot.latest.timestamp, window: gap },
            ResourceUsage {
                cpu_cores,
                memory_bytes: slot.latest.memory_working_set_bytes,
            },
        ))
    }
}

/// Applies the §4.3 update rule for one entity's slot within `map`.
fn apply_update<K: std::hash::Hash + Eq + Clone + std::fmt::Debug>(
    map: &mut HashMap<K, EntitySlot>,
    key: K,
    new: MetricsPoint,
) {
    match map.get_mut(&key) {
        None => {
            map.insert(key, EntitySlot::new(new));
        }
        Some(slot) => {
            if new.timestamp == slot.latest.timestamp {
                debug!("ignoring duplicate-timestamp sample for {key:?}");
                return;
            }
            if new.timestamp < slot.latest.timestamp {
                warn!("clock moved backwards for {key:?}, discarding slot");
                map.remove(&key);
                return;
            }
            let counter_reset = new.cumulative_cpu < slot.latest.cumulative_cpu
                || new.start_time > slot.latest.start_time;
            if counter_reset {
                debug!("counter reset detected for {key:?}, reseeding");
                slot.previous = None;
                slot.latest = new;
            } else {
                slot.previous = Some(std::mem::replace(&mut slot.latest, new));
            }
        }
    }
}
