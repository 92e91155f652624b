//! Per-node scrape task lifecycle: add/remove scrapers, ticker-driven
//! scrapes, per-scrape timeout, liveness bookkeeping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use k8s_openapi::api::core::v1::Node;
use log::{debug, info, warn};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::agent_client::{NodeAgentClient, NodeTarget};
use crate::address::NodeAddress as ResolverAddress;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::{PodKey, Store};
use crate::utils::metrics::ScrapeMetrics;

/// Builds a scrape target from a cached `Node`, or `None` if it carries
/// neither a uid nor a usable address list yet (freshly-created nodes can
/// briefly lack status).
pub fn node_target_from(node: &Node) -> Option<NodeTarget> {
    let name = node.metadata.name.clone()?;
    let uid = node.metadata.uid.clone()?;
    let status = node.status.as_ref()?;
    let addresses = status
        .addresses
        .as_ref()?
        .iter()
        .map(|a| ResolverAddress { type_raw: a.type_.clone(), address: a.address.clone() })
        .collect();
    let reported_port = status
        .daemon_endpoints
        .as_ref()
        .and_then(|d| d.kubelet_endpoint.as_ref())
        .map(|e| e.port as u16);
    Some(NodeTarget { name, uid, addresses, reported_port })
}

struct NodeScraperState {
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
    last_pod_keys: Arc<Mutex<Vec<PodKey>>>,
}

pub struct ScraperManager {
    client: Arc<dyn NodeAgentClient>,
    store: Arc<Store>,
    config: Config,
    metrics: Arc<ScrapeMetrics>,
    nodes: Mutex<HashMap<String, NodeScraperState>>,
    last_tick: Arc<RwLock<Instant>>,
}

impl ScraperManager {
    pub fn new(
        client: Arc<dyn NodeAgentClient>,
        store: Arc<Store>,
        config: Config,
        metrics: Arc<ScrapeMetrics>,
    ) -> Self {
        ScraperManager {
            client,
            store,
            config,
            metrics,
            nodes: Mutex::new(HashMap::new()),
            last_tick: Arc::new(RwLock::new(Instant::now())),
        }
    }

    /// Time elapsed since any node's scrape tick last started, for the
    /// `metric-collection-timely` liveness probe.
    pub fn last_tick_age(&self) -> std::time::Duration {
        self.last_tick.read().unwrap_or_else(|e| e.into_inner()).elapsed()
    }

    pub fn tracked_node_count(&self) -> usize {
        self.nodes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Starts a scrape task for `node`. A no-op error, not a panic, if the
    /// node is already being scraped.
    pub fn add_node_scraper(&self, node: NodeTarget) -> Result<()> {
        let mut nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        if nodes.contains_key(&node.uid) {
            return Err(Error::ScraperAlreadyActive(node.name));
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let last_pod_keys = Arc::new(Mutex::new(Vec::new()));

        let handle = tokio::spawn(scrape_loop(
            self.client.clone(),
            self.store.clone(),
            self.config.clone(),
            self.metrics.clone(),
            self.last_tick.clone(),
            node.clone(),
            cancel_rx,
            last_pod_keys.clone(),
        ));

        info!("started scraper for node {}", node.name);
        nodes.insert(node.uid, NodeScraperState { cancel: cancel_tx, handle, last_pod_keys });
        Ok(())
    }

    /// Stops the scrape task for `uid` (a silent no-op if it is not
    /// tracked) and evicts the node's and its last-seen pods' store slots.
    /// Returns only once the task has acknowledged cancellation.
    pub async fn delete_node_scraper(&self, uid: &str, node_name: &str) {
        let state = {
            let mut nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
            nodes.remove(uid)
        };
        let Some(state) = state else {
            debug!("delete_node_scraper: {node_name} was not tracked");
            return;
        };

        let _ = state.cancel.send(());
        let _ = state.handle.await;

        self.store.discard_node(node_name);
        let pod_keys = state.last_pod_keys.lock().unwrap_or_else(|e| e.into_inner()).clone();
        self.store.discard_pods(&pod_keys);
        self.metrics.forget(node_name);
        info!("stopped scraper for node {node_name}");
    }
}

#[allow(clippy::too_many_arguments)]
async fn scrape_loop(
    client: Arc<dyn NodeAgentClient>,
    store: Arc<Store>,
    config: Config,
    metrics: Arc<ScrapeMetrics>,
    last_tick: Arc<RwLock<Instant>>,
    node: NodeTarget,
    mut cancel_rx: oneshot::Receiver<()>,
    last_pod_keys: Arc<Mutex<Vec<PodKey>>>,
) {
    // `interval`'s first tick resolves immediately, giving us the
    // immediate-bootstrap-scrape behaviour without a separate code path.
    let mut ticker = tokio::time::interval(config.metric_resolution);

    loop {
        tokio::select! {
            _ = &mut cancel_rx => break,
            _ = ticker.tick() => {}
        }

        *last_tick.write().unwrap_or_else(|e| e.into_inner()) = Instant::now();

        match tokio::time::timeout(config.scrape_timeout, client.get_metrics(&node)).await {
            Ok(Ok(batch)) => {
                let keys: Vec<PodKey> = batch.pods.keys().cloned().collect();
                *last_pod_keys.lock().unwrap_or_else(|e| e.into_inner()) = keys;
                store.store(batch);
                metrics.record_success(&node.name);
            }
            Ok(Err(e)) => {
                warn!("scrape of {} failed: {e}", node.name);
                metrics.record_failure(&node.name);
            }
            Err(_elapsed) => {
                warn!("scrape of {} timed out after {:?}", node.name, config.scrape_timeout);
                metrics.record_failure(&node.name);
            }
        }
    }
}
