use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use log::{info, warn};

use metrics_aggregator::agent_client::{HttpNodeAgentClient, NodeAgentClient};
use metrics_aggregator::api::server::{self, AppState};
use metrics_aggregator::api::MetricsSurface;
use metrics_aggregator::config::{Args, Config};
use metrics_aggregator::k8s::informers::{Informers, NodeEvent};
use metrics_aggregator::k8s::K8sClient;
use metrics_aggregator::scraper::{self, ScraperManager};
use metrics_aggregator::store::{RateWindow, Store};
use metrics_aggregator::utils::metrics::ScrapeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = match Config::from_args(Args::parse()) {
        Ok(config) => config,
        Err(errors) => {
            eprintln!("{}", "invalid configuration:".bright_red().bold());
            for e in &errors {
                eprintln!("  - {e}");
            }
            std::process::exit(1);
        }
    };

    println!("{}", "Cluster-wide resource-usage aggregator".bright_cyan().bold());
    println!("{}", "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".bright_cyan());
    println!("   metric resolution: {}", format!("{:?}", config.metric_resolution).bright_green());
    println!("   bind address:      {}", config.bind_address.bright_green());

    print!("connecting to cluster API... ");
    let client = K8sClient::new(config.kubeconfig.as_deref()).await?;
    println!("{}", "ok".bright_green());

    let bearer_token = HttpNodeAgentClient::bearer_token_from_kube_config(client.config());
    let agent_client: Arc<dyn NodeAgentClient> = Arc::new(HttpNodeAgentClient::new(&config, bearer_token)?);

    print!("starting informers and waiting for cache sync... ");
    let (informers, node_events, _watch_handles) = Informers::start(client.client().clone());
    informers.wait_for_sync().await?;
    println!("{}", "ok".bright_green());

    let store = Arc::new(Store::new(RateWindow::for_resolution(config.metric_resolution)));
    let scrape_metrics = Arc::new(ScrapeMetrics::new());
    let scraper_manager = Arc::new(ScraperManager::new(
        agent_client,
        store.clone(),
        config.clone(),
        scrape_metrics,
    ));

    tokio::spawn(run_node_lifecycle(
        node_events,
        scraper_manager.clone(),
        store.clone(),
        config.scrape_timeout,
    ));

    let surface = Arc::new(MetricsSurface::new(informers.nodes.clone(), informers.pods.clone(), store.clone()));
    let app_state = AppState {
        surface,
        store,
        scraper: scraper_manager,
        resolution: config.metric_resolution,
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("serving metrics.k8s.io surface on {}", config.bind_address);
    println!("{}", "ready".bright_green().bold());

    axum::serve(listener, server::router(app_state)).await?;
    Ok(())
}

/// Drives the Scraper Manager from raw node watch events: starts a
/// scraper on first sight of a node, stops it when the node disappears,
/// and reconciles the whole tracked set on a watch restart. Marks the
/// Store's first scrape cycle complete once the initial node list has
/// had a chance to complete one scrape each.
async fn run_node_lifecycle(
    mut events: tokio::sync::mpsc::UnboundedReceiver<NodeEvent>,
    scraper: Arc<ScraperManager>,
    store: Arc<Store>,
    scrape_timeout: std::time::Duration,
) {
    let mut tracked: HashMap<String, String> = HashMap::new();
    let mut first_resync_done = false;

    while let Some(event) = events.recv().await {
        match event {
            NodeEvent::Applied(node) => {
                start_if_new(&node, &scraper, &mut tracked);
            }
            NodeEvent::Deleted(node) => {
                stop_if_tracked(&node, &scraper, &mut tracked).await;
            }
            NodeEvent::Restarted(nodes) => {
                let mut seen = HashSet::new();
                for node in &nodes {
                    if let Some(target) = scraper::node_target_from(node) {
                        seen.insert(target.uid.clone());
                    }
                    start_if_new(node, &scraper, &mut tracked);
                }
                let stale: Vec<(String, String)> = tracked
                    .iter()
                    .filter(|(uid, _)| !seen.contains(*uid))
                    .map(|(uid, name)| (uid.clone(), name.clone()))
                    .collect();
                for (uid, name) in stale {
                    tracked.remove(&uid);
                    scraper.delete_node_scraper(&uid, &name).await;
                }

                if !first_resync_done {
                    first_resync_done = true;
                    let store = store.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(scrape_timeout).await;
                        store.mark_cycle_complete();
                    });
                }
            }
        }
    }
}

fn start_if_new(
    node: &k8s_openapi::api::core::v1::Node,
    scraper: &Arc<ScraperManager>,
    tracked: &mut HashMap<String, String>,
) {
    let Some(target) = scraper::node_target_from(node) else { return };
    if tracked.contains_key(&target.uid) {
        return;
    }
    let name = target.name.clone();
    let uid = target.uid.clone();
    match scraper.add_node_scraper(target) {
        Ok(()) => {
            tracked.insert(uid, name);
        }
        Err(e) => warn!("failed to start scraper for {name}: {e}"),
    }
}

async fn stop_if_tracked(
    node: &k8s_openapi::api::core::v1::Node,
    scraper: &Arc<ScraperManager>,
    tracked: &mut HashMap<String, String>,
) {
    let (Some(name), Some(uid)) = (node.metadata.name.as_ref(), node.metadata.uid.as_ref()) else { return };
    if tracked.remove(uid).is_some() {
        scraper.delete_node_scraper(uid, name).await;
    }
}
