//! Node/Pod informer caches, kept in sync by `kube-runtime` reflectors.
//!
//! The generic watch machinery belongs to the `kube` crate, not to this
//! core: we only start the reflectors and hand out their read-only
//! `Store` handles to the Metrics API Surface (for listing/label-selector
//! filtering and pod metadata hydration), plus a channel of raw node
//! add/delete events the Scraper Manager drives its lifecycle from.

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Api, Client};
use log::error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A node appearing, changing, or disappearing from the watch.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    Applied(Node),
    Deleted(Node),
    /// The watch restarted (reconnect, resync); carries the full current
    /// node list to reconcile against.
    Restarted(Vec<Node>),
}

pub struct Informers {
    pub nodes: reflector::Store<Node>,
    pub pods: reflector::Store<Pod>,
}

impl Informers {
    /// Starts the node and pod watchers and returns the reader handles
    /// immediately; callers should wait on [`Informers::wait_for_sync`]
    /// before trusting the caches to be complete. Also returns a receiver
    /// of raw node lifecycle events for driving the Scraper Manager.
    pub fn start(client: Client) -> (Self, mpsc::UnboundedReceiver<NodeEvent>, Vec<JoinHandle<()>>) {
        let (nodes_reader, nodes_writer) = reflector::store();
        let (pods_reader, pods_writer) = reflector::store();
        let (node_events_tx, node_events_rx) = mpsc::unbounded_channel();

        let mut handles = Vec::new();

        let node_api: Api<Node> = Api::all(client.clone());
        handles.push(tokio::spawn(async move {
            let stream = watcher(node_api, watcher::Config::default())
                .default_backoff()
                .reflect(nodes_writer);
            tokio::pin!(stream);
            while let Some(result) = stream.next().await {
                match result {
                    Ok(watcher::Event::Applied(node)) => {
                        let _ = node_events_tx.send(NodeEvent::Applied(node));
                    }
                    Ok(watcher::Event::Deleted(node)) => {
                        let _ = node_events_tx.send(NodeEvent::Deleted(node));
                    }
                    Ok(watcher::Event::Restarted(nodes)) => {
                        let _ = node_events_tx.send(NodeEvent::Restarted(nodes));
                    }
                    Err(e) => error!("node watch error: {e}"),
                }
            }
        }));

        let pod_api: Api<Pod> = Api::all(client);
        handles.push(tokio::spawn(async move {
            let stream = watcher(pod_api, watcher::Config::default())
                .default_backoff()
                .reflect(pods_writer)
                .touched_objects();
            tokio::pin!(stream);
            while let Some(result) = stream.next().await {
                if let Err(e) = result {
                    error!("pod watch error: {e}");
                }
            }
        }));

        (Informers { nodes: nodes_reader, pods: pods_reader }, node_events_rx, handles)
    }

    /// Waits until both caches have observed at least one list+watch sync.
    pub async fn wait_for_sync(&self) -> anyhow::Result<()> {
        self.nodes.wait_until_ready().await?;
        self.pods.wait_until_ready().await?;
        Ok(())
    }
}
