use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::core::v1::{Container, Node, NodeAddress, NodeStatus, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::runtime::{reflector, watcher};

use metrics_aggregator::api::MetricsSurface;
use metrics_aggregator::store::scaled::ScaledNanos;
use metrics_aggregator::store::{MetricsBatch, MetricsPoint, RateWindow, Store};

fn node_with_labels(name: &str, labels: &[(&str, &str)]) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            uid: Some(format!("{name}-uid")),
            labels: Some(labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
            creation_timestamp: Some(Time(Utc::now())),
            ..Default::default()
        },
        status: Some(NodeStatus {
            addresses: Some(vec![NodeAddress { type_: "Hostname".to_string(), address: name.to_string() }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod_in_namespace(namespace: &str, name: &str, labels: &[(&str, &str)]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("{name}-uid")),
            labels: Some(labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
            creation_timestamp: Some(Time(Utc::now())),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container { name: "c1".to_string(), ..Default::default() }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn point(secs: i64, cpu_ns: u64) -> MetricsPoint {
    MetricsPoint {
        timestamp: Utc::now() + chrono::Duration::seconds(secs),
        cumulative_cpu: ScaledNanos::from_raw(cpu_ns),
        memory_working_set_bytes: 200 * 1024 * 1024,
        start_time: Utc::now(),
    }
}

#[test]
fn list_and_get_project_stored_rates_for_known_nodes() {
    let (nodes_reader, mut nodes_writer) = reflector::store();
    let (pods_reader, _pods_writer) = reflector::store::<Pod>();
    nodes_writer.apply_watcher_event(&watcher::Event::Applied(node_with_labels("n1", &[("tier", "worker")])));

    let store = Arc::new(Store::new(RateWindow::for_resolution(Duration::from_secs(10))));
    store.store(MetricsBatch { node: Some(("n1".to_string(), point(0, 1_000_000_000))), pods: Default::default() });
    store.store(MetricsBatch { node: Some(("n1".to_string(), point(10, 1_500_000_000))), pods: Default::default() });

    let surface = MetricsSurface::new(nodes_reader, pods_reader, store);

    let list = surface.list_node_metrics(None);
    assert_eq!(list.items.len(), 1);
    assert_eq!(list.items[0].usage.cpu, "50m");
    assert_eq!(list.items[0].usage.memory, "200Mi");

    let single = surface.get_node_metrics("n1").expect("n1 has a rate");
    assert_eq!(single.metadata.name, "n1");
}

#[test]
fn unknown_node_get_is_reported_as_not_found() {
    let (nodes_reader, _w) = reflector::store::<Node>();
    let (pods_reader, _pw) = reflector::store::<Pod>();
    let store = Arc::new(Store::new(RateWindow::for_resolution(Duration::from_secs(10))));
    let surface = MetricsSurface::new(nodes_reader, pods_reader, store);

    let err = surface.get_node_metrics("ghost").unwrap_err();
    assert!(matches!(err, metrics_aggregator::error::Error::EntityUnknown { .. }));
}

#[test]
fn known_node_without_a_rate_yet_is_not_ready() {
    let (nodes_reader, mut nodes_writer) = reflector::store();
    let (pods_reader, _pw) = reflector::store::<Pod>();
    nodes_writer.apply_watcher_event(&watcher::Event::Applied(node_with_labels("n1", &[])));

    let store = Arc::new(Store::new(RateWindow::for_resolution(Duration::from_secs(10))));
    store.store(MetricsBatch { node: Some(("n1".to_string(), point(0, 1))), pods: Default::default() });

    let surface = MetricsSurface::new(nodes_reader, pods_reader, store);
    let err = surface.get_node_metrics("n1").unwrap_err();
    assert!(matches!(err, metrics_aggregator::error::Error::NotReadyYet { .. }));
}

#[test]
fn label_selector_matching_nothing_returns_an_empty_list_not_an_error() {
    let (nodes_reader, mut nodes_writer) = reflector::store();
    let (pods_reader, _pw) = reflector::store::<Pod>();
    nodes_writer.apply_watcher_event(&watcher::Event::Applied(node_with_labels("n1", &[("tier", "worker")])));

    let store = Arc::new(Store::new(RateWindow::for_resolution(Duration::from_secs(10))));
    store.store(MetricsBatch { node: Some(("n1".to_string(), point(0, 1_000_000_000))), pods: Default::default() });
    store.store(MetricsBatch { node: Some(("n1".to_string(), point(10, 2_000_000_000))), pods: Default::default() });

    let surface = MetricsSurface::new(nodes_reader, pods_reader, store);
    let list = surface.list_node_metrics(Some("tier=control-plane"));
    assert!(list.items.is_empty());
}

#[test]
fn pod_list_is_sorted_by_namespace_then_name() {
    let (nodes_reader, _w) = reflector::store::<Node>();
    let (pods_reader, mut pods_writer) = reflector::store();
    pods_writer.apply_watcher_event(&watcher::Event::Applied(pod_in_namespace("zeta", "a", &[])));
    pods_writer.apply_watcher_event(&watcher::Event::Applied(pod_in_namespace("alpha", "b", &[])));

    let store = Arc::new(Store::new(RateWindow::for_resolution(Duration::from_secs(10))));
    for (ns, name) in [("zeta", "a"), ("alpha", "b")] {
        let mut pod_containers = std::collections::HashMap::new();
        pod_containers.insert("c1".to_string(), point(0, 1_000_000_000));
        store.store(MetricsBatch {
            node: Some(("n1".to_string(), point(0, 1))),
            pods: std::collections::HashMap::from([(
                (ns.to_string(), name.to_string()),
                metrics_aggregator::store::PodMetricsPoint {
                    namespace: ns.to_string(),
                    name: name.to_string(),
                    containers: pod_containers,
                },
            )]),
        });
        let mut pod_containers = std::collections::HashMap::new();
        pod_containers.insert("c1".to_string(), point(10, 1_500_000_000));
        store.store(MetricsBatch {
            node: Some(("n1".to_string(), point(10, 2_000_000_000))),
            pods: std::collections::HashMap::from([(
                (ns.to_string(), name.to_string()),
                metrics_aggregator::store::PodMetricsPoint {
                    namespace: ns.to_string(),
                    name: name.to_string(),
                    containers: pod_containers,
                },
            )]),
        });
    }

    let surface = MetricsSurface::new(nodes_reader, pods_reader, store);
    let list = surface.list_pod_metrics(None, None);
    let names: Vec<(Option<String>, String)> =
        list.items.iter().map(|p| (p.metadata.namespace.clone(), p.metadata.name.clone())).collect();
    assert_eq!(
        names,
        vec![(Some("alpha".to_string()), "b".to_string()), (Some("zeta".to_string()), "a".to_string())]
    );
}
