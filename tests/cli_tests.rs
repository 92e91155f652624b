use clap::Parser;
use metrics_aggregator::address::AddressType;
use metrics_aggregator::config::{Args, Config};

#[test]
fn defaults_parse_and_validate() {
    let args = Args::try_parse_from(["metrics-aggregator"]).unwrap();
    let config = Config::from_args(args).expect("defaults should validate");
    assert_eq!(config.kubelet_port, 10250);
    assert!(!config.kubelet_use_node_status_port);
}

#[test]
fn custom_resolution_and_port_are_honoured() {
    let args = Args::try_parse_from([
        "metrics-aggregator",
        "--metric-resolution",
        "30s",
        "--kubelet-port",
        "10255",
        "--kubelet-use-node-status-port",
    ])
    .unwrap();
    let config = Config::from_args(args).unwrap();
    assert_eq!(config.metric_resolution, std::time::Duration::from_secs(30));
    assert_eq!(config.kubelet_port, 10255);
    assert!(config.kubelet_use_node_status_port);
    // Scrape timeout must stay strictly below the resolution.
    assert!(config.scrape_timeout < config.metric_resolution);
}

#[test]
fn custom_address_priority_is_parsed_in_order() {
    let args = Args::try_parse_from([
        "metrics-aggregator",
        "--kubelet-preferred-address-types",
        "ExternalIP,Hostname",
    ])
    .unwrap();
    let config = Config::from_args(args).unwrap();
    assert_eq!(config.address_priority, vec![AddressType::ExternalIp, AddressType::Hostname]);
}

#[test]
fn completely_insecure_and_client_cert_are_rejected_together() {
    let args = Args::try_parse_from([
        "metrics-aggregator",
        "--deprecated-kubelet-completely-insecure",
        "--kubelet-client-certificate",
        "/cert.pem",
        "--kubelet-client-key",
        "/key.pem",
    ])
    .unwrap();
    let errors = Config::from_args(args).unwrap_err();
    assert!(errors.iter().any(|e| e.contains("mutually exclusive")));
}

#[test]
fn unknown_address_type_is_reported() {
    let args = Args::try_parse_from([
        "metrics-aggregator",
        "--kubelet-preferred-address-types",
        "Hostname,Bogus",
    ])
    .unwrap();
    let errors = Config::from_args(args).unwrap_err();
    assert!(errors.iter().any(|e| e.contains("Bogus")));
}
