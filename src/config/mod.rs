//! Process configuration: CLI flags (clap, mirroring the shape of the
//! original inspection tool's `cli` module) plus the mutual-exclusion
//! validation called out in the design notes as "the entire configuration
//! surface worth validating at start".

use std::time::Duration;

use clap::Parser;

use crate::address::{default_priority, AddressType};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Cluster-wide node/pod resource-usage aggregator", long_about = None)]
pub struct Args {
    /// Scrape period; must exceed the scrape timeout.
    #[arg(long = "metric-resolution", value_parser = humantime_secs, default_value = "15s")]
    pub metric_resolution: Duration,

    /// Default node-agent port, used unless the node reports its own.
    #[arg(long = "kubelet-port", default_value_t = 10250)]
    pub kubelet_port: u16,

    /// Prefer the port the node status reports over `kubelet-port`.
    #[arg(long = "kubelet-use-node-status-port", default_value_t = false)]
    pub kubelet_use_node_status_port: bool,

    /// Ordered list of address types the Address Resolver accepts.
    #[arg(
        long = "kubelet-preferred-address-types",
        value_delimiter = ',',
        default_value = "Hostname,InternalDNS,InternalIP,ExternalDNS,ExternalIP"
    )]
    pub kubelet_preferred_address_types: Vec<String>,

    /// CA file used to validate the node agent's TLS certificate.
    #[arg(long = "kubelet-certificate-authority")]
    pub kubelet_certificate_authority: Option<String>,

    /// Skip CA validation of the node agent's certificate.
    #[arg(long = "kubelet-insecure-tls", default_value_t = false)]
    pub kubelet_insecure_tls: bool,

    /// Client certificate for mTLS against the node agent.
    #[arg(long = "kubelet-client-certificate")]
    pub kubelet_client_certificate: Option<String>,

    /// Client key paired with `kubelet-client-certificate`.
    #[arg(long = "kubelet-client-key")]
    pub kubelet_client_key: Option<String>,

    /// Plain HTTP, no authentication. Mutually exclusive with every TLS option.
    #[arg(long = "deprecated-kubelet-completely-insecure", default_value_t = false)]
    pub deprecated_kubelet_completely_insecure: bool,

    /// Kubeconfig file to source cluster client config from (default: in-cluster).
    #[arg(long)]
    pub kubeconfig: Option<String>,

    /// Address to bind the health/metrics HTTP surface to.
    #[arg(long = "bind-address", default_value = "0.0.0.0:4443")]
    pub bind_address: String,
}

fn humantime_secs(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let (digits, suffix) = raw.split_at(raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len()));
    let n: u64 = digits.parse().map_err(|_| format!("not a duration: {raw}"))?;
    match suffix {
        "s" | "" => Ok(Duration::from_secs(n)),
        "m" => Ok(Duration::from_secs(n * 60)),
        "ms" => Ok(Duration::from_millis(n)),
        other => Err(format!("unknown duration suffix {other:?}")),
    }
}

/// Resolved, validated configuration. Built once at start-up and treated
/// as immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct Config {
    pub metric_resolution: Duration,
    pub scrape_timeout: Duration,
    pub kubelet_port: u16,
    pub kubelet_use_node_status_port: bool,
    pub address_priority: Vec<AddressType>,
    pub tls: TlsMode,
    pub kubeconfig: Option<String>,
    pub bind_address: String,
}

#[derive(Debug, Clone)]
pub enum TlsMode {
    /// Normal case: HTTPS, bearer token from the cluster client config,
    /// optional CA override, optional client cert/key, optional insecure flag.
    Https {
        ca_file: Option<String>,
        insecure_skip_verify: bool,
        client_cert: Option<(String, String)>,
    },
    /// `deprecated-kubelet-completely-insecure`: plain HTTP, no auth at all.
    CompletelyInsecure,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self, Vec<String>> {
        let mut errors = Vec::new();

        if args.metric_resolution.is_zero() {
            errors.push("metric-resolution must be greater than zero".to_string());
        }
        // Scrape timeout is derived, not independently configurable, so it is
        // always strictly less than the resolution by construction.
        let scrape_timeout = args.metric_resolution.mul_f64(0.9);

        let any_tls_override = args.kubelet_certificate_authority.is_some()
            || args.kubelet_insecure_tls
            || args.kubelet_client_certificate.is_some()
            || args.kubelet_client_key.is_some();
        if args.deprecated_kubelet_completely_insecure && any_tls_override {
            errors.push(
                "deprecated-kubelet-completely-insecure is mutually exclusive with every TLS option"
                    .to_string(),
            );
        }
        if args.kubelet_certificate_authority.is_some() && args.kubelet_insecure_tls {
            errors.push(
                "kubelet-certificate-authority and kubelet-insecure-tls are mutually exclusive"
                    .to_string(),
            );
        }
        let client_cert_given = args.kubelet_client_certificate.is_some();
        let client_key_given = args.kubelet_client_key.is_some();
        if client_cert_given != client_key_given {
            errors.push(
                "kubelet-client-certificate and kubelet-client-key must be given together"
                    .to_string(),
            );
        }

        let mut address_priority = Vec::new();
        for raw in &args.kubelet_preferred_address_types {
            match raw.trim() {
                "Hostname" => address_priority.push(AddressType::Hostname),
                "InternalDNS" => address_priority.push(AddressType::InternalDns),
                "InternalIP" => address_priority.push(AddressType::InternalIp),
                "ExternalDNS" => address_priority.push(AddressType::ExternalDns),
                "ExternalIP" => address_priority.push(AddressType::ExternalIp),
                other => errors.push(format!("unknown address type {other:?}")),
            }
        }
        if address_priority.is_empty() && errors.is_empty() {
            address_priority = default_priority();
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let tls = if args.deprecated_kubelet_completely_insecure {
            TlsMode::CompletelyInsecure
        } else {
            TlsMode::Https {
                ca_file: args.kubelet_certificate_authority,
                insecure_skip_verify: args.kubelet_insecure_tls,
                client_cert: client_cert_given
                    .then(|| (args.kubelet_client_certificate.unwrap(), args.kubelet_client_key.unwrap())),
            }
        };

        Ok(Config {
            metric_resolution: args.metric_resolution,
            scrape_timeout,
            kubelet_port: args.kubelet_port,
            kubelet_use_node_status_port: args.kubelet_use_node_status_port,
            address_priority,
            tls,
            kubeconfig: args.kubeconfig,
            bind_address: args.bind_address,
        })
    }
}
