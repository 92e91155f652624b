use anyhow::Result;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::{Api, Client, Config};

/// Thin wrapper around the cluster client. Node/Pod listing for the API
/// surface goes through the reflector-backed caches in
/// [`crate::k8s::informers`]; this struct exists to hand out a `Client`
/// built once from the resolved kubeconfig, and the raw `Config` so the
/// node-agent client can reuse the same credentials (bearer token, CA)
/// it would use against the API server by default.
#[derive(Clone)]
pub struct K8sClient {
    client: Client,
    config: Config,
}

impl K8sClient {
    pub async fn new(kubeconfig: Option<&str>) -> Result<Self> {
        if let Some(path) = kubeconfig {
            std::env::set_var("KUBECONFIG", path);
        }
        let config = Config::infer().await?;
        let client = Client::try_from(config.clone())?;
        Ok(Self { client, config })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    pub fn pods(&self, namespace: Option<&str>) -> Api<Pod> {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}
