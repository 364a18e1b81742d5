//! Cluster access for the CLI

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use scaler_lib::cluster::{ClusterStore, KubeClusterStore, MetricsApiSource, PodMetricsSource};
use std::sync::Arc;

use crate::config::kubeconfig_path;

/// Cluster collaborators a scaler is built with
pub struct ClusterClients {
    pub store: Arc<dyn ClusterStore>,
    pub metrics: Arc<dyn PodMetricsSource>,
}

impl ClusterClients {
    /// Connect using the kubeconfig at `override_path`, `KUBECONFIG` or
    /// `~/.kube/config`, falling back to in-cluster configuration when no
    /// file exists and none was requested explicitly
    pub async fn connect(override_path: Option<&str>) -> Result<Self> {
        let client = kube_client(override_path).await?;

        Ok(Self {
            store: Arc::new(KubeClusterStore::new(client.clone())),
            metrics: Arc::new(MetricsApiSource::new(client)),
        })
    }
}

async fn kube_client(override_path: Option<&str>) -> Result<Client> {
    let path = kubeconfig_path(override_path)?;

    if override_path.is_none() && !path.exists() {
        return Client::try_default()
            .await
            .context("Failed to create in-cluster Kubernetes client");
    }

    let kubeconfig = Kubeconfig::read_from(&path)
        .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .context("Invalid kubeconfig")?;

    Client::try_from(config).context("Failed to create Kubernetes client")
}
