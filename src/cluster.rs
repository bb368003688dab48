use k8s_openapi::api::core::v1::Node;
use std::sync::Arc;
use tracing::warn;

use crate::client::{Connection, LabelSelector};
use crate::error::Result;
use crate::metrics::{ClusterMetrics, MetricsSnapshot, cluster_load};
use crate::model::{NA_VALUE, ResourceKind};

pub struct ClusterInfo {
    conn: Arc<dyn Connection>,
}

fn or_na(value: Result<String>) -> String {
    value.unwrap_or_else(|_| NA_VALUE.to_string())
}

impl ClusterInfo {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self { conn }
    }

    pub async fn version(&self) -> String {
        or_na(self.conn.server_version().await)
    }

    pub fn context_name(&self) -> String {
        or_na(self.conn.context_name())
    }

    pub fn cluster_name(&self) -> String {
        or_na(self.conn.cluster_name())
    }

    pub fn user_name(&self) -> String {
        or_na(self.conn.user_name())
    }

    /// Cluster-wide utilization, or `None` when no metrics server answers.
    pub async fn metrics(&self) -> Option<ClusterMetrics> {
        if !self.conn.has_metrics() {
            return None;
        }
        let gvr = ResourceKind::Nodes.gvr()?;
        let nodes = match self.conn.list(&gvr, None, &LabelSelector::everything()).await {
            Ok(nodes) => nodes,
            Err(error) => {
                warn!("unable to list nodes for cluster load: {error}");
                return None;
            }
        };
        let node_metrics = match self.conn.fetch_node_metrics().await {
            Ok(metrics) => metrics,
            Err(error) => {
                warn!("unable to fetch node metrics: {error}");
                return None;
            }
        };

        let nodes = nodes
            .into_iter()
            .filter_map(|raw| serde_json::from_value::<Node>(raw).ok())
            .collect::<Vec<_>>();
        Some(cluster_load(
            &nodes,
            &MetricsSnapshot::with_nodes(&node_metrics),
        ))
    }
}
