use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::{Accessor, Describer, Nuker, Resource, ResourceContext};
use crate::client::{Connection, meta_str};
use crate::error::Result;
use crate::metrics::MetricsSnapshot;
use crate::model::{Gvr, NamespaceScope, ResourceKind};
use crate::render::{NodeWithMetrics, Object};

pub struct NodeAccessor {
    resource: Resource,
}

impl NodeAccessor {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        let gvr = ResourceKind::Nodes
            .gvr()
            .unwrap_or_else(|| Gvr::new("", "v1", "Node", "nodes", false));
        Self {
            resource: Resource::new(gvr, conn),
        }
    }
}

#[async_trait]
impl Accessor for NodeAccessor {
    async fn list(&self, ctx: &ResourceContext, _scope: &NamespaceScope) -> Result<Vec<Object>> {
        let nodes = self
            .resource
            .list_raw(ctx, &NamespaceScope::Cluster)
            .await?;
        let conn = self.resource.connection();
        let snapshot = if conn.has_metrics() {
            match conn.fetch_node_metrics().await {
                Ok(items) => MetricsSnapshot::with_nodes(&items),
                Err(error) => {
                    warn!("node metrics unavailable: {error}");
                    MetricsSnapshot::default()
                }
            }
        } else {
            MetricsSnapshot::default()
        };

        Ok(nodes
            .into_iter()
            .map(|raw| {
                let metrics = snapshot.node(meta_str(&raw, "name").unwrap_or_default());
                Object::Node(NodeWithMetrics { raw, metrics })
            })
            .collect())
    }

    async fn get(&self, _ctx: &ResourceContext, path: &str) -> Result<Object> {
        let raw = self.resource.get_raw(path).await?;
        Ok(Object::Node(NodeWithMetrics { raw, metrics: None }))
    }

    fn as_nuker(&self) -> Option<&dyn Nuker> {
        Some(&self.resource)
    }

    fn as_describer(&self) -> Option<&dyn Describer> {
        Some(&self.resource)
    }
}

#[cfg(test)]
mod tests {
    use super::NodeAccessor;
    use crate::client::fake::FakeConnection;
    use crate::dao::{Accessor, ResourceContext};
    use crate::model::NamespaceScope;
    use crate::render::Object;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn joins_node_metrics_by_name() {
        let fake = FakeConnection {
            metrics: true,
            node_metrics: vec![json!({"metadata": {"name": "n1"}, "usage": {"cpu": "1", "memory": "1Gi"}})],
            ..FakeConnection::default()
        };
        fake.set_objects(
            "nodes",
            vec![json!({"metadata": {"name": "n1"}}), json!({"metadata": {"name": "n2"}})],
        );
        let accessor = NodeAccessor::new(Arc::new(fake));
        let objects = accessor
            .list(
                &ResourceContext::default(),
                &NamespaceScope::Named("ignored".to_string()),
            )
            .await
            .expect("list");

        let metrics = objects
            .iter()
            .map(|object| match object {
                Object::Node(node) => node.metrics.map(|m| m.cpu_millis),
                other => panic!("unexpected {}", other.type_name()),
            })
            .collect::<Vec<_>>();
        assert_eq!(metrics, vec![Some(1000), None]);
    }
}
