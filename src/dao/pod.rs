use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use super::{Accessor, Describer, Loggable, Nuker, Resource, ResourceContext, tail_pod};
use crate::client::{Connection, LogOptions, meta_str};
use crate::error::Result;
use crate::metrics::MetricsSnapshot;
use crate::model::{Gvr, NamespaceScope, ResourceKind, fqn, namespaced};
use crate::render::{Object, PodWithMetrics};

pub struct PodAccessor {
    resource: Resource,
}

impl PodAccessor {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        let gvr = ResourceKind::Pods
            .gvr()
            .unwrap_or_else(|| Gvr::new("", "v1", "Pod", "pods", true));
        Self {
            resource: Resource::new(gvr, conn),
        }
    }

    async fn metrics(&self, scope: &NamespaceScope) -> MetricsSnapshot {
        let conn = self.resource.connection();
        if !conn.has_metrics() {
            return MetricsSnapshot::default();
        }
        match conn.fetch_pod_metrics(scope.namespace()).await {
            Ok(items) => MetricsSnapshot::with_pods(&items),
            Err(error) => {
                warn!("pod metrics unavailable: {error}");
                MetricsSnapshot::default()
            }
        }
    }
}

#[async_trait]
impl Accessor for PodAccessor {
    async fn list(&self, ctx: &ResourceContext, scope: &NamespaceScope) -> Result<Vec<Object>> {
        let pods = self.resource.list_raw(ctx, scope).await?;
        let snapshot = self.metrics(scope).await;
        Ok(pods
            .into_iter()
            .map(|raw| {
                let path = fqn(
                    meta_str(&raw, "namespace").unwrap_or_default(),
                    meta_str(&raw, "name").unwrap_or_default(),
                );
                Object::Pod(PodWithMetrics {
                    metrics: snapshot.pod(&path),
                    raw,
                })
            })
            .collect())
    }

    async fn get(&self, _ctx: &ResourceContext, path: &str) -> Result<Object> {
        let raw = self.resource.get_raw(path).await?;
        Ok(Object::Pod(PodWithMetrics { raw, metrics: None }))
    }

    fn as_nuker(&self) -> Option<&dyn Nuker> {
        Some(&self.resource)
    }

    fn as_describer(&self) -> Option<&dyn Describer> {
        Some(&self.resource)
    }

    fn as_loggable(&self) -> Option<&dyn Loggable> {
        Some(self)
    }
}

#[async_trait]
impl Loggable for PodAccessor {
    async fn tail_logs(
        &self,
        ctx: &ResourceContext,
        sink: mpsc::Sender<String>,
        opts: LogOptions,
    ) -> Result<()> {
        let (namespace, name) = namespaced(&opts.path);
        let (namespace, name) = (namespace.to_string(), name.to_string());
        tail_pod(
            self.resource.connection().clone(),
            ctx.cancel.clone(),
            sink,
            namespace,
            name,
            None,
            opts,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::PodAccessor;
    use crate::client::LogOptions;
    use crate::client::fake::FakeConnection;
    use crate::dao::{Accessor, ResourceContext};
    use crate::metrics::PodMetrics;
    use crate::model::NamespaceScope;
    use crate::render::Object;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn fake(metrics: bool) -> FakeConnection {
        let fake = FakeConnection {
            metrics,
            pod_metrics: vec![json!({
                "metadata": {"name": "web", "namespace": "default"},
                "containers": [{"name": "app", "usage": {"cpu": "25m", "memory": "32Mi"}}]
            })],
            logs: HashMap::from([(
                "default/web".to_string(),
                vec!["line 1".to_string(), "line 2".to_string()],
            )]),
            ..FakeConnection::default()
        };
        fake.set_objects(
            "pods",
            vec![
                json!({"metadata": {"name": "web", "namespace": "default"}}),
                json!({"metadata": {"name": "db", "namespace": "default"}}),
            ],
        );
        fake
    }

    fn metrics_of(objects: &[Object]) -> Vec<Option<PodMetrics>> {
        objects
            .iter()
            .map(|object| match object {
                Object::Pod(pod) => pod.metrics,
                other => panic!("unexpected {}", other.type_name()),
            })
            .collect()
    }

    #[tokio::test]
    async fn attaches_metrics_when_available() {
        let accessor = PodAccessor::new(Arc::new(fake(true)));
        let objects = accessor
            .list(&ResourceContext::default(), &NamespaceScope::All)
            .await
            .expect("list");
        assert_eq!(
            metrics_of(&objects),
            vec![
                Some(PodMetrics {
                    cpu_millis: 25,
                    mem_bytes: 32 * 1024 * 1024
                }),
                None
            ]
        );
    }

    #[tokio::test]
    async fn metrics_gate_is_respected() {
        let accessor = PodAccessor::new(Arc::new(fake(false)));
        let objects = accessor
            .list(&ResourceContext::default(), &NamespaceScope::All)
            .await
            .expect("list");
        assert_eq!(metrics_of(&objects), vec![None, None]);
    }

    #[tokio::test]
    async fn tails_a_single_pod() {
        let accessor = PodAccessor::new(Arc::new(fake(false)));
        let (tx, mut rx) = mpsc::channel(8);
        let opts = LogOptions {
            path: "default/web".to_string(),
            ..LogOptions::default()
        };
        accessor
            .as_loggable()
            .expect("loggable")
            .tail_logs(&ResourceContext::default(), tx, opts)
            .await
            .expect("tail");

        assert_eq!(rx.recv().await.as_deref(), Some("line 1"));
        assert_eq!(rx.recv().await.as_deref(), Some("line 2"));
        assert_eq!(rx.recv().await, None);
    }
}
