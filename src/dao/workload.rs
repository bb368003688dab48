use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{Accessor, Describer, Loggable, Nuker, ResourceContext, pod_logs};
use crate::client::{Connection, LogOptions};
use crate::error::{Result, SkiffError};
use crate::model::{Gvr, NamespaceScope, namespaced};
use crate::render::Object;

/// Pod-owning controllers (deployments, stateful sets, daemon sets, jobs).
/// Listing goes through `inner`; logs come from the pods matched by the
/// controller's `spec.selector.matchLabels`.
pub struct WorkloadAccessor<A> {
    inner: A,
    gvr: Gvr,
    conn: Arc<dyn Connection>,
}

impl<A> WorkloadAccessor<A>
where
    A: Accessor,
{
    pub fn new(inner: A, gvr: Gvr, conn: Arc<dyn Connection>) -> Self {
        Self { inner, gvr, conn }
    }
}

fn match_labels(object: &Value) -> BTreeMap<String, String> {
    object
        .pointer("/spec/selector/matchLabels")
        .and_then(|labels| serde_json::from_value(labels.clone()).ok())
        .unwrap_or_default()
}

#[async_trait]
impl<A> Accessor for WorkloadAccessor<A>
where
    A: Accessor,
{
    async fn list(&self, ctx: &ResourceContext, scope: &NamespaceScope) -> Result<Vec<Object>> {
        self.inner.list(ctx, scope).await
    }

    async fn get(&self, ctx: &ResourceContext, path: &str) -> Result<Object> {
        self.inner.get(ctx, path).await
    }

    fn as_nuker(&self) -> Option<&dyn Nuker> {
        self.inner.as_nuker()
    }

    fn as_describer(&self) -> Option<&dyn Describer> {
        self.inner.as_describer()
    }

    fn as_loggable(&self) -> Option<&dyn Loggable> {
        Some(self)
    }
}

#[async_trait]
impl<A> Loggable for WorkloadAccessor<A>
where
    A: Accessor,
{
    async fn tail_logs(
        &self,
        ctx: &ResourceContext,
        sink: mpsc::Sender<String>,
        opts: LogOptions,
    ) -> Result<()> {
        let object = self.conn.get(&self.gvr, &opts.path).await?;
        let selector = match_labels(&object);
        if selector.is_empty() {
            return Err(SkiffError::Selector {
                path: opts.path.clone(),
            });
        }

        let namespace = namespaced(&opts.path).0.to_string();
        pod_logs(self.conn.clone(), ctx, sink, &namespace, &selector, opts).await
    }
}

#[cfg(test)]
mod tests {
    use super::WorkloadAccessor;
    use crate::client::LogOptions;
    use crate::client::fake::FakeConnection;
    use crate::dao::{Accessor, Resource, ResourceContext};
    use crate::model::ResourceKind;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn logs_follow_match_labels() {
        let fake = FakeConnection {
            logs: HashMap::from([("shop/api-7d9".to_string(), vec!["GET /".to_string()])]),
            ..FakeConnection::default()
        };
        fake.set_objects(
            "deployments",
            vec![json!({
                "metadata": {"name": "api", "namespace": "shop"},
                "spec": {"selector": {"matchLabels": {"app": "api"}}}
            })],
        );
        fake.set_objects(
            "pods",
            vec![json!({"metadata": {"name": "api-7d9", "namespace": "shop", "labels": {"app": "api"}}})],
        );
        let conn = Arc::new(fake);
        let gvr = ResourceKind::Deployments.gvr().expect("gvr");
        let accessor =
            WorkloadAccessor::new(Resource::new(gvr.clone(), conn.clone()), gvr, conn);

        let (tx, mut rx) = mpsc::channel(4);
        let opts = LogOptions {
            path: "shop/api".to_string(),
            ..LogOptions::default()
        };
        accessor
            .as_loggable()
            .expect("loggable")
            .tail_logs(&ResourceContext::default(), tx, opts)
            .await
            .expect("tail");
        assert_eq!(rx.recv().await.as_deref(), Some("GET /"));
        assert!(accessor.as_nuker().is_some());
    }
}
