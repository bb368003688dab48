use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{Accessor, Describer, Loggable, Nuker, Resource, ResourceContext, pod_logs};
use crate::client::{Connection, LogOptions};
use crate::error::{Result, SkiffError};
use crate::model::{Gvr, NamespaceScope, ResourceKind, namespaced};
use crate::render::Object;

/// Services own no pods themselves; their logs are those of the pods their
/// selector picks.
pub struct ServiceAccessor {
    resource: Resource,
}

impl ServiceAccessor {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        let gvr = ResourceKind::Services
            .gvr()
            .unwrap_or_else(|| Gvr::new("", "v1", "Service", "services", true));
        Self {
            resource: Resource::new(gvr, conn),
        }
    }
}

#[async_trait]
impl Accessor for ServiceAccessor {
    async fn list(&self, ctx: &ResourceContext, scope: &NamespaceScope) -> Result<Vec<Object>> {
        self.resource.list(ctx, scope).await
    }

    async fn get(&self, ctx: &ResourceContext, path: &str) -> Result<Object> {
        self.resource.get(ctx, path).await
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
impl Loggable for ServiceAccessor {
    async fn tail_logs(
        &self,
        ctx: &ResourceContext,
        sink: mpsc::Sender<String>,
        opts: LogOptions,
    ) -> Result<()> {
        let raw = self.resource.get_raw(&opts.path).await?;
        let svc: Service = serde_json::from_value(raw)
            .map_err(|error| SkiffError::type_error(format!("expecting Service resource: {error}")))?;
        let selector = svc
            .spec
            .and_then(|spec| spec.selector)
            .filter(|selector| !selector.is_empty())
            .ok_or_else(|| SkiffError::Selector {
                path: opts.path.clone(),
            })?;

        let namespace = namespaced(&opts.path).0.to_string();
        pod_logs(
            self.resource.connection().clone(),
            ctx,
            sink,
            &namespace,
            &selector,
            opts,
        )
        .await
    }
}
