mod benchmark;
mod generic;
mod node;
mod pod;
mod resource;
mod service;
mod workload;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use benchmark::BenchmarkAccessor;
pub use generic::GenericAccessor;
pub use node::NodeAccessor;
pub use pod::PodAccessor;
pub use resource::Resource;
pub use service::ServiceAccessor;
pub use workload::WorkloadAccessor;

use crate::client::{Connection, LabelSelector, LogOptions, meta_str};
use crate::error::{Result, SkiffError};
use crate::model::{NamespaceScope, ResourceKind, fqn};
use crate::render::Object;

#[derive(Debug, Clone, Default)]
pub struct ResourceContext {
    pub labels: Option<String>,
    pub dir: Option<PathBuf>,
    pub cancel: CancellationToken,
}

impl ResourceContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Self::default()
        }
    }

    pub fn with_labels(mut self, labels: impl Into<String>) -> Self {
        self.labels = Some(labels.into());
        self
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Selector from the context labels. Unparseable text selects everything.
    pub fn selector(&self) -> LabelSelector {
        self.labels
            .as_deref()
            .and_then(LabelSelector::parse)
            .unwrap_or_default()
    }
}

#[async_trait]
pub trait Accessor: Send + Sync {
    async fn list(&self, ctx: &ResourceContext, scope: &NamespaceScope) -> Result<Vec<Object>>;

    async fn get(&self, ctx: &ResourceContext, path: &str) -> Result<Object>;

    fn as_nuker(&self) -> Option<&dyn Nuker> {
        None
    }

    fn as_describer(&self) -> Option<&dyn Describer> {
        None
    }

    fn as_loggable(&self) -> Option<&dyn Loggable> {
        None
    }
}

#[async_trait]
pub trait Nuker: Send + Sync {
    async fn delete(&self, path: &str, cascade: bool, force: bool) -> Result<()>;
}

#[async_trait]
pub trait Describer: Send + Sync {
    async fn describe(&self, path: &str) -> Result<String>;

    async fn to_yaml(&self, path: &str) -> Result<String>;
}

#[async_trait]
pub trait Loggable: Send + Sync {
    async fn tail_logs(
        &self,
        ctx: &ResourceContext,
        sink: mpsc::Sender<String>,
        opts: LogOptions,
    ) -> Result<()>;
}

pub fn accessor_for(kind: &ResourceKind, conn: Arc<dyn Connection>) -> Option<Arc<dyn Accessor>> {
    let accessor: Arc<dyn Accessor> = match kind {
        ResourceKind::Pods => Arc::new(PodAccessor::new(conn)),
        ResourceKind::Nodes => Arc::new(NodeAccessor::new(conn)),
        ResourceKind::Services => Arc::new(ServiceAccessor::new(conn)),
        ResourceKind::Benchmarks => Arc::new(BenchmarkAccessor),
        ResourceKind::Deployments => {
            let inner = Resource::new(kind.gvr()?, conn.clone());
            Arc::new(WorkloadAccessor::new(inner, kind.gvr()?, conn))
        }
        ResourceKind::StatefulSets | ResourceKind::DaemonSets | ResourceKind::Jobs => {
            let inner = GenericAccessor::new(kind.gvr()?, conn.clone());
            Arc::new(WorkloadAccessor::new(inner, kind.gvr()?, conn))
        }
        ResourceKind::PersistentVolumes => Arc::new(Resource::new(kind.gvr()?, conn)),
        ResourceKind::ConfigMaps
        | ResourceKind::Secrets
        | ResourceKind::Namespaces
        | ResourceKind::Custom(_) => Arc::new(GenericAccessor::new(kind.gvr()?, conn)),
    };
    Some(accessor)
}

pub(crate) fn describe_object(object: &Value) -> Result<String> {
    let mut out = String::new();
    let meta = object
        .get("metadata")
        .ok_or_else(|| SkiffError::type_error("no metadata found on resource"))?;
    let line = |out: &mut String, key: &str, value: &str| {
        out.push_str(&format!("{:<14}{value}\n", format!("{key}:")));
    };

    line(&mut out, "Name", meta_str(object, "name").unwrap_or_default());
    if let Some(namespace) = meta_str(object, "namespace") {
        line(&mut out, "Namespace", namespace);
    }
    if let Some(kind) = object.get("kind").and_then(Value::as_str) {
        line(&mut out, "Kind", kind);
    }
    for (key, title) in [("labels", "Labels"), ("annotations", "Annotations")] {
        let entries: BTreeMap<String, String> = meta
            .get(key)
            .and_then(|map| serde_json::from_value(map.clone()).ok())
            .unwrap_or_default();
        let rendered = if entries.is_empty() {
            "<none>".to_string()
        } else {
            entries
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        line(&mut out, title, &rendered);
    }
    if let Some(created) = meta_str(object, "creationTimestamp") {
        line(&mut out, "Created", created);
    }
    if let Some(status) = object.get("status").filter(|status| !status.is_null()) {
        out.push_str("Status:\n");
        let yaml = serde_yaml::to_string(status)?;
        for status_line in yaml.lines() {
            out.push_str("  ");
            out.push_str(status_line);
            out.push('\n');
        }
    }
    Ok(out)
}

/// Streams logs for every pod matching `selector` in `namespace` until the
/// streams end or the context is cancelled.
pub(crate) async fn pod_logs(
    conn: Arc<dyn Connection>,
    ctx: &ResourceContext,
    sink: mpsc::Sender<String>,
    namespace: &str,
    selector: &BTreeMap<String, String>,
    opts: LogOptions,
) -> Result<()> {
    let Some(gvr) = ResourceKind::Pods.gvr() else {
        return Ok(());
    };
    let pods = conn
        .list(&gvr, Some(namespace), &LabelSelector::from_map(selector))
        .await?;
    if pods.is_empty() {
        return Err(SkiffError::Stream {
            path: opts.path.clone(),
            details: "no matching pods".to_string(),
        });
    }

    let prefixed = pods.len() > 1;
    let mut tails = JoinSet::new();
    for pod in &pods {
        let name = meta_str(pod, "name").unwrap_or_default().to_string();
        debug!("tailing logs for {}", fqn(namespace, &name));
        let prefix = prefixed.then(|| name.clone());
        tails.spawn(tail_pod(
            conn.clone(),
            ctx.cancel.clone(),
            sink.clone(),
            namespace.to_string(),
            name,
            prefix,
            opts.clone(),
        ));
    }

    let mut first_error = None;
    while let Some(joined) = tails.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                warn!("log tail failed: {error}");
                first_error.get_or_insert(error);
            }
            Err(error) => warn!("log tail task aborted: {error}"),
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Forwards one pod's log lines into `sink`, abandoning pending sends as soon
/// as `cancel` fires.
pub(crate) async fn tail_pod(
    conn: Arc<dyn Connection>,
    cancel: CancellationToken,
    sink: mpsc::Sender<String>,
    namespace: String,
    pod: String,
    prefix: Option<String>,
    opts: LogOptions,
) -> Result<()> {
    let mut stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(()),
        stream = conn.stream_logs(&namespace, &pod, &opts) => stream?,
    };

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            line = stream.next() => line,
        };
        let line = match line {
            Some(Ok(line)) => line,
            Some(Err(error)) => return Err(error),
            None => return Ok(()),
        };
        let line = match prefix.as_deref() {
            Some(prefix) => format!("{prefix} {line}"),
            None => line,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            sent = sink.send(line) => {
                if sent.is_err() {
                    return Ok(());
                }
            }
        }
    }
}
