use anyhow::Context as _;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{AsyncBufReadExt, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ListMeta;
use kube::api::{DeleteParams, ListParams, LogParams, PropagationPolicy};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind, ObjectList, Request, request};
use kube::{Api, Client, Config, Resource};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{Result, SkiffError};
use crate::model::{Gvr, namespaced};

const TABLE_ACCEPT: &str = "application/json;as=Table;v=v1;g=meta.k8s.io,application/json";
const LIST_LIMIT: u32 = 500;

/// Equality-based label selector. An empty selector selects everything.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct LabelSelector(BTreeMap<String, String>);

impl LabelSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    /// Parses `k=v,k2=v2`; returns `None` when the text is not a valid selector.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Some(Self::everything());
        }

        let mut labels = BTreeMap::new();
        for term in raw.split(',') {
            let (key, value) = term
                .split_once("==")
                .or_else(|| term.split_once('='))?;
            let key = key.trim();
            if key.is_empty() || value.contains('=') {
                return None;
            }
            labels.insert(key.to_string(), value.trim().to_string());
        }
        Some(Self(labels))
    }

    pub fn from_map(labels: &BTreeMap<String, String>) -> Self {
        Self(labels.clone())
    }

    pub fn is_everything(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.0.iter().all(|(key, value)| labels.get(key) == Some(value))
    }

    pub fn to_query(&self) -> String {
        self.0
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub path: String,
    pub container: Option<String>,
    pub tail_lines: Option<i64>,
    pub previous: bool,
    pub follow: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTable {
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default)]
    pub column_definitions: Vec<ColumnDefinition>,
    #[serde(default)]
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableRow {
    #[serde(default)]
    pub cells: Vec<Value>,
    #[serde(default)]
    pub object: Value,
}

pub type LogStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait Connection: Send + Sync {
    fn cluster_name(&self) -> Result<String>;
    fn context_name(&self) -> Result<String>;
    fn user_name(&self) -> Result<String>;
    fn current_namespace(&self) -> Result<String>;
    fn has_metrics(&self) -> bool;

    async fn server_version(&self) -> Result<String>;

    async fn list(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<Value>>;

    async fn get(&self, gvr: &Gvr, path: &str) -> Result<Value>;

    async fn delete(&self, gvr: &Gvr, path: &str, cascade: bool, force: bool) -> Result<()>;

    async fn list_table(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<ServerTable>;

    async fn stream_logs(&self, namespace: &str, pod: &str, opts: &LogOptions)
    -> Result<LogStream>;

    async fn fetch_node_metrics(&self) -> Result<Vec<Value>>;

    async fn fetch_pod_metrics(&self, namespace: Option<&str>) -> Result<Vec<Value>>;
}

#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    context: String,
    cluster: String,
    user: String,
    default_namespace: String,
    has_metrics: bool,
}

impl KubeGateway {
    pub async fn new(context: Option<String>) -> anyhow::Result<Self> {
        let kubeconfig = Kubeconfig::read().ok();

        let config = if let Some(kubeconfig_value) = kubeconfig.clone() {
            let options = KubeConfigOptions {
                context: context.clone(),
                cluster: None,
                user: None,
            };
            Config::from_custom_kubeconfig(kubeconfig_value, &options)
                .await
                .context("failed to infer Kubernetes configuration")?
        } else {
            if context.is_some() {
                anyhow::bail!("kubeconfig not found; context selection is unavailable");
            }
            Config::infer()
                .await
                .context("failed to infer Kubernetes configuration")?
        };

        let default_namespace = config.default_namespace.clone();
        let client = Client::try_from(config).context("failed to initialize Kubernetes client")?;

        let active_context = context
            .or_else(|| {
                kubeconfig
                    .as_ref()
                    .and_then(|cfg| cfg.current_context.clone())
            })
            .unwrap_or_else(|| "in-cluster".to_string());
        let named_context = kubeconfig.as_ref().and_then(|cfg| {
            cfg.contexts
                .iter()
                .find(|named| named.name == active_context)
                .and_then(|named| named.context.clone())
        });
        let cluster = named_context
            .as_ref()
            .map(|ctx| ctx.cluster.clone())
            .unwrap_or_else(|| "in-cluster".to_string());
        let user = named_context
            .and_then(|ctx| ctx.user)
            .unwrap_or_else(|| "-".to_string());

        let has_metrics = match client.list_api_groups().await {
            Ok(groups) => groups
                .groups
                .iter()
                .any(|group| group.name == "metrics.k8s.io"),
            Err(error) => {
                debug!("api group discovery failed: {error}");
                false
            }
        };

        Ok(Self {
            client,
            context: active_context,
            cluster,
            user,
            default_namespace,
            has_metrics,
        })
    }

    fn dynamic_api(&self, gvr: &Gvr, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = api_resource(gvr);
        match namespace.filter(|value| !value.is_empty()) {
            Some(namespace) if gvr.namespaced => {
                Api::namespaced_with(self.client.clone(), namespace, &resource)
            }
            _ => Api::all_with(self.client.clone(), &resource),
        }
    }

    async fn list_metrics(&self, kind: &str, plural: &str, namespace: Option<&str>) -> Result<Vec<Value>> {
        let gvr = Gvr::new("metrics.k8s.io", "v1beta1", kind, plural, plural == "pods");
        let api = self.dynamic_api(&gvr, namespace);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|error| SkiffError::access(gvr.to_string(), error))?;
        list.items
            .into_iter()
            .map(|item| serde_json::to_value(item).map_err(SkiffError::from))
            .collect()
    }
}

#[async_trait]
impl Connection for KubeGateway {
    fn cluster_name(&self) -> Result<String> {
        Ok(self.cluster.clone())
    }

    fn context_name(&self) -> Result<String> {
        Ok(self.context.clone())
    }

    fn user_name(&self) -> Result<String> {
        Ok(self.user.clone())
    }

    fn current_namespace(&self) -> Result<String> {
        Ok(self.default_namespace.clone())
    }

    fn has_metrics(&self) -> bool {
        self.has_metrics
    }

    async fn server_version(&self) -> Result<String> {
        let info = self
            .client
            .apiserver_version()
            .await
            .map_err(|error| SkiffError::access("version", error))?;
        Ok(info.git_version)
    }

    async fn list(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<Value>> {
        let api = self.dynamic_api(gvr, namespace);
        let params = list_params(selector);
        let list = collect_pages(|token| {
            let api = &api;
            let params = page_params(&params, token);
            async move {
                api.list(&params)
                    .await
                    .map_err(|error| SkiffError::access(gvr.to_string(), error))
            }
        })
        .await?;
        list.items
            .into_iter()
            .map(|item| serde_json::to_value(item).map_err(SkiffError::from))
            .collect()
    }

    async fn get(&self, gvr: &Gvr, path: &str) -> Result<Value> {
        let (namespace, name) = namespaced(path);
        let api = self.dynamic_api(gvr, Some(namespace));
        let object = api
            .get_opt(name)
            .await
            .map_err(|error| SkiffError::access(gvr.to_string(), error))?
            .ok_or_else(|| SkiffError::NotFound {
                path: path.to_string(),
            })?;
        Ok(serde_json::to_value(object)?)
    }

    async fn delete(&self, gvr: &Gvr, path: &str, cascade: bool, force: bool) -> Result<()> {
        let (namespace, name) = namespaced(path);
        let api = self.dynamic_api(gvr, Some(namespace));
        let params = DeleteParams {
            grace_period_seconds: force.then_some(0),
            propagation_policy: Some(if cascade {
                PropagationPolicy::Background
            } else {
                PropagationPolicy::Orphan
            }),
            ..DeleteParams::default()
        };
        api.delete(name, &params)
            .await
            .map_err(|error| SkiffError::Delete {
                path: path.to_string(),
                details: error.to_string(),
            })?;
        Ok(())
    }

    async fn list_table(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<ServerTable> {
        let resource = api_resource(gvr);
        let namespace = namespace.filter(|value| !value.is_empty() && gvr.namespaced);
        let url = DynamicObject::url_path(&resource, namespace);
        let params = list_params(selector);
        let client = &self.client;
        collect_pages(|token| {
            let request = table_request(&url, &page_params(&params, token));
            async move {
                let request =
                    request.map_err(|error| SkiffError::access(gvr.to_string(), error))?;
                client
                    .request::<ServerTable>(request)
                    .await
                    .map_err(|error| SkiffError::access(gvr.to_string(), error))
            }
        })
        .await
    }

    async fn stream_logs(
        &self,
        namespace: &str,
        pod: &str,
        opts: &LogOptions,
    ) -> Result<LogStream> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: opts.container.clone(),
            follow: opts.follow,
            previous: opts.previous,
            tail_lines: opts.tail_lines,
            ..LogParams::default()
        };
        let path = format!("{namespace}/{pod}");
        let reader = pods
            .log_stream(pod, &params)
            .await
            .map_err(|error| SkiffError::Stream {
                path: path.clone(),
                details: error.to_string(),
            })?;

        Ok(reader
            .lines()
            .map(move |line| {
                line.map_err(|error| SkiffError::Stream {
                    path: path.clone(),
                    details: error.to_string(),
                })
            })
            .boxed())
    }

    async fn fetch_node_metrics(&self) -> Result<Vec<Value>> {
        self.list_metrics("NodeMetrics", "nodes", None).await
    }

    async fn fetch_pod_metrics(&self, namespace: Option<&str>) -> Result<Vec<Value>> {
        self.list_metrics("PodMetrics", "pods", namespace).await
    }
}

fn api_resource(gvr: &Gvr) -> ApiResource {
    let gvk = GroupVersionKind::gvk(&gvr.group, &gvr.version, &gvr.kind);
    ApiResource::from_gvk_with_plural(&gvk, &gvr.plural)
}

fn list_params(selector: &LabelSelector) -> ListParams {
    let params = ListParams::default().limit(LIST_LIMIT);
    if selector.is_everything() {
        params
    } else {
        params.labels(&selector.to_query())
    }
}

fn page_params(params: &ListParams, token: Option<String>) -> ListParams {
    match token {
        Some(token) => params.clone().continue_token(&token),
        None => params.clone(),
    }
}

/// A list request asking the server for its tabular rendering.
fn table_request(
    url: &str,
    params: &ListParams,
) -> std::result::Result<http::Request<Vec<u8>>, request::Error> {
    let mut request = Request::new(url).list(params)?;
    request.headers_mut().insert(
        http::header::ACCEPT,
        http::HeaderValue::from_static(TABLE_ACCEPT),
    );
    Ok(request)
}

trait Paged {
    fn next_token(&self) -> Option<String>;
    fn absorb(&mut self, next: Self);
}

impl<K: Clone> Paged for ObjectList<K> {
    fn next_token(&self) -> Option<String> {
        self.metadata.continue_.clone().filter(|token| !token.is_empty())
    }

    fn absorb(&mut self, next: Self) {
        self.items.extend(next.items);
        self.metadata = next.metadata;
    }
}

impl Paged for ServerTable {
    fn next_token(&self) -> Option<String> {
        self.metadata.continue_.clone().filter(|token| !token.is_empty())
    }

    fn absorb(&mut self, next: Self) {
        self.rows.extend(next.rows);
        self.metadata = next.metadata;
    }
}

/// Follows continue tokens until the server reports the last page.
async fn collect_pages<P, F, Fut>(mut fetch: F) -> Result<P>
where
    P: Paged,
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<P>>,
{
    let mut all = fetch(None).await?;
    let mut token = all.next_token();
    while let Some(next) = token {
        let page = fetch(Some(next)).await?;
        token = page.next_token();
        all.absorb(page);
    }
    Ok(all)
}

pub fn meta_str<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
    object.get("metadata")?.get(key)?.as_str()
}

pub fn meta_labels(object: &Value) -> BTreeMap<String, String> {
    object
        .get("metadata")
        .and_then(|meta| meta.get("labels"))
        .and_then(|labels| serde_json::from_value(labels.clone()).ok())
        .unwrap_or_default()
}
