use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// Namespace sentinel for resources that are not namespaced.
pub const CLUSTER_SCOPE: &str = "-";
pub const NAMESPACE_ALL: &str = "all";
pub const NA_VALUE: &str = "n/a";
pub const MISSING_VALUE: &str = "<none>";

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum NamespaceScope {
    All,
    Named(String),
    Cluster,
}

impl NamespaceScope {
    pub fn is_all_namespaces(&self) -> bool {
        matches!(self, Self::All)
    }

    pub fn is_cluster_wide(&self) -> bool {
        matches!(self, Self::All | Self::Cluster)
    }

    /// Namespace to hand to the connection layer, `None` meaning every namespace.
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::Named(namespace) => Some(namespace.as_str()),
            Self::All | Self::Cluster => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::All => NAMESPACE_ALL.to_string(),
            Self::Named(namespace) => namespace.clone(),
            Self::Cluster => CLUSTER_SCOPE.to_string(),
        }
    }
}

impl Display for NamespaceScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Gvr {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub namespaced: bool,
}

impl Gvr {
    pub fn new(group: &str, version: &str, kind: &str, plural: &str, namespaced: bool) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
            namespaced,
        }
    }
}

impl Display for Gvr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.plural)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.plural)
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Pods,
    Deployments,
    Services,
    Nodes,
    PersistentVolumes,
    Benchmarks,
    ConfigMaps,
    Secrets,
    Jobs,
    StatefulSets,
    DaemonSets,
    Namespaces,
    Custom(Gvr),
}

impl ResourceKind {
    pub const BUILTIN: [Self; 12] = [
        Self::Pods,
        Self::Deployments,
        Self::Services,
        Self::Nodes,
        Self::PersistentVolumes,
        Self::Benchmarks,
        Self::ConfigMaps,
        Self::Secrets,
        Self::Jobs,
        Self::StatefulSets,
        Self::DaemonSets,
        Self::Namespaces,
    ];

    pub fn title(&self) -> &str {
        match self {
            Self::Pods => "Pods",
            Self::Deployments => "Deployments",
            Self::Services => "Services",
            Self::Nodes => "Nodes",
            Self::PersistentVolumes => "PersistentVolumes",
            Self::Benchmarks => "Benchmarks",
            Self::ConfigMaps => "ConfigMaps",
            Self::Secrets => "Secrets",
            Self::Jobs => "Jobs",
            Self::StatefulSets => "StatefulSets",
            Self::DaemonSets => "DaemonSets",
            Self::Namespaces => "Namespaces",
            Self::Custom(gvr) => gvr.kind.as_str(),
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "po" | "pod" | "pods" => Some(Self::Pods),
            "dp" | "deploy" | "deployment" | "deployments" => Some(Self::Deployments),
            "svc" | "service" | "services" => Some(Self::Services),
            "no" | "node" | "nodes" => Some(Self::Nodes),
            "pv" | "persistentvolume" | "persistentvolumes" | "persistent-volume"
            | "persistent-volumes" => Some(Self::PersistentVolumes),
            "be" | "bench" | "benchmark" | "benchmarks" => Some(Self::Benchmarks),
            "cm" | "configmap" | "configmaps" | "config-map" | "config-maps" => {
                Some(Self::ConfigMaps)
            }
            "sec" | "secret" | "secrets" => Some(Self::Secrets),
            "job" | "jobs" => Some(Self::Jobs),
            "sts" | "statefulset" | "statefulsets" => Some(Self::StatefulSets),
            "ds" | "daemonset" | "daemonsets" | "daemon-set" | "daemon-sets" => {
                Some(Self::DaemonSets)
            }
            "ns" | "namespace" | "namespaces" => Some(Self::Namespaces),
            _ => None,
        }
    }

    pub fn short_token(&self) -> &str {
        match self {
            Self::Pods => "po",
            Self::Deployments => "dp",
            Self::Services => "svc",
            Self::Nodes => "no",
            Self::PersistentVolumes => "pv",
            Self::Benchmarks => "be",
            Self::ConfigMaps => "cm",
            Self::Secrets => "sec",
            Self::Jobs => "job",
            Self::StatefulSets => "sts",
            Self::DaemonSets => "ds",
            Self::Namespaces => "ns",
            Self::Custom(gvr) => gvr.plural.as_str(),
        }
    }

    pub fn gvr(&self) -> Option<Gvr> {
        let gvr = match self {
            Self::Pods => Gvr::new("", "v1", "Pod", "pods", true),
            Self::Deployments => Gvr::new("apps", "v1", "Deployment", "deployments", true),
            Self::Services => Gvr::new("", "v1", "Service", "services", true),
            Self::Nodes => Gvr::new("", "v1", "Node", "nodes", false),
            Self::PersistentVolumes => {
                Gvr::new("", "v1", "PersistentVolume", "persistentvolumes", false)
            }
            Self::Benchmarks => return None,
            Self::ConfigMaps => Gvr::new("", "v1", "ConfigMap", "configmaps", true),
            Self::Secrets => Gvr::new("", "v1", "Secret", "secrets", true),
            Self::Jobs => Gvr::new("batch", "v1", "Job", "jobs", true),
            Self::StatefulSets => Gvr::new("apps", "v1", "StatefulSet", "statefulsets", true),
            Self::DaemonSets => Gvr::new("apps", "v1", "DaemonSet", "daemonsets", true),
            Self::Namespaces => Gvr::new("", "v1", "Namespace", "namespaces", false),
            Self::Custom(gvr) => gvr.clone(),
        };
        Some(gvr)
    }

    pub fn is_namespaced(&self) -> bool {
        match self {
            Self::Benchmarks => true,
            other => other.gvr().is_some_and(|gvr| gvr.namespaced),
        }
    }

    /// Scope a view of this kind should request given the user's namespace choice.
    pub fn effective_scope(&self, requested: &NamespaceScope) -> NamespaceScope {
        if self.is_namespaced() {
            requested.clone()
        } else {
            NamespaceScope::Cluster
        }
    }
}

pub fn fqn(namespace: &str, name: &str) -> String {
    if namespace.is_empty() || namespace == CLUSTER_SCOPE {
        return name.to_string();
    }
    format!("{namespace}/{name}")
}

pub fn namespaced(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((namespace, name)) => (namespace.trim_matches('/'), name),
        None => ("", path),
    }
}

pub type Fields = Vec<String>;

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Row {
    pub id: String,
    pub fields: Fields,
}

impl Row {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum EventKind {
    Add,
    Update,
    Delete,
    Unchanged,
}

impl EventKind {
    /// Freshly added and updated rows share the same "just changed" treatment.
    pub fn is_fresh(self) -> bool {
        matches!(self, Self::Add | Self::Update)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RowEvent {
    pub kind: EventKind,
    pub row: Row,
}

impl RowEvent {
    pub fn new(kind: EventKind, row: Row) -> Self {
        Self { kind, row }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum Alignment {
    #[default]
    Left,
    Right,
}

pub type Decorator = fn(&str) -> String;

#[derive(Debug, Clone)]
pub struct Header {
    pub name: String,
    pub align: Alignment,
    pub decorator: Option<Decorator>,
}

impl Header {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            align: Alignment::Left,
            decorator: None,
        }
    }

    pub fn right(name: impl Into<String>) -> Self {
        Self {
            align: Alignment::Right,
            ..Self::new(name)
        }
    }

    pub fn decorated(name: impl Into<String>, decorator: Decorator) -> Self {
        Self {
            decorator: Some(decorator),
            ..Self::new(name)
        }
    }

    pub fn display(&self, value: &str) -> String {
        match self.decorator {
            Some(decorate) => decorate(value),
            None => value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HeaderRow(pub Vec<Header>);

impl HeaderRow {
    pub fn columns(&self) -> Vec<String> {
        self.0.iter().map(|header| header.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|header| header.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }
}

impl FromIterator<Header> for HeaderRow {
    fn from_iter<T: IntoIterator<Item = Header>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone)]
pub struct TableData {
    pub namespace: NamespaceScope,
    pub header: HeaderRow,
    pub row_events: HashMap<String, RowEvent>,
}

impl TableData {
    pub fn new(namespace: NamespaceScope, header: HeaderRow) -> Self {
        Self {
            namespace,
            header,
            row_events: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.row_events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_events.is_empty()
    }

    pub fn sorted_events(&self) -> Vec<&RowEvent> {
        let mut events = self.row_events.values().collect::<Vec<_>>();
        events.sort_by(|left, right| left.row.id.cmp(&right.row.id));
        events
    }

    /// Checks the snapshot invariants: keys match row ids and every row is as
    /// wide as the header.
    pub fn is_consistent(&self) -> bool {
        let width = self.header.len();
        self.row_events
            .iter()
            .all(|(id, event)| *id == event.row.id && event.row.fields.len() == width)
    }
}
