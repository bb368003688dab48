mod benchmark;
mod deployment;
mod generic;
mod helpers;
mod node;
mod pod;
mod pv;
mod service;

use ratatui::style::Color;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

pub use benchmark::{BenchInfo, Benchmark};
pub use deployment::Deployment;
pub use generic::{GenericRow, Generic};
pub use helpers::{age_decorator, format_elapsed_seconds, to_age};
pub use node::{Node, NodeWithMetrics};
pub use pod::{Pod, PodWithMetrics, pod_phase};
pub use pv::PersistentVolume;
pub use service::Service;

use crate::error::{Result, SkiffError};
use crate::model::{EventKind, HeaderRow, NamespaceScope, ResourceKind, Row, RowEvent};

pub const STD_COLOR: Color = Color::White;
pub const ADD_COLOR: Color = Color::Rgb(30, 144, 255);
pub const MOD_COLOR: Color = Color::Rgb(173, 255, 47);
pub const ERR_COLOR: Color = Color::Rgb(248, 113, 113);
pub const WARN_COLOR: Color = Color::Rgb(251, 191, 36);
pub const HIGHLIGHT_COLOR: Color = Color::Rgb(0, 255, 255);
pub const COMPLETED_COLOR: Color = Color::Gray;
pub const KILL_COLOR: Color = Color::Rgb(119, 136, 153);

pub type ColorerFn = fn(&NamespaceScope, &RowEvent) -> Color;

/// Baseline coloring driven only by the row's change state.
pub fn default_colorer(_scope: &NamespaceScope, event: &RowEvent) -> Color {
    match event.kind {
        EventKind::Add => ADD_COLOR,
        EventKind::Update => MOD_COLOR,
        EventKind::Delete => KILL_COLOR,
        EventKind::Unchanged => STD_COLOR,
    }
}

#[derive(Debug, Clone)]
pub enum Object {
    Raw(Value),
    Pod(PodWithMetrics),
    Node(NodeWithMetrics),
    TableRow(GenericRow),
    Bench(BenchInfo),
}

impl Object {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Raw(_) => "Raw",
            Self::Pod(_) => "PodWithMetrics",
            Self::Node(_) => "NodeWithMetrics",
            Self::TableRow(_) => "TableRow",
            Self::Bench(_) => "BenchInfo",
        }
    }

    pub fn raw(&self) -> Option<&Value> {
        match self {
            Self::Raw(raw) => Some(raw),
            Self::Pod(pod) => Some(&pod.raw),
            Self::Node(node) => Some(&node.raw),
            Self::TableRow(row) => Some(&row.row.object),
            Self::Bench(_) => None,
        }
    }
}

pub trait Renderer: Send + Sync {
    fn header(&self, scope: &NamespaceScope) -> HeaderRow;

    fn render(&self, object: &Object, scope: &NamespaceScope) -> Result<Row>;

    fn colorer(&self) -> ColorerFn {
        default_colorer
    }

    /// Lets renderers whose columns come from the listing itself see it first.
    fn prepare(&self, _objects: &[Object]) {}
}

pub fn renderer_for(kind: &ResourceKind) -> Arc<dyn Renderer> {
    match kind {
        ResourceKind::Pods => Arc::new(Pod),
        ResourceKind::Deployments => Arc::new(Deployment),
        ResourceKind::Services => Arc::new(Service),
        ResourceKind::Nodes => Arc::new(Node),
        ResourceKind::PersistentVolumes => Arc::new(PersistentVolume),
        ResourceKind::Benchmarks => Arc::new(Benchmark),
        _ => Arc::new(Generic::default()),
    }
}

pub(crate) fn decode<T>(raw: &Value, expected: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    if let Some(kind) = raw.get("kind").and_then(Value::as_str)
        && kind != expected
    {
        return Err(SkiffError::render(format!(
            "expected {expected}, but got {kind}"
        )));
    }
    serde_json::from_value(raw.clone())
        .map_err(|error| SkiffError::render(format!("unable to decode {expected}: {error}")))
}

pub(crate) fn mismatch(expected: &str, object: &Object) -> SkiffError {
    SkiffError::render(format!(
        "expected {expected}, but got {}",
        object.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::{ADD_COLOR, KILL_COLOR, MOD_COLOR, STD_COLOR, default_colorer, renderer_for};
    use crate::model::{EventKind, NamespaceScope, ResourceKind, Row, RowEvent};

    #[test]
    fn default_colorer_follows_event_kind() {
        let scope = NamespaceScope::All;
        let row = Row::new("a", vec![]);
        let cases = [
            (EventKind::Add, ADD_COLOR),
            (EventKind::Update, MOD_COLOR),
            (EventKind::Delete, KILL_COLOR),
            (EventKind::Unchanged, STD_COLOR),
        ];
        for (kind, color) in cases {
            assert_eq!(default_colorer(&scope, &RowEvent::new(kind, row.clone())), color);
        }
    }

    #[test]
    fn namespace_column_tracks_scope() {
        for kind in [
            ResourceKind::Pods,
            ResourceKind::Deployments,
            ResourceKind::Services,
        ] {
            let renderer = renderer_for(&kind);
            let all = renderer.header(&NamespaceScope::All);
            let named = renderer.header(&NamespaceScope::Named("default".to_string()));
            assert_eq!(all.columns()[0], "NAMESPACE");
            assert_eq!(all.len(), named.len() + 1);
        }
    }
}
