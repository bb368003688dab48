use k8s_openapi::api::core::v1::{Node as KubeNode, NodeStatus};
use serde_json::Value;

use super::helpers::{missing, to_age};
use super::{Object, Renderer, age_decorator, decode, mismatch};
use crate::error::Result;
use crate::metrics::{NodeMetrics, node_overlay};
use crate::model::{Header, HeaderRow, MISSING_VALUE, NamespaceScope, Row};

const NODE_ROLE_PREFIX: &str = "node-role.kubernetes.io/";
const NODE_ROLE_LABEL: &str = "kubernetes.io/role";

#[derive(Debug, Clone)]
pub struct NodeWithMetrics {
    pub raw: Value,
    pub metrics: Option<NodeMetrics>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Node;

impl Renderer for Node {
    fn header(&self, _scope: &NamespaceScope) -> HeaderRow {
        HeaderRow(vec![
            Header::new("NAME"),
            Header::new("STATUS"),
            Header::new("ROLE"),
            Header::new("VERSION"),
            Header::new("KERNEL"),
            Header::new("INTERNAL-IP"),
            Header::new("EXTERNAL-IP"),
            Header::right("CPU"),
            Header::right("MEM"),
            Header::right("%CPU"),
            Header::right("%MEM"),
            Header::right("ACPU"),
            Header::right("AMEM"),
            Header::decorated("AGE", age_decorator),
        ])
    }

    fn render(&self, object: &Object, _scope: &NamespaceScope) -> Result<Row> {
        let Object::Node(node) = object else {
            return Err(mismatch("NodeWithMetrics", object));
        };
        let no: KubeNode = decode(&node.raw, "Node")?;
        let status = no.status.clone().unwrap_or_default();
        let unschedulable = no
            .spec
            .as_ref()
            .and_then(|spec| spec.unschedulable)
            .unwrap_or(false);
        let (internal_ip, external_ip) = addresses(&status);
        let info = status.node_info.clone().unwrap_or_default();
        let (current, allocatable, percent) = node_overlay(&no, node.metrics);
        let name = no.metadata.name.clone().unwrap_or_default();

        Ok(Row::new(
            name.clone(),
            vec![
                name,
                node_status(&status, unschedulable),
                node_roles(&no),
                info.kubelet_version,
                info.kernel_version,
                missing(internal_ip.as_deref()),
                missing(external_ip.as_deref()),
                current.cpu,
                current.mem,
                percent.cpu,
                percent.mem,
                allocatable.cpu,
                allocatable.mem,
                to_age(no.metadata.creation_timestamp.as_ref()),
            ],
        ))
    }
}

fn addresses(status: &NodeStatus) -> (Option<String>, Option<String>) {
    let mut internal = None;
    let mut external = None;
    for address in status.addresses.as_deref().unwrap_or_default() {
        match address.type_.as_str() {
            "InternalIP" => internal = Some(address.address.clone()),
            "ExternalIP" => external = Some(address.address.clone()),
            _ => {}
        }
    }
    (internal, external)
}

fn node_status(status: &NodeStatus, unschedulable: bool) -> String {
    let mut parts = Vec::with_capacity(2);
    match status
        .conditions
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|condition| condition.type_ == "Ready")
    {
        Some(condition) if condition.status == "True" => parts.push("Ready"),
        Some(_) => parts.push("NotReady"),
        None => parts.push("Unknown"),
    }
    if unschedulable {
        parts.push("SchedulingDisabled");
    }
    parts.join(",")
}

fn node_roles(node: &KubeNode) -> String {
    let mut roles = node
        .metadata
        .labels
        .as_ref()
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(key, value)| {
                    if let Some(role) = key.strip_prefix(NODE_ROLE_PREFIX) {
                        return (!role.is_empty()).then(|| role.to_string());
                    }
                    (key == NODE_ROLE_LABEL && !value.is_empty()).then(|| value.clone())
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    roles.dedup();
    if roles.is_empty() {
        return MISSING_VALUE.to_string();
    }
    roles.join(",")
}
