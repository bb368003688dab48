use k8s_openapi::api::core::v1::{Service as KubeService, ServicePort, ServiceSpec, ServiceStatus};

use super::helpers::{map_to_str, meta_fqn, missing, to_age};
use super::{Object, Renderer, age_decorator, decode, mismatch};
use crate::error::Result;
use crate::model::{Header, HeaderRow, MISSING_VALUE, NamespaceScope, Row};

pub const PROTOCOL_SEPARATOR: char = '╱';
pub const NODE_PORT_SEPARATOR: char = '►';

#[derive(Debug, Clone, Copy, Default)]
pub struct Service;

impl Renderer for Service {
    fn header(&self, scope: &NamespaceScope) -> HeaderRow {
        let mut header = Vec::with_capacity(8);
        if scope.is_all_namespaces() {
            header.push(Header::new("NAMESPACE"));
        }
        header.extend([
            Header::new("NAME"),
            Header::new("TYPE"),
            Header::new("CLUSTER-IP"),
            Header::new("EXTERNAL-IP"),
            Header::new("SELECTOR"),
            Header::new("PORTS"),
            Header::decorated("AGE", age_decorator),
        ]);
        HeaderRow(header)
    }

    fn render(&self, object: &Object, scope: &NamespaceScope) -> Result<Row> {
        let Object::Raw(raw) = object else {
            return Err(mismatch("Service", object));
        };
        let svc: KubeService = decode(raw, "Service")?;
        let spec = svc.spec.clone().unwrap_or_default();

        let mut fields = Vec::with_capacity(8);
        if scope.is_all_namespaces() {
            fields.push(svc.metadata.namespace.clone().unwrap_or_default());
        }
        fields.extend([
            svc.metadata.name.clone().unwrap_or_default(),
            spec.type_.clone().unwrap_or_else(|| "ClusterIP".to_string()),
            missing(spec.cluster_ip.as_deref()),
            external_ips(&spec, svc.status.as_ref()),
            map_to_str(spec.selector.as_ref()),
            to_ports(spec.ports.as_deref().unwrap_or_default()),
            to_age(svc.metadata.creation_timestamp.as_ref()),
        ]);

        Ok(Row::new(meta_fqn(&svc.metadata), fields))
    }
}

fn external_ips(spec: &ServiceSpec, status: Option<&ServiceStatus>) -> String {
    let mut ips: Vec<String> = status
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .map(|ingress| {
            ingress
                .iter()
                .filter_map(|entry| entry.ip.clone().or_else(|| entry.hostname.clone()))
                .collect()
        })
        .unwrap_or_default();
    ips.extend(spec.external_ips.iter().flatten().cloned());

    if ips.is_empty() {
        if spec.type_.as_deref() == Some("LoadBalancer") {
            return "<pending>".to_string();
        }
        return MISSING_VALUE.to_string();
    }
    ips.join(",")
}

fn to_ports(ports: &[ServicePort]) -> String {
    ports
        .iter()
        .map(|port| {
            let mut spec = String::new();
            if let Some(name) = port.name.as_deref().filter(|name| !name.is_empty()) {
                spec.push_str(name);
                spec.push(':');
            }
            spec.push_str(&port.port.to_string());
            if let Some(node_port) = port.node_port.filter(|node_port| *node_port != 0) {
                spec.push(NODE_PORT_SEPARATOR);
                spec.push_str(&node_port.to_string());
            }
            spec.push(PROTOCOL_SEPARATOR);
            spec.push_str(port.protocol.as_deref().unwrap_or("TCP"));
            spec
        })
        .collect::<Vec<_>>()
        .join(" ")
}
