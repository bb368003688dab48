use k8s_openapi::api::core::v1::{Container, Node, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::client::meta_str;
use crate::model::{NA_VALUE, fqn};

const MEGABYTE: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Metric {
    pub cpu: String,
    pub mem: String,
}

impl Metric {
    pub fn na() -> Self {
        Self {
            cpu: NA_VALUE.to_string(),
            mem: NA_VALUE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct PodMetrics {
    pub cpu_millis: u64,
    pub mem_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct NodeMetrics {
    pub cpu_millis: u64,
    pub mem_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClusterMetrics {
    pub perc_cpu: u64,
    pub perc_mem: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub pods: HashMap<String, PodMetrics>,
    pub nodes: HashMap<String, NodeMetrics>,
}

impl MetricsSnapshot {
    pub fn with_pods(raw: &[Value]) -> Self {
        let pods = raw
            .iter()
            .map(|item| {
                let name = fqn(
                    meta_str(item, "namespace").unwrap_or_default(),
                    meta_str(item, "name").unwrap_or_default(),
                );
                (name, parse_pod_metrics_usage(item))
            })
            .collect();
        Self {
            pods,
            nodes: HashMap::new(),
        }
    }

    pub fn with_nodes(raw: &[Value]) -> Self {
        let nodes = raw
            .iter()
            .map(|item| {
                let name = meta_str(item, "name").unwrap_or_default().to_string();
                let (cpu_millis, mem_bytes) = item
                    .get("usage")
                    .map(parse_usage_from_value)
                    .unwrap_or((0, 0));
                (
                    name,
                    NodeMetrics {
                        cpu_millis,
                        mem_bytes,
                    },
                )
            })
            .collect();
        Self {
            pods: HashMap::new(),
            nodes,
        }
    }

    pub fn pod(&self, path: &str) -> Option<PodMetrics> {
        self.pods.get(path).copied()
    }

    pub fn node(&self, name: &str) -> Option<NodeMetrics> {
        self.nodes.get(name).copied()
    }
}

/// Percentage of `used` over `capacity`, rounded; zero capacity yields zero.
pub fn to_perc(used: f64, capacity: f64) -> u64 {
    if capacity <= 0.0 {
        return 0;
    }
    (used / capacity * 100.0).round().max(0.0) as u64
}

fn to_mi(bytes: u64) -> String {
    ((bytes as f64 / MEGABYTE) as u64).to_string()
}

pub fn pod_overlay(pod: &Pod, metrics: Option<PodMetrics>) -> (Metric, Metric) {
    let Some(metrics) = metrics else {
        return (Metric::na(), Metric::na());
    };

    let current = Metric {
        cpu: metrics.cpu_millis.to_string(),
        mem: to_mi(metrics.mem_bytes),
    };
    let (requested_cpu, requested_mem) = requested_resources(pod);
    let percent = Metric {
        cpu: to_perc(metrics.cpu_millis as f64, requested_cpu as f64).to_string(),
        mem: to_perc(metrics.mem_bytes as f64, requested_mem as f64).to_string(),
    };
    (current, percent)
}

pub fn node_overlay(node: &Node, metrics: Option<NodeMetrics>) -> (Metric, Metric, Metric) {
    let Some(metrics) = metrics else {
        return (Metric::na(), Metric::na(), Metric::na());
    };

    let (alloc_cpu, alloc_mem) = node_allocatable(node);
    let current = Metric {
        cpu: metrics.cpu_millis.to_string(),
        mem: to_mi(metrics.mem_bytes),
    };
    let allocatable = Metric {
        cpu: alloc_cpu.to_string(),
        mem: to_mi(alloc_mem),
    };
    let percent = Metric {
        cpu: to_perc(metrics.cpu_millis as f64, alloc_cpu as f64).to_string(),
        mem: to_perc(metrics.mem_bytes as f64, alloc_mem as f64).to_string(),
    };
    (current, allocatable, percent)
}

pub fn cluster_load(nodes: &[Node], snapshot: &MetricsSnapshot) -> ClusterMetrics {
    let (mut used_cpu, mut used_mem, mut alloc_cpu, mut alloc_mem) = (0u64, 0u64, 0u64, 0u64);
    for node in nodes {
        let name = node.metadata.name.as_deref().unwrap_or_default();
        let Some(metrics) = snapshot.node(name) else {
            continue;
        };
        let (cpu, mem) = node_allocatable(node);
        used_cpu = used_cpu.saturating_add(metrics.cpu_millis);
        used_mem = used_mem.saturating_add(metrics.mem_bytes);
        alloc_cpu = alloc_cpu.saturating_add(cpu);
        alloc_mem = alloc_mem.saturating_add(mem);
    }

    ClusterMetrics {
        perc_cpu: to_perc(used_cpu as f64, alloc_cpu as f64),
        perc_mem: to_perc(used_mem as f64, alloc_mem as f64),
    }
}

fn node_allocatable(node: &Node) -> (u64, u64) {
    let allocatable = node
        .status
        .as_ref()
        .and_then(|status| status.allocatable.as_ref());
    quantities(allocatable)
}

/// Sums container requests, falling back to limits when a container sets no
/// requests at all.
fn requested_resources(pod: &Pod) -> (u64, u64) {
    let containers = pod
        .spec
        .as_ref()
        .map(|spec| spec.containers.as_slice())
        .unwrap_or_default();
    containers
        .iter()
        .map(container_resources)
        .fold((0u64, 0u64), |(cpu, mem), (c, m)| {
            (cpu.saturating_add(c), mem.saturating_add(m))
        })
}

fn container_resources(container: &Container) -> (u64, u64) {
    let Some(resources) = container.resources.as_ref() else {
        return (0, 0);
    };
    let requests = resources.requests.as_ref().filter(|map| !map.is_empty());
    let limits = resources.limits.as_ref().filter(|map| !map.is_empty());
    quantities(requests.or(limits))
}

fn quantities(map: Option<&BTreeMap<String, Quantity>>) -> (u64, u64) {
    let Some(map) = map else {
        return (0, 0);
    };
    let cpu = map
        .get("cpu")
        .and_then(|quantity| parse_cpu_millicores(&quantity.0))
        .unwrap_or(0);
    let memory = map
        .get("memory")
        .and_then(|quantity| parse_memory_bytes(&quantity.0))
        .unwrap_or(0);
    (cpu, memory)
}

fn parse_pod_metrics_usage(data: &Value) -> PodMetrics {
    let Some(containers) = data.get("containers").and_then(Value::as_array) else {
        return PodMetrics::default();
    };

    containers
        .iter()
        .fold(PodMetrics::default(), |total, container| {
            let (cpu, memory) = container
                .get("usage")
                .map(parse_usage_from_value)
                .unwrap_or((0, 0));
            PodMetrics {
                cpu_millis: total.cpu_millis.saturating_add(cpu),
                mem_bytes: total.mem_bytes.saturating_add(memory),
            }
        })
}

fn parse_usage_from_value(value: &Value) -> (u64, u64) {
    let cpu = value
        .get("cpu")
        .and_then(Value::as_str)
        .and_then(parse_cpu_millicores)
        .unwrap_or(0);
    let memory = value
        .get("memory")
        .and_then(Value::as_str)
        .and_then(parse_memory_bytes)
        .unwrap_or(0);
    (cpu, memory)
}

pub fn parse_cpu_millicores(value: &str) -> Option<u64> {
    let raw = value.trim();
    if raw.is_empty() {
        return None;
    }

    let (number, multiplier) = if let Some(number) = raw.strip_suffix('m') {
        (number, 1.0)
    } else if let Some(number) = raw.strip_suffix('u') {
        (number, 0.001)
    } else if let Some(number) = raw.strip_suffix('n') {
        (number, 0.000001)
    } else {
        (raw, 1000.0)
    };

    let numeric = number.parse::<f64>().ok()?;
    let millicores = (numeric * multiplier).round();
    if !millicores.is_finite() || millicores < 0.0 {
        return None;
    }
    Some(millicores as u64)
}

pub fn parse_memory_bytes(value: &str) -> Option<u64> {
    const UNITS: [(&str, f64); 12] = [
        ("Ei", 1_152_921_504_606_846_976.0),
        ("Pi", 1_125_899_906_842_624.0),
        ("Ti", 1_099_511_627_776.0),
        ("Gi", 1_073_741_824.0),
        ("Mi", 1_048_576.0),
        ("Ki", 1_024.0),
        ("E", 1_000_000_000_000_000_000.0),
        ("P", 1_000_000_000_000_000.0),
        ("T", 1_000_000_000_000.0),
        ("G", 1_000_000_000.0),
        ("M", 1_000_000.0),
        ("k", 1_000.0),
    ];

    let raw = value.trim();
    if raw.is_empty() {
        return None;
    }

    let (number, multiplier) = UNITS
        .iter()
        .find_map(|(suffix, multiplier)| raw.strip_suffix(suffix).map(|n| (n, *multiplier)))
        .or_else(|| raw.strip_suffix('K').map(|n| (n, 1_000.0)))
        .or_else(|| raw.strip_suffix('m').map(|n| (n, 0.001)))
        .unwrap_or((raw, 1.0));

    let bytes = (number.parse::<f64>().ok()? * multiplier).round();
    if !bytes.is_finite() || bytes < 0.0 {
        return None;
    }
    Some(bytes as u64)
}
