use k8s_openapi::api::core::v1::{ContainerStatus, Pod as KubePod, PodStatus};
use ratatui::style::Color;
use serde_json::Value;

use super::helpers::{column, meta_fqn, na, to_age};
use super::{
    ADD_COLOR, COMPLETED_COLOR, ColorerFn, ERR_COLOR, HIGHLIGHT_COLOR, KILL_COLOR, Object,
    Renderer, decode, default_colorer, mismatch,
};
use crate::error::Result;
use crate::metrics::{PodMetrics, pod_overlay};
use crate::model::{Header, HeaderRow, NamespaceScope, RowEvent, Row};

pub const TERMINATING: &str = "Terminating";
pub const RUNNING: &str = "Running";
pub const INITIALIZED: &str = "Initialized";
pub const COMPLETED: &str = "Completed";
pub const CONTAINER_CREATING: &str = "ContainerCreating";
pub const POD_INITIALIZING: &str = "PodInitializing";

/// Reason the node controller stamps on pods of an unreachable node.
const NODE_UNREACHABLE_REASON: &str = "NodeLost";

#[derive(Debug, Clone)]
pub struct PodWithMetrics {
    pub raw: Value,
    pub metrics: Option<PodMetrics>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Pod;

impl Renderer for Pod {
    fn header(&self, scope: &NamespaceScope) -> HeaderRow {
        let mut header = Vec::with_capacity(13);
        if scope.is_all_namespaces() {
            header.push(Header::new("NAMESPACE"));
        }
        header.extend([
            Header::new("NAME"),
            Header::new("READY"),
            Header::new("STATUS"),
            Header::right("RESTARTS"),
            Header::right("CPU"),
            Header::right("MEM"),
            Header::right("%CPU"),
            Header::right("%MEM"),
            Header::new("IP"),
            Header::new("NODE"),
            Header::new("QOS"),
            Header::decorated("AGE", super::age_decorator),
        ]);
        HeaderRow(header)
    }

    fn render(&self, object: &Object, scope: &NamespaceScope) -> Result<Row> {
        let Object::Pod(pod) = object else {
            return Err(mismatch("PodWithMetrics", object));
        };
        let po: KubePod = decode(&pod.raw, "Pod")?;

        let statuses = po
            .status
            .as_ref()
            .and_then(|status| status.container_statuses.as_deref())
            .unwrap_or_default();
        let ready = statuses.iter().filter(|status| status.ready).count();
        let restarts = statuses
            .iter()
            .map(|status| i64::from(status.restart_count))
            .sum::<i64>();
        let (current, percent) = pod_overlay(&po, pod.metrics);

        let mut fields = Vec::with_capacity(13);
        if scope.is_all_namespaces() {
            fields.push(po.metadata.namespace.clone().unwrap_or_default());
        }
        fields.extend([
            po.metadata.name.clone().unwrap_or_default(),
            format!("{ready}/{}", statuses.len()),
            pod_phase(&po),
            restarts.to_string(),
            current.cpu,
            current.mem,
            percent.cpu,
            percent.mem,
            na(po.status.as_ref().and_then(|status| status.pod_ip.as_deref())),
            na(po.spec.as_ref().and_then(|spec| spec.node_name.as_deref())),
            map_qos(po.status.as_ref().and_then(|status| status.qos_class.as_deref())),
            to_age(po.metadata.creation_timestamp.as_ref()),
        ]);

        Ok(Row::new(meta_fqn(&po.metadata), fields))
    }

    fn colorer(&self) -> ColorerFn {
        pod_colorer
    }
}

fn pod_colorer(scope: &NamespaceScope, event: &RowEvent) -> Color {
    let color = default_colorer(scope, event);
    let ready_col = column(1, scope.is_all_namespaces());
    let fields = &event.row.fields;
    let (Some(ready), Some(status)) = (fields.get(ready_col), fields.get(ready_col + 1)) else {
        return ERR_COLOR;
    };
    let status = status.trim();
    let color = check_ready(ready.trim(), status, color);

    match status {
        CONTAINER_CREATING | POD_INITIALIZING => ADD_COLOR,
        INITIALIZED => HIGHLIGHT_COLOR,
        COMPLETED => COMPLETED_COLOR,
        RUNNING => color,
        TERMINATING => KILL_COLOR,
        _ => ERR_COLOR,
    }
}

fn check_ready(ready: &str, status: &str, color: Color) -> Color {
    if status == COMPLETED {
        return color;
    }
    match ready.split_once('/') {
        Some((count, total)) if count == "0" || count != total => ERR_COLOR,
        _ => color,
    }
}

fn map_qos(class: Option<&str>) -> String {
    match class {
        Some("Guaranteed") => "GA",
        Some("Burstable") => "BU",
        _ => "BE",
    }
    .to_string()
}

/// Derives the display phase of a pod from its status, init containers and
/// container states.
pub fn pod_phase(po: &KubePod) -> String {
    let default_status = PodStatus::default();
    let status = po.status.as_ref().unwrap_or(&default_status);
    let deleting = po.metadata.deletion_timestamp.is_some();

    let mut phase = status.phase.clone().unwrap_or_default();
    if let Some(reason) = status.reason.as_deref().filter(|reason| !reason.is_empty()) {
        if deleting && reason == NODE_UNREACHABLE_REASON {
            return "Unknown".to_string();
        }
        phase = reason.to_string();
    }

    let init_count = po
        .spec
        .as_ref()
        .and_then(|spec| spec.init_containers.as_ref())
        .map(Vec::len)
        .unwrap_or(0);
    let init_phase = status
        .init_container_statuses
        .as_deref()
        .unwrap_or_default()
        .iter()
        .enumerate()
        .find_map(|(index, cs)| init_container_phase(cs, index, init_count));

    if let Some(init_phase) = init_phase {
        phase = init_phase;
    } else {
        let (container_phase, running) = container_phase(status, phase);
        phase = container_phase;
        if running && phase == COMPLETED {
            phase = RUNNING.to_string();
        }
    }

    if deleting {
        return "Terminated".to_string();
    }
    phase
}

fn container_phase(status: &PodStatus, mut phase: String) -> (String, bool) {
    let mut running = false;
    let statuses = status.container_statuses.as_deref().unwrap_or_default();
    for cs in statuses.iter().rev() {
        let state = cs.state.clone().unwrap_or_default();
        let waiting_reason = state
            .waiting
            .as_ref()
            .and_then(|waiting| waiting.reason.as_deref())
            .filter(|reason| !reason.is_empty());
        let terminated = state.terminated.as_ref();
        let terminated_reason = terminated
            .and_then(|terminated| terminated.reason.as_deref())
            .filter(|reason| !reason.is_empty());

        if let Some(reason) = waiting_reason {
            phase = reason.to_string();
        } else if let Some(reason) = terminated_reason {
            phase = reason.to_string();
        } else if let Some(terminated) = terminated {
            phase = match terminated.signal.filter(|signal| *signal != 0) {
                Some(signal) => format!("Signal:{signal}"),
                None => format!("ExitCode:{}", terminated.exit_code),
            };
        } else if cs.ready && state.running.is_some() {
            running = true;
        }
    }
    (phase, running)
}

/// Phase override for the first init container that has not completed
/// successfully, `None` for one that has.
fn init_container_phase(cs: &ContainerStatus, index: usize, count: usize) -> Option<String> {
    let state = cs.state.clone().unwrap_or_default();
    if let Some(terminated) = state.terminated.as_ref() {
        if terminated.exit_code == 0 {
            return None;
        }
        if let Some(reason) = terminated.reason.as_deref().filter(|r| !r.is_empty()) {
            return Some(format!("Init:{reason}"));
        }
        if let Some(signal) = terminated.signal.filter(|signal| *signal != 0) {
            return Some(format!("Init:Signal:{signal}"));
        }
        return Some(format!("Init:ExitCode:{}", terminated.exit_code));
    }

    if let Some(reason) = state
        .waiting
        .as_ref()
        .and_then(|waiting| waiting.reason.as_deref())
        .filter(|reason| !reason.is_empty() && *reason != POD_INITIALIZING)
    {
        return Some(format!("Init:{reason}"));
    }

    Some(format!("Init:{index}/{count}"))
}

#[cfg(test)]
mod tests {
    use super::{Pod, PodWithMetrics, pod_colorer, pod_phase};
    use crate::metrics::PodMetrics;
    use crate::model::{EventKind, NamespaceScope, Row, RowEvent};
    use crate::render::{
        ADD_COLOR, COMPLETED_COLOR, ERR_COLOR, KILL_COLOR, Object, Renderer, STD_COLOR,
    };
    use k8s_openapi::api::core::v1::Pod as KubePod;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn raw_pod() -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "web-0",
                "namespace": "default",
                "creationTimestamp": "2024-01-01T00:00:00Z"
            },
            "spec": {
                "nodeName": "n1",
                "initContainers": [{"name": "init"}],
                "containers": [{"name": "app", "resources": {"requests": {"cpu": "200m", "memory": "128Mi"}}}]
            },
            "status": {
                "phase": "Running",
                "podIP": "10.0.0.7",
                "qosClass": "Burstable",
                "initContainerStatuses": [{
                    "name": "init", "image": "busybox", "imageID": "", "ready": false, "restartCount": 0,
                    "state": {"terminated": {"exitCode": 0, "reason": "Completed"}}
                }],
                "containerStatuses": [{
                    "name": "app", "image": "nginx", "imageID": "", "ready": true, "restartCount": 2,
                    "state": {"running": {"startedAt": "2024-01-01T00:00:05Z"}}
                }]
            }
        })
    }

    fn decode(raw: Value) -> KubePod {
        serde_json::from_value(raw).expect("pod fixture")
    }

    #[test]
    fn successful_init_and_ready_container_is_running() {
        assert_eq!(pod_phase(&decode(raw_pod())), "Running");
    }

    #[test]
    fn deletion_timestamp_means_terminated() {
        let mut raw = raw_pod();
        raw["metadata"]["deletionTimestamp"] = json!("2024-01-02T00:00:00Z");
        assert_eq!(pod_phase(&decode(raw.clone())), "Terminated");

        raw["status"]["phase"] = json!("Pending");
        raw["status"]["initContainerStatuses"][0]["state"] =
            json!({"waiting": {"reason": "PodInitializing"}});
        assert_eq!(pod_phase(&decode(raw)), "Terminated");
    }

    #[test]
    fn unreachable_node_while_deleting_is_unknown() {
        let mut raw = raw_pod();
        raw["metadata"]["deletionTimestamp"] = json!("2024-01-02T00:00:00Z");
        raw["status"]["reason"] = json!("NodeLost");
        assert_eq!(pod_phase(&decode(raw)), "Unknown");
    }

    #[test]
    fn reason_replaces_phase() {
        let mut raw = raw_pod();
        raw["status"]["reason"] = json!("Evicted");
        raw["status"]["containerStatuses"] = json!([]);
        assert_eq!(pod_phase(&decode(raw)), "Evicted");
    }

    #[test]
    fn init_containers_short_circuit() {
        let mut raw = raw_pod();
        raw["status"]["initContainerStatuses"][0]["state"] =
            json!({"terminated": {"exitCode": 1, "reason": "Error"}});
        assert_eq!(pod_phase(&decode(raw.clone())), "Init:Error");

        raw["status"]["initContainerStatuses"][0]["state"] =
            json!({"terminated": {"exitCode": 137, "signal": 9}});
        assert_eq!(pod_phase(&decode(raw.clone())), "Init:Signal:9");

        raw["status"]["initContainerStatuses"][0]["state"] =
            json!({"terminated": {"exitCode": 3}});
        assert_eq!(pod_phase(&decode(raw.clone())), "Init:ExitCode:3");

        raw["status"]["initContainerStatuses"][0]["state"] =
            json!({"waiting": {"reason": "ImagePullBackOff"}});
        assert_eq!(pod_phase(&decode(raw.clone())), "Init:ImagePullBackOff");

        raw["status"]["initContainerStatuses"][0]["state"] =
            json!({"waiting": {"reason": "PodInitializing"}});
        assert_eq!(pod_phase(&decode(raw.clone())), "Init:0/1");

        raw["status"]["initContainerStatuses"][0]["state"] = json!({"running": {}});
        assert_eq!(pod_phase(&decode(raw)), "Init:0/1");
    }

    #[test]
    fn container_states_scan_in_reverse() {
        let mut raw = raw_pod();
        raw["status"]["containerStatuses"] = json!([
            {"name": "a", "image": "", "imageID": "", "ready": false, "restartCount": 0,
             "state": {"waiting": {"reason": "CrashLoopBackOff"}}},
            {"name": "b", "image": "", "imageID": "", "ready": false, "restartCount": 0,
             "state": {"terminated": {"exitCode": 2}}}
        ]);
        // The first declared container is examined last and wins.
        assert_eq!(pod_phase(&decode(raw.clone())), "CrashLoopBackOff");

        raw["status"]["containerStatuses"] = json!([
            {"name": "a", "image": "", "imageID": "", "ready": false, "restartCount": 0,
             "state": {"terminated": {"exitCode": 0, "signal": 15}}}
        ]);
        assert_eq!(pod_phase(&decode(raw)), "Signal:15");
    }

    #[test]
    fn completed_with_running_sidecar_reads_running() {
        let mut raw = raw_pod();
        raw["status"]["containerStatuses"] = json!([
            {"name": "app", "image": "", "imageID": "", "ready": true, "restartCount": 0,
             "state": {"running": {}}},
            {"name": "job", "image": "", "imageID": "", "ready": false, "restartCount": 0,
             "state": {"terminated": {"exitCode": 0, "reason": "Completed"}}}
        ]);
        assert_eq!(pod_phase(&decode(raw)), "Running");
    }

    #[test]
    fn renders_fields_in_header_order() {
        let object = Object::Pod(PodWithMetrics {
            raw: raw_pod(),
            metrics: Some(PodMetrics {
                cpu_millis: 50,
                mem_bytes: 64 * 1024 * 1024,
            }),
        });
        let scope = NamespaceScope::All;
        let row = Pod.render(&object, &scope).expect("render pod");

        assert_eq!(row.id, "default/web-0");
        assert_eq!(row.fields.len(), Pod.header(&scope).len());
        assert_eq!(
            row.fields,
            vec![
                "default", "web-0", "1/1", "Running", "2", "50", "64", "25", "50", "10.0.0.7",
                "n1", "BU", "2024-01-01T00:00:00Z"
            ]
        );

        let named = NamespaceScope::Named("default".to_string());
        let row = Pod.render(&object, &named).expect("render pod");
        assert_eq!(row.fields.len(), Pod.header(&named).len());
        assert_eq!(row.fields[0], "web-0");
    }

    #[test]
    fn missing_metrics_render_na() {
        let object = Object::Pod(PodWithMetrics {
            raw: raw_pod(),
            metrics: None,
        });
        let row = Pod
            .render(&object, &NamespaceScope::Cluster)
            .expect("render pod");
        assert_eq!(&row.fields[4..8], &["n/a", "n/a", "n/a", "n/a"]);
    }

    #[test]
    fn rendering_is_idempotent() {
        let object = Object::Pod(PodWithMetrics {
            raw: raw_pod(),
            metrics: None,
        });
        let scope = NamespaceScope::All;
        assert_eq!(
            Pod.render(&object, &scope).expect("first"),
            Pod.render(&object, &scope).expect("second")
        );
    }

    #[test]
    fn rejects_foreign_objects() {
        let error = Pod
            .render(&Object::Raw(raw_pod()), &NamespaceScope::All)
            .unwrap_err();
        assert!(error.to_string().contains("expected PodWithMetrics"));

        let mut service = raw_pod();
        service["kind"] = json!("Service");
        let object = Object::Pod(PodWithMetrics {
            raw: service,
            metrics: None,
        });
        assert!(Pod.render(&object, &NamespaceScope::All).is_err());
    }

    fn event(ready: &str, status: &str, kind: EventKind) -> RowEvent {
        let fields = ["web", ready, status]
            .into_iter()
            .map(str::to_string)
            .collect();
        RowEvent::new(kind, Row::new("default/web", fields))
    }

    #[test]
    fn colors_follow_pod_health() {
        let scope = NamespaceScope::Named("default".to_string());
        let unchanged = EventKind::Unchanged;
        assert_eq!(pod_colorer(&scope, &event("1/1", "Running", unchanged)), STD_COLOR);
        assert_eq!(pod_colorer(&scope, &event("1/1", "Running", EventKind::Add)), ADD_COLOR);
        assert_eq!(pod_colorer(&scope, &event("0/1", "Running", unchanged)), ERR_COLOR);
        assert_eq!(pod_colorer(&scope, &event("1/2", "Running", unchanged)), ERR_COLOR);
        assert_eq!(
            pod_colorer(&scope, &event("0/1", "ContainerCreating", unchanged)),
            ADD_COLOR
        );
        assert_eq!(
            pod_colorer(&scope, &event("0/1", "Completed", unchanged)),
            COMPLETED_COLOR
        );
        assert_eq!(
            pod_colorer(&scope, &event("1/1", "Terminating", unchanged)),
            KILL_COLOR
        );
        assert_eq!(
            pod_colorer(&scope, &event("1/1", "CrashLoopBackOff", unchanged)),
            ERR_COLOR
        );
    }
}
