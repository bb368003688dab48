use k8s_openapi::api::core::v1::PersistentVolume as KubePersistentVolume;
use ratatui::style::Color;

use super::helpers::{meta_fqn, to_age};
use super::{
    ColorerFn, ERR_COLOR, Object, Renderer, STD_COLOR, WARN_COLOR, age_decorator, decode,
    default_colorer, mismatch,
};
use crate::error::Result;
use crate::model::{Header, HeaderRow, NamespaceScope, Row, RowEvent};

const BETA_STORAGE_CLASS_ANNOTATION: &str = "volume.beta.kubernetes.io/storage-class";
const STATUS_COL: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
pub struct PersistentVolume;

impl Renderer for PersistentVolume {
    fn header(&self, _scope: &NamespaceScope) -> HeaderRow {
        HeaderRow(vec![
            Header::new("NAME"),
            Header::new("CAPACITY"),
            Header::new("ACCESS MODES"),
            Header::new("RECLAIM POLICY"),
            Header::new("STATUS"),
            Header::new("CLAIM"),
            Header::new("STORAGECLASS"),
            Header::new("REASON"),
            Header::decorated("AGE", age_decorator),
        ])
    }

    fn render(&self, object: &Object, _scope: &NamespaceScope) -> Result<Row> {
        let Object::Raw(raw) = object else {
            return Err(mismatch("PersistentVolume", object));
        };
        let pv: KubePersistentVolume = decode(raw, "PersistentVolume")?;
        let spec = pv.spec.clone().unwrap_or_default();
        let status = pv.status.clone().unwrap_or_default();

        let phase = if pv.metadata.deletion_timestamp.is_some() {
            "Terminating".to_string()
        } else {
            status.phase.unwrap_or_default()
        };
        let claim = spec
            .claim_ref
            .as_ref()
            .map(|claim| {
                let namespace = claim.namespace.as_deref().unwrap_or_default();
                let name = claim.name.as_deref().unwrap_or_default();
                match (namespace.is_empty(), name.is_empty()) {
                    (true, _) => name.to_string(),
                    (false, true) => namespace.to_string(),
                    (false, false) => format!("{namespace}/{name}"),
                }
            })
            .unwrap_or_default();
        let class = pv
            .metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(BETA_STORAGE_CLASS_ANNOTATION))
            .cloned()
            .or(spec.storage_class_name.clone())
            .unwrap_or_default();
        let size = spec
            .capacity
            .as_ref()
            .and_then(|capacity| capacity.get("storage"))
            .map(|quantity| quantity.0.clone())
            .unwrap_or_else(|| "0".to_string());

        Ok(Row::new(
            meta_fqn(&pv.metadata),
            vec![
                pv.metadata.name.clone().unwrap_or_default(),
                size,
                access_modes(spec.access_modes.as_deref().unwrap_or_default()),
                spec.persistent_volume_reclaim_policy.unwrap_or_default(),
                phase,
                claim,
                class,
                status.reason.unwrap_or_default(),
                to_age(pv.metadata.creation_timestamp.as_ref()),
            ],
        ))
    }

    fn colorer(&self) -> ColorerFn {
        pv_colorer
    }
}

fn pv_colorer(scope: &NamespaceScope, event: &RowEvent) -> Color {
    if event.kind.is_fresh() {
        return default_colorer(scope, event);
    }

    match event.row.fields.get(STATUS_COL).map(|status| status.trim()) {
        Some("Bound") => STD_COLOR,
        Some("Available") => WARN_COLOR,
        _ => ERR_COLOR,
    }
}

/// Short access mode names, first occurrence order, without repeats.
fn access_modes(modes: &[String]) -> String {
    let mut seen: Vec<&str> = Vec::with_capacity(modes.len());
    for mode in modes {
        let short = match mode.as_str() {
            "ReadWriteOnce" => "RWO",
            "ReadOnlyMany" => "ROX",
            "ReadWriteMany" => "RWX",
            "ReadWriteOncePod" => "RWOP",
            _ => continue,
        };
        if !seen.contains(&short) {
            seen.push(short);
        }
    }
    seen.join(",")
}

#[cfg(test)]
mod tests {
    use super::{PersistentVolume, access_modes, pv_colorer};
    use crate::model::{EventKind, NamespaceScope, Row, RowEvent};
    use crate::render::{ADD_COLOR, ERR_COLOR, Object, Renderer, STD_COLOR, WARN_COLOR};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn raw_pv() -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "PersistentVolume",
            "metadata": {
                "name": "pv-data",
                "creationTimestamp": "2024-02-01T00:00:00Z",
                "annotations": {"volume.beta.kubernetes.io/storage-class": "legacy"}
            },
            "spec": {
                "capacity": {"storage": "10Gi"},
                "accessModes": ["ReadWriteOnce", "ReadWriteOnce", "ReadOnlyMany"],
                "persistentVolumeReclaimPolicy": "Retain",
                "storageClassName": "standard",
                "claimRef": {"namespace": "db", "name": "data-0"}
            },
            "status": {"phase": "Bound"}
        })
    }

    #[test]
    fn renders_cluster_scoped_row() {
        let scope = NamespaceScope::Cluster;
        let row = PersistentVolume
            .render(&Object::Raw(raw_pv()), &scope)
            .expect("render pv");

        assert_eq!(row.id, "pv-data");
        assert_eq!(
            row.fields,
            vec![
                "pv-data",
                "10Gi",
                "RWO,ROX",
                "Retain",
                "Bound",
                "db/data-0",
                "legacy",
                "",
                "2024-02-01T00:00:00Z"
            ]
        );
        assert_eq!(row.fields.len(), PersistentVolume.header(&scope).len());
    }

    #[test]
    fn storage_class_falls_back_to_spec() {
        let mut raw = raw_pv();
        raw["metadata"]
            .as_object_mut()
            .expect("metadata")
            .remove("annotations");
        let row = PersistentVolume
            .render(&Object::Raw(raw), &NamespaceScope::Cluster)
            .expect("render pv");
        assert_eq!(row.fields[6], "standard");
    }

    #[test]
    fn deleting_volume_is_terminating() {
        let mut raw = raw_pv();
        raw["metadata"]["deletionTimestamp"] = json!("2024-02-02T00:00:00Z");
        let row = PersistentVolume
            .render(&Object::Raw(raw), &NamespaceScope::Cluster)
            .expect("render pv");
        assert_eq!(row.fields[4], "Terminating");
    }

    #[test]
    fn access_modes_are_deduplicated() {
        let modes = ["ReadWriteMany", "ReadWriteOnce", "ReadWriteMany"].map(str::to_string);
        assert_eq!(access_modes(&modes), "RWX,RWO");
        assert_eq!(access_modes(&[]), "");
    }

    #[test]
    fn status_drives_steady_color() {
        let scope = NamespaceScope::Cluster;
        let event = |status: &str, kind| {
            let fields = ["pv", "1Gi", "RWO", "Retain", status]
                .into_iter()
                .map(str::to_string)
                .collect();
            RowEvent::new(kind, Row::new("pv", fields))
        };

        assert_eq!(pv_colorer(&scope, &event("Bound", EventKind::Unchanged)), STD_COLOR);
        assert_eq!(
            pv_colorer(&scope, &event("Available", EventKind::Unchanged)),
            WARN_COLOR
        );
        assert_eq!(
            pv_colorer(&scope, &event("Released", EventKind::Unchanged)),
            ERR_COLOR
        );
        assert_eq!(pv_colorer(&scope, &event("Released", EventKind::Add)), ADD_COLOR);
    }
}
