use k8s_openapi::api::apps::v1::Deployment as KubeDeployment;
use ratatui::style::Color;

use super::helpers::{column, meta_fqn, to_age};
use super::{
    ColorerFn, ERR_COLOR, Object, Renderer, STD_COLOR, age_decorator, decode, default_colorer,
    mismatch,
};
use crate::error::Result;
use crate::model::{Header, HeaderRow, NamespaceScope, Row, RowEvent};

#[derive(Debug, Clone, Copy, Default)]
pub struct Deployment;

impl Renderer for Deployment {
    fn header(&self, scope: &NamespaceScope) -> HeaderRow {
        let mut header = Vec::with_capacity(6);
        if scope.is_all_namespaces() {
            header.push(Header::new("NAMESPACE"));
        }
        header.extend([
            Header::new("NAME"),
            Header::new("READY"),
            Header::right("UP-TO-DATE"),
            Header::right("AVAILABLE"),
            Header::decorated("AGE", age_decorator),
        ]);
        HeaderRow(header)
    }

    fn render(&self, object: &Object, scope: &NamespaceScope) -> Result<Row> {
        let Object::Raw(raw) = object else {
            return Err(mismatch("Deployment", object));
        };
        let dp: KubeDeployment = decode(raw, "Deployment")?;

        let desired = dp
            .spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(1);
        let status = dp.status.clone().unwrap_or_default();
        let available = status.available_replicas.unwrap_or(0);

        let mut fields = Vec::with_capacity(6);
        if scope.is_all_namespaces() {
            fields.push(dp.metadata.namespace.clone().unwrap_or_default());
        }
        fields.extend([
            dp.metadata.name.clone().unwrap_or_default(),
            format!("{available}/{desired}"),
            status.updated_replicas.unwrap_or(0).to_string(),
            available.to_string(),
            to_age(dp.metadata.creation_timestamp.as_ref()),
        ]);

        Ok(Row::new(meta_fqn(&dp.metadata), fields))
    }

    fn colorer(&self) -> ColorerFn {
        deployment_colorer
    }
}

fn deployment_colorer(scope: &NamespaceScope, event: &RowEvent) -> Color {
    if event.kind.is_fresh() {
        return default_colorer(scope, event);
    }

    let ready_col = column(1, scope.is_all_namespaces());
    match event
        .row
        .fields
        .get(ready_col)
        .and_then(|ready| ready.trim().split_once('/'))
    {
        Some((ready, desired)) if ready == desired => STD_COLOR,
        _ => ERR_COLOR,
    }
}

#[cfg(test)]
mod tests {
    use super::{Deployment, deployment_colorer};
    use crate::model::{EventKind, NamespaceScope, Row, RowEvent};
    use crate::render::{ADD_COLOR, ERR_COLOR, MOD_COLOR, Object, Renderer, STD_COLOR};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn raw_deployment(available: i32) -> serde_json::Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": "api",
                "namespace": "shop",
                "creationTimestamp": "2024-03-01T10:00:00Z"
            },
            "spec": {
                "replicas": 3,
                "selector": {"matchLabels": {"app": "api"}},
                "template": {}
            },
            "status": {"availableReplicas": available, "updatedReplicas": 3}
        })
    }

    #[test]
    fn renders_ready_as_available_over_desired() {
        let scope = NamespaceScope::All;
        let row = Deployment
            .render(&Object::Raw(raw_deployment(2)), &scope)
            .expect("render deployment");

        assert_eq!(row.id, "shop/api");
        assert_eq!(
            row.fields,
            vec!["shop", "api", "2/3", "3", "2", "2024-03-01T10:00:00Z"]
        );
        assert_eq!(row.fields.len(), Deployment.header(&scope).len());
    }

    #[test]
    fn replicas_default_to_one() {
        let mut raw = raw_deployment(1);
        raw["spec"].as_object_mut().expect("spec").remove("replicas");
        let scope = NamespaceScope::Named("shop".to_string());
        let row = Deployment
            .render(&Object::Raw(raw), &scope)
            .expect("render deployment");
        assert_eq!(row.fields[1], "1/1");
        assert_eq!(row.fields.len(), Deployment.header(&scope).len());
    }

    #[test]
    fn rejects_other_kinds() {
        let mut raw = raw_deployment(1);
        raw["kind"] = json!("StatefulSet");
        assert!(
            Deployment
                .render(&Object::Raw(raw), &NamespaceScope::All)
                .is_err()
        );
    }

    #[test]
    fn steady_rows_color_on_readiness() {
        let scope = NamespaceScope::Named("shop".to_string());
        let event = |ready: &str, kind| {
            RowEvent::new(
                kind,
                Row::new("shop/api", vec!["api".to_string(), ready.to_string()]),
            )
        };

        assert_eq!(
            deployment_colorer(&scope, &event("3/3", EventKind::Unchanged)),
            STD_COLOR
        );
        assert_eq!(
            deployment_colorer(&scope, &event("2/3", EventKind::Unchanged)),
            ERR_COLOR
        );
        assert_eq!(
            deployment_colorer(&scope, &event("2/3", EventKind::Add)),
            ADD_COLOR
        );
        assert_eq!(
            deployment_colorer(&scope, &event("2/3", EventKind::Update)),
            MOD_COLOR
        );
        assert_eq!(
            deployment_colorer(&scope, &event("garbage", EventKind::Unchanged)),
            ERR_COLOR
        );
    }
}
