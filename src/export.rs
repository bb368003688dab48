use chrono::Utc;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Result, SkiffError};
use crate::model::{NAMESPACE_ALL, NamespaceScope, TableData};

/// Builds the export path for a table snapshot. Everything is lower-cased.
pub fn compute_filename(
    dump_dir: &Path,
    cluster: &str,
    scope: &NamespaceScope,
    title: &str,
    path: &str,
    unix_nanos: i64,
) -> PathBuf {
    let name = if path.is_empty() {
        title.to_string()
    } else {
        format!("{title}-{}", path.replace('/', "-"))
    };
    let file = if path.is_empty() && scope.is_cluster_wide() {
        format!("{name}-{unix_nanos}.csv")
    } else {
        let namespace = if scope.is_cluster_wide() {
            NAMESPACE_ALL.to_string()
        } else {
            scope.label().replace('/', "-")
        };
        format!("{name}-{namespace}-{unix_nanos}.csv")
    };

    dump_dir
        .join(sanitize(cluster).to_lowercase())
        .join(file.to_lowercase())
}

fn sanitize(name: &str) -> String {
    name.replace(['/', ':', '\\'], "-")
}

pub fn save_table(
    dump_dir: &Path,
    cluster: &str,
    title: &str,
    path: &str,
    data: &TableData,
) -> Result<PathBuf> {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let target = compute_filename(dump_dir, cluster, &data.namespace, title, path, nanos);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    debug!("saving table to {}", target.display());

    let mut out = fs::File::create(&target)?;
    write_record(&mut out, &data.header.columns())?;
    for event in data.sorted_events() {
        write_record(&mut out, &event.row.fields)?;
    }
    out.flush()?;
    Ok(target)
}

fn write_record(out: &mut impl Write, fields: &[String]) -> Result<()> {
    let line = fields
        .iter()
        .map(|field| quote(field))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(out, "{line}")?;
    Ok(())
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) || field.starts_with(' ') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn to_yaml(object: &Value) -> Result<String> {
    if object.is_null() {
        return Err(SkiffError::Marshal("no object to yamlize".to_string()));
    }
    let mut object = object.clone();
    if let Some(meta) = object.get_mut("metadata").and_then(Value::as_object_mut) {
        meta.remove("managedFields");
    }
    Ok(serde_yaml::to_string(&object)?)
}

#[cfg(test)]
mod tests {
    use super::{compute_filename, quote, save_table, to_yaml};
    use crate::model::{EventKind, Header, HeaderRow, NamespaceScope, Row, RowEvent, TableData};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use std::fs;
    use std::path::{Path, PathBuf};

    #[test]
    fn filenames_are_deterministic_and_lower_cased() {
        let dir = Path::new("/dump");
        assert_eq!(
            compute_filename(
                dir,
                "Prod",
                &NamespaceScope::Named("Shop".to_string()),
                "Pods",
                "shop/api-0",
                42
            ),
            PathBuf::from("/dump/prod/pods-shop-api-0-shop-42.csv")
        );
        assert_eq!(
            compute_filename(dir, "prod", &NamespaceScope::All, "Pods", "", 7),
            PathBuf::from("/dump/prod/pods-7.csv")
        );
        assert_eq!(
            compute_filename(dir, "prod", &NamespaceScope::Cluster, "Nodes", "n1", 7),
            PathBuf::from("/dump/prod/nodes-n1-all-7.csv")
        );
        assert_eq!(
            compute_filename(
                dir,
                "arn:aws:eks/prod",
                &NamespaceScope::Named("default".to_string()),
                "Pods",
                "",
                1
            ),
            PathBuf::from("/dump/arn-aws-eks-prod/pods-default-1.csv")
        );
    }

    #[test]
    fn csv_has_header_then_one_line_per_row() {
        let dir = tempfile::tempdir().expect("tempdir");
        let header = HeaderRow(vec![Header::new("NAME"), Header::new("LABELS")]);
        let mut data = TableData::new(NamespaceScope::Named("default".to_string()), header);
        for (id, labels) in [("b", "app=web,tier=front"), ("a", "say \"hi\"")] {
            let row = Row::new(id, vec![id.to_string(), labels.to_string()]);
            data.row_events
                .insert(id.to_string(), RowEvent::new(EventKind::Unchanged, row));
        }

        let file = save_table(dir.path(), "kind", "Pods", "", &data).expect("save");
        assert!(file.starts_with(dir.path().join("kind")));
        let content = fs::read_to_string(&file).expect("read");
        assert_eq!(
            content.lines().collect::<Vec<_>>(),
            vec![
                "NAME,LABELS",
                "a,\"say \"\"hi\"\"\"",
                "b,\"app=web,tier=front\""
            ]
        );
    }

    #[test]
    fn quoting_only_when_needed() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("a,b"), "\"a,b\"");
        assert_eq!(quote("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn yaml_drops_managed_fields() {
        let yaml = to_yaml(&json!({
            "metadata": {"name": "web", "managedFields": [{"manager": "kubectl"}]},
            "spec": {"replicas": 2}
        }))
        .expect("yaml");
        assert!(yaml.contains("name: web"));
        assert!(yaml.contains("replicas: 2"));
        assert!(!yaml.contains("managedFields"));

        assert!(to_yaml(&Value::Null).is_err());
    }
}
