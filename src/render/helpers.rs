use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::jiff::Timestamp;
use std::collections::BTreeMap;

use crate::model::{MISSING_VALUE, NA_VALUE, fqn};

pub(crate) fn meta_fqn(meta: &ObjectMeta) -> String {
    fqn(
        meta.namespace.as_deref().unwrap_or_default(),
        meta.name.as_deref().unwrap_or_default(),
    )
}

pub(crate) fn na(value: Option<&str>) -> String {
    check(value, NA_VALUE)
}

pub(crate) fn missing(value: Option<&str>) -> String {
    check(value, MISSING_VALUE)
}

fn check(value: Option<&str>, substitute: &str) -> String {
    match value {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => substitute.to_string(),
    }
}

/// Stores creation time verbatim so rows stay identical across polls; the
/// AGE header decorator humanizes it at display time.
pub fn to_age(timestamp: Option<&Time>) -> String {
    timestamp
        .map(|time| time.0.to_string())
        .unwrap_or_else(|| NA_VALUE.to_string())
}

pub fn age_decorator(value: &str) -> String {
    match value.parse::<Timestamp>() {
        Ok(ts) => {
            let elapsed = (Timestamp::now().as_second() - ts.as_second()).max(0);
            format_elapsed_seconds(elapsed)
        }
        Err(_) => value.to_string(),
    }
}

pub fn format_elapsed_seconds(seconds: i64) -> String {
    if seconds >= 86_400 {
        return format!("{}d", seconds / 86_400);
    }

    if seconds >= 3_600 {
        return format!("{}h", seconds / 3_600);
    }

    if seconds >= 60 {
        return format!("{}m", seconds / 60);
    }

    format!("{seconds}s")
}

pub(crate) fn map_to_str(map: Option<&BTreeMap<String, String>>) -> String {
    match map {
        Some(map) if !map.is_empty() => map
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(","),
        _ => MISSING_VALUE.to_string(),
    }
}

/// Index of `base` shifted right by one when the NAMESPACE column leads.
pub(crate) fn column(base: usize, all_namespaces: bool) -> usize {
    if all_namespaces { base + 1 } else { base }
}

#[cfg(test)]
mod tests {
    use super::{age_decorator, format_elapsed_seconds, map_to_str, na};
    use std::collections::BTreeMap;

    #[test]
    fn elapsed_seconds_use_largest_unit() {
        assert_eq!(format_elapsed_seconds(42), "42s");
        assert_eq!(format_elapsed_seconds(125), "2m");
        assert_eq!(format_elapsed_seconds(7_200), "2h");
        assert_eq!(format_elapsed_seconds(259_200), "3d");
    }

    #[test]
    fn age_decorator_passes_through_non_timestamps() {
        assert_eq!(age_decorator("5d"), "5d");
        assert_eq!(age_decorator("n/a"), "n/a");
        assert!(age_decorator("2020-01-01T00:00:00Z").ends_with('d'));
    }

    #[test]
    fn blanks_render_as_placeholders() {
        assert_eq!(na(None), "n/a");
        assert_eq!(na(Some("")), "n/a");
        assert_eq!(na(Some("10.0.0.1")), "10.0.0.1");

        let mut labels = BTreeMap::new();
        assert_eq!(map_to_str(Some(&labels)), "<none>");
        labels.insert("tier".to_string(), "db".to_string());
        labels.insert("app".to_string(), "web".to_string());
        assert_eq!(map_to_str(Some(&labels)), "app=web,tier=db");
    }
}
