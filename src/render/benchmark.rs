use k8s_openapi::jiff::Timestamp;
use ratatui::style::Color;
use std::path::PathBuf;

use super::{ColorerFn, ERR_COLOR, Object, Renderer, age_decorator, default_colorer, mismatch};
use crate::error::{Result, SkiffError};
use crate::model::{Header, HeaderRow, NA_VALUE, NamespaceScope, Row, RowEvent};

const STATUS_COL: usize = 2;
const PASS: &str = "pass";
const FAIL: &str = "fail";

#[derive(Debug, Clone)]
pub struct BenchInfo {
    pub name: String,
    pub path: PathBuf,
    pub modified: Option<Timestamp>,
    pub report: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Benchmark;

impl Renderer for Benchmark {
    fn header(&self, _scope: &NamespaceScope) -> HeaderRow {
        HeaderRow(vec![
            Header::new("NAMESPACE"),
            Header::new("NAME"),
            Header::new("STATUS"),
            Header::right("TIME"),
            Header::right("REQ/S"),
            Header::right("2XX"),
            Header::right("4XX/5XX"),
            Header::new("REPORT"),
            Header::decorated("AGE", age_decorator),
        ])
    }

    fn render(&self, object: &Object, _scope: &NamespaceScope) -> Result<Row> {
        let Object::Bench(bench) = object else {
            return Err(mismatch("BenchInfo", object));
        };
        let (namespace, name) = split_file_name(&bench.name)?;
        let summary = Summary::parse(&bench.report);

        Ok(Row::new(
            bench.path.display().to_string(),
            vec![
                namespace.to_string(),
                name.to_string(),
                summary.status().to_string(),
                summary.total.clone().unwrap_or_else(|| NA_VALUE.to_string()),
                summary.rps.clone().unwrap_or_else(|| NA_VALUE.to_string()),
                summary.ok.to_string(),
                summary.failed.to_string(),
                bench.name.clone(),
                bench
                    .modified
                    .map(|ts| ts.to_string())
                    .unwrap_or_else(|| NA_VALUE.to_string()),
            ],
        ))
    }

    fn colorer(&self) -> ColorerFn {
        bench_colorer
    }
}

fn bench_colorer(scope: &NamespaceScope, event: &RowEvent) -> Color {
    match event.row.fields.get(STATUS_COL).map(String::as_str) {
        Some(FAIL) => ERR_COLOR,
        _ => default_colorer(scope, event),
    }
}

/// Splits `<namespace>_<name>_<timestamp>.txt` into namespace and name.
fn split_file_name(file: &str) -> Result<(&str, &str)> {
    let stem = file.strip_suffix(".txt").unwrap_or(file);
    let mut parts = stem.splitn(3, '_');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(namespace), Some(name), Some(_)) if !namespace.is_empty() && !name.is_empty() => {
            Ok((namespace, name))
        }
        _ => Err(SkiffError::render(format!(
            "invalid benchmark file name {file}"
        ))),
    }
}

#[derive(Debug, Default, PartialEq)]
struct Summary {
    total: Option<String>,
    rps: Option<String>,
    ok: u64,
    failed: u64,
    errors: bool,
}

impl Summary {
    fn parse(report: &str) -> Self {
        let mut summary = Self::default();
        let mut in_errors = false;
        for line in report.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with("Error distribution") {
                in_errors = true;
                continue;
            }
            if let Some(total) = line.strip_prefix("Total:") {
                summary.total = Some(total.trim().to_string());
            } else if let Some(rps) = line.strip_prefix("Requests/sec:") {
                summary.rps = Some(rps.trim().to_string());
            } else if let Some(rest) = line.strip_prefix('[') {
                if in_errors {
                    summary.errors = true;
                    continue;
                }
                let Some((code, count)) = rest.split_once(']') else {
                    continue;
                };
                let count = count
                    .split_whitespace()
                    .next()
                    .and_then(|count| count.parse::<u64>().ok())
                    .unwrap_or(0);
                match code.trim().chars().next() {
                    Some('2') => summary.ok += count,
                    Some('4' | '5') => summary.failed += count,
                    _ => {}
                }
            }
        }
        summary
    }

    fn status(&self) -> &'static str {
        if self.errors || self.failed > 0 {
            FAIL
        } else {
            PASS
        }
    }
}
