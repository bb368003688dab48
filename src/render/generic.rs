use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};

use super::{Object, Renderer, age_decorator, mismatch};
use crate::client::{ColumnDefinition, TableRow};
use crate::error::{Result, SkiffError};
use crate::model::{Header, HeaderRow, NamespaceScope, Row, fqn};

const AGE_TABLE_COL: &str = "Age";

/// One server-side table row together with the column definitions it was
/// listed with.
#[derive(Debug, Clone)]
pub struct GenericRow {
    pub columns: Arc<Vec<ColumnDefinition>>,
    pub row: TableRow,
}

#[derive(Debug, Default)]
pub struct Generic {
    columns: RwLock<Arc<Vec<ColumnDefinition>>>,
}

impl Generic {
    pub fn with_columns(columns: Vec<ColumnDefinition>) -> Self {
        Self {
            columns: RwLock::new(Arc::new(columns)),
        }
    }

    fn columns(&self) -> Arc<Vec<ColumnDefinition>> {
        self.columns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn age_index(columns: &[ColumnDefinition]) -> Option<usize> {
    columns
        .iter()
        .position(|column| column.name == AGE_TABLE_COL)
}

impl Renderer for Generic {
    fn header(&self, scope: &NamespaceScope) -> HeaderRow {
        let columns = self.columns();
        if columns.is_empty() {
            return HeaderRow::default();
        }

        let mut header = Vec::with_capacity(columns.len() + 1);
        if scope.is_all_namespaces() {
            header.push(Header::new("NAMESPACE"));
        }
        header.extend(
            columns
                .iter()
                .filter(|column| column.name != AGE_TABLE_COL)
                .map(|column| Header::new(column.name.to_uppercase())),
        );
        if age_index(&columns).is_some() {
            header.push(Header::decorated("AGE", age_decorator));
        }
        HeaderRow(header)
    }

    fn render(&self, object: &Object, scope: &NamespaceScope) -> Result<Row> {
        let Object::TableRow(generic) = object else {
            return Err(mismatch("TableRow", object));
        };
        let row = &generic.row;
        let namespace = resource_namespace(&row.object)?;
        let name = row
            .cells
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| {
                SkiffError::render(format!(
                    "expecting cell 0 to be a string but got {}",
                    row.cells.first().map(json_type).unwrap_or("nothing")
                ))
            })?;

        let age = age_index(&generic.columns);
        let mut fields = Vec::with_capacity(row.cells.len() + 1);
        if scope.is_all_namespaces() {
            fields.push(namespace.clone().unwrap_or_default());
        }
        fields.extend(
            row.cells
                .iter()
                .enumerate()
                .filter(|(index, _)| Some(*index) != age)
                .map(|(_, cell)| cell_text(cell)),
        );
        if let Some(index) = age {
            let created = row
                .object
                .get("metadata")
                .and_then(|meta| meta.get("creationTimestamp"))
                .and_then(Value::as_str);
            fields.push(match created {
                Some(created) => created.to_string(),
                None => row.cells.get(index).map(cell_text).unwrap_or_default(),
            });
        }

        Ok(Row::new(
            fqn(namespace.as_deref().unwrap_or_default(), name),
            fields,
        ))
    }

    fn prepare(&self, objects: &[Object]) {
        let Some(columns) = objects.iter().find_map(|object| match object {
            Object::TableRow(row) => Some(row.columns.clone()),
            _ => None,
        }) else {
            return;
        };
        *self
            .columns
            .write()
            .unwrap_or_else(PoisonError::into_inner) = columns;
    }
}

/// Namespace embedded in a row's metadata payload. `None` means cluster scoped.
fn resource_namespace(object: &Value) -> Result<Option<String>> {
    let meta = object
        .get("metadata")
        .and_then(Value::as_object)
        .ok_or_else(|| SkiffError::type_error("no metadata found on generic resource"))?;
    match meta.get("namespace") {
        None => Ok(None),
        Some(Value::String(namespace)) => Ok(Some(namespace.clone())),
        Some(other) => Err(SkiffError::type_error(format!(
            "expecting namespace string type but got {}",
            json_type(other)
        ))),
    }
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
