use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{Accessor, Describer, Nuker, Resource, ResourceContext};
use crate::client::Connection;
use crate::error::Result;
use crate::model::{Gvr, NamespaceScope};
use crate::render::{GenericRow, Object};

pub struct GenericAccessor {
    resource: Resource,
}

impl GenericAccessor {
    pub fn new(gvr: Gvr, conn: Arc<dyn Connection>) -> Self {
        Self {
            resource: Resource::new(gvr, conn),
        }
    }
}

#[async_trait]
impl Accessor for GenericAccessor {
    async fn list(&self, ctx: &ResourceContext, scope: &NamespaceScope) -> Result<Vec<Object>> {
        let gvr = self.resource.gvr();
        debug!("table list {gvr} in {scope}");
        let table = self
            .resource
            .connection()
            .list_table(gvr, scope.namespace(), &ctx.selector())
            .await?;

        let columns = Arc::new(table.column_definitions);
        Ok(table
            .rows
            .into_iter()
            .map(|row| {
                Object::TableRow(GenericRow {
                    columns: columns.clone(),
                    row,
                })
            })
            .collect())
    }

    async fn get(&self, ctx: &ResourceContext, path: &str) -> Result<Object> {
        self.resource.get(ctx, path).await
    }

    fn as_nuker(&self) -> Option<&dyn Nuker> {
        Some(&self.resource)
    }

    fn as_describer(&self) -> Option<&dyn Describer> {
        Some(&self.resource)
    }
}
