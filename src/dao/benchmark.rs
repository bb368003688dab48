use async_trait::async_trait;
use k8s_openapi::jiff::Timestamp;
use tracing::debug;

use super::{Accessor, Nuker, ResourceContext};
use crate::error::{Result, SkiffError};
use crate::model::NamespaceScope;
use crate::render::{BenchInfo, Object};

#[derive(Debug, Clone, Copy, Default)]
pub struct BenchmarkAccessor;

#[async_trait]
impl Accessor for BenchmarkAccessor {
    async fn list(&self, ctx: &ResourceContext, scope: &NamespaceScope) -> Result<Vec<Object>> {
        let dir = ctx
            .dir
            .as_ref()
            .ok_or(SkiffError::Context { key: "dir" })?;
        debug!("list benchmarks in {}", dir.display());

        let prefix = scope.namespace().map(|namespace| format!("{namespace}_"));
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut reports = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if prefix
                .as_deref()
                .is_some_and(|prefix| !name.starts_with(prefix))
            {
                continue;
            }
            let path = entry.path();
            let report = tokio::fs::read_to_string(&path).await?;
            let modified = metadata
                .modified()
                .ok()
                .and_then(|time| Timestamp::try_from(time).ok());
            reports.push(BenchInfo {
                name,
                path,
                modified,
                report,
            });
        }
        reports.sort_by(|left, right| left.name.cmp(&right.name));

        Ok(reports.into_iter().map(Object::Bench).collect())
    }

    async fn get(&self, _ctx: &ResourceContext, path: &str) -> Result<Object> {
        panic!("benchmark reports cannot be fetched individually: {path}");
    }

    fn as_nuker(&self) -> Option<&dyn Nuker> {
        Some(self)
    }
}

#[async_trait]
impl Nuker for BenchmarkAccessor {
    async fn delete(&self, path: &str, _cascade: bool, _force: bool) -> Result<()> {
        debug!("delete benchmark {path}");
        tokio::fs::remove_file(path)
            .await
            .map_err(|error| SkiffError::Delete {
                path: path.to_string(),
                details: error.to_string(),
            })
    }
}
