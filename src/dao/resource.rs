use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use super::{Accessor, Describer, Nuker, ResourceContext, describe_object};
use crate::client::{Connection, meta_str};
use crate::error::Result;
use crate::export::to_yaml;
use crate::model::{Gvr, NamespaceScope, fqn, namespaced};
use crate::render::Object;

pub struct Resource {
    gvr: Gvr,
    conn: Arc<dyn Connection>,
    cache: RwLock<HashMap<String, Value>>,
}

impl Resource {
    pub fn new(gvr: Gvr, conn: Arc<dyn Connection>) -> Self {
        Self {
            gvr,
            conn,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn gvr(&self) -> &Gvr {
        &self.gvr
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    pub(crate) async fn list_raw(
        &self,
        ctx: &ResourceContext,
        scope: &NamespaceScope,
    ) -> Result<Vec<Value>> {
        debug!("list {} in {scope}", self.gvr);
        let items = self
            .conn
            .list(&self.gvr, scope.namespace(), &ctx.selector())
            .await?;

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.retain(|path, _| !in_scope(path, scope));
        for item in &items {
            cache.insert(object_path(item), item.clone());
        }
        Ok(items)
    }

    pub(crate) async fn get_raw(&self, path: &str) -> Result<Value> {
        let cached = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned();
        if let Some(object) = cached {
            return Ok(object);
        }

        let object = self.conn.get(&self.gvr, path).await?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), object.clone());
        Ok(object)
    }
}

fn object_path(object: &Value) -> String {
    fqn(
        meta_str(object, "namespace").unwrap_or_default(),
        meta_str(object, "name").unwrap_or_default(),
    )
}

fn in_scope(path: &str, scope: &NamespaceScope) -> bool {
    match scope.namespace() {
        Some(namespace) => namespaced(path).0 == namespace,
        None => true,
    }
}

#[async_trait]
impl Accessor for Resource {
    async fn list(&self, ctx: &ResourceContext, scope: &NamespaceScope) -> Result<Vec<Object>> {
        Ok(self
            .list_raw(ctx, scope)
            .await?
            .into_iter()
            .map(Object::Raw)
            .collect())
    }

    async fn get(&self, _ctx: &ResourceContext, path: &str) -> Result<Object> {
        self.get_raw(path).await.map(Object::Raw)
    }

    fn as_nuker(&self) -> Option<&dyn Nuker> {
        Some(self)
    }

    fn as_describer(&self) -> Option<&dyn Describer> {
        Some(self)
    }
}

#[async_trait]
impl Nuker for Resource {
    async fn delete(&self, path: &str, cascade: bool, force: bool) -> Result<()> {
        debug!("delete {} {path} cascade={cascade} force={force}", self.gvr);
        self.conn.delete(&self.gvr, path, cascade, force).await?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        Ok(())
    }
}

#[async_trait]
impl Describer for Resource {
    async fn describe(&self, path: &str) -> Result<String> {
        describe_object(&self.get_raw(path).await?)
    }

    async fn to_yaml(&self, path: &str) -> Result<String> {
        to_yaml(&self.get_raw(path).await?)
    }
}
