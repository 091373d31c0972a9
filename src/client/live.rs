//! kube-rs backed [`TargetClient`]

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams};
use kube::Client;
use serde_json::Value;
use tracing::{debug, trace};

use super::schema::{SchemaDefinition, SchemaRegistry};
use super::{Manifest, ResourceRef, TargetClient};
use crate::{Error, Result};

/// Target client talking to a live cluster through kube-rs
#[derive(Clone)]
pub struct KubeTargetClient {
    client: Client,
    schemas: Arc<SchemaRegistry>,
    field_manager: String,
}

impl KubeTargetClient {
    /// Wrap a kube client with an empty schema registry
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            schemas: Arc::new(SchemaRegistry::new()),
            field_manager: field_manager.into(),
        }
    }

    /// Register the kinds of a schema definition; repeated calls are no-ops
    pub fn extend_schema(&self, definition: &SchemaDefinition) -> usize {
        self.schemas.register(definition)
    }

    /// Registered schemas
    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// The underlying kube client
    pub fn kube_client(&self) -> &Client {
        &self.client
    }

    fn api_for(&self, resource: &ResourceRef) -> Result<Api<DynamicObject>> {
        let ar = self.schemas.resolve(&resource.api_version, &resource.kind)?;
        Ok(match &resource.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        })
    }
}

#[async_trait]
impl TargetClient for KubeTargetClient {
    async fn apply(&self, manifest: &Manifest) -> Result<()> {
        let resource = manifest.reference();
        let api = self.api_for(resource)?;
        let params = PatchParams::apply(&self.field_manager).force();
        api.patch(&resource.name, &params, &Patch::Apply(manifest.body()))
            .await?;
        trace!(resource = %resource, "applied");
        Ok(())
    }

    async fn get(&self, resource: &ResourceRef) -> Result<Option<Value>> {
        let api = self.api_for(resource)?;
        match api.get_opt(&resource.name).await? {
            Some(obj) => serde_json::to_value(&obj)
                .map(Some)
                .map_err(|e| Error::serialization_for_kind(&resource.kind, e.to_string())),
            None => Ok(None),
        }
    }

    async fn delete(&self, resource: &ResourceRef) -> Result<bool> {
        let api = self.api_for(resource)?;
        match api.delete(&resource.name, &DeleteParams::default()).await {
            Ok(_) => {
                debug!(resource = %resource, "deleted");
                Ok(true)
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
