//! Apply raw YAML manifests to a test cluster
//!
//! Works like `kubectl apply --server-side`: every document is resolved
//! through API discovery and patched with the configured field manager.

use kube::{
    api::{Api, DynamicObject, Patch, PatchParams},
    core::GroupVersionKind,
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
    Client, ResourceExt,
};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};

/// Applies manifests on behalf of one field manager
#[derive(Clone)]
pub struct ManifestApplier {
    client: Client,
    field_manager: String,
    namespace: String,
}

impl ManifestApplier {
    pub fn new(client: Client, field_manager: &str, namespace: &str) -> Self {
        Self {
            client,
            field_manager: field_manager.to_string(),
            namespace: namespace.to_string(),
        }
    }

    pub fn field_manager(&self) -> &str {
        &self.field_manager
    }

    /// Apply every document in `manifest`. Returns the names of the applied
    /// objects in document order.
    #[instrument(skip(self, manifest), fields(field_manager = %self.field_manager))]
    pub async fn apply(&self, manifest: &[u8]) -> Result<Vec<String>> {
        let documents = parse_documents(manifest)?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let discovery = Discovery::new(self.client.clone()).run().await?;
        let params = PatchParams::apply(&self.field_manager).force();

        let mut applied = Vec::with_capacity(documents.len());
        for obj in documents {
            let gvk = gvk_of(&obj)?;
            let (resource, caps) = discovery.resolve_gvk(&gvk).ok_or_else(|| {
                Error::manifest(format!(
                    "kind {} in {}/{} is not served by the cluster",
                    gvk.kind, gvk.group, gvk.version
                ))
            })?;

            let name = obj.name_any();
            let api = self.dynamic_api(&resource, &caps, obj.metadata.namespace.as_deref());
            api.patch(&name, &params, &Patch::Apply(&obj)).await?;

            info!(kind = %gvk.kind, name = %name, "Applied manifest");
            applied.push(name);
        }

        Ok(applied)
    }

    fn dynamic_api(
        &self,
        resource: &ApiResource,
        caps: &ApiCapabilities,
        namespace: Option<&str>,
    ) -> Api<DynamicObject> {
        if caps.scope == Scope::Cluster {
            Api::all_with(self.client.clone(), resource)
        } else {
            let ns = namespace.unwrap_or(&self.namespace);
            Api::namespaced_with(self.client.clone(), ns, resource)
        }
    }
}

/// Split a multi-document YAML stream into objects, skipping empty documents
pub fn parse_documents(manifest: &[u8]) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_slice(manifest) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        let obj: DynamicObject = serde_yaml::from_value(value)?;
        if obj.metadata.name.is_none() {
            return Err(Error::manifest("manifest document without metadata.name"));
        }
        debug!(name = ?obj.metadata.name, "Parsed manifest document");
        objects.push(obj);
    }
    Ok(objects)
}

fn gvk_of(obj: &DynamicObject) -> Result<GroupVersionKind> {
    let types = obj.types.as_ref().ok_or_else(|| {
        Error::manifest(format!("object {} has no apiVersion/kind", obj.name_any()))
    })?;

    let (group, version) = match types.api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", types.api_version.as_str()),
    };
    Ok(GroupVersionKind::gvk(group, version, &types.kind))
}
