//! kube-rs implementation of [`KubeResources`]

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

use ella_common::{kube_utils, FIELD_MANAGER};

use super::{KubeResources, NetworkAttachmentDefinition};
use crate::Error;

/// Real Kubernetes client scoped to the unit's namespace
pub struct KubeResourcesImpl {
    client: Client,
    namespace: String,
}

impl KubeResourcesImpl {
    /// Create a client for objects in `namespace`
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = kube::core::NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn get_opt<K>(&self, name: &str) -> Result<Option<K>, Error>
    where
        K: Resource<Scope = kube::core::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
        <K as Resource>::DynamicType: Default,
    {
        match self.api::<K>().get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if kube_utils::is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create<K>(&self, obj: &K) -> Result<(), Error>
    where
        K: Resource<Scope = kube::core::NamespaceResourceScope>
            + Clone
            + Serialize
            + DeserializeOwned
            + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        match self.api::<K>().create(&params, obj).await {
            Ok(_) => Ok(()),
            Err(e) if kube_utils::is_already_exists(&e) => Err(Error::already_exists(
                K::kind(&Default::default()).to_string(),
                obj.name_any(),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl KubeResources for KubeResourcesImpl {
    async fn get_network_attachment(
        &self,
        name: &str,
    ) -> Result<Option<NetworkAttachmentDefinition>, Error> {
        self.get_opt(name).await
    }

    async fn create_network_attachment(
        &self,
        nad: &NetworkAttachmentDefinition,
    ) -> Result<(), Error> {
        self.create(nad).await
    }

    async fn get_statefulset(&self, name: &str) -> Result<Option<StatefulSet>, Error> {
        self.get_opt(name).await
    }

    async fn patch_statefulset(
        &self,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), Error> {
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.api::<StatefulSet>()
            .patch(name, &params, &Patch::Strategic(patch))
            .await?;
        Ok(())
    }

    async fn replace_statefulset(&self, statefulset: &StatefulSet) -> Result<(), Error> {
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.api::<StatefulSet>()
            .replace(&statefulset.name_any(), &params, statefulset)
            .await?;
        Ok(())
    }

    async fn get_service(&self, name: &str) -> Result<Option<Service>, Error> {
        self.get_opt(name).await
    }

    async fn create_service(&self, service: &Service) -> Result<(), Error> {
        self.create(service).await
    }
}
