//! Catalog kinds used by the demo server, the examples and the test suites.
//!
//! `Broker` is cluster-scoped, `ServiceInstance` is namespaced.

use serde::{Deserialize, Serialize};

use crate::{ListMeta, ObjectMeta, Resource, ResourceList};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerSpec {
    #[serde(rename = "URL", default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broker {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: BrokerSpec,
}

impl Broker {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::named("", name),
            spec: BrokerSpec { url: url.into() },
        }
    }
}

impl Resource for Broker {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerList {
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default)]
    pub items: Vec<Broker>,
}

impl ResourceList for BrokerList {
    type Item = Broker;

    fn items(&self) -> &[Broker] {
        &self.items
    }

    fn items_mut(&mut self) -> &mut Vec<Broker> {
        &mut self.items
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstanceSpec {
    #[serde(default)]
    pub service_class_name: String,
    #[serde(default)]
    pub plan_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ServiceInstanceSpec,
}

impl ServiceInstance {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        service_class_name: impl Into<String>,
        plan_name: impl Into<String>,
    ) -> Self {
        Self {
            metadata: ObjectMeta::named(namespace, name),
            spec: ServiceInstanceSpec {
                service_class_name: service_class_name.into(),
                plan_name: plan_name.into(),
            },
        }
    }
}

impl Resource for ServiceInstance {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstanceList {
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default)]
    pub items: Vec<ServiceInstance>,
}

impl ResourceList for ServiceInstanceList {
    type Item = ServiceInstance;

    fn items(&self) -> &[ServiceInstance] {
        &self.items
    }

    fn items_mut(&mut self) -> &mut Vec<ServiceInstance> {
        &mut self.items
    }
}
