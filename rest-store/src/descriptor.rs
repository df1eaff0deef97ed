use std::fmt;

use serde::{Deserialize, Serialize};
use shared_types::{Resource, ResourceList};

use crate::error::Result;
use crate::unstructured::{from_generic, Unstructured};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Namespaced,
    /// Addressed through the default namespace, which callers never see
    Cluster,
}

/// Everything the store needs to know about one kind, fixed at construction.
pub struct ResourceDescriptor<T, L> {
    pub kind: String,
    pub scope: Scope,
    /// Decode target for a single object, pre-populated with namespace and name
    pub new_instance: fn(&str, &str) -> T,
    pub new_list: fn() -> L,
}

impl<T, L> ResourceDescriptor<T, L>
where
    T: Resource,
    L: ResourceList<Item = T>,
{
    pub fn namespaced(
        kind: impl Into<String>,
        new_instance: fn(&str, &str) -> T,
        new_list: fn() -> L,
    ) -> Self {
        Self {
            kind: kind.into(),
            scope: Scope::Namespaced,
            new_instance,
            new_list,
        }
    }

    pub fn cluster(
        kind: impl Into<String>,
        new_instance: fn(&str, &str) -> T,
        new_list: fn() -> L,
    ) -> Self {
        Self {
            kind: kind.into(),
            scope: Scope::Cluster,
            new_instance,
            new_list,
        }
    }

    pub fn is_namespaced(&self) -> bool {
        self.scope == Scope::Namespaced
    }

    /// Clears the addressing namespace from inbound cluster-scoped objects.
    pub(crate) fn strip_addressing(&self, object: &mut Unstructured) {
        if self.scope == Scope::Cluster {
            object.strip_namespace();
        }
    }

    pub(crate) fn decode_object(&self, mut generic: Unstructured) -> Result<T> {
        self.strip_addressing(&mut generic);
        let shell = (self.new_instance)(generic.namespace(), generic.name());
        from_generic(generic, shell)
    }

    pub(crate) fn decode_list(&self, mut generic: Unstructured) -> Result<L> {
        self.strip_addressing(&mut generic);
        let items = generic.take_items();
        let mut list = from_generic(generic, (self.new_list)())?;
        list.items_mut().clear();
        for item in items {
            let item = self.decode_object(Unstructured::from_value(item)?)?;
            list.items_mut().push(item);
        }
        Ok(list)
    }
}

impl<T, L> Clone for ResourceDescriptor<T, L> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            scope: self.scope,
            new_instance: self.new_instance,
            new_list: self.new_list,
        }
    }
}

impl<T, L> fmt::Debug for ResourceDescriptor<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDescriptor")
            .field("kind", &self.kind)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
