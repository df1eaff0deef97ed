//! Two-phase deletion and write preconditions.
//!
//! An object moves `Active -> PendingDeletion -> Finalized`: a deletion
//! timestamp marks it pending while finalizers remain, and it is removed
//! from the backend once the finalizer list is empty. [`should_remove`] is
//! the only place that decides removal, for deletes and updates alike.

use tracing::debug;

use crate::error::{Result, StoreError};
use crate::unstructured::Unstructured;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    /// Deletion requested, finalizers still present
    PendingDeletion,
    /// Deletion requested and every finalizer cleared
    Finalized,
}

impl Lifecycle {
    pub fn of(object: &Unstructured) -> Result<Self> {
        let marked = object.deletion_timestamp()?.is_some();
        let finalized = object.finalizers().is_empty();
        Ok(match (marked, finalized) {
            (false, _) => Lifecycle::Active,
            (true, false) => Lifecycle::PendingDeletion,
            (true, true) => Lifecycle::Finalized,
        })
    }
}

/// What asked for an object to be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    Delete,
    Update,
}

/// A delete removes any object without finalizers; an update only removes
/// objects it has finalized.
pub(crate) fn should_remove(object: &Unstructured, trigger: Trigger) -> Result<bool> {
    let lifecycle = Lifecycle::of(object)?;
    let remove = match trigger {
        Trigger::Delete => object.finalizers().is_empty(),
        Trigger::Update => lifecycle == Lifecycle::Finalized,
    };
    debug!(?trigger, ?lifecycle, remove, name = object.name(), "settling object");
    Ok(remove)
}

/// Result of [`Store::delete`](crate::Store::delete).
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome<T> {
    /// The object is gone from the backend
    Removed(T),
    /// Finalizers are still present; the object was left untouched
    Deferred(T),
}

impl<T> DeleteOutcome<T> {
    pub fn is_removed(&self) -> bool {
        matches!(self, DeleteOutcome::Removed(_))
    }

    pub fn object(&self) -> &T {
        match self {
            DeleteOutcome::Removed(object) | DeleteOutcome::Deferred(object) => object,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            DeleteOutcome::Removed(object) | DeleteOutcome::Deferred(object) => object,
        }
    }
}

/// Conditions the stored object must satisfy before a write goes out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preconditions {
    pub uid: Option<String>,
    pub resource_version: Option<String>,
}

impl Preconditions {
    pub fn uid(uid: impl Into<String>) -> Self {
        Self {
            uid: Some(uid.into()),
            ..Self::default()
        }
    }

    pub fn resource_version(resource_version: impl Into<String>) -> Self {
        Self {
            resource_version: Some(resource_version.into()),
            ..Self::default()
        }
    }

    pub fn check(&self, key: &str, current: &Unstructured) -> Result<()> {
        if let Some(uid) = &self.uid {
            if uid != current.uid() {
                return Err(StoreError::PreconditionFailed(format!(
                    "{key}: expected uid {uid}, found {:?}",
                    current.uid()
                )));
            }
        }
        if let Some(rv) = &self.resource_version {
            if rv != current.resource_version() {
                return Err(StoreError::PreconditionFailed(format!(
                    "{key}: expected resourceVersion {rv}, found {:?}",
                    current.resource_version()
                )));
            }
        }
        Ok(())
    }
}

/// Once set, a deletion timestamp can neither change nor be cleared.
/// Compared at whole seconds.
pub(crate) fn check_deletion_timestamp(
    key: &str,
    current: &Unstructured,
    next: &Unstructured,
) -> Result<()> {
    let Some(stored) = current.deletion_timestamp()? else {
        return Ok(());
    };
    match next.deletion_timestamp()? {
        Some(proposed) if proposed.timestamp() == stored.timestamp() => Ok(()),
        Some(proposed) => Err(StoreError::InvalidInput(format!(
            "{key}: deletionTimestamp is immutable (stored {}, got {})",
            stored.to_rfc3339(),
            proposed.to_rfc3339()
        ))),
        None => Err(StoreError::InvalidInput(format!(
            "{key}: deletionTimestamp cannot be cleared once set"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: serde_json::Value) -> Unstructured {
        Unstructured::from_value(value).unwrap()
    }

    #[test]
    fn test_lifecycle_states() {
        let active = object(json!({"metadata": {"finalizers": ["a"]}}));
        assert_eq!(Lifecycle::of(&active).unwrap(), Lifecycle::Active);

        let pending = object(json!({"metadata": {
            "finalizers": ["a"],
            "deletionTimestamp": "2024-01-01T00:00:00Z"
        }}));
        assert_eq!(Lifecycle::of(&pending).unwrap(), Lifecycle::PendingDeletion);

        let finalized = object(json!({"metadata": {"deletionTimestamp": "2024-01-01T00:00:00Z"}}));
        assert_eq!(Lifecycle::of(&finalized).unwrap(), Lifecycle::Finalized);
    }

    #[test]
    fn test_should_remove() {
        let plain = object(json!({"metadata": {"name": "a"}}));
        assert!(should_remove(&plain, Trigger::Delete).unwrap());
        assert!(!should_remove(&plain, Trigger::Update).unwrap());

        let guarded = object(json!({"metadata": {"name": "a", "finalizers": ["x"]}}));
        assert!(!should_remove(&guarded, Trigger::Delete).unwrap());
        assert!(!should_remove(&guarded, Trigger::Update).unwrap());

        let finalized = object(json!({"metadata": {"deletionTimestamp": "2024-01-01T00:00:00Z"}}));
        assert!(should_remove(&finalized, Trigger::Update).unwrap());
    }

    #[test]
    fn test_preconditions() {
        let current = object(json!({"metadata": {"uid": "u-1", "resourceVersion": "3"}}));
        assert!(Preconditions::default().check("k", &current).is_ok());
        assert!(Preconditions::uid("u-1").check("k", &current).is_ok());
        assert!(matches!(
            Preconditions::uid("u-2").check("k", &current),
            Err(StoreError::PreconditionFailed(_))
        ));
        assert!(Preconditions::resource_version("2").check("k", &current).is_err());
    }

    #[test]
    fn test_deletion_timestamp_is_immutable() {
        let stored = object(json!({"metadata": {"deletionTimestamp": "2024-01-01T00:00:00Z"}}));
        let same_second =
            object(json!({"metadata": {"deletionTimestamp": "2024-01-01T00:00:00.900Z"}}));
        let moved = object(json!({"metadata": {"deletionTimestamp": "2024-01-01T00:00:05Z"}}));
        let cleared = object(json!({"metadata": {}}));

        assert!(check_deletion_timestamp("k", &stored, &same_second).is_ok());
        assert!(check_deletion_timestamp("k", &stored, &moved).is_err());
        assert!(check_deletion_timestamp("k", &stored, &cleared).is_err());
        assert!(check_deletion_timestamp("k", &cleared, &moved).is_ok());
    }
}
