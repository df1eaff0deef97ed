use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use shared_types::{Resource, ResourceList};
use tracing::{debug, info, instrument, warn};

use crate::codec::Codec;
use crate::config::{RetryPolicy, StoreConfig};
use crate::descriptor::{ResourceDescriptor, Scope};
use crate::error::{Result, StoreError, TransportError};
use crate::keyer::Keyer;
use crate::lifecycle::{
    check_deletion_timestamp, should_remove, DeleteOutcome, Preconditions, Trigger,
};
use crate::selector::SelectionPredicate;
use crate::transport::{EventStream, Transport, TransportResponse};
use crate::unstructured::{to_generic, Unstructured};
use crate::watch::{self, EventDecoder, WatchHandle, WatchTarget};

/// Versioned object store for one kind, layered on a [`Transport`].
///
/// Holds configuration only; every call is a fresh round trip and nothing is
/// cached between calls. Resource-version hints on reads are forwarded but
/// the backend gives no snapshot guarantee for them.
pub struct Store<T, L> {
    codec: Arc<dyn Codec>,
    transport: Arc<dyn Transport>,
    keyer: Keyer,
    descriptor: ResourceDescriptor<T, L>,
    retry: RetryPolicy,
    request_timeout: Option<Duration>,
    watch_buffer: usize,
}

impl<T, L> Store<T, L>
where
    T: Resource,
    L: ResourceList<Item = T>,
{
    pub fn new(
        config: &StoreConfig,
        codec: Arc<dyn Codec>,
        transport: Arc<dyn Transport>,
        descriptor: ResourceDescriptor<T, L>,
    ) -> Result<Self> {
        if config.retry.max_attempts == 0 {
            return Err(StoreError::InvalidInput(
                "retry policy needs at least one attempt".to_string(),
            ));
        }
        if descriptor.kind.is_empty() {
            return Err(StoreError::InvalidInput("kind must not be empty".to_string()));
        }

        info!(kind = %descriptor.kind, scope = ?descriptor.scope, "Initializing object store");
        Ok(Self {
            codec,
            transport,
            keyer: config.keyer()?,
            descriptor,
            retry: config.retry,
            request_timeout: config.request_timeout,
            watch_buffer: config.watch_buffer.max(1),
        })
    }

    pub fn keyer(&self) -> &Keyer {
        &self.keyer
    }

    pub fn descriptor(&self) -> &ResourceDescriptor<T, L> {
        &self.descriptor
    }

    /// Key of `name`; the namespace is ignored for cluster-scoped kinds.
    pub fn key_for(&self, namespace: Option<&str>, name: &str) -> Result<String> {
        match self.descriptor.scope {
            Scope::Namespaced => self.keyer.key(namespace, name),
            Scope::Cluster => self.keyer.key(None, name),
        }
    }

    pub fn root_key(&self, namespace: Option<&str>) -> String {
        match self.descriptor.scope {
            Scope::Namespaced => self.keyer.key_root(namespace),
            Scope::Cluster => self.keyer.key_root(None),
        }
    }

    fn kind(&self) -> &str {
        &self.descriptor.kind
    }

    /// Namespace the transport is addressed with.
    fn transport_namespace(&self, namespace: String) -> String {
        match self.descriptor.scope {
            Scope::Namespaced => namespace,
            Scope::Cluster => self.keyer.default_namespace().to_string(),
        }
    }

    fn address(&self, key: &str) -> Result<(String, String)> {
        let (namespace, name) = self.keyer.decode_key(key)?;
        if name.is_empty() {
            return Err(StoreError::InvalidInput(format!(
                "key {key:?} does not name an object"
            )));
        }
        Ok((self.transport_namespace(namespace), name))
    }

    fn root_address(&self, key: &str) -> Result<String> {
        let (namespace, name) = self.keyer.decode_key(key)?;
        if !name.is_empty() {
            return Err(StoreError::InvalidInput(format!(
                "key {key:?} is not a root key"
            )));
        }
        Ok(self.transport_namespace(namespace))
    }

    /// Makes an outbound object agree with the address it is written to.
    fn prepare_outbound(
        &self,
        object: &mut Unstructured,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        match object.name() {
            "" => object.set_name(name),
            existing if existing != name => {
                return Err(StoreError::InvalidInput(format!(
                    "object name {existing:?} does not match key name {name:?}"
                )));
            }
            _ => {}
        }
        if self.descriptor.scope == Scope::Namespaced {
            let existing = object.namespace();
            if !existing.is_empty() && existing != namespace {
                return Err(StoreError::InvalidInput(format!(
                    "object namespace {existing:?} does not match key namespace {namespace:?}"
                )));
            }
        }
        object.set_namespace(namespace);
        Ok(())
    }

    async fn round_trip<R, F>(&self, call: F) -> Result<R>
    where
        F: Future<Output = Result<R, TransportError>>,
    {
        let outcome = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                warn!(kind = %self.kind(), ?limit, "backend round trip timed out");
                StoreError::DeadlineExceeded
            })?,
            None => call.await,
        };
        Ok(outcome?)
    }

    fn unexpected(response: &TransportResponse) -> StoreError {
        StoreError::UnexpectedStatus {
            status: response.status,
            message: response.message(),
        }
    }

    /// Current generic form of the object, `None` when the backend has none.
    async fn fetch(&self, namespace: &str, name: &str) -> Result<Option<Unstructured>> {
        let response = self
            .round_trip(self.transport.get(self.kind(), namespace, name))
            .await?;
        match response.status {
            status if status.is_success() => Ok(Some(self.codec.decode(&response.body)?)),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Self::unexpected(&response)),
        }
    }

    #[instrument(skip(self, input), fields(kind = %self.descriptor.kind))]
    pub async fn create(&self, key: &str, input: &T, ttl: Option<Duration>) -> Result<T> {
        let (namespace, name) = self.address(key)?;
        if let Some(ttl) = ttl {
            debug!(?ttl, "TTL is not supported by the backend, ignoring");
        }

        let mut object = to_generic(input)?;
        let resource_version = object.resource_version().to_string();
        if !matches!(resource_version.as_str(), "" | "0") {
            return Err(StoreError::InvalidInput(format!(
                "resourceVersion must not be set on create, got {resource_version}"
            )));
        }
        object.set_resource_version("");
        self.prepare_outbound(&mut object, &namespace, &name)?;

        let body = self.codec.encode(&object)?;
        let response = self
            .round_trip(self.transport.create(self.kind(), &namespace, &name, body))
            .await?;

        match response.status {
            status if status.is_success() => {
                let created = self.descriptor.decode_object(self.codec.decode(&response.body)?)?;
                info!(
                    "Created {} at resourceVersion {}",
                    key,
                    created.metadata().resource_version
                );
                Ok(created)
            }
            StatusCode::CONFLICT => Err(StoreError::AlreadyExists {
                key: key.to_string(),
            }),
            _ => Err(Self::unexpected(&response)),
        }
    }

    /// Reads the object at `key`. Returns `Ok(None)` only when the key is
    /// absent and `ignore_not_found` is set.
    #[instrument(skip(self), fields(kind = %self.descriptor.kind))]
    pub async fn get(
        &self,
        key: &str,
        resource_version: Option<&str>,
        ignore_not_found: bool,
    ) -> Result<Option<T>> {
        let (namespace, name) = self.address(key)?;
        if let Some(rv) = resource_version.filter(|rv| !rv.is_empty()) {
            debug!(rv, "resourceVersion hint is not honored by the backend");
        }

        match self.fetch(&namespace, &name).await? {
            Some(current) => Ok(Some(self.descriptor.decode_object(current)?)),
            None if ignore_not_found => Ok(None),
            None => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    /// Lists every object under a root key, in the order the backend returns.
    #[instrument(skip(self), fields(kind = %self.descriptor.kind))]
    pub async fn list(&self, root_key: &str, predicate: &SelectionPredicate) -> Result<L> {
        let namespace = self.root_address(root_key)?;
        let options = predicate.list_options(None);

        let response = self
            .round_trip(self.transport.list(self.kind(), &namespace, &options))
            .await?;
        if !response.status.is_success() {
            return Err(Self::unexpected(&response));
        }

        let list = self.descriptor.decode_list(self.codec.decode(&response.body)?)?;
        debug!(count = list.items().len(), "listed objects");
        Ok(list)
    }

    /// Like [`list`](Self::list) for root keys. A key naming one object yields
    /// a list holding just that object, or an empty list when it is absent.
    #[instrument(skip(self), fields(kind = %self.descriptor.kind))]
    pub async fn get_to_list(
        &self,
        key: &str,
        resource_version: Option<&str>,
        predicate: &SelectionPredicate,
    ) -> Result<L> {
        let (_, name) = self.keyer.decode_key(key)?;
        if name.is_empty() {
            return self.list(key, predicate).await;
        }

        let mut list = (self.descriptor.new_list)();
        if let Some(object) = self.get(key, resource_version, true).await? {
            list.items_mut().push(object);
        }
        Ok(list)
    }

    /// Deletes the object at `key`.
    ///
    /// Objects without finalizers are removed at once. Objects that still
    /// carry finalizers are returned untouched as [`DeleteOutcome::Deferred`];
    /// marking them for deletion is left to a later update, which removes
    /// them once the last finalizer is gone.
    #[instrument(skip(self), fields(kind = %self.descriptor.kind))]
    pub async fn delete(
        &self,
        key: &str,
        preconditions: Option<&Preconditions>,
    ) -> Result<DeleteOutcome<T>> {
        let (namespace, name) = self.address(key)?;
        let current = self
            .fetch(&namespace, &name)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })?;
        if let Some(preconditions) = preconditions {
            preconditions.check(key, &current)?;
        }

        self.settle(key, &namespace, &name, current, Trigger::Delete)
            .await
    }

    /// Removes `object` from the backend if its lifecycle allows it.
    async fn settle(
        &self,
        key: &str,
        namespace: &str,
        name: &str,
        object: Unstructured,
        trigger: Trigger,
    ) -> Result<DeleteOutcome<T>> {
        if !should_remove(&object, trigger)? {
            return Ok(DeleteOutcome::Deferred(self.descriptor.decode_object(object)?));
        }

        let response = self
            .round_trip(self.transport.delete(self.kind(), namespace, name))
            .await?;
        let removed = match response.status {
            status if status.is_success() && !response.body.is_empty() => {
                self.codec.decode(&response.body)?
            }
            status if status.is_success() => object,
            // Someone else finished the removal first
            StatusCode::NOT_FOUND if trigger == Trigger::Update => object,
            StatusCode::NOT_FOUND => {
                return Err(StoreError::NotFound {
                    key: key.to_string(),
                })
            }
            _ => return Err(Self::unexpected(&response)),
        };

        info!("Removed {}", key);
        Ok(DeleteOutcome::Removed(self.descriptor.decode_object(removed)?))
    }

    /// Read-mutate-write loop with optimistic concurrency.
    ///
    /// `try_update` receives the current object (`None` when the key is
    /// absent and `ignore_not_found` is set; nothing is created in that case).
    /// Each write carries the resource version that was read; when the
    /// backend rejects it as stale the whole cycle starts over, up to the
    /// retry policy's bound, after which `Conflict` is returned. Errors from
    /// `try_update` are returned unchanged.
    ///
    /// When the written object is ready for removal the store deletes it
    /// right away. If that delete fails the error is returned, but the update
    /// itself has already been committed.
    #[instrument(skip(self, try_update), fields(kind = %self.descriptor.kind))]
    pub async fn guaranteed_update<F>(
        &self,
        key: &str,
        ignore_not_found: bool,
        preconditions: Option<&Preconditions>,
        mut try_update: F,
    ) -> Result<Option<T>>
    where
        F: FnMut(Option<T>) -> Result<T> + Send,
    {
        let (namespace, name) = self.address(key)?;
        let max_attempts = self.retry.max_attempts;

        for attempt in 1..=max_attempts {
            let Some(current) = self.fetch(&namespace, &name).await? else {
                if !ignore_not_found {
                    return Err(StoreError::NotFound {
                        key: key.to_string(),
                    });
                }
                try_update(None)?;
                debug!("{} is absent, nothing to update", key);
                return Ok(None);
            };

            if let Some(preconditions) = preconditions {
                preconditions.check(key, &current)?;
            }
            let original_version = current.resource_version().to_string();

            let updated = try_update(Some(self.descriptor.decode_object(current.clone())?))?;
            let mut next = to_generic(&updated)?;
            check_deletion_timestamp(key, &current, &next)?;
            next.set_resource_version(&original_version);
            self.prepare_outbound(&mut next, &namespace, &name)?;

            let body = self.codec.encode(&next)?;
            let response = self
                .round_trip(self.transport.update(self.kind(), &namespace, &name, body))
                .await?;

            match response.status {
                status if status.is_success() => {
                    let written = self.codec.decode(&response.body)?;
                    debug!(
                        attempt,
                        from = %original_version,
                        to = written.resource_version(),
                        "update applied"
                    );
                    let outcome = self
                        .settle(key, &namespace, &name, written, Trigger::Update)
                        .await
                        .inspect_err(|err| {
                            warn!(
                                attempt,
                                error = %err,
                                "Update of {} committed but its removal failed",
                                key
                            );
                        })?;
                    return Ok(Some(outcome.into_inner()));
                }
                StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::NOT_FOUND => {
                    warn!(
                        attempt,
                        status = %response.status,
                        "Update of {} raced with another writer: {}",
                        key,
                        response.message()
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.backoff_for(attempt)).await;
                    }
                }
                _ => return Err(Self::unexpected(&response)),
            }
        }

        Err(StoreError::Conflict {
            key: key.to_string(),
            attempts: max_attempts,
        })
    }

    /// Watches the single object at `key`.
    #[instrument(skip(self), fields(kind = %self.descriptor.kind))]
    pub async fn watch(
        &self,
        key: &str,
        resource_version: Option<&str>,
        predicate: &SelectionPredicate,
    ) -> Result<WatchHandle<T>> {
        let (namespace, name) = self.address(key)?;
        let options = predicate.list_options(resource_version);
        let upstream = self
            .round_trip(self.transport.watch(self.kind(), &namespace, Some(&name), &options))
            .await?;
        Ok(self.spawn_pipeline(upstream, WatchTarget::Object))
    }

    /// Watches every object under a root key.
    #[instrument(skip(self), fields(kind = %self.descriptor.kind))]
    pub async fn watch_list(
        &self,
        root_key: &str,
        resource_version: Option<&str>,
        predicate: &SelectionPredicate,
    ) -> Result<WatchHandle<T>> {
        let namespace = self.root_address(root_key)?;
        let options = predicate.list_options(resource_version);
        let upstream = self
            .round_trip(self.transport.watch(self.kind(), &namespace, None, &options))
            .await?;
        Ok(self.spawn_pipeline(upstream, WatchTarget::List))
    }

    fn spawn_pipeline(&self, upstream: EventStream, target: WatchTarget) -> WatchHandle<T> {
        let decoder = EventDecoder::new(self.codec.clone(), self.descriptor.clone(), target);
        watch::spawn(upstream, decoder, self.watch_buffer)
    }
}
