#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use anyhow::Result;
use client::RestTransport;
use rest_store::{
    JsonCodec, MemoryTransport, ResourceDescriptor, SelectionPredicate, Store, StoreConfig,
    StoreError, WatchEvent,
};
use shared_types::{Broker, BrokerList, ObjectMeta, ServiceInstance, ServiceInstanceList};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

struct TestServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Serves an in-memory backend on an ephemeral port.
    async fn start() -> Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = server::http::router(Arc::new(MemoryTransport::new()));

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(TestServer { addr, handle })
    }

    fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn broker_store(transport: Arc<RestTransport>) -> Result<Store<Broker, BrokerList>> {
    let descriptor = ResourceDescriptor::cluster(
        "brokers",
        |_, name| Broker {
            metadata: ObjectMeta::named("", name),
            ..Broker::default()
        },
        BrokerList::default,
    );
    Ok(Store::new(
        &StoreConfig::default(),
        Arc::new(JsonCodec),
        transport,
        descriptor,
    )?)
}

#[tokio::test]
async fn test_e2e_broker_workflow() -> Result<()> {
    let server = TestServer::start().await?;
    let transport = Arc::new(RestTransport::new(server.url())?);
    assert!(transport.health_check().await?);

    let store = broker_store(transport)?;
    let key = store.key_for(None, "b1")?;

    // Create
    let created = store.create(&key, &Broker::new("b1", "http://x"), None).await?;
    assert_eq!(created.metadata.resource_version, "1");
    assert_eq!(created.metadata.namespace, "");

    // Double create is rejected
    let err = store
        .create(&key, &Broker::new("b1", "http://x"), None)
        .await
        .unwrap_err();
    assert!(err.is_already_exists());

    // Update
    let updated = store
        .guaranteed_update(&key, false, None, |current| {
            let mut broker = current.unwrap_or_default();
            broker.spec.url = "http://y".to_string();
            Ok(broker)
        })
        .await?
        .expect("updated");
    assert_eq!(updated.metadata.resource_version, "2");

    let fetched = store.get(&key, None, false).await?.expect("stored");
    assert_eq!(fetched.spec.url, "http://y");

    // List
    let listed = store
        .list(&store.root_key(None), &SelectionPredicate::everything())
        .await?;
    assert_eq!(listed.items.len(), 1);
    assert_eq!(listed.items[0].metadata.namespace, "");

    // Delete
    assert!(store.delete(&key, None).await?.is_removed());
    let err = store.get(&key, None, false).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));

    Ok(())
}

#[tokio::test]
async fn test_e2e_finalizers_over_http() -> Result<()> {
    let server = TestServer::start().await?;
    let store = broker_store(Arc::new(RestTransport::new(server.url())?))?;
    let key = store.key_for(None, "b1")?;

    let mut broker = Broker::new("b1", "http://x");
    broker.metadata.finalizers = vec!["catalog/cleanup".to_string()];
    store.create(&key, &broker, None).await?;

    assert!(!store.delete(&key, None).await?.is_removed());
    assert!(store.get(&key, None, true).await?.is_some());

    store
        .guaranteed_update(&key, false, None, |current| {
            let mut broker = current.unwrap_or_default();
            broker.metadata.deletion_timestamp = Some(chrono::Utc::now());
            broker.metadata.finalizers.clear();
            Ok(broker)
        })
        .await?;
    assert!(store.get(&key, None, true).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_e2e_watch_over_http() -> Result<()> {
    let server = TestServer::start().await?;
    let transport = Arc::new(RestTransport::new(server.url())?);
    let descriptor = ResourceDescriptor::namespaced(
        "serviceinstances",
        |namespace, name| ServiceInstance {
            metadata: ObjectMeta::named(namespace, name),
            ..ServiceInstance::default()
        },
        ServiceInstanceList::default,
    );
    let store: Store<ServiceInstance, ServiceInstanceList> = Store::new(
        &StoreConfig::default(),
        Arc::new(JsonCodec),
        transport,
        descriptor,
    )?;

    let root = store.root_key(Some("team-a"));
    let mut watch = store
        .watch_list(&root, None, &SelectionPredicate::labels("tier=gold"))
        .await?;

    for (name, tier) in [("cache", "silver"), ("db", "gold")] {
        let mut instance = ServiceInstance::new("team-a", name, "postgres", "small");
        instance.metadata.labels.insert("tier".to_string(), tier.to_string());
        store
            .create(&store.key_for(Some("team-a"), name)?, &instance, None)
            .await?;
    }

    let event = tokio::time::timeout(Duration::from_secs(5), watch.recv())
        .await?
        .expect("event");
    match event {
        WatchEvent::Added(instance) => {
            assert_eq!(instance.metadata.name, "db");
            assert_eq!(instance.metadata.namespace, "team-a");
        }
        other => panic!("expected ADDED, got {other:?}"),
    }

    watch.stop();
    assert!(watch.recv().await.is_none());
    Ok(())
}
