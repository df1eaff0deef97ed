use std::sync::Arc;

use anyhow::Result;
use rest_store::{
    JsonCodec, MemoryTransport, ResourceDescriptor, SelectionPredicate, Store, StoreConfig,
    WatchEvent,
};
use shared_types::{Broker, BrokerList, ObjectMeta};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = StoreConfig::from_env()?;
    let transport = Arc::new(MemoryTransport::new());
    let descriptor = ResourceDescriptor::cluster(
        "brokers",
        |_, name| Broker {
            metadata: ObjectMeta::named("", name),
            ..Broker::default()
        },
        BrokerList::default,
    );
    let store: Store<Broker, BrokerList> =
        Store::new(&config, Arc::new(JsonCodec), transport, descriptor)?;

    let root = store.root_key(None);
    let mut watch = store
        .watch_list(&root, None, &SelectionPredicate::everything())
        .await?;

    // Register a broker that carries a finalizer
    let key = store.key_for(None, "b1")?;
    let mut broker = Broker::new("b1", "http://x");
    broker.metadata.finalizers = vec!["catalog/cleanup".to_string()];
    let created = store.create(&key, &broker, None).await?;
    println!(
        "Created {} at resourceVersion {}",
        key, created.metadata.resource_version
    );

    let updated = store
        .guaranteed_update(&key, false, None, |current| {
            let mut broker = current.unwrap_or_default();
            broker.spec.url = "http://y".to_string();
            Ok(broker)
        })
        .await?;
    if let Some(updated) = &updated {
        println!(
            "Updated URL to {} at resourceVersion {}",
            updated.spec.url, updated.metadata.resource_version
        );
    }

    // The finalizer keeps the broker in place
    let outcome = store.delete(&key, None).await?;
    println!("Delete removed the broker: {}", outcome.is_removed());

    // Mark it for deletion and release the finalizer in one update
    store
        .guaranteed_update(&key, false, None, |current| {
            let mut broker = current.unwrap_or_default();
            broker.metadata.deletion_timestamp = Some(chrono::Utc::now());
            broker.metadata.finalizers.clear();
            Ok(broker)
        })
        .await?;
    let gone = store.get(&key, None, true).await?.is_none();
    println!("Broker gone after finalizing update: {}", gone);

    println!("\nEvents seen by the watcher:");
    for _ in 0..4 {
        match watch.recv().await {
            Some(WatchEvent::Error(err)) => {
                println!("  watch failed: {}", err);
                break;
            }
            Some(event) => {
                let rv = event
                    .object()
                    .map(|b| b.metadata.resource_version.clone())
                    .unwrap_or_default();
                println!("  - {} (resourceVersion {})", event.event_type(), rv);
            }
            None => break,
        }
    }
    watch.stop();

    Ok(())
}
