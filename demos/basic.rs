//! Basic chatsync Example
//!
//! Two clients share one in-process backend. Each runs a chat session; a
//! message sent by one shows up in the other's view.
//!
//! Run with: cargo run --example basic

use std::sync::Arc;
use std::time::Duration;

use chatsync_backend::{Backend, MemoryBackend};
use chatsync_client::{ChatSession, SharedBackend, SyncConfig, SyncCore};
use chatsync_core::{Message, SystemClock};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("chatsync Basic Example\n");

    let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());

    // The first client seeds the empty collection
    let alice = client(backend.clone(), true).await?;
    let bob = client(backend.clone(), false).await?;

    let alice_session = ChatSession::start(alice, |messages: &[Message]| {
        println!("[alice] {} messages", messages.len());
    })
    .await?;
    let bob_session = ChatSession::start(bob, |messages: &[Message]| {
        if let Some(last) = messages.last() {
            println!("[bob] latest: {} ({})", last.text, last.timestamp);
        }
    })
    .await?;

    alice_session.submit("Hi Bob!", &SystemClock).await?;
    bob_session.submit("Hey Alice", &SystemClock).await?;

    // Give the listeners a moment to deliver
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("\nBob's view:");
    for message in bob_session.messages() {
        println!("  {}  {}  {}", message.key, message.timestamp, message.text);
    }

    Ok(())
}

async fn client(
    backend: Arc<dyn Backend>,
    seed: bool,
) -> Result<Arc<SyncCore>, Box<dyn std::error::Error>> {
    let core = SyncCore::with_connector(
        SyncConfig::default().with_seed(seed),
        Arc::new(SharedBackend::new(backend)),
    );
    core.initialize().await?;
    Ok(Arc::new(core))
}
