use shorts_blocker::prelude::*;
use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn short(id: &str) -> ElementSpec {
    ElementSpec::new("ytd-reel-item-renderer").child(
        ElementSpec::new("a")
            .attr("href", format!("/shorts/{id}"))
            .text(format!("Short {id}")),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("🛡️  Shorts Blocker Demo");

    let mut doc = Document::loaded("https://www.youtube.com/results?search_query=rust")?;
    let body = doc.ensure_body();
    doc.insert(body, &short("abc123"));
    doc.insert(body, &ElementSpec::new("ytd-video-renderer").text("A regular video"));
    let page = Page::new(doc);

    let storage = Arc::new(ExtensionStorage::in_memory());
    storage.initialize(shorts_blocker::config::DEFAULT_VERSION).await?;
    let notifier = Arc::new(PageNotifier::new(page.clone(), EngineConfig::default().notification_duration));
    let collaborators = Collaborators::from_storage(storage.clone(), notifier);

    let blocker = BlockerHandle::start(page.clone(), collaborators, EngineConfig::default()).await?;
    println!("\n📋 After initial scan: {}", blocker.handle_message(&json!({ "action": "getStatus" })).await);

    // New content arrives after the page loaded
    page.lock().insert(body, &short("def456"));
    tokio::time::sleep(Duration::from_millis(300)).await;
    println!("📋 After dynamic insert: {}", blocker.handle_message(&json!({ "action": "getStatus" })).await);

    println!("\n🔧 Switching to redirect mode");
    let response = blocker
        .handle_message(&json!({ "action": "updateSettings", "settings": { "blockingMode": "redirect" } }))
        .await;
    println!("updateSettings -> {response}");

    let stats = storage.stats().await?;
    println!("\n📊 Total blocked: {}", stats.total_blocked);

    blocker.shutdown().await?;
    println!("\n✨ Shorts blocker stopped, page restored");

    Ok(())
}
