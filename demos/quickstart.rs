use ambient_storage::map::Value;
use ambient_storage::{ambient, ScopeRegistry, StorageConfig, StorageResult, WriteScheduler};
use serde_json::json;

async fn serve_page(registry: &ScopeRegistry, cookies: (Option<String>, Option<String>)) -> StorageResult<(String, Option<String>)> {
    let (session_cookie, browser_cookie) = cookies;
    let resolver = registry.resolver()?;
    let resolution = resolver.resolve(session_cookie.as_deref());
    let browser = registry.decode_browser_cookie(browser_cookie.as_deref())?;
    let ctx = registry.bind(resolution.session, browser);

    let outgoing = ctx
        .scope(async {
            let user = ambient::user()?;
            let count = user.modify("count", |current| {
                json!(current.and_then(Value::as_i64).unwrap_or(0) + 1)
            })?;
            println!("user visit count: {count}");

            let general = ambient::general()?;
            general.modify("total_visits", |current| {
                json!(current.and_then(Value::as_i64).unwrap_or(0) + 1)
            })?;

            let browser = ambient::browser()?;
            browser.insert("last_page", "/")?;
            ambient::current()?.finalize_response()
        })
        .await?;

    Ok((outgoing, resolution.set_cookie))
}

#[tokio::main]
async fn main() -> StorageResult<()> {
    let config = StorageConfig::new()
        .with_secret("quickstart secret")
        .with_dir(".storage-demo");
    let registry = ScopeRegistry::new(config)?;
    let scheduler = WriteScheduler::spawn(registry.clone());

    println!("== First visit ==");
    let (browser_cookie, session_cookie) = serve_page(&registry, (None, None)).await?;

    println!("== Returning visit ==");
    serve_page(&registry, (session_cookie.clone(), Some(browser_cookie))).await?;

    println!("== Cookies cleared ==");
    serve_page(&registry, (None, None)).await?;

    let total = registry.general().get_or("total_visits", 0);
    println!("total visits across all sessions: {total}");

    scheduler.stop().await;
    Ok(())
}
