//! wellcache - inspect, sync and purge the local cache of the signed-in user.
//!
//! Usage:
//!   wellcache [status]              signed-in user and cached entries
//!   wellcache show <resource>       print one cached value
//!   wellcache purge                 remove every cached entry of the user
//!   wellcache login <user-id> [name]
//!   wellcache logout                sign out and purge
//!   wellcache sync                  refresh plans, history and feed

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wellcache_core::features::social_feed;
use wellcache_core::models::PlanKind;
use wellcache_core::{
    age_display, CacheKey, CacheStore, Config, Coordinator, FeatureContext, FileStore, HistoryFeature,
    HttpRemote, PlanFeature, RemoteError, Session, SessionData,
};

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

struct Env {
    config: Config,
    session: Session,
    cache: CacheStore,
}

impl Env {
    fn open() -> Result<Self> {
        let config = Config::load()?;
        let cache_dir = config.cache_dir()?;
        let mut session = Session::new(cache_dir.clone());
        if let Err(e) = session.load() {
            warn!(error = %e, "Ignoring unreadable session");
        }
        let store = FileStore::new(cache_dir.join("entries"))
            .with_context(|| format!("Failed to open cache at {}", cache_dir.display()))?;
        Ok(Self {
            config,
            session,
            cache: CacheStore::with_system_clock(Arc::new(store)),
        })
    }

    fn require_user(&self) -> Result<String> {
        match self.session.user_id() {
            Some(id) => Ok(id.to_string()),
            None => bail!("Not signed in. Run `wellcache login <user-id>` first."),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("status");
    let mut env = Env::open()?;

    match command {
        "status" => status(&env),
        "show" => match args.get(1) {
            Some(resource) => show(&env, resource),
            None => bail!("Usage: wellcache show <resource>"),
        },
        "purge" => purge(&env),
        "login" => match args.get(1) {
            Some(user_id) => login(&mut env, user_id, args.get(2).cloned()),
            None => bail!("Usage: wellcache login <user-id> [name]"),
        },
        "logout" => logout(&mut env),
        "sync" => sync(&env).await,
        other => bail!("Unknown command: {}", other),
    }
}

fn status(env: &Env) -> Result<()> {
    let Some(user_id) = env.session.user_id() else {
        println!("Not signed in.");
        return Ok(());
    };
    println!("Signed in as {}", user_id);

    let now = env.cache.now();
    let entries = env.cache.entries_for_user(&env.config.namespace, user_id);
    if entries.is_empty() {
        println!("No cached entries.");
        return Ok(());
    }
    for entry in entries {
        let age = entry
            .stored_at
            .map(|at| age_display(now - at))
            .unwrap_or_else(|| "unreadable".to_string());
        println!("  {:<40} {:>10}  {} bytes", entry.key, age, entry.size_bytes);
    }
    Ok(())
}

fn show(env: &Env, resource: &str) -> Result<()> {
    let user_id = env.require_user()?;
    let key = CacheKey::for_user(&env.config.namespace, Some(&user_id), resource)
        .context("Invalid cache key")?;
    match env.cache.peek_entry::<serde_json::Value>(&key) {
        Some(entry) => {
            println!("# {} (stored {})", key, entry.age_display(env.cache.now()));
            println!("{}", serde_json::to_string_pretty(&entry.value)?);
        }
        None => println!("Nothing cached for {}", key),
    }
    Ok(())
}

fn purge(env: &Env) -> Result<()> {
    let user_id = env.require_user()?;
    let removed = env.cache.purge_user(&env.config.namespace, &user_id);
    println!("Removed {} cached entries.", removed);
    Ok(())
}

fn login(env: &mut Env, user_id: &str, username: Option<String>) -> Result<()> {
    if user_id.trim().is_empty() {
        bail!("User id must not be empty");
    }
    env.session.update(SessionData {
        user_id: user_id.to_string(),
        username,
        token: None,
        created_at: Utc::now(),
    });
    env.session.save()?;
    info!(user = user_id, "Signed in");
    println!("Signed in as {}", user_id);
    Ok(())
}

fn logout(env: &mut Env) -> Result<()> {
    if let Some(user_id) = env.session.user_id().map(String::from) {
        let removed = env.cache.purge_user(&env.config.namespace, &user_id);
        info!(user = %user_id, removed, "Signed out");
    }
    env.session.clear()?;
    println!("Signed out.");
    Ok(())
}

async fn sync(env: &Env) -> Result<()> {
    env.require_user()?;
    let (Some(url), Some(api_key)) = (env.config.backend_url.as_deref(), env.config.api_key.as_deref()) else {
        bail!("Backend not configured. Set WELLCACHE_BACKEND_URL and WELLCACHE_API_KEY.");
    };
    let mut remote = HttpRemote::new(url, api_key)?;
    if let Some(token) = env.session.token() {
        remote = remote.with_token(token);
    }

    let ctx = FeatureContext::from_session(
        Arc::new(remote),
        Coordinator::new(env.cache.clone()),
        &env.config,
        &env.session,
    );

    for kind in [PlanKind::Meal, PlanKind::Workout] {
        let plan = PlanFeature::new(ctx.clone(), kind);
        match plan.load().await {
            Ok(source) => match plan.current() {
                Some(doc) => println!(
                    "{} plan: {}/{} days done ({:?})",
                    kind,
                    doc.completed_count(),
                    doc.days.len(),
                    source
                ),
                None => println!("{} plan: none", kind),
            },
            Err(e) => eprintln!("{} plan: {}", kind, describe_failure(&e)),
        }
    }

    let history = HistoryFeature::new(ctx.clone());
    match history.load().await {
        Ok(_) => println!(
            "history: {} entries, last logged {}",
            history.current().len(),
            history.current().last_logged_display(env.cache.now())
        ),
        Err(e) => eprintln!("history: {}", describe_failure(&e)),
    }

    let feed = social_feed(&ctx, env.config.page_size());
    match feed.load_initial().await {
        Ok(_) => println!("feed: {} posts loaded", feed.items().len()),
        Err(e) => eprintln!("feed: {}", describe_failure(&e)),
    }
    Ok(())
}

/// Transient failures leave the cached copy in place and are worth a retry.
fn describe_failure(e: &RemoteError) -> String {
    if e.is_transient() {
        format!("{} (showing cached data, try again later)", e)
    } else {
        e.to_string()
    }
}
