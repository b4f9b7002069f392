use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use forklink::analytics::WindowedCache;
use forklink::cache;
use forklink::config::{CacheBackend, Config};
use forklink::links::LinkManager;
use forklink::models::RuleInput;
use forklink::storage::{SqliteStorage, Storage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "forklink-admin")]
#[command(about = "Forklink short link management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a short link from a JSON rules file
    Create {
        /// Short link id (alphanumeric)
        id: String,
        /// Path to a JSON array of rules
        rules: PathBuf,
        /// Owning username; omit for an anonymous link
        #[arg(long)]
        owner: Option<String>,
    },
    /// Replace the rules of a link, starting its analytics over
    Redefine {
        id: String,
        rules: PathBuf,
        #[arg(long)]
        owner: String,
    },
    /// Move a link and its analytics to a new id
    Rename {
        id: String,
        new_id: String,
        #[arg(long)]
        owner: String,
    },
    /// Soft delete a link
    Delete {
        id: String,
        #[arg(long)]
        owner: String,
    },
    /// Print a link and its per-rule counters
    Show { id: String },
}

fn read_rules(path: &Path) -> Result<Vec<RuleInput>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rules file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid rules JSON in {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let storage: Arc<dyn Storage> = Arc::new(
        SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
    );

    // Ensure database is initialized
    storage.init().await?;

    // The server's in-memory cache cannot be reached from here, so changing
    // an existing link would leave it serving stale analytics
    let changes_existing = matches!(
        cli.command,
        Commands::Redefine { .. } | Commands::Rename { .. } | Commands::Delete { .. }
    );
    if changes_existing && !config.cache.backend.is_shared() {
        bail!(
            "The server caches analytics in memory; redefine, rename and delete links \
             through the API server, or configure a redis or none cache backend"
        );
    }

    let backend = match config.cache.backend {
        CacheBackend::Redis => cache::from_config(&config.cache).await?,
        CacheBackend::None | CacheBackend::Memory => None,
    };
    let window_cache = Arc::new(WindowedCache::new(backend, config.cache.extra_pages));
    let links =
        LinkManager::new(Arc::clone(&storage), window_cache).with_max_rules(config.links.max_rules);

    match cli.command {
        Commands::Create { id, rules, owner } => {
            let rules = read_rules(&rules)?;
            let link = links.create(&id, &rules, owner.as_deref()).await?;
            println!(
                "✓ Created short link '{}' with {} rules (uid {})",
                link.id,
                link.rules.len(),
                link.uid
            );
        }
        Commands::Redefine { id, rules, owner } => {
            let rules = read_rules(&rules)?;
            let link = links.redefine(&id, &rules, &owner).await?;
            println!(
                "✓ Redefined short link '{}' with {} rules (new uid {})",
                link.id,
                link.rules.len(),
                link.uid
            );
        }
        Commands::Rename { id, new_id, owner } => {
            let link = links.rename(&id, &new_id, &owner).await?;
            println!("✓ Renamed short link '{}' to '{}'", id, link.id);
        }
        Commands::Delete { id, owner } => {
            links.delete(&id, &owner).await?;
            println!("✓ Deleted short link '{}'", id);
        }
        Commands::Show { id } => match links.get(&id).await {
            Ok(link) => {
                println!("Short link '{}'", link.id);
                println!("  uid:   {}", link.uid);
                println!("  owner: {}", link.owner.as_deref().unwrap_or("(anonymous)"));
                if let Some(minute) = link.first_event_minute {
                    if let Some(first) = chrono::DateTime::from_timestamp(minute * 60, 0) {
                        println!("  first redirect: {}", first.format("%Y-%m-%d %H:%M UTC"));
                    }
                }
                let rules = link.rules.rules().iter().zip(&link.counters);
                for (index, (rule, count)) in rules.enumerate() {
                    println!(
                        "  [{}] {} ({} conditions, {}) -> {} redirects",
                        index,
                        rule.url,
                        rule.conditions.len(),
                        serde_json::to_string(&rule.combinator)?.trim_matches('"'),
                        count
                    );
                }
            }
            Err(e) => println!("⚠ {}", e),
        },
    }

    Ok(())
}
