mod cli;
mod config;
mod domain;
mod infrastructure;
mod web;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Command};
use config::Config;
use infrastructure::database::setup_database;
use infrastructure::fetcher::Fetcher;
use infrastructure::generator::{self, RenderDescriptor};
use infrastructure::opml;
use infrastructure::scheduler::Dispatcher;
use infrastructure::store::Store;

/// The `User-Agent` sent on every outbound fetch, identifying this
/// aggregator and carrying a contact URL per spec §4.2/§6.
pub fn user_agent() -> String {
    format!(
        "planetd/{} (+https://github.com/planetd/planetd)",
        env!("CARGO_PKG_VERSION")
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let pool = setup_database(&config.database_path).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    let store = Store::new(pool);

    match cli.command {
        Command::Update => {
            for feed_override in &config.feeds {
                if let Err(e) = store
                    .apply_feed_override(
                        &feed_override.url,
                        feed_override.fetch_interval,
                        feed_override.active,
                    )
                    .await
                {
                    tracing::warn!(
                        url = %feed_override.url,
                        error = %e,
                        "skipped per-feed config override for an unregistered feed"
                    );
                }
            }

            let fetcher = Fetcher::new(&user_agent())?;
            let dispatcher = Dispatcher::new(store, fetcher);
            let outcomes = dispatcher
                .update_all(config.render.concurrency, CancellationToken::new())
                .await?;
            tracing::info!(feeds_processed = outcomes.len(), "update cycle finished");
        }
        Command::Generate => {
            let descriptor = RenderDescriptor {
                planet_title: config.planet.name.clone(),
                subtitle: config.planet.subtitle.clone(),
                site_link: config.planet.link.clone(),
                owner_name: config.planet.owner_name.clone(),
                owner_email: config.planet.owner_email.clone(),
                output_dir: config.output_dir.clone(),
                days: config.render.days,
                group_by_date: config.render.group_by_date,
                filter_by_first_seen: config.render.filter_by_first_seen,
                sort_by: config.sort_field(),
                static_source_dir: config.render.static_source_dir.clone(),
            };
            generator::generate(&store, &descriptor).await?;
            println!("wrote {}", config.output_dir.join("index.html").display());
        }
        Command::AddFeed { url, title } => {
            infrastructure::ssrf::validate_url(&url, infrastructure::ssrf::Mode::Strict)?;
            let feed = store.add_feed(&url, &title).await?;
            println!("added feed {} ({})", feed.id, feed.url);
        }
        Command::RemoveFeed { id } => {
            store.remove_feed(id).await?;
            println!("removed feed {id}");
        }
        Command::ListFeeds { active_only } => {
            for feed in store.get_feeds(active_only).await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    feed.id,
                    feed.title,
                    feed.url,
                    if feed.active { "active" } else { "inactive" }
                );
            }
        }
        Command::ImportOpml { path } => {
            let xml = std::fs::read_to_string(&path)?;
            let imported = opml::import(&xml)?;
            let mut added = 0;
            for feed in imported {
                if let Err(e) =
                    infrastructure::ssrf::validate_url(&feed.xml_url, infrastructure::ssrf::Mode::Strict)
                {
                    tracing::warn!(url = %feed.xml_url, error = %e, "skipped feed");
                    continue;
                }
                match store.add_feed(&feed.xml_url, &feed.title).await {
                    Ok(_) => added += 1,
                    Err(e) => tracing::warn!(url = %feed.xml_url, error = %e, "skipped feed"),
                }
            }
            println!("imported {added} feed(s)");
        }
        Command::ExportOpml { path } => {
            let feeds = store.get_feeds(false).await?;
            let xml = opml::export(&feeds)?;
            std::fs::write(&path, xml)?;
            println!("exported {} feed(s) to {}", feeds.len(), path.display());
        }
    }

    Ok(())
}
