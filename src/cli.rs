use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "planetd", version, about = "Fetches feeds and renders a static planet page")]
pub struct Cli {
    /// Path to the planetd.toml configuration file.
    #[arg(short, long, default_value = "planetd.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one fetch-normalize-store cycle over all active feeds.
    Update,
    /// Render the static planet page from the current Store state.
    Generate,
    /// Register a new feed.
    AddFeed {
        url: String,
        /// Title to use until the first successful fetch supplies one.
        #[arg(long, default_value = "")]
        title: String,
    },
    /// Unregister a feed and delete its entries.
    RemoveFeed { id: i64 },
    /// List registered feeds.
    ListFeeds {
        #[arg(long)]
        active_only: bool,
    },
    /// Import feed subscriptions from an OPML document.
    ImportOpml { path: PathBuf },
    /// Export registered feeds as an OPML document.
    ExportOpml { path: PathBuf },
}
