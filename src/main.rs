//! Command line interface for operating the bot. Supports initialization,
//! serving the live ingest engine with its HTTP/WebSocket endpoints, manual
//! catch-up passes, and index rebuilds.

mod catchup;
mod config;
mod counters;
mod ingest;
mod platform;
mod post;
mod push;
mod server;
mod storage;

use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Parser, Subcommand};
use config::Settings;
use platform::{Credentials, Platform};
use storage::Store;

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "boostr",
    author,
    version,
    about = "Hashtag-watching repost bot",
    short_flag = 'v',
    long_flag = "version"
)]
struct Cli {
    /// Path to the `.env` configuration file.
    #[arg(long, default_value = ".env")]
    env: String,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the store directory tree at `STORE_ROOT`.
    Init,
    /// Launch the stream ingest engine, HTTP API, and viewer push channel.
    Serve,
    /// Run one catch-up pass over all watched hashtags.
    Catchup {
        /// Unix timestamp to search from. Defaults to the newest recorded
        /// repost.
        #[arg(long)]
        since: Option<u64>,
    },
    /// Rebuild the hashtag index and latest pointer from stored records.
    Reindex,
}

/// Execute the selected CLI subcommand.
async fn run(cli: Cli) -> anyhow::Result<()> {
    ensure_env_file(&cli.env)?;
    let cfg = Settings::from_env(&cli.env)?;
    let store = Store::new(cfg.store_root.clone());
    match cli.command {
        Commands::Init => {
            // Create the on-disk directory structure.
            store.init()?;
        }
        Commands::Reindex => {
            store.reindex()?;
        }
        Commands::Catchup { since } => {
            store.init()?;
            let platform = platform_client(&cfg)?;
            let since = match since {
                Some(ts) => ts,
                None => store.latest_created_at()?.unwrap_or(0),
            };
            let reconciler = catchup::Reconciler::new(platform, store);
            let n = reconciler.reconcile(&cfg.watch_terms, since).await;
            println!("reposted {n} missed posts");
        }
        Commands::Serve => {
            store.init()?;
            let platform = platform_client(&cfg)?;
            let counters = Arc::new(counters::Counters::new());
            let reconciler = Arc::new(catchup::Reconciler::new(platform.clone(), store.clone()));
            let http_addr: SocketAddr = cfg.bind_http.as_str().parse()?;
            let ws_addr: SocketAddr = cfg.bind_ws.as_str().parse()?;
            let http_state = server::HttpState {
                platform: platform.clone(),
                store: store.clone(),
                counters: counters.clone(),
                reconciler,
                terms: cfg.watch_terms.clone(),
                account: cfg.account.clone(),
                verbose: cfg.verbose,
            };
            // Any branch failing fatally, including the ingest engine running
            // out of reconnect attempts, tears the whole process down.
            // Ctrl-C drops all three branches, which closes the listeners and
            // the live stream subscription.
            tokio::select! {
                res = async {
                    tokio::try_join!(
                        server::serve_http(http_addr, http_state, std::future::pending()),
                        push::serve_push(ws_addr, counters.clone(), std::future::pending()),
                        ingest::run(platform, store, counters.clone(), cfg.watch_terms.clone()),
                    )
                } => {
                    res?;
                }
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("shutting down");
                }
            }
        }
    }
    Ok(())
}

/// Build the platform client from configured credentials.
fn platform_client(cfg: &Settings) -> anyhow::Result<Platform> {
    let creds = Credentials {
        consumer_key: cfg.consumer_key.clone(),
        consumer_secret: cfg.consumer_secret.clone(),
        access_token: cfg.access_token.clone(),
        access_token_secret: cfg.access_token_secret.clone(),
    };
    Platform::new(cfg.api_base.clone(), cfg.stream_url.clone(), &creds)
}

/// Create a default `.env` file if one is not already present at `path`.
fn ensure_env_file(path: &str) -> anyhow::Result<()> {
    let env_path = Path::new(path);
    if env_path.exists() {
        return Ok(());
    }
    if let Some(parent) = env_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let base_dir = match env_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    let store_root = base_dir.join("boostr-data");
    let mut content = String::new();
    content.push_str(&format!("STORE_ROOT={}\n", display_path(&store_root)));
    content.push_str("BIND_HTTP=127.0.0.1:3000\n");
    content.push_str("BIND_WS=127.0.0.1:3001\n");
    content.push_str("API_BASE=https://api.example.com/1.1\n");
    content.push_str("STREAM_URL=wss://stream.example.com/filter\n");
    content.push_str("CONSUMER_KEY=\n");
    content.push_str("CONSUMER_SECRET=\n");
    content.push_str("ACCESS_TOKEN=\n");
    content.push_str("ACCESS_TOKEN_SECRET=\n");
    content.push_str("ACCOUNT=RT_Himachal\n");
    content.push_str("WATCH_TERMS=#himachal,#himachalpradesh,#Himachal,#HimachalPradesh,#हिमाचल\n");
    content.push_str("VERBOSE=0\n");
    fs::write(env_path, content)?;
    Ok(())
}

fn display_path(path: &PathBuf) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run(cli).await
}
