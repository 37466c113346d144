use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

use facet_server::cache::{CacheKey, InvalidationMessage};

#[derive(Parser)]
#[command(name = "facet-cli")]
#[command(about = "Sends cache invalidations to facet-server instances", long_about = None)]
struct Cli {
    /// Base URLs of the servers to invalidate.
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: Vec<String>,

    /// Invalidation endpoint path.
    #[arg(short, long, default_value = "/_cache/invalidate")]
    path: String,

    /// Shared secret, sent as a bearer token.
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop every cached entry tagged with a group
    Group { group: String },
    /// Drop one composite cache key (`key|type|charset|language`)
    Delete { key: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
    }

    let message = match cli.command {
        Commands::Group { group } => InvalidationMessage::InvalidateGroup { group },
        Commands::Delete { key } => InvalidationMessage::Delete { key: CacheKey::from(key) },
    };

    let mut failures = 0;
    for url in &cli.url {
        let endpoint = format!("{}{}", url.trim_end_matches('/'), cli.path);
        let res = client
            .post(&endpoint)
            .headers(headers.clone())
            .json(&message)
            .send()
            .await;

        match res {
            Ok(res) if res.status().is_success() => println!("{}: ok", url),
            Ok(res) => {
                failures += 1;
                eprintln!("{}: server returned status {}", url, res.status());
            }
            Err(e) => {
                failures += 1;
                eprintln!("{}: {}", url, e);
            }
        }
    }

    if failures > 0 {
        return Err(format!("{} of {} servers failed", failures, cli.url.len()).into());
    }
    Ok(())
}
