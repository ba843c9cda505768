use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Map, Value};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for relay-proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    /// Admin API key; omit when the proxy runs without one.
    #[arg(short, long, env = "RELAY_PROXY_API_KEY")]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show traffic counters and rates
    Traffic,
    /// Reset traffic counters
    Reset,
    /// Inspect or change rate limiting
    RateLimit {
        #[command(subcommand)]
        action: RateLimitAction,
    },
    /// Inspect or change the domain allow-list
    Allowlist {
        #[command(subcommand)]
        action: AllowlistAction,
    },
}

#[derive(Subcommand)]
enum RateLimitAction {
    /// Show configuration and current window usage
    Show,
    /// Update configuration; unspecified fields are left unchanged
    Set {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        window_seconds: Option<u64>,
        #[arg(long, conflicts_with = "unlimited_ip")]
        max_per_ip: Option<u64>,
        #[arg(long, conflicts_with = "unlimited_domain")]
        max_per_domain: Option<u64>,
        /// Remove the per-IP limit
        #[arg(long)]
        unlimited_ip: bool,
        /// Remove the per-domain limit
        #[arg(long)]
        unlimited_domain: bool,
    },
}

#[derive(Subcommand)]
enum AllowlistAction {
    /// List patterns
    List,
    /// Add a regex pattern
    Add { pattern: String },
    /// Remove a pattern
    Remove { pattern: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);
    }

    let base = cli.url.trim_end_matches('/');
    let request = match cli.command {
        Commands::Traffic => client.get(format!("{base}/metrics/traffic")),
        Commands::Reset => client.post(format!("{base}/metrics/traffic/reset")),
        Commands::RateLimit { action } => match action {
            RateLimitAction::Show => client.get(format!("{base}/admin/rate_limit")),
            RateLimitAction::Set {
                enabled,
                window_seconds,
                max_per_ip,
                max_per_domain,
                unlimited_ip,
                unlimited_domain,
            } => {
                let mut body = Map::new();
                if let Some(enabled) = enabled {
                    body.insert("enabled".into(), json!(enabled));
                }
                if let Some(window) = window_seconds {
                    body.insert("window_seconds".into(), json!(window));
                }
                if unlimited_ip {
                    body.insert("max_requests_per_ip".into(), Value::Null);
                } else if let Some(max) = max_per_ip {
                    body.insert("max_requests_per_ip".into(), json!(max));
                }
                if unlimited_domain {
                    body.insert("max_requests_per_domain".into(), Value::Null);
                } else if let Some(max) = max_per_domain {
                    body.insert("max_requests_per_domain".into(), json!(max));
                }
                client
                    .post(format!("{base}/admin/rate_limit/update"))
                    .json(&Value::Object(body))
            }
        },
        Commands::Allowlist { action } => match action {
            AllowlistAction::List => client.get(format!("{base}/admin/allowlist")),
            AllowlistAction::Add { pattern } => client
                .post(format!("{base}/admin/allowlist/add"))
                .json(&json!({ "pattern": pattern })),
            AllowlistAction::Remove { pattern } => client
                .post(format!("{base}/admin/allowlist/remove"))
                .json(&json!({ "pattern": pattern })),
        },
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await?;
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
