use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "ring-cli")]
#[command(about = "Management CLI for the ring monitor", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8087")]
    url: String,

    /// Admin bearer key, if the daemon has one configured.
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show state, endpoint, session and wake sources
    Status,
    /// Start monitoring
    Start,
    /// Stop monitoring
    Stop,
    /// Start if idle, stop otherwise
    Toggle,
    /// Stop and start with a fresh session
    Restart,
    /// Start if needed and repair a dead poll loop (for cron / timers)
    Ensure,
}

impl Commands {
    fn request(&self) -> (Method, &'static str) {
        match self {
            Commands::Status => (Method::GET, "status"),
            Commands::Start => (Method::POST, "start"),
            Commands::Stop => (Method::POST, "stop"),
            Commands::Toggle => (Method::POST, "toggle"),
            Commands::Restart => (Method::POST, "restart"),
            Commands::Ensure => (Method::POST, "ensure"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", key))?,
        );
    }

    let (method, action) = cli.command.request();
    let res = client
        .request(method, format!("{}/admin/{}", cli.url.trim_end_matches('/'), action))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Err(format!("admin request failed with {}", status).into());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
