use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, HOST};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gatectl")]
#[command(about = "Inspect a running camp-gate", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080", env = "CAMP_GATE_URL")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gate status: cache size, live rate buckets, blocklist size
    Status,
    /// Show the tenant and user a session token is admitted as
    Whoami {
        /// Tenant host to present, e.g. camp.example.org
        #[arg(long)]
        host: String,

        /// Session token (the stinky_token cookie value)
        #[arg(long, env = "CAMP_SESSION_TOKEN")]
        token: String,

        /// Act on another tenant via the override header
        #[arg(long)]
        site_id: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{}/_gate/status", cli.url)).send().await?;
            print_response(res).await?;
        }
        Commands::Whoami { host, token, site_id } => {
            let mut headers = HeaderMap::new();
            headers.insert(HOST, HeaderValue::from_str(&host)?);
            headers.insert(COOKIE, HeaderValue::from_str(&format!("stinky_token={token}"))?);
            if let Some(id) = site_id {
                headers.insert("x-site-id", HeaderValue::from(id));
            }

            let res = client
                .get(format!("{}/api/session", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gate returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
