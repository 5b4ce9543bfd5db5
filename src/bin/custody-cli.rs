use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};

use custody_sweeper::chain::Network;
use custody_sweeper::config::loader::MASTER_SEED_ENV_VAR;
use custody_sweeper::config::SecretString;
use custody_sweeper::keys::derivation::custodial_path;
use custody_sweeper::keys::KeyDerivationService;
use custody_sweeper::notify::INTERNAL_API_KEY_HEADER;

#[derive(Parser)]
#[command(name = "custody-cli")]
#[command(about = "Operator CLI for the custody sweeper", long_about = None)]
struct Cli {
    #[arg(short, long, env = "CUSTODY_ADMIN_URL", default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, env = "CUSTODY_INTERNAL_API_KEY", hide_env_values = true)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Engine cycle stats, deposit counts and cached price
    Status,
    /// List deposits, optionally filtered by status
    Deposits {
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Mark a CONFIRMED deposit as CREDITED
    Credit { id: String },
    /// Provision a new custodial address
    Provision {
        #[arg(short, long)]
        merchant: String,
        #[arg(short, long)]
        network: Network,
        #[arg(short, long, default_value = "USDT")]
        asset: String,
    },
    /// Derive an address locally from the master seed in the environment
    Derive { network: Network, index: u32 },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let client = reqwest::Client::new();
    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(INTERNAL_API_KEY_HEADER, HeaderValue::from_str(key)?);
    }
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Status => {
            client
                .get(format!("{}/internal/status", base))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Deposits { status } => {
            let mut request = client.get(format!("{}/internal/deposits", base));
            if let Some(status) = status {
                request = request.query(&[("status", status)]);
            }
            request.headers(headers).send().await?
        }
        Commands::Credit { id } => {
            client
                .post(format!("{}/internal/deposits/{}/credited", base, id))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Provision {
            merchant,
            network,
            asset,
        } => {
            client
                .post(format!("{}/internal/addresses", base))
                .headers(headers)
                .json(&json!({ "merchantId": merchant, "network": network, "asset": asset }))
                .send()
                .await?
        }
        Commands::Derive { network, index } => return derive(network, index),
    };
    print_response(res).await
}

fn derive(network: Network, index: u32) -> Result<(), Box<dyn std::error::Error>> {
    let seed = std::env::var(MASTER_SEED_ENV_VAR)
        .map_err(|_| format!("{} is not set", MASTER_SEED_ENV_VAR))?;
    let keys = KeyDerivationService::from_secret(&SecretString::new(seed))?;
    let address = keys.derive_address(network, index)?;

    let out = json!({
        "network": network,
        "index": index,
        "path": custodial_path(network, index),
        "address": address,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: internal API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
