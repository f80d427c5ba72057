//! raftkv CLI - Main entry point.

use raftkv::cli::{Cli, Commands};
use raftkv::config::NodeConfig;
use raftkv::net::client;
use raftkv::raft::{ClientRequest, ClientResponse};
use raftkv::KvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    match cli.command {
        Commands::Server { config } => {
            let config = NodeConfig::from_file(&config)?;
            raftkv::run(config).await?;
        }

        Commands::Set { addr, key, value } => {
            let response = client::request(&addr, &ClientRequest::Set { key, value }).await?;
            match response {
                ClientResponse::Set { ok: true, .. } => println!("OK"),
                ClientResponse::Set {
                    ok: false,
                    leader_id,
                } => return Err(KvError::NotLeader { leader: leader_id }.into()),
                other => anyhow::bail!("unexpected response: {:?}", other),
            }
        }

        Commands::Get { addr, key } => {
            let response = client::request(&addr, &ClientRequest::Get { key }).await?;
            match response {
                ClientResponse::Get { value, .. } => match value {
                    Some(value) => println!("{}", value),
                    None => println!("(nil)"),
                },
                other => anyhow::bail!("unexpected response: {:?}", other),
            }
        }

        Commands::Echo { addr, payload } => {
            let response = client::request(&addr, &ClientRequest::Echo { payload }).await?;
            match response {
                ClientResponse::Echo { payload } => println!("{}", payload),
                other => anyhow::bail!("unexpected response: {:?}", other),
            }
        }
    }

    Ok(())
}
