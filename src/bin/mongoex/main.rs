// src/bin/mongoex/main.rs
use anyhow::{anyhow, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mongoex::cli::Cli;
use mongoex::credentials::{check_credentials, CheckStatus, Credentials};
use mongoex::items::{default_items, load_items};
use mongoex::mongo::MongoConnector;
use mongoex::request::{NodeRequest, RequestContext};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.debug { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli_credentials = credentials_from_args(&args)?;

    if args.check_credentials {
        let credentials = match cli_credentials {
            Some(c) => c,
            None => {
                let path = args
                    .request
                    .as_deref()
                    .ok_or_else(|| anyhow!("--check-credentials needs --credentials, --mongo-uri or --request"))?;
                NodeRequest::load(path)?
                    .credentials
                    .ok_or_else(|| anyhow!("No credentials found in {}", path))?
            }
        };
        let check = check_credentials(&MongoConnector, &credentials).await;
        print_json(&check, args.pretty)?;
        return match check.status {
            CheckStatus::Ok => Ok(()),
            CheckStatus::Error => Err(anyhow!(check.message)),
        };
    }

    let request_path = args
        .request
        .as_deref()
        .ok_or_else(|| anyhow!("--request is required"))?;
    let request = NodeRequest::load(request_path)?;

    let items = match &args.input {
        Some(path) => load_items(path, args.no_header)?,
        None => default_items(),
    };
    info!(operation = %request.operation, items = items.len(), "loaded request");

    let mut ctx = RequestContext::new(request, items);
    if args.continue_on_fail {
        ctx.set_continue_on_fail(true);
    }
    if let Some(credentials) = cli_credentials {
        ctx = ctx.with_credentials(credentials);
    }

    let records = mongoex::execute(&MongoConnector, &ctx).await?;
    info!(records = records.len(), "operation finished");
    print_json(&records, args.pretty)
}

fn credentials_from_args(args: &Cli) -> Result<Option<Credentials>> {
    if let Some(path) = &args.credentials {
        return Ok(Some(Credentials::load(path)?));
    }
    Ok(match (&args.mongo_uri, &args.db) {
        (Some(uri), Some(db)) => Some(Credentials::from_uri(uri.as_str(), db.as_str())),
        _ => None,
    })
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}
