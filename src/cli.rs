// src/cli.rs
use clap::Parser;

/// Run a MongoDB workflow operation described by a request file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Request file (YAML or JSON) naming the operation and its parameters
    #[arg(long, required_unless_present = "check_credentials")]
    pub request: Option<String>,

    /// Input items: a JSON array/object file or a CSV file
    #[arg(long)]
    pub input: Option<String>,

    /// Credentials file (YAML); overrides credentials inside the request
    #[arg(long)]
    pub credentials: Option<String>,

    /// MongoDB URI; used together with --db instead of a credentials file
    #[arg(long, requires = "db")]
    pub mongo_uri: Option<String>,

    /// Database name for --mongo-uri
    #[arg(long)]
    pub db: Option<String>,

    /// Treat the first CSV row as data
    #[arg(long)]
    pub no_header: bool,

    /// Turn item failures into error records instead of aborting
    #[arg(long)]
    pub continue_on_fail: bool,

    /// Only verify the credentials and the configured database
    #[arg(long)]
    pub check_credentials: bool,

    #[arg(long)]
    pub debug: bool,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,
}
