//! Command-line interface for couch-connector
//!
//! # Usage Examples
//!
//! ```bash
//! # Create the database if missing and reconcile design documents from a settings file
//! couch-connector --config couch.toml update
//!
//! # Drop and recreate the database
//! couch-connector --database people migrate
//!
//! # Store and read records
//! couch-connector --database people put '{"name": "Jason", "age": 44}'
//! couch-connector --database people put --id 0 '{"name": "Charlie", "age": 24}'
//! couch-connector --database people get 0
//!
//! # Query a view
//! couch-connector --database people view find byName '"Charlie"'
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use couch_connector::{Connector, CouchConnector, CouchOpts, Document};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "couch-connector")]
#[command(about = "Manage a CouchDB database and its records through the connector")]
#[command(long_about = None)]
struct Cli {
    #[command(flatten)]
    opts: CouchOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the server answers
    Ping,

    /// Create the database if missing and reconcile design documents
    Update {
        /// Model names (accepted for symmetry with the model layer)
        models: Vec<String>,
    },

    /// Drop and recreate the database, then reconcile design documents
    Migrate {
        /// Model names (accepted for symmetry with the model layer)
        models: Vec<String>,
    },

    /// Fetch one record
    Get { id: String },

    /// Create a record, or upsert it when --id is given
    Put {
        /// Target identifier
        #[arg(long)]
        id: Option<String>,

        /// Record as a JSON object
        record: String,
    },

    /// Delete one record
    Delete { id: String },

    /// Delete records matching a where-clause such as '{"id": {"inq": ["0", "1"]}}'
    DeleteWhere { filter: String },

    /// List every record (design documents excluded)
    List,

    /// Query a design-document view
    View {
        design: String,
        view: String,

        /// Keys as JSON values; bare words are taken as strings
        keys: Vec<String>,
    },

    /// Print the database URL
    Url,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let settings = cli
        .opts
        .to_settings()
        .context("Failed to load connector settings")?;
    let connector = CouchConnector::new(settings);

    let output = match cli.command {
        Commands::Ping => connector.ping().await.context("Ping failed")?,
        Commands::Update { models } => {
            let info = connector.update(&models).await.context("Update failed")?;
            serde_json::to_value(info)?
        }
        Commands::Migrate { models } => {
            let info = connector.migrate(&models).await.context("Migrate failed")?;
            serde_json::to_value(info)?
        }
        Commands::Get { id } => {
            let doc = connector
                .find_by_id(&id)
                .await
                .with_context(|| format!("Failed to fetch '{id}'"))?;
            Value::Object(doc)
        }
        Commands::Put { id, record } => {
            let record = parse_record(&record)?;
            let (id, rev) = match id {
                Some(id) => connector.save(&id, record).await,
                None => connector.create(record).await,
            }
            .context("Failed to write record")?;
            json!({"id": id, "rev": rev})
        }
        Commands::Delete { id } => {
            let deleted = connector.destroy_by_id(&id).await?;
            json!({"count": usize::from(deleted)})
        }
        Commands::DeleteWhere { filter } => {
            let filter: Value = serde_json::from_str(&filter)
                .with_context(|| format!("Invalid where-clause JSON: {filter}"))?;
            serde_json::to_value(connector.destroy_by_where(Some(&filter)).await?)?
        }
        Commands::List => {
            let rows = connector.all().await.context("Failed to list records")?;
            Value::Array(rows.into_iter().map(|(_, doc)| Value::Object(doc)).collect())
        }
        Commands::View { design, view, keys } => {
            let keys = (!keys.is_empty()).then(|| keys.iter().map(|k| parse_key(k)).collect());
            let response = connector
                .view(&design, &view, keys)
                .await
                .with_context(|| format!("Failed to query view {design}/{view}"))?;
            serde_json::to_value(response)?
        }
        Commands::Url => Value::String(connector.db_url().await?),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn parse_record(input: &str) -> anyhow::Result<Document> {
    match serde_json::from_str(input).with_context(|| format!("Invalid record JSON: {input}"))? {
        Value::Object(doc) => Ok(doc),
        other => anyhow::bail!("Record must be a JSON object, got: {other}"),
    }
}

fn parse_key(input: &str) -> Value {
    serde_json::from_str(input).unwrap_or_else(|_| Value::String(input.to_string()))
}
