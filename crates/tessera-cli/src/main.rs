//! tessera - command-line access to the tessera data layer
//!
//! Usage:
//!   tessera check-config                      Validate the config file
//!   tessera ping                              Check the server answers
//!   tessera query '<object>' --limit 10       Find in one collection
//!   tessera query-all '<object>'... --count 5 Search several collections
//!   tessera owner <id>                        Which collection holds an id
//!   tessera put <path> --meta '{"a.b": 1}'    Store a file as a large object
//!   tessera get <name> --out <path>           Read a large object
//!   tessera exists <id>                       Whether a large object exists
//!   tessera rm <id>                           Remove a large object
//!   tessera ls [name]                         List large objects
//!
//! `<object>` is a JSON database object: `{"collection": "...", "values": {...}}`

use anyhow::{bail, Context, Result};
use bson::{oid::ObjectId, Bson, Document as BsonDocument};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_mongodb::{
    Config, ConnectionManager, DatabaseObject, Handler, LargeObjectWrite, MemoryConnector,
    MemoryStore, OperationOptions, DEFAULT_CHUNK_SIZE,
};
use tokio::io::AsyncWriteExt;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(about = "Generic MongoDB access: CRUD, federated search and large objects")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: Level,

    /// Run against an empty in-memory store instead of the configured server
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the config file without connecting
    CheckConfig,

    /// Connect and ping the server
    Ping,

    /// Find documents in one collection
    Query {
        /// Database object JSON
        object: String,

        #[arg(long)]
        limit: Option<i64>,
    },

    /// Search several collections and tag results with their owner
    QueryAll {
        /// Database object JSON, one per collection
        #[arg(required = true)]
        objects: Vec<String>,

        /// Keep only the first N results
        #[arg(long)]
        count: Option<usize>,
    },

    /// Collection holding a document with this id
    Owner { id: String },

    /// Store a local file as a large object
    Put {
        path: PathBuf,

        /// Object name (defaults to the file name)
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        content_type: Option<String>,

        /// Metadata JSON object; dotted keys are nested
        #[arg(long)]
        meta: Option<String>,

        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: u32,

        /// Skip reading the object back after writing
        #[arg(long)]
        no_verify: bool,
    },

    /// Read a large object by name
    Get {
        name: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Whether a large object with this id exists
    Exists { id: String },

    /// Remove the large object with this id
    Rm { id: String },

    /// List large object names, or check a single name
    Ls { name: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Command::CheckConfig = cli.command {
        return check_config(&cli.config);
    }

    let handler = build_handler(&cli).await?;
    let outcome = run(&handler, cli.command).await;
    handler
        .close_connection()
        .await
        .context("closing the store connection")?;
    outcome
}

fn check_config(path: &Path) -> Result<()> {
    let report = Config::check_file(path)
        .with_context(|| format!("reading {}", path.display()))?;
    if report.ok {
        println!("{}: ok", path.display());
        return Ok(());
    }
    for error in &report.errors {
        eprintln!("{}", error);
    }
    bail!("{} has {} problem(s)", path.display(), report.errors.len())
}

async fn build_handler(cli: &Cli) -> Result<Handler> {
    if cli.dry_run {
        info!("dry run: using an in-memory store");
        let connector = MemoryConnector::new(Arc::new(MemoryStore::new()));
        return Ok(Handler::new(Arc::new(ConnectionManager::new(Arc::new(
            connector,
        )))));
    }

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    Handler::connect(&config)
        .await
        .with_context(|| format!("connecting to {}", config.connection_url()))
}

async fn run(handler: &Handler, command: Command) -> Result<()> {
    match command {
        Command::CheckConfig => Ok(()),
        Command::Ping => {
            handler.ping().await?;
            println!("ok");
            Ok(())
        }
        Command::Query { object, limit } => {
            let mut object = parse_object(&object)?;
            let options = OperationOptions {
                limit,
                ..Default::default()
            };
            print_documents(handler.query(&options, &mut object).await?)
        }
        Command::QueryAll { objects, count } => {
            let mut objects = objects
                .iter()
                .map(|raw| parse_object(raw))
                .collect::<Result<Vec<_>>>()?;
            print_documents(handler.query_all(&mut objects, count).await?)
        }
        Command::Owner { id } => {
            match handler.resolve_owner(&parse_id(&id)).await? {
                Some(collection) => println!("{}", collection),
                None => println!("none"),
            }
            Ok(())
        }
        Command::Put {
            path,
            name,
            content_type,
            meta,
            chunk_size,
            no_verify,
        } => {
            let name = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .context("cannot derive an object name from the path")?,
            };
            let mut request = LargeObjectWrite::new(name)
                .chunk_size(chunk_size)
                .verify(!no_verify);
            if let Some(content_type) = content_type {
                request = request.content_type(content_type);
            }
            if let Some(meta) = meta {
                request = request.metadata(parse_metadata(&meta)?);
            }

            let stored = handler
                .insert_file(&path, request)
                .await
                .with_context(|| format!("storing {}", path.display()))?;
            println!("{} {} ({} bytes)", stored.id, stored.name, stored.length);
            Ok(())
        }
        Command::Get { name, out } => {
            let payload = handler.read_large_object(&name).await?;
            match out {
                Some(path) => tokio::fs::write(&path, &payload)
                    .await
                    .with_context(|| format!("writing {}", path.display()))?,
                None => {
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(&payload).await?;
                    stdout.flush().await?;
                }
            }
            Ok(())
        }
        Command::Exists { id } => {
            println!("{}", handler.object_exists(&parse_id(&id)).await?);
            Ok(())
        }
        Command::Rm { id } => {
            handler.remove_object(&parse_id(&id)).await?;
            Ok(())
        }
        Command::Ls { name: Some(name) } => {
            println!("{}", handler.file_is_listed(&name).await?);
            Ok(())
        }
        Command::Ls { name: None } => {
            for name in handler.list_large_objects().await? {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

fn parse_object(raw: &str) -> Result<DatabaseObject> {
    let json: serde_json::Value =
        serde_json::from_str(raw).with_context(|| format!("not JSON: {}", raw))?;
    Ok(DatabaseObject::from_json(&json)?)
}

fn parse_metadata(raw: &str) -> Result<BsonDocument> {
    let json: serde_json::Value =
        serde_json::from_str(raw).with_context(|| format!("not JSON: {}", raw))?;
    bson::to_document(&json).context("metadata must be a JSON object")
}

/// 24 hex digits name an ObjectId; anything else is a string id
fn parse_id(raw: &str) -> Bson {
    match ObjectId::parse_str(raw) {
        Ok(oid) => Bson::ObjectId(oid),
        Err(_) => Bson::String(raw.to_string()),
    }
}

fn print_documents(documents: Vec<BsonDocument>) -> Result<()> {
    let json: Vec<serde_json::Value> = documents
        .into_iter()
        .map(|document| Bson::Document(document).into_relaxed_extjson())
        .collect();
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
