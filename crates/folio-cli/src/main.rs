use std::io::Read;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use folio_core::pdf::{self, RenderOptions};
use folio_core::{DocumentId, NewDocument};
use folio_engine::Issued;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod display;
mod server;

use config::{DeskArgs, GatewayArgs, MailArgs};

#[derive(Parser)]
#[command(name = "folio", version)]
#[command(about = "Quotes, invoices and contracts: issue, sign, pay, reconcile")]
struct Cli {
    /// DuckDB database file
    #[arg(long, env = "FOLIO_DB", default_value = "folio.duckdb", global = true)]
    db: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, env = "FOLIO_LOG_JSON", global = true)]
    log_json: bool,

    #[command(flatten)]
    desk: DeskArgs,

    #[command(flatten)]
    gateway: GatewayArgs,

    #[command(flatten)]
    mail: MailArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        #[arg(long, env = "FOLIO_LISTEN", default_value = "127.0.0.1:3000")]
        listen: SocketAddr,

        /// Bearer token for /api/admin routes
        #[arg(long, env = "FOLIO_ADMIN_TOKEN", hide_env_values = true)]
        admin_token: String,
    },
    /// Create a draft from a JSON file ("-" for stdin)
    Create { file: PathBuf },
    /// Issue the access link for a draft and email it to the party
    Send { id: DocumentId },
    /// Replace the access link and email the new one
    Reissue { id: DocumentId },
    /// Send a reminder with a fresh access link
    Remind { id: DocumentId },
    /// Show a document with its payments, notifications and history
    Show { id: DocumentId },
    /// Write the document PDF
    Render {
        id: DocumentId,
        /// Output path (default: <reference>.pdf)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    Cancel { id: DocumentId },
    /// Close a signed quote or contract, or a paid invoice
    Complete { id: DocumentId },
    /// Expire every open document past its expiry date
    Expire,
    /// Document counts by status and captured revenue
    Report,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let (desk, store) = config::build_desk(&cli.db, &cli.desk, &cli.gateway, &cli.mail)?;

    match cli.command {
        Command::Serve {
            listen,
            admin_token,
        } => {
            anyhow::ensure!(!admin_token.trim().is_empty(), "admin token must not be empty");
            server::serve(desk, listen, &admin_token).await?;
        }
        Command::Create { file } => {
            let new = read_new_document(&file)?;
            let doc = desk.documents.create(new).await?;
            display::print_document_card(&doc);
        }
        Command::Send { id } => print_issued(&desk.documents.send(&id).await?),
        Command::Reissue { id } => print_issued(&desk.documents.reissue(&id).await?),
        Command::Remind { id } => print_issued(&desk.documents.remind(&id).await?),
        Command::Show { id } => display::print_document_card(&desk.documents.get(&id).await?),
        Command::Render { id, out } => {
            let doc = desk.documents.get(&id).await?;
            let options = RenderOptions {
                agency_name: desk.config.agency_name.clone(),
                generated_at: doc.updated_at,
            };
            let bytes = pdf::render(&doc, &options)?;
            let out = out.unwrap_or_else(|| PathBuf::from(format!("{}.pdf", doc.reference)));
            std::fs::write(&out, &bytes).with_context(|| format!("writing {}", out.display()))?;
            println!("Wrote {} ({} bytes)", out.display(), bytes.len());
        }
        Command::Cancel { id } => {
            let doc = desk.documents.cancel(&id).await?;
            println!("{} {} is now {}", doc.kind.label(), doc.reference, doc.status);
        }
        Command::Complete { id } => {
            let doc = desk.documents.complete(&id).await?;
            println!("{} {} is now {}", doc.kind.label(), doc.reference, doc.status);
        }
        Command::Expire => {
            let expired = desk.documents.expire_overdue(chrono::Utc::now()).await?;
            println!("Expired {} document(s)", expired.len());
            for id in expired {
                println!("  {id}");
            }
        }
        Command::Report => display::print_report(&store.ledger_report()?)?,
    }

    Ok(())
}

fn read_new_document(file: &Path) -> anyhow::Result<NewDocument> {
    let json = if file.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?
    };
    serde_json::from_str(&json).context("parsing document JSON")
}

fn print_issued(issued: &Issued) {
    let doc = &issued.document;
    println!("{} {} is {}", doc.kind.label(), doc.reference, doc.status);
    println!("  link        {}", issued.link);
    match &issued.notification.error_detail {
        None => println!("  emailed     {}", issued.notification.recipient),
        Some(error) => println!(
            "  email to {} FAILED: {error}",
            issued.notification.recipient
        ),
    }
}
