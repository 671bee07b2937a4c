//! certbind - administration of MDM certificate associations
//!
//! Computes certificate hashes, inspects the association database and
//! reports the effective configuration.

use std::path::{Path, PathBuf};

use certbind_core::{CertHash, Certificate};
use certbind_server::{AssociationRecord, ConfigOverrides, ServerConfig, SqliteCertAuthStore};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

// ============================================================================
// CLI Definition
// ============================================================================

/// certbind - MDM certificate association administration
#[derive(Parser)]
#[command(name = "certbind", version, about)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Association database path [env: CERTBIND_DB]
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Let one certificate be bound to several enrollments
    #[arg(long, global = true)]
    allow_duplicates: bool,

    /// Bind certificates of existing enrollments on first sight
    #[arg(long, global = true)]
    allow_retroactive: bool,

    /// Log violations but let requests through
    #[arg(long, global = true)]
    warn_only: bool,

    /// Webhook receiving check-in and command events
    #[arg(long, global = true)]
    webhook_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the hash of a PEM or DER certificate
    Hash {
        /// Certificate file
        cert: PathBuf,
    },

    /// Inspect stored associations
    Assoc {
        #[command(subcommand)]
        action: AssocAction,
    },

    /// Print the effective configuration
    Check,
}

#[derive(Subcommand)]
enum AssocAction {
    /// List all associations
    List,

    /// Show the associations of an enrollment id
    Show {
        #[arg(long)]
        id: String,
    },

    /// List enrollments bound to a certificate hash
    Find {
        #[arg(long)]
        hash: String,
    },
}

impl From<GlobalArgs> for ConfigOverrides {
    fn from(args: GlobalArgs) -> Self {
        Self {
            db_path: args.db,
            allow_duplicates: args.allow_duplicates,
            allow_retroactive: args.allow_retroactive,
            warn_only: args.warn_only,
            webhook_url: args.webhook_url,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::from_env()?.with_overrides(cli.global.into());

    match cli.command {
        Commands::Hash { cert } => cmd_hash(&cert),
        Commands::Assoc { action } => cmd_assoc(&config, action).await,
        Commands::Check => cmd_check(&config),
    }
}

fn cmd_hash(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)?;
    let cert = Certificate::from_pem_or_der(&bytes)?;
    println!("{}", cert.hash());
    Ok(())
}

async fn cmd_assoc(
    config: &ServerConfig,
    action: AssocAction,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::debug!(path = %config.db_path.display(), "Opening association database");
    let store = SqliteCertAuthStore::open(&config.db_path).await?;

    let records = match action {
        AssocAction::List => store.list_associations().await?,
        AssocAction::Show { id } => store.find_by_enroll_id(&id).await?,
        AssocAction::Find { hash } => {
            let hash = CertHash::parse(&hash.to_ascii_lowercase())?;
            store.find_by_cert_hash(&hash).await?
        }
    };

    if records.is_empty() {
        println!("No associations found.");
        return Ok(());
    }

    println!("{:<40} {:<24} {:<64} UPDATED", "ENROLLMENT", "TYPE", "CERT HASH");
    for record in &records {
        print_record(record);
    }
    Ok(())
}

fn print_record(record: &AssociationRecord) {
    let updated = chrono::DateTime::from_timestamp(record.updated_at, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!(
        "{:<40} {:<24} {:<64} {}",
        record.enroll_id.id,
        record.enroll_id.enroll_type.as_str(),
        record.cert_hash.as_str(),
        updated
    );
}

fn cmd_check(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let policy = config.policy;

    println!("Database:          {}", config.db_path.display());
    println!("Allow duplicates:  {}", policy.allow_duplicates);
    println!("Allow retroactive: {}", policy.allow_retroactive);
    println!("Warn only:         {}", policy.warn_only);
    println!(
        "Webhook:           {}",
        config.webhook_url.as_deref().unwrap_or("(none)")
    );

    if policy.warn_only {
        println!();
        println!("WARNING: warn-only mode lets spoofed clients through.");
    }
    Ok(())
}
