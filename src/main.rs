//! Donation Ledger CLI
//!
//! ## Usage
//!
//! ```bash
//! # Create the database and a default config
//! donation-ledger init
//!
//! # First user becomes the administrator
//! donation-ledger --user admin --password secret bootstrap
//!
//! # Register an organization that can also provide
//! donation-ledger --user admin --password secret register-user org 0110 org-pass
//!
//! # Provider workflow
//! donation-ledger --user org --password org-pass create-donation
//! donation-ledger --user org --password org-pass add-item 1 Kale 5 lb
//!
//! # Receiver workflow
//! donation-ledger --user shelter --password pw unclaimed
//! donation-ledger --user shelter --password pw claim 1
//! ```
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use donation_ledger::db::donations::{Role, Status};
use donation_ledger::{Config, LedgerDb, Permissions, Services, Session};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "donation-ledger")]
#[command(about = "Track donated goods from providers to receivers")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "DONATION_LEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file (overrides config)
    #[arg(long, env = "DONATION_LEDGER_DB")]
    db: Option<PathBuf>,

    /// Acting user
    #[arg(long, env = "DONATION_LEDGER_USER", global = true)]
    user: Option<String>,

    /// Acting user's password
    #[arg(long, env = "DONATION_LEDGER_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database and write a default config if none exists
    Init,
    /// Register the first user (--user/--password) with full permissions
    Bootstrap,
    /// Register or update a child of the acting user
    RegisterUser {
        user_id: String,
        /// Permission bits as binary: admin, org, provider, receiver (e.g. 0110)
        #[arg(value_parser = parse_bits)]
        bits: Permissions,
        /// Password for a new user (ignored on update)
        child_password: String,
    },
    /// Replace the acting user's password
    ChangePassword { new_password: String },
    /// Show the acting user's permissions
    Whoami,
    /// Register a barcode in the catalog
    AddBarcode {
        code: String,
        title: String,
        unit: String,
    },
    /// List the barcode catalog
    Barcodes,
    /// Create a donation owned by the acting provider
    CreateDonation {
        /// Pre-assign a receiver
        #[arg(long)]
        receiver: Option<String>,
    },
    /// Add goods by hand
    AddItem {
        donation: i64,
        title: String,
        count: u32,
        unit: String,
    },
    /// Add goods from a scan code; counts below one count as one
    ScanItem {
        donation: i64,
        code: String,
        #[arg(default_value_t = 1, allow_negative_numbers = true)]
        count: i64,
    },
    /// Set an item's count; zero removes it
    EditItem {
        donation: i64,
        item: i64,
        count: u32,
    },
    /// List a donation's items
    Items { donation: i64 },
    /// Claim an open donation as the acting receiver
    Claim { donation: i64 },
    /// Release the acting receiver's claim
    Unclaim { donation: i64 },
    /// Mark a donation completed
    Complete { donation: i64 },
    /// Delete a donation and its items
    Delete { donation: i64 },
    /// List the acting user's donations
    Donations {
        #[arg(long, default_value = "provider")]
        role: Role,
        #[arg(long, default_value = "pending")]
        status: Status,
    },
    /// List donations open for any receiver to claim
    Unclaimed,
    /// Row counts
    Stats,
}

fn parse_bits(s: &str) -> Result<Permissions, String> {
    let raw = u8::from_str_radix(s, 2).map_err(|e| format!("expected binary bits: {e}"))?;
    Permissions::from_bits(raw).ok_or_else(|| format!("{s} has bits outside the 4-bit field"))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn credentials(args: &Args) -> anyhow::Result<(&str, &str)> {
    let user = args
        .user
        .as_deref()
        .ok_or_else(|| anyhow!("--user is required for this command"))?;
    let password = args
        .password
        .as_deref()
        .ok_or_else(|| anyhow!("--password is required for this command"))?;
    Ok((user, password))
}

fn login(services: &Services, args: &Args) -> anyhow::Result<Session> {
    let (user, password) = credentials(args)?;
    services
        .users
        .authenticate(user, password)
        .with_context(|| format!("login as {user}"))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(db) = &args.db {
        config.database_path = db.clone();
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(config.log_filter.parse()?))
        .init();

    std::fs::create_dir_all(config.data_dir())?;
    let db = Arc::new(LedgerDb::open(&config)?);
    let services = Services::new(db.clone());

    match &args.command {
        Command::Init => {
            let config_path = args
                .config
                .clone()
                .unwrap_or_else(|| config.data_dir().join("config.toml"));
            if !config_path.exists() {
                config.save(&config_path)?;
                info!(path = %config_path.display(), "Created default config");
            }
            print_json(&db.stats()?)?;
        }
        Command::Bootstrap => {
            let (user, password) = credentials(&args)?;
            print_json(&services.users.bootstrap(user, password)?)?;
        }
        Command::RegisterUser {
            user_id,
            bits,
            child_password,
        } => {
            let session = login(&services, &args)?;
            let outcome = services
                .users
                .register(&session, user_id, *bits, child_password)?;
            print_json(&outcome)?;
        }
        Command::ChangePassword { new_password } => {
            let (user, password) = credentials(&args)?;
            services.users.change_credential(user, password, new_password)?;
            print_json(&"ok")?;
        }
        Command::Whoami => {
            print_json(&login(&services, &args)?)?;
        }
        Command::AddBarcode { code, title, unit } => {
            let session = login(&services, &args)?;
            print_json(&services.catalog.register(&session, code, title, unit)?)?;
        }
        Command::Barcodes => {
            print_json(&services.catalog.list()?)?;
        }
        Command::CreateDonation { receiver } => {
            let session = login(&services, &args)?;
            print_json(&services.donations.create(&session, receiver.as_deref())?)?;
        }
        Command::AddItem {
            donation,
            title,
            count,
            unit,
        } => {
            let session = login(&services, &args)?;
            let item = services
                .donations
                .add_item(&session, *donation, title, *count, unit)?;
            print_json(&item)?;
        }
        Command::ScanItem {
            donation,
            code,
            count,
        } => {
            let session = login(&services, &args)?;
            let item = services
                .donations
                .scan_item(&session, *donation, code, *count)?;
            print_json(&item)?;
        }
        Command::EditItem {
            donation,
            item,
            count,
        } => {
            let session = login(&services, &args)?;
            let edited = services
                .donations
                .edit_item(&session, *donation, *item, *count)?;
            print_json(&edited)?;
        }
        Command::Items { donation } => {
            print_json(&services.donations.items(*donation)?)?;
        }
        Command::Claim { donation } => {
            let session = login(&services, &args)?;
            print_json(&services.donations.claim(&session, *donation)?)?;
        }
        Command::Unclaim { donation } => {
            let session = login(&services, &args)?;
            print_json(&services.donations.unclaim(&session, *donation)?)?;
        }
        Command::Complete { donation } => {
            let session = login(&services, &args)?;
            print_json(&services.donations.complete(&session, *donation)?)?;
        }
        Command::Delete { donation } => {
            let session = login(&services, &args)?;
            let items_removed = services.donations.delete(&session, *donation)?;
            print_json(&serde_json::json!({
                "donation_id": donation,
                "items_removed": items_removed,
            }))?;
        }
        Command::Donations { role, status } => {
            let session = login(&services, &args)?;
            print_json(&services.donations.list(&session, *role, *status)?)?;
        }
        Command::Unclaimed => {
            let session = login(&services, &args)?;
            print_json(&services.donations.unclaimed(&session)?)?;
        }
        Command::Stats => {
            print_json(&db.stats()?)?;
        }
    }

    Ok(())
}
