//! `shadowfed-resolve`: resolve one remote object and print it as JSON.
//!
//! # Quick start
//!
//! ```sh
//! shadowfed-resolve account @alice@social.example
//! shadowfed-resolve status https://social.example/users/alice/statuses/1 --thread
//! shadowfed-resolve instance social.example
//!
//! # Keep what was fetched:
//! SHADOWFED_DB=./shadow.db shadowfed-resolve account https://social.example/users/alice
//! ```
//!
//! # Environment variables
//!
//! See [`DerefConfig::from_env`] for the full list.

use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use shadowfed::Handle;
use shadowfed_deref::{
    DerefConfig, DerefError, Dereferencer, HttpTransportController, LocalMediaManager,
    MemoryStorage, Requester, Signer, SqliteStorage, Storage,
};

#[derive(Parser)]
#[command(
    name = "shadowfed-resolve",
    about = "Resolve remote accounts, statuses and instances into shadow records",
    version
)]
struct Cli {
    /// Local user whose key signs the requests. Defaults to the instance actor.
    #[arg(long, global = true, env = "SHADOWFED_REQUESTER", default_value = "")]
    requester: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve an actor by URI or by handle (`user@host`, `@user@host`, `acct:user@host`).
    Account { target: String },

    /// Resolve a status by URI.
    Status {
        uri: String,
        /// Also backfill ancestors and replies.
        #[arg(long)]
        thread: bool,
    },

    /// Fetch instance metadata for a host.
    Instance { host: String },
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => {
            eprintln!("error: could not serialise result: {e}");
            process::exit(1);
        }
    }
}

fn fail(err: DerefError) -> ! {
    eprintln!("error ({}): {err}", err.kind());
    process::exit(match err.kind() {
        shadowfed_deref::ErrorKind::Unretrievable => 2,
        shadowfed_deref::ErrorKind::Transport => 3,
        _ => 1,
    });
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shadowfed_deref=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = DerefConfig::from_env();

    let storage: Arc<dyn Storage> = match &config.db_path {
        Some(path) => {
            tracing::info!("storage: SQLite at {path}");
            Arc::new(
                SqliteStorage::open(path)
                    .unwrap_or_else(|e| panic!("failed to open SQLite database at {path}: {e}")),
            )
        }
        None => {
            tracing::info!("storage: in-memory (nothing is kept after exit)");
            Arc::new(MemoryStorage::new())
        }
    };

    let instance_key_id = format!("{}://{}/actor#main-key", config.scheme(), config.host);
    let transports = HttpTransportController::from_config(&config, Signer::generate(instance_key_id))
        .expect("failed to build HTTP client");
    let media = LocalMediaManager::new(config.media_dir.clone(), config.media_max_bytes);

    let deref = Dereferencer::new(storage, Arc::new(transports), Arc::new(media), config);

    let cancel = tokio_util::sync::CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted, cancelling");
                cancel.cancel();
            }
        });
    }
    let req = Requester::new(cli.requester).with_cancel(cancel);

    match cli.command {
        Command::Account { target } => {
            let result = if target.starts_with("http://") || target.starts_with("https://") {
                deref.resolve_account(&req, &target).await
            } else {
                let handle = Handle::parse(&target).unwrap_or_else(|e| {
                    eprintln!("error: {e}");
                    process::exit(1);
                });
                deref
                    .resolve_account_by_handle(&req, &handle.username, &handle.domain)
                    .await
            };
            match result {
                Ok((account, _)) => print_json(&account),
                Err(e) => fail(e),
            }
        }
        Command::Status { uri, thread } => {
            if thread {
                if let Err(e) = deref.resolve_thread(&req, &uri).await {
                    fail(e);
                }
            }
            match deref.resolve_status(&req, &uri).await {
                Ok((status, _)) => print_json(&status),
                Err(e) => fail(e),
            }
        }
        Command::Instance { host } => match deref.resolve_instance(&req, &host).await {
            Ok(instance) => print_json(&instance),
            Err(e) => fail(e),
        },
    }
}
