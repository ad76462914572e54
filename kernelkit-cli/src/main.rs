//! `kernelkit`: developer CLI over a KernelKit storage root.
//!
//! The root holds `chains.json` plus one JSON file per storage key, so the same
//! directory can be inspected while an application is using it.

mod config;
mod file_store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use alloy_primitives::Address;
use clap::{Parser, Subcommand};
use eyre::eyre;
use kernelkit_core::chain::EndpointClientBuilder;
use kernelkit_core::nonce::{generate_nonce_seed, nonce_key_hex};
use kernelkit_core::primitives::ParseFromForeignBinding;
use kernelkit_core::session::Policy;
use kernelkit_core::{
    ConnectionState, ConnectionStore, EntryPointVersion, KernelKitError, PersistOptions,
    SessionId, SessionRecord, SessionRegistry,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use crate::file_store::FileStore;

#[derive(Parser)]
#[command(name = "kernelkit", version, about = "Inspect KernelKit state, sessions and nonce lanes")]
struct Cli {
    /// Storage root. Defaults to the platform data directory.
    #[arg(long, env = "KERNELKIT_ROOT", global = true)]
    root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List configured chains and the transport each resolves to
    Chains,

    /// Persisted connection state
    State {
        #[command(subcommand)]
        command: StateCommand,
    },

    /// Stored sessions
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },

    /// Derive the nonce key of a lane
    NonceKey {
        /// Lane seed. A random seed is generated when omitted.
        seed: Option<String>,

        /// Entry point revision of the account (v0.6 or v0.7)
        #[arg(long, default_value = "v0.7")]
        entry_point: EntryPointVersion,
    },
}

#[derive(Clone, Copy, Subcommand)]
enum StateCommand {
    /// Print the current state
    Show,
    /// Reset to the initial state
    Reset,
    /// Set the active chain without touching connections
    SetChain {
        /// A configured chain id
        chain_id: u64,
    },
}

#[derive(Subcommand)]
enum SessionsCommand {
    /// List stored sessions
    List {
        /// Only sessions of this account
        #[arg(long, value_parser = parse_account)]
        account: Option<Address>,
        /// Only sessions scoped to this chain
        #[arg(long)]
        chain: Option<u64>,
    },
    /// Show which session would be used for an account on a chain
    Resolve {
        /// Smart account address
        #[arg(long, value_parser = parse_account)]
        account: Address,
        /// Active chain id
        #[arg(long)]
        chain: u64,
        /// Explicit session id
        #[arg(long)]
        id: Option<SessionId>,
    },
    /// Remove a stored session
    Remove {
        /// Session id, e.g. `0xe001:1`
        id: SessionId,
    },
}

fn parse_account(value: &str) -> Result<Address, KernelKitError> {
    Address::parse_from_ffi(value, "account")
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let root = cli.root.map_or_else(default_root, Ok)?;
    tracing::debug!(root = %root.display(), "using storage root");

    match cli.command {
        Command::Chains => chains(&root),
        Command::State { command } => state(&root, command),
        Command::Sessions { command } => sessions(&root, command),
        Command::NonceKey { seed, entry_point } => {
            let seed = seed.unwrap_or_else(generate_nonce_seed);
            println!("seed: {seed}");
            println!("key:  {}", nonce_key_hex(&seed, entry_point));
            Ok(())
        }
    }
}

fn default_root() -> eyre::Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("kernelkit"))
        .ok_or_else(|| eyre!("no data directory on this platform, pass --root"))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_json(value: &impl serde::Serialize) -> eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn chains(root: &Path) -> eyre::Result<()> {
    let config = config::load(root)?;
    for chain in config.chains() {
        let transport = config
            .resolve_transport(chain.id)
            .map_or_else(|err| format!("<{err}>"), |transport| transport.url().to_string());
        println!("{}\t{}\t{transport}", chain.id, chain.name);
    }
    Ok(())
}

fn open_store(root: &Path) -> eyre::Result<ConnectionStore> {
    let config = config::load(root)?;
    let backend = Arc::new(FileStore::open(root)?);
    Ok(ConnectionStore::with_persistence(
        config,
        EndpointClientBuilder,
        PersistOptions::new(backend),
    ))
}

fn state(root: &Path, command: StateCommand) -> eyre::Result<()> {
    let store = open_store(root)?;
    match command {
        StateCommand::Show => {}
        StateCommand::Reset => store.replace_state(store.initial_state().clone()),
        StateCommand::SetChain { chain_id } => {
            store.chain(chain_id)?;
            store.set_state(|state| ConnectionState {
                chain_id,
                ..state.clone()
            });
        }
    }
    print_json(&*store.state())
}

fn describe(id: &SessionId, record: &SessionRecord) -> Value {
    let policies: Vec<String> = record
        .grants
        .policies()
        .iter()
        .map(|policy| Policy::kind(policy.as_ref()).to_string())
        .collect();
    json!({
        "id": id.to_string(),
        "chainId": id.chain_id(),
        "smartAccount": record.smart_account,
        "entryPoint": record.grants.entry_point(),
        "policies": policies,
        "permissions": record.grants.permissions().len(),
    })
}

fn sessions(root: &Path, command: SessionsCommand) -> eyre::Result<()> {
    let registry = SessionRegistry::new(Arc::new(FileStore::open(root)?));
    match command {
        SessionsCommand::List { account, chain } => {
            let listed: Vec<Value> = registry
                .get_all()
                .iter()
                .filter(|(id, record)| {
                    account.is_none_or(|account| account == record.smart_account)
                        && chain.is_none_or(|chain| id.is_scoped_to(chain))
                })
                .map(|(id, record)| describe(id, record))
                .collect();
            print_json(&listed)
        }
        SessionsCommand::Resolve { account, chain, id } => {
            let (id, record) = registry.resolve(account, chain, id.as_ref())?;
            print_json(&describe(&id, &record))
        }
        SessionsCommand::Remove { id } => {
            if !registry.remove(&id)? {
                eyre::bail!("no session stored under {id}");
            }
            println!("removed {id}");
            Ok(())
        }
    }
}
