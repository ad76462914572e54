//! `kernelkit-core` keeps the client-side state of Kernel smart accounts.
//!
//! - [`store::ConnectionStore`]: configured chains, lazily built per-chain clients and
//!   the persisted, versioned set of connections.
//! - [`session::SessionRegistry`]: durable session keys and their grants.
//! - [`nonce`]: nonce-key derivation for parallel submission lanes.
//! - [`actions`]: connect, switch chain, create sessions and submit operations
//!   through the collaborator traits of [`account`].
//!
//! Account construction, bundler transport and authentication ceremonies are
//! supplied by the host through those traits.
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod account;
pub mod actions;
pub mod chain;
pub mod entry_point;
pub mod logger;
pub mod nonce;
pub mod primitives;
pub mod session;
pub mod storage;
pub mod store;

mod error;
pub use error::*;

pub use chain::{Chain, ChainConfig, Transport};
pub use entry_point::{EntryPointVersion, KernelVersion};
pub use nonce::{derive_nonce_key, NonceLane};
pub use session::{SessionId, SessionRecord, SessionRegistry};
pub use store::{ConnectionState, ConnectionStore, PersistOptions};

uniffi::setup_scaffolding!("kernelkit_core");
