//! Session keys: delegated, revocable signing authority for a smart account.
//!
//! A session pairs an ephemeral private key with the capabilities the account's
//! sudo validator granted to it. Records are kept in a [`SessionRegistry`] and
//! picked for submission with [`SessionRegistry::resolve`], which refuses to
//! guess between several sessions of the same account.

mod id;
pub mod permission;
pub mod policy;
mod record;
mod registry;

pub use id::SessionId;
pub use permission::{Operation, ParamCondition, ParamRule, Permission};
pub use policy::{
    decode_policy, encode_policies, encode_policy, EncodedPolicy, FrozenPolicy, ParamsPolicy,
    Policy, PolicyFlag, PolicyKind, PolicyParams,
};
pub use record::{create_session_key, EncodedSessionRecord, SessionGrants, SessionRecord};
pub use registry::{resolve_session, SessionRegistry};
