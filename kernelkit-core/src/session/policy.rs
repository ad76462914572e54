//! Session policies and their storage-safe form.
//!
//! A live policy computes its enable data from its parameters. Once written to
//! storage it is kept as an [`EncodedPolicy`]: the computed bytes are
//! snapshotted next to the parameters, and decoding yields a [`FrozenPolicy`]
//! that replays the snapshot instead of recomputing it.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::permission::Permission;
use crate::error::{KernelKitError, KernelKitResult};

/// Largest value of the 48-bit timestamp and counter fields.
const U48_MAX: u64 = (1 << 48) - 1;

/// Closed set of policy kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum PolicyKind {
    /// Restricts call targets and arguments.
    Call,
    /// Caps gas spending.
    Gas,
    /// Caps the number of operations per interval.
    RateLimit,
    /// Restricts who may request signatures.
    SignatureCaller,
    /// No restriction.
    Sudo,
    /// Restricts the validity window.
    Timestamp,
}

/// Call policy parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallPolicyParams {
    /// Permitted calls.
    pub permissions: Vec<Permission>,
    /// Deployed policy contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_address: Option<Address>,
}

/// Gas policy parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasPolicyParams {
    /// Total gas allowance in wei.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<U256>,
    /// Require operations to be sponsored.
    #[serde(default)]
    pub enforce_paymaster: bool,
    /// Only this paymaster may sponsor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_paymaster: Option<Address>,
    /// Deployed policy contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_address: Option<Address>,
}

/// Rate limit policy parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicyParams {
    /// Interval length in seconds.
    pub interval: u64,
    /// Operations allowed per interval.
    pub count: u64,
    /// First interval start, unix seconds.
    #[serde(default)]
    pub start_at: u64,
    /// Deployed policy contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_address: Option<Address>,
}

/// Signature caller policy parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureCallerPolicyParams {
    /// Contracts allowed to request signatures.
    pub allowed_callers: Vec<Address>,
    /// Deployed policy contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_address: Option<Address>,
}

/// Sudo policy parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SudoPolicyParams {
    /// Deployed policy contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_address: Option<Address>,
}

/// Timestamp policy parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampPolicyParams {
    /// Earliest valid time, unix seconds.
    #[serde(default)]
    pub valid_after: u64,
    /// Latest valid time, unix seconds.
    pub valid_until: u64,
    /// Deployed policy contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_address: Option<Address>,
}

/// Parameters of a policy, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PolicyParams {
    /// See [`CallPolicyParams`].
    Call(CallPolicyParams),
    /// See [`GasPolicyParams`].
    Gas(GasPolicyParams),
    /// See [`RateLimitPolicyParams`].
    RateLimit(RateLimitPolicyParams),
    /// See [`SignatureCallerPolicyParams`].
    SignatureCaller(SignatureCallerPolicyParams),
    /// See [`SudoPolicyParams`].
    Sudo(SudoPolicyParams),
    /// See [`TimestampPolicyParams`].
    Timestamp(TimestampPolicyParams),
}

impl PolicyParams {
    /// Kind of the policy.
    #[must_use]
    pub const fn kind(&self) -> PolicyKind {
        match self {
            Self::Call(_) => PolicyKind::Call,
            Self::Gas(_) => PolicyKind::Gas,
            Self::RateLimit(_) => PolicyKind::RateLimit,
            Self::SignatureCaller(_) => PolicyKind::SignatureCaller,
            Self::Sudo(_) => PolicyKind::Sudo,
            Self::Timestamp(_) => PolicyKind::Timestamp,
        }
    }

    /// Deployed policy contract, if set.
    #[must_use]
    pub const fn policy_address(&self) -> Option<Address> {
        match self {
            Self::Call(p) => p.policy_address,
            Self::Gas(p) => p.policy_address,
            Self::RateLimit(p) => p.policy_address,
            Self::SignatureCaller(p) => p.policy_address,
            Self::Sudo(p) => p.policy_address,
            Self::Timestamp(p) => p.policy_address,
        }
    }
}

/// Which validations a policy applies to. Encoded as the two leading bytes of the
/// policy info.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PolicyFlag {
    /// User operations and signatures.
    #[default]
    ForAllValidation,
    /// Signatures only.
    NotForValidateUserOp,
    /// User operations only.
    NotForValidateSig,
}

impl PolicyFlag {
    const fn bytes(self) -> [u8; 2] {
        match self {
            Self::ForAllValidation => [0x00, 0x00],
            Self::NotForValidateUserOp => [0x00, 0x01],
            Self::NotForValidateSig => [0x00, 0x02],
        }
    }
}

/// Constraint on what a session key may authorize.
pub trait Policy: Send + Sync + fmt::Debug {
    /// Parameters the policy was built from.
    fn params(&self) -> &PolicyParams;

    /// Flag and contract address of the policy.
    fn policy_info(&self) -> Bytes;

    /// Data enabling the policy for the permission `permission_id`.
    fn policy_data(&self, permission_id: Option<&[u8]>) -> Bytes;

    /// Kind of the policy.
    fn kind(&self) -> PolicyKind {
        self.params().kind()
    }
}

/// A policy that derives its data from its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamsPolicy {
    params: PolicyParams,
    address: Address,
    flag: PolicyFlag,
    init_data: Vec<u8>,
}

impl ParamsPolicy {
    /// Builds a policy from `params`.
    ///
    /// # Errors
    /// `KernelKitError::InvalidInput` if the parameters carry no policy contract
    /// address, a 48-bit field overflows or a permission has too many rules.
    pub fn new(params: PolicyParams) -> KernelKitResult<Self> {
        let address = params.policy_address().ok_or_else(|| KernelKitError::InvalidInput {
            attribute: "policy_address".to_string(),
            reason: format!("{} policy has no contract address", params.kind()),
        })?;
        let wide = match &params {
            PolicyParams::RateLimit(p) => [p.interval, p.count, p.start_at]
                .into_iter()
                .any(|v| v > U48_MAX),
            PolicyParams::Timestamp(p) => p.valid_after > U48_MAX || p.valid_until > U48_MAX,
            _ => false,
        };
        if wide {
            return Err(KernelKitError::InvalidInput {
                attribute: "policy_params".to_string(),
                reason: "value does not fit in 48 bits".to_string(),
            });
        }
        let init_data = init_data(&params)?;
        Ok(Self {
            params,
            address,
            flag: PolicyFlag::default(),
            init_data,
        })
    }

    /// Overrides the validation flag.
    #[must_use]
    pub const fn with_flag(mut self, flag: PolicyFlag) -> Self {
        self.flag = flag;
        self
    }
}

fn init_data(params: &PolicyParams) -> KernelKitResult<Vec<u8>> {
    let mut out = Vec::new();
    match params {
        PolicyParams::Call(p) => {
            for permission in &p.permissions {
                permission.encode_packed(&mut out)?;
            }
        }
        PolicyParams::Gas(p) => {
            out.extend_from_slice(&p.allowed.unwrap_or_default().to_be_bytes::<32>());
            out.push(u8::from(p.enforce_paymaster));
            out.extend_from_slice(p.allowed_paymaster.unwrap_or_default().as_slice());
        }
        PolicyParams::RateLimit(p) => {
            for value in [p.interval, p.count, p.start_at] {
                push_u48(&mut out, value);
            }
        }
        PolicyParams::SignatureCaller(p) => {
            for caller in &p.allowed_callers {
                out.extend_from_slice(caller.as_slice());
            }
        }
        PolicyParams::Sudo(_) => {}
        PolicyParams::Timestamp(p) => {
            push_u48(&mut out, p.valid_after);
            push_u48(&mut out, p.valid_until);
        }
    }
    Ok(out)
}

fn push_u48(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes()[2..]);
}

impl Policy for ParamsPolicy {
    fn params(&self) -> &PolicyParams {
        &self.params
    }

    fn policy_info(&self) -> Bytes {
        let mut info = self.flag.bytes().to_vec();
        info.extend_from_slice(self.address.as_slice());
        info.into()
    }

    fn policy_data(&self, _permission_id: Option<&[u8]>) -> Bytes {
        let mut data = self.policy_info().to_vec();
        data.extend_from_slice(&self.init_data);
        data.into()
    }
}

/// Storage-safe snapshot of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedPolicy {
    /// Snapshot of [`Policy::policy_data`].
    #[serde(rename = "getPolicyData")]
    pub data: Bytes,
    /// Snapshot of [`Policy::policy_info`].
    #[serde(rename = "getPolicyInfoInBytes")]
    pub info: Bytes,
    /// Parameters, tagged with the policy kind.
    #[serde(rename = "policyParams")]
    pub params: PolicyParams,
}

/// Read-only policy rebuilt from an [`EncodedPolicy`]. It returns the stored
/// snapshot whatever it is asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenPolicy(EncodedPolicy);

impl FrozenPolicy {
    /// The stored snapshot.
    #[must_use]
    pub const fn encoded(&self) -> &EncodedPolicy {
        &self.0
    }
}

impl Policy for FrozenPolicy {
    fn params(&self) -> &PolicyParams {
        &self.0.params
    }

    fn policy_info(&self) -> Bytes {
        self.0.info.clone()
    }

    fn policy_data(&self, _permission_id: Option<&[u8]>) -> Bytes {
        self.0.data.clone()
    }
}

/// Snapshots `policy`.
#[must_use]
pub fn encode_policy(policy: &dyn Policy) -> EncodedPolicy {
    EncodedPolicy {
        data: policy.policy_data(None),
        info: policy.policy_info(),
        params: policy.params().clone(),
    }
}

/// Snapshots every policy, preserving order.
#[must_use]
pub fn encode_policies(policies: &[Arc<dyn Policy>]) -> Vec<EncodedPolicy> {
    policies.iter().map(|policy| encode_policy(policy.as_ref())).collect()
}

/// Rebuilds a read-only policy from its snapshot.
#[must_use]
pub fn decode_policy(encoded: EncodedPolicy) -> Arc<dyn Policy> {
    Arc::new(FrozenPolicy(encoded))
}
