//! Call permissions: the grants of v0.6 basic sessions, also reused by the call policy.

use alloy_primitives::{Address, FixedBytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::error::{KernelKitError, KernelKitResult};

/// How a permitted call is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Regular call.
    #[default]
    Call,
    /// Delegate call.
    #[serde(rename = "delegatecall")]
    DelegateCall,
}

impl Operation {
    pub(crate) const fn code(self) -> u8 {
        match self {
            Self::Call => 0,
            Self::DelegateCall => 1,
        }
    }
}

/// Comparison applied by a [`ParamRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParamCondition {
    /// `argument == param`
    Equal,
    /// `argument > param`
    GreaterThan,
    /// `argument < param`
    LessThan,
    /// `argument >= param`
    GreaterThanOrEqual,
    /// `argument <= param`
    LessThanOrEqual,
    /// `argument != param`
    NotEqual,
}

impl ParamCondition {
    pub(crate) const fn code(self) -> u8 {
        match self {
            Self::Equal => 0,
            Self::GreaterThan => 1,
            Self::LessThan => 2,
            Self::GreaterThanOrEqual => 3,
            Self::LessThanOrEqual => 4,
            Self::NotEqual => 5,
        }
    }
}

/// Constraint on one 32-byte word of the calldata arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamRule {
    /// Byte offset of the word within the arguments.
    pub offset: u64,
    /// Comparison applied.
    pub condition: ParamCondition,
    /// Value compared against.
    pub param: B256,
}

/// A call a session key may make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    /// Contract the key may call.
    pub target: Address,
    /// Function selector, or any function when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<FixedBytes<4>>,
    /// Maximum native value per call.
    #[serde(default)]
    pub value_limit: U256,
    /// Argument constraints.
    #[serde(default)]
    pub rules: Vec<ParamRule>,
    /// Call or delegate call.
    #[serde(default)]
    pub operation: Operation,
}

impl Permission {
    /// Permission to call any function of `target` without value.
    #[must_use]
    pub const fn new(target: Address) -> Self {
        Self {
            target,
            selector: None,
            value_limit: U256::ZERO,
            rules: Vec::new(),
            operation: Operation::Call,
        }
    }

    /// Restricts the permission to one function.
    #[must_use]
    pub const fn with_selector(mut self, selector: FixedBytes<4>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Allows up to `value_limit` wei per call.
    #[must_use]
    pub const fn with_value_limit(mut self, value_limit: U256) -> Self {
        self.value_limit = value_limit;
        self
    }

    /// Adds an argument constraint.
    #[must_use]
    pub fn with_rule(mut self, rule: ParamRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Packed encoding used inside call policy data.
    ///
    /// # Errors
    /// `KernelKitError::InvalidInput` if the permission has more than 255 rules.
    pub(crate) fn encode_packed(&self, out: &mut Vec<u8>) -> KernelKitResult<()> {
        let rule_count =
            u8::try_from(self.rules.len()).map_err(|_| KernelKitError::InvalidInput {
                attribute: "rules".to_string(),
                reason: format!("{} rules exceed the limit of {}", self.rules.len(), u8::MAX),
            })?;
        out.push(self.operation.code());
        out.extend_from_slice(self.target.as_slice());
        out.extend_from_slice(self.selector.unwrap_or_default().as_slice());
        out.extend_from_slice(&self.value_limit.to_be_bytes::<32>());
        out.push(rule_count);
        for rule in &self.rules {
            out.push(rule.condition.code());
            out.extend_from_slice(&rule.offset.to_be_bytes());
            out.extend_from_slice(rule.param.as_slice());
        }
        Ok(())
    }
}
