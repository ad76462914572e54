use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::KernelKitError;

/// Key of a session record: `0x<tag>` optionally scoped to a chain as `0x<tag>:<chainId>`.
///
/// Sessions created by this crate are always chain scoped. Unscoped identifiers
/// are still parsed so older records stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId {
    tag: Vec<u8>,
    chain_id: Option<u64>,
}

impl SessionId {
    /// Identifier scoped to `chain_id`.
    #[must_use]
    pub fn scoped(tag: impl Into<Vec<u8>>, chain_id: u64) -> Self {
        Self {
            tag: tag.into(),
            chain_id: Some(chain_id),
        }
    }

    /// Identifier valid on every chain.
    #[must_use]
    pub fn unscoped(tag: impl Into<Vec<u8>>) -> Self {
        Self {
            tag: tag.into(),
            chain_id: None,
        }
    }

    /// Raw tag bytes.
    #[must_use]
    pub fn tag(&self) -> &[u8] {
        &self.tag
    }

    /// Chain the identifier is scoped to.
    #[must_use]
    pub const fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }

    /// Whether the identifier is scoped to exactly `chain_id`.
    #[must_use]
    pub fn is_scoped_to(&self, chain_id: u64) -> bool {
        self.chain_id == Some(chain_id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.tag))?;
        if let Some(chain_id) = self.chain_id {
            write!(f, ":{chain_id}")?;
        }
        Ok(())
    }
}

impl FromStr for SessionId {
    type Err = KernelKitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| KernelKitError::InvalidInput {
            attribute: "session_id".to_string(),
            reason: reason.to_string(),
        };
        let (tag, chain_id) = match s.split_once(':') {
            Some((tag, chain_id)) => (
                tag,
                Some(
                    chain_id
                        .parse::<u64>()
                        .map_err(|_| invalid("chain id suffix is not a number"))?,
                ),
            ),
            None => (s, None),
        };
        let tag = tag
            .strip_prefix("0x")
            .ok_or_else(|| invalid("missing 0x prefix"))?;
        let tag = hex::decode(tag).map_err(|e| invalid(&e.to_string()))?;
        if tag.is_empty() {
            return Err(invalid("empty tag"));
        }
        Ok(Self { tag, chain_id })
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
