//! Primitive helpers such as address parsing.

use alloy_primitives::Address;
use std::str::FromStr;

use crate::error::KernelKitError;

/// Parses primitive types from foreign provided values.
///
/// For example, parsing a stringified address coming from a host application or a CLI
/// argument into an `Address`, attributing failures to the named input.
///
/// # Examples
/// ```rust
/// use alloy_primitives::Address;
/// use kernelkit_core::primitives::ParseFromForeignBinding;
///
/// let address = Address::parse_from_ffi(
///     "0x00000000000000000000000000000000000000aa",
///     "account",
/// )
/// .unwrap();
/// assert_eq!(address, Address::with_last_byte(0xaa));
/// ```
pub trait ParseFromForeignBinding {
    /// Parses `s`, naming `attr` in the error.
    ///
    /// # Errors
    /// `KernelKitError::InvalidInput` if the value does not parse.
    fn parse_from_ffi(s: &str, attr: &'static str) -> Result<Self, KernelKitError>
    where
        Self: Sized;

    /// Parses an optional value, passing `None` through.
    ///
    /// # Errors
    /// `KernelKitError::InvalidInput` if a present value does not parse.
    fn parse_from_ffi_optional(
        s: Option<String>,
        attr: &'static str,
    ) -> Result<Option<Self>, KernelKitError>
    where
        Self: Sized,
    {
        s.map(|s| Self::parse_from_ffi(s.as_str(), attr)).transpose()
    }
}

impl ParseFromForeignBinding for Address {
    fn parse_from_ffi(s: &str, attr: &'static str) -> Result<Self, KernelKitError> {
        Self::from_str(s.trim()).map_err(|e| KernelKitError::InvalidInput {
            attribute: attr.to_string(),
            reason: e.to_string(),
        })
    }
}
