//! EVM address parsing and the 32-byte canonical recipient form.
//!
//! CCTP messages carry recipients as 32 bytes regardless of chain. A 20-byte
//! EVM address is left-padded with zeros.

use std::str::FromStr;

use alloy::primitives::{Address, B256};

use crate::error::ValidationError;

const EVM_ADDRESS_HEX_LEN: usize = 40;
const PADDING_LEN: usize = 12;

/// Parses a `0x`-prefixed, 40-hex-digit EVM address. Checksums are not
/// enforced.
pub fn parse_evm_address(input: &str) -> Result<Address, ValidationError> {
    let invalid = |reason| ValidationError::InvalidAddress {
        input: input.to_string(),
        reason,
    };

    let hex = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .ok_or_else(|| invalid("missing 0x prefix"))?;

    if hex.len() != EVM_ADDRESS_HEX_LEN {
        return Err(invalid("expected 40 hex digits"));
    }

    if !hex.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return Err(invalid("contains a non-hex character"));
    }

    Address::from_str(hex).map_err(|_| invalid("not a valid address"))
}

pub fn to_canonical_recipient(address: Address) -> B256 {
    B256::left_padding_from(address.as_slice())
}

pub fn from_canonical_recipient(recipient: B256) -> Result<Address, ValidationError> {
    if recipient[..PADDING_LEN].iter().any(|byte| *byte != 0) {
        return Err(ValidationError::NonCanonicalRecipient(recipient));
    }

    Ok(Address::from_slice(&recipient[PADDING_LEN..]))
}
