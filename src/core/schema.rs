//! Purpose: Decode node-store key prefixes into symbolic record types.
//! Exports: `RECORD_TYPES`, `RecordPrefix`, `decode_prefix`, `encode_prefix`, `name_of`.
//! Role: Shared schema for the aggregation report and the transaction lookup key.
//! Invariants: A prefix is the first 2 key bytes, big-endian.
//! Invariants: `RECORD_TYPES` is append-only; position is the on-disk prefix value.

use std::fmt;

use crate::core::error::{Error, ErrorKind};

pub const PREFIX_LEN: usize = 2;

/// Node record types, indexed by prefix value.
pub static RECORD_TYPES: &[&str] = &[
    "version",
    "height",
    "score",
    "block-at-height",
    "height-of",
    "waves-balance-history",
    "waves-balance",
    "assets-for-address",
    "asset-balance-history",
    "asset-balance",
    "asset-info-history",
    "asset-info",
    "lease-balance-history",
    "lease-balance",
    "lease-status-history",
    "lease-status",
    "filled-volume-and-fee-history",
    "filled-volume-and-fee",
    "transaction-info",
    "address-transaction-history",
    "address-transaction-ids-at-height",
    "changed-addresses",
    "transaction-ids-at-height",
    "address-id-of-alias",
    "last-address-id",
    "address-to-id",
    "id-of-address",
    "address-script-history",
    "address-script",
    "approved-features",
    "activated-features",
    "data-key-chunk-count",
    "data-key-chunk",
    "data-history",
    "data",
    "sponsorship-history",
    "sponsorship",
    "addresses-for-waves-seq-nr",
    "addresses-for-waves",
    "addresses-for-asset-seq-nr",
    "addresses-for-asset",
    "address-transaction-ids-seq-nr",
    "address-transaction-ids",
    "alias-is-disabled",
];

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RecordPrefix(pub u16);

/// Prefix of the node's transaction index (`transaction-info`).
pub const TRANSACTION_INFO: RecordPrefix = RecordPrefix(18);

impl RecordPrefix {
    pub fn value(self) -> u16 {
        self.0
    }

    pub fn name(self) -> Option<&'static str> {
        name_of(self)
    }

    pub fn bytes(self) -> [u8; PREFIX_LEN] {
        encode_prefix(self)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        RECORD_TYPES
            .iter()
            .position(|candidate| *candidate == name)
            .map(|idx| RecordPrefix(idx as u16))
    }

    /// Every prefix with a declared name, in prefix order.
    pub fn known() -> impl Iterator<Item = RecordPrefix> {
        (0..RECORD_TYPES.len()).map(|idx| RecordPrefix(idx as u16))
    }

    /// Accepts a numeric prefix or a record-type name.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let trimmed = input.trim();
        if let Ok(value) = trimmed.parse::<u16>() {
            return Ok(RecordPrefix(value));
        }
        Self::from_name(trimmed).ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("unknown record type '{trimmed}'"))
                .with_hint("Use a numeric prefix or a name from `dexaudit prefixes`.")
        })
    }
}

impl fmt::Display for RecordPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reads the prefix from the first two bytes of `key`; `None` for shorter keys.
pub fn decode_prefix(key: &[u8]) -> Option<RecordPrefix> {
    let bytes: [u8; PREFIX_LEN] = key.get(..PREFIX_LEN)?.try_into().ok()?;
    Some(RecordPrefix(u16::from_be_bytes(bytes)))
}

pub fn encode_prefix(prefix: RecordPrefix) -> [u8; PREFIX_LEN] {
    prefix.0.to_be_bytes()
}

pub fn name_of(prefix: RecordPrefix) -> Option<&'static str> {
    RECORD_TYPES.get(prefix.0 as usize).copied()
}
