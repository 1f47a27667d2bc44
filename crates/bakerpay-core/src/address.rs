// Base58check account addresses. Implicit accounts (tz1/tz2/tz3) and
// originated contracts (KT1) carry a 3-byte prefix plus a 20-byte payload.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 3-byte base58check prefixes for supported address kinds.
const PREFIX_TZ1: [u8; 3] = [6, 161, 159];
const PREFIX_TZ2: [u8; 3] = [6, 161, 161];
const PREFIX_TZ3: [u8; 3] = [6, 161, 164];
const PREFIX_KT1: [u8; 3] = [2, 90, 121];

const PAYLOAD_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Tz1,
    Tz2,
    Tz3,
    Kt1,
}

impl AddressKind {
    fn prefix(&self) -> [u8; 3] {
        match self {
            AddressKind::Tz1 => PREFIX_TZ1,
            AddressKind::Tz2 => PREFIX_TZ2,
            AddressKind::Tz3 => PREFIX_TZ3,
            AddressKind::Kt1 => PREFIX_KT1,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base58check encoding: {0}")]
    Encoding(String),
    #[error("unknown address prefix")]
    UnknownPrefix,
    #[error("invalid payload length {0}")]
    PayloadLength(usize),
}

/// A validated account address. Stored in its textual form; the payload
/// was checked against the base58check checksum at construction.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn parse(s: &str) -> Result<Address, AddressError> {
        let raw = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|e| AddressError::Encoding(e.to_string()))?;
        if raw.len() < 3 {
            return Err(AddressError::UnknownPrefix);
        }
        let prefix: [u8; 3] = [raw[0], raw[1], raw[2]];
        if ![PREFIX_TZ1, PREFIX_TZ2, PREFIX_TZ3, PREFIX_KT1].contains(&prefix) {
            return Err(AddressError::UnknownPrefix);
        }
        let payload = &raw[3..];
        if payload.len() != PAYLOAD_LEN {
            return Err(AddressError::PayloadLength(payload.len()));
        }
        Ok(Address(s.to_string()))
    }

    /// Construct an address from a kind and a 20-byte payload (e.g. a
    /// public key hash).
    pub fn from_payload(kind: AddressKind, payload: &[u8; PAYLOAD_LEN]) -> Address {
        let mut raw = Vec::with_capacity(3 + PAYLOAD_LEN);
        raw.extend_from_slice(&kind.prefix());
        raw.extend_from_slice(payload);
        Address(bs58::encode(raw).with_check().into_string())
    }

    /// Originated contract (KT1) destination.
    pub fn is_contract(&self) -> bool {
        self.0.starts_with("KT1")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// "tz1ab...xyz12" form for tables.
    pub fn shortened(&self) -> String {
        let s = &self.0;
        if s.len() <= 10 {
            return s.clone();
        }
        format!("{}...{}", &s[..5], &s[s.len() - 5..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

impl std::str::FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}
