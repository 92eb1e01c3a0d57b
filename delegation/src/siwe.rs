// delegation/src/siwe.rs
//! EIP-4361 (Sign-In With Ethereum) messages and the delegation claim they carry.
//!
//! ```text
//! {domain} wants you to sign in with your Ethereum account:
//! {address}
//!
//! {statement}
//!
//! URI: {uri}
//! Version: 1
//! Chain ID: {chain-id}
//! Nonce: {nonce}
//! Issued At: {issued-at}
//! Expiration Time: {expiration-time}
//! Not Before: {not-before}
//! Request ID: {request-id}
//! Resources:
//! - {resource}
//! ```
//!
//! The delegated key travels either as an `ephemeralPublicKey=<key>` token in
//! the statement or as an `urn:ephemeral-key:<key>` resource.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::eth;

const HEADER_SUFFIX: &str = " wants you to sign in with your Ethereum account:";
const URI_TAG: &str = "URI: ";
const VERSION_TAG: &str = "Version: ";
const CHAIN_ID_TAG: &str = "Chain ID: ";
const NONCE_TAG: &str = "Nonce: ";
const ISSUED_AT_TAG: &str = "Issued At: ";
const EXPIRATION_TAG: &str = "Expiration Time: ";
const NOT_BEFORE_TAG: &str = "Not Before: ";
const REQUEST_ID_TAG: &str = "Request ID: ";
const RESOURCES_TAG: &str = "Resources:";

/// Statement token carrying the delegated key
pub const DELEGATION_MARKER: &str = "ephemeralPublicKey=";
/// Resource URI prefix carrying the delegated key
pub const DELEGATION_RESOURCE_PREFIX: &str = "urn:ephemeral-key:";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing sign-in header")]
    MissingHeader,
    #[error("invalid address line")]
    InvalidAddress,
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("duplicate field {0}")]
    DuplicateField(&'static str),
    #[error("invalid value for {0}")]
    InvalidField(&'static str),
    #[error("unsupported version {0}")]
    UnsupportedVersion(String),
    #[error("unexpected line {0}")]
    UnexpectedLine(usize),
}

/// Parsed sign-in message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiweMessage {
    pub domain: String,
    pub address: String,
    pub statement: Option<String>,
    pub uri: String,
    pub version: String,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    pub expiration_time: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub request_id: Option<String>,
    pub resources: Vec<String>,
}

/// Typed binding between the signing wallet and a delegated key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationClaim {
    /// Lowercase key identity
    pub ephemeral_public_key: String,
}

fn parse_time(field: &'static str, value: &str) -> Result<DateTime<Utc>, ParseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ParseError::InvalidField(field))
}

fn set_once<T>(slot: &mut Option<T>, field: &'static str, value: T) -> Result<(), ParseError> {
    if slot.is_some() {
        return Err(ParseError::DuplicateField(field));
    }
    *slot = Some(value);
    Ok(())
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl FromStr for SiweMessage {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let lines: Vec<&str> = input.lines().collect();
        let mut idx = 0;

        let domain = lines
            .first()
            .and_then(|l| l.strip_suffix(HEADER_SUFFIX))
            .filter(|d| !d.is_empty() && !d.contains(char::is_whitespace))
            .ok_or(ParseError::MissingHeader)?
            .to_string();
        idx += 1;

        let address = lines
            .get(idx)
            .map(|l| l.trim())
            .filter(|l| eth::is_hex_address(l))
            .ok_or(ParseError::InvalidAddress)?
            .to_string();
        idx += 1;

        // Blank separator, then an optional single-line statement and its separator
        while lines.get(idx).is_some_and(|l| l.is_empty()) {
            idx += 1;
        }
        let mut statement = None;
        if let Some(line) = lines.get(idx) {
            if !line.starts_with(URI_TAG) {
                statement = Some(line.to_string());
                idx += 1;
                while lines.get(idx).is_some_and(|l| l.is_empty()) {
                    idx += 1;
                }
            }
        }

        let mut uri = None;
        let mut version = None;
        let mut chain_id = None;
        let mut nonce = None;
        let mut issued_at = None;
        let mut expiration_time = None;
        let mut not_before = None;
        let mut request_id = None;
        let mut resources: Option<Vec<String>> = None;

        while idx < lines.len() {
            let line = lines[idx];
            idx += 1;

            if line.is_empty() {
                continue;
            } else if let Some(v) = line.strip_prefix(URI_TAG) {
                set_once(&mut uri, "URI", v.to_string())?;
            } else if let Some(v) = line.strip_prefix(VERSION_TAG) {
                set_once(&mut version, "Version", v.to_string())?;
            } else if let Some(v) = line.strip_prefix(CHAIN_ID_TAG) {
                let id = v.parse::<u64>().map_err(|_| ParseError::InvalidField("Chain ID"))?;
                set_once(&mut chain_id, "Chain ID", id)?;
            } else if let Some(v) = line.strip_prefix(NONCE_TAG) {
                if v.len() < 8 || !v.chars().all(|c| c.is_ascii_alphanumeric()) {
                    return Err(ParseError::InvalidField("Nonce"));
                }
                set_once(&mut nonce, "Nonce", v.to_string())?;
            } else if let Some(v) = line.strip_prefix(ISSUED_AT_TAG) {
                set_once(&mut issued_at, "Issued At", parse_time("Issued At", v)?)?;
            } else if let Some(v) = line.strip_prefix(EXPIRATION_TAG) {
                let at = parse_time("Expiration Time", v)?;
                set_once(&mut expiration_time, "Expiration Time", at)?;
            } else if let Some(v) = line.strip_prefix(NOT_BEFORE_TAG) {
                set_once(&mut not_before, "Not Before", parse_time("Not Before", v)?)?;
            } else if let Some(v) = line.strip_prefix(REQUEST_ID_TAG) {
                set_once(&mut request_id, "Request ID", v.to_string())?;
            } else if line == RESOURCES_TAG {
                let mut list = Vec::new();
                while let Some(item) = lines.get(idx).and_then(|l| l.strip_prefix("- ")) {
                    list.push(item.to_string());
                    idx += 1;
                }
                set_once(&mut resources, "Resources", list)?;
            } else {
                return Err(ParseError::UnexpectedLine(idx));
            }
        }

        let version = version.ok_or(ParseError::MissingField("Version"))?;
        if version != "1" {
            return Err(ParseError::UnsupportedVersion(version));
        }

        Ok(SiweMessage {
            domain,
            address,
            statement,
            uri: uri.ok_or(ParseError::MissingField("URI"))?,
            version,
            chain_id: chain_id.ok_or(ParseError::MissingField("Chain ID"))?,
            nonce: nonce.ok_or(ParseError::MissingField("Nonce"))?,
            issued_at: issued_at.ok_or(ParseError::MissingField("Issued At"))?,
            expiration_time,
            not_before,
            request_id,
            resources: resources.unwrap_or_default(),
        })
    }
}

impl fmt::Display for SiweMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}{}", self.domain, HEADER_SUFFIX)?;
        writeln!(f, "{}", self.address)?;
        writeln!(f)?;
        if let Some(statement) = &self.statement {
            writeln!(f, "{}", statement)?;
            writeln!(f)?;
        }
        writeln!(f, "{}{}", URI_TAG, self.uri)?;
        writeln!(f, "{}{}", VERSION_TAG, self.version)?;
        writeln!(f, "{}{}", CHAIN_ID_TAG, self.chain_id)?;
        writeln!(f, "{}{}", NONCE_TAG, self.nonce)?;
        write!(f, "{}{}", ISSUED_AT_TAG, format_time(&self.issued_at))?;
        if let Some(t) = &self.expiration_time {
            write!(f, "\n{}{}", EXPIRATION_TAG, format_time(t))?;
        }
        if let Some(t) = &self.not_before {
            write!(f, "\n{}{}", NOT_BEFORE_TAG, format_time(t))?;
        }
        if let Some(id) = &self.request_id {
            write!(f, "\n{}{}", REQUEST_ID_TAG, id)?;
        }
        if !self.resources.is_empty() {
            write!(f, "\n{}", RESOURCES_TAG)?;
            for resource in &self.resources {
                write!(f, "\n- {}", resource)?;
            }
        }
        Ok(())
    }
}

impl SiweMessage {
    /// Canonical text the wallet signs
    pub fn to_message(&self) -> String {
        self.to_string()
    }

    /// Statement fragment a client embeds to delegate `key`
    pub fn delegation_statement(key: &str) -> String {
        format!("{}{}", DELEGATION_MARKER, key)
    }

    /// Extract the delegated key. Returns `None` when no claim is present, a
    /// claimed key is malformed, or two claims disagree.
    pub fn delegation_claim(&self) -> Option<DelegationClaim> {
        let from_statement = self
            .statement
            .iter()
            .flat_map(|s| s.split_whitespace())
            .filter_map(|token| {
                token.find(DELEGATION_MARKER).map(|at| {
                    let value = &token[at + DELEGATION_MARKER.len()..];
                    value.trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
                })
            });
        let from_resources = self
            .resources
            .iter()
            .filter_map(|r| r.strip_prefix(DELEGATION_RESOURCE_PREFIX));

        let mut claimed: Option<String> = None;
        for candidate in from_statement.chain(from_resources) {
            let key = eth::normalize_address(candidate)?;
            match &claimed {
                Some(existing) if *existing != key => return None,
                _ => claimed = Some(key),
            }
        }

        claimed.map(|ephemeral_public_key| DelegationClaim { ephemeral_public_key })
    }
}
