//! Record data model with per-type validation and wire conversion
//!
//! A [`Record`] is the unit stored and persisted by the record store. It is
//! plain data: an owner name, a type, a TTL, a textual value, and the
//! per-type extras (MX preference, SRV fields, CAA flag/tag). Validation
//! normalises the TTL and enforces the per-type value rules; conversion to
//! the typed wire representation happens in [`Record::to_rr`].

use std::convert::TryFrom;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde_derive::{Deserialize, Serialize};

use crate::dns::errors::StoreError;
use crate::dns::protocol::{RData, ResourceRecord};

type Result<T> = std::result::Result<T, StoreError>;

/// TTL applied when a record is validated with a zero TTL.
pub const DEFAULT_TTL: u32 = 3600;
/// Lowest TTL accepted for a non-zero value.
pub const MIN_TTL: u32 = 60;
/// Highest TTL accepted.
pub const MAX_TTL: u32 = 86400;

/// Longest TXT segment emitted on wire conversion.
const TXT_CHUNK: usize = 255;

/// The set of record types the store manages.
#[derive(PartialEq, Eq, Debug, Clone, Hash, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Txt,
    Mx,
    Srv,
    Ns,
    Ptr,
    Caa,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match *self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Txt => "TXT",
            RecordType::Mx => "MX",
            RecordType::Srv => "SRV",
            RecordType::Ns => "NS",
            RecordType::Ptr => "PTR",
            RecordType::Caa => "CAA",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<RecordType> {
        match s.to_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            "CNAME" => Ok(RecordType::Cname),
            "TXT" => Ok(RecordType::Txt),
            "MX" => Ok(RecordType::Mx),
            "SRV" => Ok(RecordType::Srv),
            "NS" => Ok(RecordType::Ns),
            "PTR" => Ok(RecordType::Ptr),
            "CAA" => Ok(RecordType::Caa),
            _ => Err(StoreError::UnknownType(s.to_string())),
        }
    }
}

impl TryFrom<String> for RecordType {
    type Error = StoreError;

    fn try_from(s: String) -> Result<RecordType> {
        s.parse()
    }
}

impl From<RecordType> for String {
    fn from(t: RecordType) -> String {
        t.as_str().to_string()
    }
}

fn is_zero_u16(v: &u16) -> bool {
    *v == 0
}

fn is_zero_u8(v: &u8) -> bool {
    *v == 0
}

/// A single managed DNS record.
///
/// Identity for upsert/delete matching is the `(name, type, value)` triple,
/// with the name compared case-insensitively. TTL and the per-type extras
/// are mutable through upsert without changing identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    #[serde(rename = "type")]
    pub rtype: RecordType,
    #[serde(default)]
    pub ttl: u32,
    pub value: String,
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub priority: u16,
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub weight: u16,
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "is_zero_u8")]
    pub flag: u8,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,
}

impl Record {
    /// Creates a record with the given name, type, TTL and value, leaving
    /// the per-type extras zeroed.
    pub fn new(name: &str, rtype: RecordType, ttl: u32, value: &str) -> Record {
        Record {
            name: name.to_string(),
            rtype,
            ttl,
            value: value.to_string(),
            priority: 0,
            weight: 0,
            port: 0,
            flag: 0,
            tag: String::new(),
        }
    }

    /// The lowercase owner name, used as the index key.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    /// True when `other` names the same `(name, type, value)` identity.
    pub fn same_identity(&self, name: &str, rtype: RecordType, value: &str) -> bool {
        self.rtype == rtype && self.name.eq_ignore_ascii_case(name) && self.value == value
    }

    /// Checks the record fields for correctness.
    ///
    /// Sets the default TTL when zero. Returns `StoreError::Validation` on
    /// the first violated rule.
    pub fn validate(&mut self) -> Result<()> {
        validate_name(&self.name)?;

        if self.ttl == 0 {
            self.ttl = DEFAULT_TTL;
        }
        if self.ttl < MIN_TTL || self.ttl > MAX_TTL {
            return Err(StoreError::Validation(format!(
                "TTL {} out of range [{}, {}]",
                self.ttl, MIN_TTL, MAX_TTL
            )));
        }

        match self.rtype {
            RecordType::A => {
                if self.value.parse::<Ipv4Addr>().is_err() {
                    return Err(StoreError::Validation(format!(
                        "value {:?} is not a valid IPv4 address",
                        self.value
                    )));
                }
            }
            RecordType::Aaaa => {
                let addr = self.value.parse::<Ipv6Addr>().map_err(|_| {
                    StoreError::Validation(format!(
                        "value {:?} is not a valid IPv6 address",
                        self.value
                    ))
                })?;
                if addr.to_ipv4_mapped().is_some() {
                    return Err(StoreError::Validation(format!(
                        "value {:?} is not a valid IPv6 address",
                        self.value
                    )));
                }
            }
            RecordType::Cname | RecordType::Ns | RecordType::Ptr | RecordType::Mx => {
                if !is_fqdn(&self.value) {
                    return Err(StoreError::Validation(format!(
                        "{} value {:?} must be a FQDN with trailing dot",
                        self.rtype, self.value
                    )));
                }
            }
            RecordType::Txt => {
                if self.value.is_empty() {
                    return Err(StoreError::Validation(
                        "TXT value must not be empty".to_string(),
                    ));
                }
            }
            RecordType::Srv => {
                if !is_fqdn(&self.value) {
                    return Err(StoreError::Validation(format!(
                        "SRV target {:?} must be a FQDN with trailing dot",
                        self.value
                    )));
                }
                if self.port == 0 {
                    return Err(StoreError::Validation(
                        "SRV port must be non-zero".to_string(),
                    ));
                }
            }
            RecordType::Caa => {
                if self.value.is_empty() {
                    return Err(StoreError::Validation(
                        "CAA value must not be empty".to_string(),
                    ));
                }
                match self.tag.as_str() {
                    "issue" | "issuewild" | "iodef" => {}
                    "" => {
                        return Err(StoreError::Validation(
                            "CAA tag must not be empty".to_string(),
                        ))
                    }
                    other => {
                        return Err(StoreError::Validation(format!(
                            "CAA tag {:?} is invalid; must be one of: issue, issuewild, iodef",
                            other
                        )))
                    }
                }
            }
        }

        Ok(())
    }

    /// Converts the record into its typed wire representation.
    ///
    /// The record should have been validated first; a value that no longer
    /// parses is reported as a validation error.
    pub fn to_rr(&self) -> Result<ResourceRecord> {
        let rdata = match self.rtype {
            RecordType::A => {
                let addr = self.value.parse::<Ipv4Addr>().map_err(|_| {
                    StoreError::Validation(format!(
                        "value {:?} is not a valid IPv4 address",
                        self.value
                    ))
                })?;
                RData::A { addr }
            }
            RecordType::Aaaa => {
                let addr = self.value.parse::<Ipv6Addr>().map_err(|_| {
                    StoreError::Validation(format!(
                        "value {:?} is not a valid IPv6 address",
                        self.value
                    ))
                })?;
                RData::Aaaa { addr }
            }
            RecordType::Cname => RData::Cname {
                host: self.value.clone(),
            },
            RecordType::Txt => RData::Txt {
                chunks: split_txt(&self.value),
            },
            RecordType::Mx => RData::Mx {
                preference: self.priority,
                host: self.value.clone(),
            },
            RecordType::Srv => RData::Srv {
                priority: self.priority,
                weight: self.weight,
                port: self.port,
                target: self.value.clone(),
            },
            RecordType::Ns => RData::Ns {
                host: self.value.clone(),
            },
            RecordType::Ptr => RData::Ptr {
                host: self.value.clone(),
            },
            RecordType::Caa => RData::Caa {
                flag: self.flag,
                tag: self.tag.clone(),
                value: self.value.clone(),
            },
        };

        Ok(ResourceRecord {
            name: self.name.clone(),
            ttl: self.ttl,
            rdata,
        })
    }
}

/// True when `s` is non-empty and carries the trailing dot.
pub fn is_fqdn(s: &str) -> bool {
    s.len() > 1 && s.ends_with('.') || s == "."
}

/// Validates an owner name: trailing dot, label and total length limits,
/// no empty interior labels.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::Validation("name must not be empty".to_string()));
    }
    if !name.ends_with('.') {
        return Err(StoreError::Validation(format!(
            "name {:?} must end with a trailing dot",
            name
        )));
    }

    let without_root = &name[..name.len() - 1];
    if without_root.is_empty() {
        return Err(StoreError::Validation(
            "name must contain at least one label".to_string(),
        ));
    }
    if without_root.len() > 253 {
        return Err(StoreError::Validation(format!(
            "name {:?} exceeds 253 bytes",
            name
        )));
    }
    for label in without_root.split('.') {
        if label.is_empty() {
            return Err(StoreError::Validation(format!(
                "name {:?} contains an empty label",
                name
            )));
        }
        if label.len() > 63 {
            return Err(StoreError::Validation(format!(
                "label {:?} exceeds 63 bytes",
                label
            )));
        }
    }

    Ok(())
}

/// Breaks a TXT value into segments of at most 255 bytes each, splitting on
/// character boundaries.
fn split_txt(s: &str) -> Vec<String> {
    if s.len() <= TXT_CHUNK {
        return vec![s.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for c in s.chars() {
        if current.len() + c.len_utf8() > TXT_CHUNK {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
