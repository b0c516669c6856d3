//! Query types and the typed resource record representation
//!
//! This is the transport-agnostic answer surface: the resolution engine
//! produces [`ResourceRecord`] values that a wire-format server serializes
//! into actual DNS packets.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_derive::{Deserialize, Serialize};

use crate::dns::record::RecordType;

/// TTL carried by a synthesized SOA authority record.
const SOA_TTL: u32 = 300;

/// `QueryType` represents the requested record type of a query
///
/// The specific type Unknown takes an integer parameter in order to retain
/// the id of an unknown query when compiling the reply. An integer can be
/// converted to a querytype using the `from_num` function, and back to an
/// integer using the `to_num` method.
#[derive(PartialEq, Eq, Debug, Clone, Hash, Copy, Serialize, Deserialize)]
pub enum QueryType {
    Unknown(u16),
    A,     // 1
    Ns,    // 2
    Cname, // 5
    Soa,   // 6
    Ptr,   // 12
    Mx,    // 15
    Txt,   // 16
    Aaaa,  // 28
    Srv,   // 33
    Caa,   // 257
}

impl QueryType {
    pub fn to_num(&self) -> u16 {
        match *self {
            QueryType::Unknown(x) => x,
            QueryType::A => 1,
            QueryType::Ns => 2,
            QueryType::Cname => 5,
            QueryType::Soa => 6,
            QueryType::Ptr => 12,
            QueryType::Mx => 15,
            QueryType::Txt => 16,
            QueryType::Aaaa => 28,
            QueryType::Srv => 33,
            QueryType::Caa => 257,
        }
    }

    pub fn from_num(num: u16) -> QueryType {
        match num {
            1 => QueryType::A,
            2 => QueryType::Ns,
            5 => QueryType::Cname,
            6 => QueryType::Soa,
            12 => QueryType::Ptr,
            15 => QueryType::Mx,
            16 => QueryType::Txt,
            28 => QueryType::Aaaa,
            33 => QueryType::Srv,
            257 => QueryType::Caa,
            _ => QueryType::Unknown(num),
        }
    }
}

impl From<RecordType> for QueryType {
    fn from(t: RecordType) -> QueryType {
        match t {
            RecordType::A => QueryType::A,
            RecordType::Aaaa => QueryType::Aaaa,
            RecordType::Cname => QueryType::Cname,
            RecordType::Txt => QueryType::Txt,
            RecordType::Mx => QueryType::Mx,
            RecordType::Srv => QueryType::Srv,
            RecordType::Ns => QueryType::Ns,
            RecordType::Ptr => QueryType::Ptr,
            RecordType::Caa => QueryType::Caa,
        }
    }
}

/// Typed record payload for the answer and authority sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RData {
    A {
        addr: Ipv4Addr,
    },
    Aaaa {
        addr: Ipv6Addr,
    },
    Cname {
        host: String,
    },
    Txt {
        chunks: Vec<String>,
    },
    Mx {
        preference: u16,
        host: String,
    },
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    Ns {
        host: String,
    },
    Ptr {
        host: String,
    },
    Caa {
        flag: u8,
        tag: String,
        value: String,
    },
    Soa {
        m_name: String,
        r_name: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
}

/// A single answer or authority section entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub name: String,
    pub ttl: u32,
    pub rdata: RData,
}

impl ResourceRecord {
    /// Synthesizes the SOA used in the authority section of NameError and
    /// NoData responses. The serial is the current unix time, a freshness
    /// signal rather than real zone versioning.
    pub fn soa(zone: &str) -> ResourceRecord {
        let serial = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or_default();

        ResourceRecord {
            name: zone.to_string(),
            ttl: SOA_TTL,
            rdata: RData::Soa {
                m_name: format!("ns1.{}", zone),
                r_name: format!("hostmaster.{}", zone),
                serial,
                refresh: 7200,
                retry: 1800,
                expire: 86400,
                minimum: 300,
            },
        }
    }
}
