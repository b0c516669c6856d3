//! Zone-aware resolution engine
//!
//! Answers a single query against the record store: zone matching,
//! name lookup, type filtering, CNAME chasing for address queries, and
//! synthesized SOA authority records for negative answers. Requests for
//! names outside the configured zones (or covered by the fallthrough set)
//! are handed back to the surrounding handler chain as [`Resolution::PassThrough`].

use std::sync::Arc;

use crate::dns::protocol::{QueryType, ResourceRecord};
use crate::dns::record::Record;
use crate::dns::store::RecordStore;

/// Maximum number of CNAME hops followed per query. A chain (or cycle)
/// longer than this is cut off; the partial chain is still returned.
const MAX_CNAME_HOPS: usize = 10;

/// Terminal outcome of a single query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Records matching the query, in stored (or chain) order.
    Success(Vec<ResourceRecord>),
    /// The name has no records at all; authoritative denial.
    NameError { authority: ResourceRecord },
    /// The name exists but holds nothing of the queried type.
    NoData { authority: ResourceRecord },
    /// Outside our zones or covered by fallthrough; the next handler owns it.
    PassThrough,
}

/// The set of names for which an empty lookup falls through to the next
/// handler instead of producing an authoritative NameError.
#[derive(Debug, Clone, Default)]
pub struct Fallthrough {
    zones: Vec<String>,
}

impl Fallthrough {
    /// No fallthrough: empty lookups inside our zones are authoritative.
    pub fn disabled() -> Fallthrough {
        Fallthrough { zones: Vec::new() }
    }

    /// Fall through for every name.
    pub fn all() -> Fallthrough {
        Fallthrough {
            zones: vec![".".to_string()],
        }
    }

    /// Fall through only for names inside the given zones.
    pub fn zones(zones: Vec<String>) -> Fallthrough {
        Fallthrough {
            zones: zones.into_iter().map(|z| z.to_lowercase()).collect(),
        }
    }

    /// True when `qname` is covered by the fallthrough set.
    pub fn matches(&self, qname: &str) -> bool {
        self.zones.iter().any(|z| zone_contains(z, qname))
    }
}

/// True when `qname` is `zone` itself or a name below it. Both are expected
/// lowercase and dot-terminated; the root zone contains everything.
fn zone_contains(zone: &str, qname: &str) -> bool {
    if zone == "." {
        return true;
    }
    if qname.len() == zone.len() {
        return qname == zone;
    }
    qname.ends_with(zone) && qname.as_bytes()[qname.len() - zone.len() - 1] == b'.'
}

/// Returns the longest configured zone containing `qname`, if any.
pub fn zone_match<'a>(zones: &'a [String], qname: &str) -> Option<&'a str> {
    zones
        .iter()
        .filter(|z| zone_contains(z, qname))
        .max_by_key(|z| z.len())
        .map(String::as_str)
}

/// Resolution engine over a shared record store.
pub struct Resolver {
    store: Arc<RecordStore>,
    zones: Vec<String>,
    fall: Fallthrough,
}

impl Resolver {
    /// Creates a resolver authoritative for the given zones. Zone names are
    /// normalised to lowercase FQDNs.
    pub fn new(store: Arc<RecordStore>, zones: Vec<String>, fall: Fallthrough) -> Resolver {
        let zones = zones
            .into_iter()
            .map(|z| {
                let mut z = z.to_lowercase();
                if !z.ends_with('.') {
                    z.push('.');
                }
                z
            })
            .collect();
        Resolver { store, zones, fall }
    }

    /// Answers a single query.
    pub fn resolve(&self, qname: &str, qtype: QueryType) -> Resolution {
        let qname = qname.to_lowercase();

        let zone = match zone_match(&self.zones, &qname) {
            Some(zone) => zone,
            None => return Resolution::PassThrough,
        };

        let all = self.store.get_all(&qname);

        // No records for this name
        if all.is_empty() {
            if self.fall.matches(&qname) {
                return Resolution::PassThrough;
            }
            return Resolution::NameError {
                authority: ResourceRecord::soa(zone),
            };
        }

        // Exact type match wins
        let typed = filter_by_type(&all, qtype);
        if !typed.is_empty() {
            return Resolution::Success(to_answers(&typed));
        }

        // CNAME chasing for address queries
        if qtype == QueryType::A || qtype == QueryType::Aaaa {
            let cnames = filter_by_type(&all, QueryType::Cname);
            if let Some(cname) = cnames.first() {
                if let Ok(rr) = cname.to_rr() {
                    let mut answers = vec![rr];
                    answers.extend(self.chase_cname(&cname.value, qtype, 1));
                    return Resolution::Success(answers);
                }
            }
        }

        // Name exists but nothing of this type
        Resolution::NoData {
            authority: ResourceRecord::soa(zone),
        }
    }

    /// Follows a CNAME chain through the store, up to `MAX_CNAME_HOPS` deep.
    /// A dead end or exhausted depth yields the chain accumulated so far.
    fn chase_cname(&self, target: &str, qtype: QueryType, depth: usize) -> Vec<ResourceRecord> {
        if depth > MAX_CNAME_HOPS {
            return Vec::new();
        }

        let all = self.store.get_all(target);
        if all.is_empty() {
            return Vec::new();
        }

        let typed = filter_by_type(&all, qtype);
        if !typed.is_empty() {
            return to_answers(&typed);
        }

        let cnames = filter_by_type(&all, QueryType::Cname);
        if let Some(cname) = cnames.first() {
            if let Ok(rr) = cname.to_rr() {
                let mut chain = vec![rr];
                chain.extend(self.chase_cname(&cname.value, qtype, depth + 1));
                return chain;
            }
        }

        Vec::new()
    }
}

fn filter_by_type(records: &[Record], qtype: QueryType) -> Vec<Record> {
    records
        .iter()
        .filter(|r| QueryType::from(r.rtype) == qtype)
        .cloned()
        .collect()
}

fn to_answers(records: &[Record]) -> Vec<ResourceRecord> {
    let mut answers = Vec::with_capacity(records.len());
    for rec in records {
        match rec.to_rr() {
            Ok(rr) => answers.push(rr),
            Err(e) => log::error!("converting record {} to RR: {}", rec.name, e),
        }
    }
    answers
}
