//! Unit tests for the resolution engine

#[cfg(test)]
mod tests {
    use crate::dns::protocol::{QueryType, RData, ResourceRecord};
    use crate::dns::record::{Record, RecordType};
    use crate::dns::resolve::{zone_match, Fallthrough, Resolution, Resolver};
    use crate::dns::store::{RecordStore, StoreOptions};
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> Arc<RecordStore> {
        RecordStore::open(
            dir.path().join("records.json"),
            Duration::from_secs(0),
            StoreOptions::default(),
        )
        .unwrap()
    }

    fn resolver(store: Arc<RecordStore>) -> Resolver {
        Resolver::new(store, vec!["example.org.".to_string()], Fallthrough::disabled())
    }

    fn a_record(name: &str, value: &str) -> Record {
        Record::new(name, RecordType::A, 300, value)
    }

    fn cname(name: &str, target: &str) -> Record {
        Record::new(name, RecordType::Cname, 300, target)
    }

    fn assert_soa(authority: &ResourceRecord, zone: &str) {
        assert_eq!(authority.name, zone);
        assert_eq!(authority.ttl, 300);
        match &authority.rdata {
            RData::Soa {
                m_name,
                r_name,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                assert_eq!(m_name, &format!("ns1.{}", zone));
                assert_eq!(r_name, &format!("hostmaster.{}", zone));
                assert!(*serial > 0);
                assert_eq!(*refresh, 7200);
                assert_eq!(*retry, 1800);
                assert_eq!(*expire, 86400);
                assert_eq!(*minimum, 300);
            }
            other => panic!("expected SOA authority, got {:?}", other),
        }
    }

    #[test]
    fn a_query_returns_matching_record() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.upsert(a_record("app.example.org.", "10.0.0.1")).unwrap();

        match resolver(store).resolve("app.example.org.", QueryType::A) {
            Resolution::Success(answers) => {
                assert_eq!(answers.len(), 1);
                assert_eq!(answers[0].name, "app.example.org.");
                assert_eq!(
                    answers[0].rdata,
                    RData::A {
                        addr: Ipv4Addr::new(10, 0, 0, 1)
                    }
                );
            }
            other => panic!("expected Success, got {:?}", other),
        }
    }

    #[test]
    fn multiple_records_come_back_in_stored_order() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.upsert(a_record("app.example.org.", "10.0.0.1")).unwrap();
        store.upsert(a_record("app.example.org.", "10.0.0.2")).unwrap();

        match resolver(store).resolve("app.example.org.", QueryType::A) {
            Resolution::Success(answers) => {
                assert_eq!(answers.len(), 2);
                assert_eq!(answers[0].rdata, RData::A { addr: Ipv4Addr::new(10, 0, 0, 1) });
                assert_eq!(answers[1].rdata, RData::A { addr: Ipv4Addr::new(10, 0, 0, 2) });
            }
            other => panic!("expected Success, got {:?}", other),
        }
    }

    #[test]
    fn query_name_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.upsert(a_record("App.Example.Org.", "10.0.0.1")).unwrap();

        match resolver(store).resolve("APP.EXAMPLE.ORG.", QueryType::A) {
            Resolution::Success(answers) => assert_eq!(answers.len(), 1),
            other => panic!("expected Success, got {:?}", other),
        }
    }

    #[test]
    fn missing_name_yields_name_error_with_soa() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        match resolver(store).resolve("missing.example.org.", QueryType::A) {
            Resolution::NameError { authority } => assert_soa(&authority, "example.org."),
            other => panic!("expected NameError, got {:?}", other),
        }
    }

    #[test]
    fn wrong_type_yields_no_data_with_soa() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.upsert(a_record("app.example.org.", "10.0.0.1")).unwrap();

        match resolver(store).resolve("app.example.org.", QueryType::Aaaa) {
            Resolution::NoData { authority } => assert_soa(&authority, "example.org."),
            other => panic!("expected NoData, got {:?}", other),
        }
    }

    #[test]
    fn out_of_zone_query_passes_through() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.upsert(a_record("app.example.org.", "10.0.0.1")).unwrap();

        let outcome = resolver(store).resolve("app.example.net.", QueryType::A);
        assert_eq!(outcome, Resolution::PassThrough);
    }

    #[test]
    fn fallthrough_passes_empty_names_onward() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let r = Resolver::new(
            store,
            vec!["example.org.".to_string()],
            Fallthrough::all(),
        );
        assert_eq!(
            r.resolve("missing.example.org.", QueryType::A),
            Resolution::PassThrough
        );
    }

    #[test]
    fn fallthrough_zones_are_scoped() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let r = Resolver::new(
            store,
            vec!["example.org.".to_string()],
            Fallthrough::zones(vec!["legacy.example.org.".to_string()]),
        );

        assert_eq!(
            r.resolve("host.legacy.example.org.", QueryType::A),
            Resolution::PassThrough
        );
        match r.resolve("missing.example.org.", QueryType::A) {
            Resolution::NameError { .. } => {}
            other => panic!("expected NameError, got {:?}", other),
        }
    }

    #[test]
    fn cname_chase_returns_chain_then_address() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.upsert(cname("alias.example.org.", "app.example.org.")).unwrap();
        store.upsert(a_record("app.example.org.", "10.0.0.1")).unwrap();

        match resolver(store).resolve("alias.example.org.", QueryType::A) {
            Resolution::Success(answers) => {
                assert_eq!(answers.len(), 2);
                assert_eq!(answers[0].name, "alias.example.org.");
                assert_eq!(
                    answers[0].rdata,
                    RData::Cname {
                        host: "app.example.org.".to_string()
                    }
                );
                assert_eq!(answers[1].name, "app.example.org.");
                assert_eq!(
                    answers[1].rdata,
                    RData::A {
                        addr: Ipv4Addr::new(10, 0, 0, 1)
                    }
                );
            }
            other => panic!("expected Success, got {:?}", other),
        }
    }

    #[test]
    fn cname_chase_follows_multiple_hops() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.upsert(cname("a.example.org.", "b.example.org.")).unwrap();
        store.upsert(cname("b.example.org.", "c.example.org.")).unwrap();
        store.upsert(a_record("c.example.org.", "10.0.0.3")).unwrap();

        match resolver(store).resolve("a.example.org.", QueryType::A) {
            Resolution::Success(answers) => {
                assert_eq!(answers.len(), 3);
                assert_eq!(answers[0].name, "a.example.org.");
                assert_eq!(answers[1].name, "b.example.org.");
                assert_eq!(
                    answers[2].rdata,
                    RData::A {
                        addr: Ipv4Addr::new(10, 0, 0, 3)
                    }
                );
            }
            other => panic!("expected Success, got {:?}", other),
        }
    }

    #[test]
    fn cname_dead_end_returns_partial_chain() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.upsert(cname("alias.example.org.", "gone.example.org.")).unwrap();

        match resolver(store).resolve("alias.example.org.", QueryType::A) {
            Resolution::Success(answers) => {
                assert_eq!(answers.len(), 1);
                assert_eq!(answers[0].name, "alias.example.org.");
            }
            other => panic!("expected Success, got {:?}", other),
        }
    }

    // A two-node alias cycle is walked to the depth cap and returned as a
    // repeating chain, not flagged as an error.
    #[test]
    fn cname_loop_stops_at_depth_cap() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.upsert(cname("x.example.org.", "y.example.org.")).unwrap();
        store.upsert(cname("y.example.org.", "x.example.org.")).unwrap();

        match resolver(store).resolve("x.example.org.", QueryType::A) {
            Resolution::Success(answers) => {
                // initial CNAME plus ten chased hops
                assert_eq!(answers.len(), 11);
                assert_eq!(answers[0].name, "x.example.org.");
                assert_eq!(answers[1].name, "y.example.org.");
                assert_eq!(answers[2].name, "x.example.org.");
            }
            other => panic!("expected Success, got {:?}", other),
        }
    }

    #[test]
    fn cname_is_not_chased_for_non_address_queries() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.upsert(cname("alias.example.org.", "app.example.org.")).unwrap();
        store
            .upsert(Record::new("app.example.org.", RecordType::Txt, 300, "hello"))
            .unwrap();

        match resolver(store).resolve("alias.example.org.", QueryType::Txt) {
            Resolution::NoData { authority } => assert_soa(&authority, "example.org."),
            other => panic!("expected NoData, got {:?}", other),
        }
    }

    #[test]
    fn cname_query_returns_the_cname_itself() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.upsert(cname("alias.example.org.", "app.example.org.")).unwrap();

        match resolver(store).resolve("alias.example.org.", QueryType::Cname) {
            Resolution::Success(answers) => {
                assert_eq!(answers.len(), 1);
                assert_eq!(
                    answers[0].rdata,
                    RData::Cname {
                        host: "app.example.org.".to_string()
                    }
                );
            }
            other => panic!("expected Success, got {:?}", other),
        }
    }

    #[test]
    fn longest_zone_wins() {
        let zones = vec!["example.org.".to_string(), "sub.example.org.".to_string()];
        assert_eq!(
            zone_match(&zones, "host.sub.example.org."),
            Some("sub.example.org.")
        );
        assert_eq!(zone_match(&zones, "host.example.org."), Some("example.org."));
        assert_eq!(zone_match(&zones, "example.org."), Some("example.org."));
        assert_eq!(zone_match(&zones, "example.net."), None);
        // a zone never matches on a partial label
        assert_eq!(zone_match(&zones, "badexample.org."), None);
    }

    #[test]
    fn soa_authority_names_the_matched_zone() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let r = Resolver::new(
            store,
            vec!["example.org.".to_string(), "sub.example.org.".to_string()],
            Fallthrough::disabled(),
        );
        match r.resolve("missing.sub.example.org.", QueryType::A) {
            Resolution::NameError { authority } => assert_soa(&authority, "sub.example.org."),
            other => panic!("expected NameError, got {:?}", other),
        }
    }

    #[test]
    fn mx_query_succeeds_without_chasing() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let mut mx = Record::new("example.org.", RecordType::Mx, 300, "mail.example.org.");
        mx.priority = 10;
        store.upsert(mx).unwrap();

        match resolver(store).resolve("example.org.", QueryType::Mx) {
            Resolution::Success(answers) => {
                assert_eq!(answers.len(), 1);
                assert_eq!(
                    answers[0].rdata,
                    RData::Mx {
                        preference: 10,
                        host: "mail.example.org.".to_string()
                    }
                );
            }
            other => panic!("expected Success, got {:?}", other),
        }
    }
}
