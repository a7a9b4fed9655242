use crate::{
    error::ErrorKind,
    model::Model,
    persist::Record,
    test_support::{self, seeded_persister},
};
use serde_json::json;

#[test]
fn proxy_identity_is_stable_across_lookups() {
    let (session, _) = test_support::session();

    let first = session.proxy("person", "42").unwrap();
    let second = session.proxy("person", "42").unwrap();

    assert!(
        Model::ptr_eq(&first, &second),
        "both lookups must yield the same in-memory instance"
    );
    assert_eq!(session.cached_models(), 1);
}

#[test]
fn find_materializes_a_loaded_model() {
    let (session, persister) = test_support::session();

    let ada = session.find("person", "1").unwrap();

    assert!(ada.is_loaded());
    assert!(!ada.is_new());
    assert_eq!(ada.composite_key(), "person.1");
    assert_eq!(persister.record_fetches(), 1);

    let name = ada.get("name").unwrap().unwrap();
    assert_eq!(name.as_value().and_then(|v| v.as_text()), Some("Ada"));
    assert_eq!(persister.record_fetches(), 1, "get must not refetch");
}

#[test]
fn create_model_upgrades_an_unloaded_proxy_in_place() {
    let (session, _) = test_support::session();

    let proxy = session.proxy("person", "1").unwrap();
    assert!(!proxy.is_loaded());

    let found = session.find("person", "1").unwrap();

    assert!(Model::ptr_eq(&proxy, &found), "upgrade must preserve identity");
    assert!(proxy.is_loaded(), "every holder observes the hydration");
}

#[test]
fn a_second_fetch_never_overwrites_local_state() {
    let (session, _) = test_support::session();

    let ada = session.find("person", "1").unwrap();
    ada.set("name", "Lovelace").unwrap();

    let again = session.find("person", "1").unwrap();

    assert!(Model::ptr_eq(&ada, &again));
    let name = again.get("name").unwrap().unwrap();
    assert_eq!(
        name.as_value().and_then(|v| v.as_text()),
        Some("Lovelace"),
        "a refetch must not clobber unsaved modifications"
    );
}

#[test]
fn record_type_must_match_the_requested_type_or_a_subtype() {
    let (session, _) = test_support::session();

    let record = Record::new("person", "9").with_property("name", json!("Eve"));
    let err = session.loader().create_model("dog", &record).unwrap_err();
    assert_eq!(err.kind, ErrorKind::SchemaMismatch);

    let record = Record::new("dog", "d9").with_property("name", json!("Fido"));
    let model = session.loader().create_model("animal", &record).unwrap();
    assert_eq!(model.type_key(), "dog", "subtype records resolve concretely");
}

#[test]
fn create_new_model_rejects_cached_identities() {
    let (session, _) = test_support::session();

    session.find("person", "1").unwrap();
    let err = session.create("person", "1").unwrap_err();

    assert_eq!(err.kind, ErrorKind::IdentityConflict);
}

#[test]
fn create_new_model_rejects_abstract_types() {
    let (session, _) = test_support::session();

    let err = session.create("animal", "a1").unwrap_err();

    assert_eq!(err.kind, ErrorKind::AbstractInstantiation);
}

#[test]
fn new_models_register_and_start_dirty() {
    let (session, _) = test_support::session();

    let pup = session.create("dog", "new-1").unwrap();

    assert!(pup.is_new());
    assert!(pup.is_loaded(), "there is nothing to fetch for a new model");
    assert!(pup.is_dirty().unwrap());

    let same = session.proxy("dog", "new-1").unwrap();
    assert!(Model::ptr_eq(&pup, &same));
}

#[test]
fn identifiers_are_normalized_through_convert_id() {
    let (session, _) = test_support::session();

    let padded = session.proxy("person", " 7 ").unwrap();
    let plain = session.proxy("person", "7").unwrap();

    assert!(Model::ptr_eq(&padded, &plain));
    assert_eq!(padded.id(), "7");
}

#[test]
fn operations_on_a_dropped_session_fail_closed() {
    let persister = seeded_persister();
    let proxy = {
        let session = crate::session::Session::new(test_support::contact_registry(), persister);
        session.proxy("person", "2").unwrap()
    };

    let err = proxy.get("name").unwrap_err();
    assert_eq!(err.kind, ErrorKind::SessionClosed);
}

#[test]
fn batch_created_models_share_the_cache() {
    let (session, _) = test_support::session();

    let proxies = session
        .loader()
        .create_proxy_models("person", &["1".to_string(), "2".to_string()])
        .unwrap();
    assert_eq!(proxies.len(), 2);

    let records = vec![
        Record::new("person", "1").with_property("name", json!("Ada")),
        Record::new("person", "2").with_property("name", json!("Grace")),
    ];
    let models = session.loader().create_models("person", &records).unwrap();

    assert!(Model::ptr_eq(&proxies[0], &models[0]));
    assert!(Model::ptr_eq(&proxies[1], &models[1]));
    assert!(models.iter().all(Model::is_loaded));
}
