use crate::{
    error::ErrorKind,
    model::Model,
    obs::with_metrics_sink,
    persist::Record,
    test_support::{self, CountingSink},
    value::{Timestamp, Value},
};
use serde_json::json;

fn text_of(model: &Model, key: &str) -> Option<String> {
    model
        .get(key)
        .unwrap()
        .and_then(|value| value.as_value().and_then(Value::as_text).map(String::from))
}

// ----------------------------------------------------------------------
// State machine
// ----------------------------------------------------------------------

#[test]
fn new_person_with_pets_scenario() {
    let (session, _) = test_support::session();

    let p1 = session.create("person", "p1").unwrap();
    assert!(p1.is_new());

    p1.set("name", "Ada").unwrap();
    assert!(p1.is_dirty().unwrap());
    assert_eq!(text_of(&p1, "name"), Some("Ada".to_string()));

    let pet1 = session.create("dog", "pet1").unwrap();
    p1.push("pets", &pet1).unwrap();

    let pets = p1.get("pets").unwrap().unwrap();
    let pets = pets.as_models().unwrap();
    assert!(pets.has(&pet1).unwrap());
    assert!(pets.is_dirty());
    assert_eq!(pets.total_count(), 1);

    p1.remove("pets", &pet1).unwrap();
    assert!(pets.is_empty().unwrap());
    assert!(!pets.is_dirty(), "push then remove must cancel out");
}

#[test]
fn proxy_touch_loads_on_first_access() {
    let (session, persister) = test_support::session();

    let grace = session.proxy("person", "2").unwrap();
    assert!(!grace.is_loaded());
    assert_eq!(persister.record_fetches(), 0);

    assert_eq!(text_of(&grace, "name"), Some("Grace".to_string()));
    assert!(grace.is_loaded());
    assert_eq!(persister.record_fetches(), 1);

    // Further access stays in memory.
    grace.get("age").unwrap();
    assert_eq!(persister.record_fetches(), 1);
}

#[test]
fn reload_refetches_and_discards_local_changes() {
    let (session, persister) = test_support::session();

    let grace = session.find("person", "2").unwrap();
    grace.set("name", "X").unwrap();
    assert!(grace.is_dirty().unwrap());

    grace.reload().unwrap();

    assert_eq!(persister.record_fetches(), 2);
    assert!(!grace.is_dirty().unwrap());
    assert_eq!(text_of(&grace, "name"), Some("Grace".to_string()));
}

#[test]
fn delete_is_illegal_on_new_models() {
    let (session, _) = test_support::session();

    let fresh = session.create("dog", "pup").unwrap();
    let err = fresh.delete().unwrap_err();

    assert_eq!(err.kind, ErrorKind::IllegalDelete);
    assert!(!fresh.is_deleted());
}

#[test]
fn delete_suppresses_all_future_hydration() {
    let (session, persister) = test_support::session();

    let ghost = session.proxy("person", "404").unwrap();
    ghost.delete().unwrap();
    assert!(ghost.is_deleted());

    // Touch becomes a no-op: no fetch, and reads answer from what's there.
    assert_eq!(ghost.get("name").unwrap().map(|_| ()), None);
    assert_eq!(persister.record_fetches(), 0);
    assert!(!ghost.is_loaded());

    ghost.reload().unwrap();
    assert_eq!(persister.record_fetches(), 0);
}

#[test]
fn save_rollback_and_change_set_are_unsupported() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    for err in [
        ada.save().unwrap_err(),
        ada.rollback().unwrap_err(),
        ada.change_set().unwrap_err(),
    ] {
        assert_eq!(err.kind, ErrorKind::Unsupported);
    }
}

// ----------------------------------------------------------------------
// Property store
// ----------------------------------------------------------------------

#[test]
fn equal_sets_never_mark_a_key_modified() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    ada.set("name", "Ada").unwrap();
    ada.set("age", 36_i64).unwrap();
    assert!(!ada.is_dirty().unwrap(), "no-op edits must stay clean");

    ada.set("name", "Lovelace").unwrap();
    assert!(ada.is_dirty().unwrap());

    ada.set("name", "Ada").unwrap();
    assert!(
        !ada.is_dirty().unwrap(),
        "setting back to the original clears the pending change"
    );
}

#[test]
fn date_edits_compare_by_timestamp() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    // Same instant, different construction paths.
    ada.set("joined", "1843-09-05").unwrap();
    assert!(!ada.is_dirty().unwrap());

    ada.set("joined", Timestamp::parse("1843-09-05T00:00:00Z").unwrap())
        .unwrap();
    assert!(!ada.is_dirty().unwrap());

    ada.set("joined", "2000-01-01").unwrap();
    assert!(ada.is_dirty().unwrap());
}

#[test]
fn absent_attributes_fall_back_to_their_default() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    let active = ada.get("active").unwrap().unwrap();
    assert_eq!(active.as_value(), Some(&Value::Bool(true)));
}

#[test]
fn cleared_attributes_answer_with_their_default() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    ada.clear("active").unwrap();

    let active = ada.get("active").unwrap().unwrap();
    assert_eq!(active.as_value(), Some(&Value::Bool(true)));
    assert!(ada.is_dirty().unwrap(), "the removal itself is a change");

    ada.clear("name").unwrap();
    assert_eq!(ada.get("name").unwrap().map(|_| ()), None);
}

#[test]
fn cleared_has_many_keys_answer_with_an_empty_collection() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    ada.clear("pets").unwrap();

    let pets = ada.get("pets").unwrap().expect("never a missing value");
    let pets = pets.as_models().unwrap();
    assert_eq!(pets.len().unwrap(), 0);
    assert!(pets.is_dirty());
    assert!(ada.is_dirty().unwrap(), "collection deltas dirty the parent");
}

#[test]
fn direct_set_on_many_cardinality_keys_is_rejected() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    let err = ada.set("pets", "nope").unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidMutation);

    let err = ada.push("name", &ada).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidMutation);
}

#[test]
fn unknown_properties_are_schema_errors() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    let err = ada.get("nonsense").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Schema);
}

#[test]
fn calculated_attributes_recompute_on_every_access() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    assert_eq!(text_of(&ada, "greeting"), Some("Hello, Ada!".to_string()));

    ada.set("name", "Lovelace").unwrap();
    assert_eq!(
        text_of(&ada, "greeting"),
        Some("Hello, Lovelace!".to_string()),
        "calculated values must track live properties"
    );
}

#[test]
fn calculated_attributes_hydrate_proxies_through_the_resolver() {
    let (session, persister) = test_support::session();
    let grace = session.proxy("person", "2").unwrap();

    assert_eq!(text_of(&grace, "greeting"), Some("Hello, Grace!".to_string()));
    assert_eq!(persister.record_fetches(), 1);
}

#[test]
fn relationship_one_edits_compare_by_identity() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    let same = session.proxy("person", "2").unwrap();
    ada.set("best_friend", &same).unwrap();
    assert!(!ada.is_dirty().unwrap(), "same target identity is a no-op");

    ada.set("best_friend", &ada).unwrap();
    assert!(ada.is_dirty().unwrap());
}

// ----------------------------------------------------------------------
// Collections
// ----------------------------------------------------------------------

#[test]
fn membership_is_knowable_without_any_data_fetch() {
    let (session, persister) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    let pets = ada.get("pets").unwrap().unwrap();
    let pets = pets.as_models().unwrap();

    assert_eq!(pets.len().unwrap(), 2);
    assert_eq!(pets.total_count(), 2);
    assert!(pets.is_proxied());
    assert!(!pets.is_loaded());
    assert_eq!(persister.batch_fetches(), 0);
    assert_eq!(persister.record_fetches(), 1, "only the find itself");
}

#[test]
fn touching_a_collection_issues_exactly_one_batched_fetch() {
    let (session, persister) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    let pets = ada.get("pets").unwrap().unwrap();
    let models = pets.as_models().unwrap().models().unwrap();

    assert_eq!(models.len(), 2);
    assert_eq!(persister.batch_fetches(), 1);
    assert_eq!(persister.last_batch_len(), 2, "one fetch spanning all ids");
    assert!(models.iter().all(Model::is_loaded));

    // Member data arrived through the batch; no per-member fetches follow.
    assert_eq!(text_of(&models[1], "bark"), Some("loud".to_string()));
    assert_eq!(persister.record_fetches(), 1);
}

#[test]
fn iteration_defers_hydration_to_the_first_dereference() {
    let (session, persister) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    let pets = ada.get("pets").unwrap().unwrap();
    let mut iter = pets.as_models().unwrap().iter().unwrap();
    assert_eq!(persister.batch_fetches(), 0, "creating the iterator is free");

    let first = iter.next().unwrap().unwrap();
    assert_eq!(persister.batch_fetches(), 1);
    assert!(first.is_loaded());

    let rest: Vec<_> = iter.map(Result::unwrap).collect();
    assert_eq!(rest.len(), 1);
    assert_eq!(persister.batch_fetches(), 1);
}

#[test]
fn untyped_references_default_to_the_declared_target_and_rekey_on_load() {
    let (session, persister) = test_support::session();
    persister.insert(
        Record::new("person", "3")
            .with_property("name", json!("Blaise"))
            .with_property("pets", json!([{"id": "d1"}])),
    );

    let blaise = session.find("person", "3").unwrap();
    let pets = blaise.get("pets").unwrap().unwrap();
    let pets = pets.as_models().unwrap();

    assert_eq!(pets.len().unwrap(), 1);
    assert_eq!(pets.get_single().unwrap().unwrap().type_key(), "animal");

    let models = pets.models().unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(
        models[0].type_key(),
        "dog",
        "the polymorphic record resolves under its concrete subtype"
    );
    assert!(models[0].is_loaded());
}

#[test]
fn pushes_validate_against_the_declared_target_type() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();
    let grace = session.find("person", "2").unwrap();

    let err = ada.push("pets", &grace).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidMutation);

    let pup = session.create("dog", "pup").unwrap();
    ada.push("pets", &pup).unwrap();
}

#[test]
fn collection_push_is_idempotent_through_the_facade() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();
    let pup = session.create("dog", "pup").unwrap();

    ada.push("pets", &pup).unwrap();
    ada.push("pets", &pup).unwrap();

    let pets = ada.get("pets").unwrap().unwrap();
    let pets = pets.as_models().unwrap();
    assert_eq!(pets.len().unwrap(), 3);
    assert_eq!(pets.total_count(), 3);
}

#[test]
fn removing_an_original_member_flags_it_and_push_undoes_it() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    let pets = ada.get("pets").unwrap().unwrap();
    let pets = pets.as_models().unwrap().clone();
    let rex = pets.models().unwrap()[1].clone();
    assert_eq!(rex.type_key(), "dog");

    pets.remove(&rex).unwrap();
    assert_eq!(pets.len().unwrap(), 1);
    assert_eq!(pets.total_count(), 1);
    assert!(pets.is_dirty());

    pets.push(&rex).unwrap();
    assert_eq!(pets.len().unwrap(), 2);
    assert_eq!(pets.total_count(), 2);
    assert!(!pets.is_dirty(), "remove then push must cancel out");
}

#[test]
fn collection_rollback_restores_the_original_membership() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    let pets = ada.get("pets").unwrap().unwrap();
    let pets = pets.as_models().unwrap().clone();
    let pup = session.create("dog", "pup").unwrap();

    pets.push(&pup).unwrap();
    pets.clear().unwrap();
    assert_eq!(pets.len().unwrap(), 0);

    pets.rollback().unwrap();
    assert_eq!(pets.len().unwrap(), 2);
    assert_eq!(pets.total_count(), 2);
    assert!(!pets.is_dirty());
}

#[test]
fn member_dirtiness_does_not_leak_into_relationship_deltas() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    let pets = ada.get("pets").unwrap().unwrap();
    let pets = pets.as_models().unwrap().clone();
    let rex = pets.models().unwrap()[1].clone();

    rex.set("bark", "quiet").unwrap();

    assert!(rex.is_dirty().unwrap());
    assert!(pets.has_dirty_models().unwrap());
    assert!(!pets.is_dirty(), "a member edit is not a membership change");
    assert!(
        !ada.is_dirty().unwrap(),
        "related models answer for their own changes"
    );
}

// ----------------------------------------------------------------------
// Embeds
// ----------------------------------------------------------------------

#[test]
fn embed_edits_propagate_dirtiness_to_the_parent() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    let address = ada.get("address").unwrap().unwrap();
    let address = address.as_embed().unwrap().clone();
    assert!(!ada.is_dirty().unwrap());

    address.set("city", "Paris").unwrap();

    assert!(address.is_dirty().unwrap());
    assert!(
        ada.is_dirty().unwrap(),
        "a dirty nested embed dirties the whole parent"
    );
}

#[test]
fn deeply_nested_embed_edits_still_propagate() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    let address = ada.get("address").unwrap().unwrap();
    let address = address.as_embed().unwrap().clone();
    let geo = address.get("geo").unwrap().unwrap();
    let geo = geo.as_embed().unwrap().clone();

    geo.set("lat", 48.85).unwrap();

    assert!(geo.is_dirty().unwrap());
    assert!(address.is_dirty().unwrap());
    assert!(ada.is_dirty().unwrap());
}

#[test]
fn embed_one_no_op_sets_compare_by_structural_hash() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    let address = ada.get("address").unwrap().unwrap();
    let address = address.as_embed().unwrap().clone();

    ada.set("address", &address).unwrap();
    assert!(!ada.is_dirty().unwrap(), "same content is a no-op");

    let fresh = session.create_embed(&test_support::address_schema()).unwrap();
    fresh.set("street", "1 Rue Nouvelle").unwrap();
    ada.set("address", &fresh).unwrap();
    assert!(ada.is_dirty().unwrap());
}

#[test]
fn embed_collections_fold_member_dirtiness_into_their_own() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    let phones = ada.get("phones").unwrap().unwrap();
    let phones = phones.as_embeds().unwrap().clone();
    assert_eq!(phones.len(), 2);
    assert!(phones.is_loaded(), "embed collections are born loaded");
    assert!(!phones.is_dirty().unwrap());

    phones.embeds()[0].set("number", "003").unwrap();

    assert!(phones.is_dirty().unwrap());
    assert!(ada.is_dirty().unwrap());
}

#[test]
fn embed_collections_accept_only_their_own_embed_name() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    let phones = ada.get("phones").unwrap().unwrap();
    let phones = phones.as_embeds().unwrap().clone();

    let stray = session.create_embed(&test_support::geo_schema()).unwrap();
    let err = phones.push(&stray).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidMutation);

    let phone = phones.create_new_embed().unwrap();
    phone.set("label", "mobile").unwrap();
    phone.set("number", "004").unwrap();
    phones.push(&phone).unwrap();

    assert_eq!(phones.len(), 3);
    assert_eq!(phones.total_count(), 3);
}

#[test]
fn embed_delete_is_a_no_op() {
    let (session, _) = test_support::session();
    let ada = session.find("person", "1").unwrap();

    let address = ada.get("address").unwrap().unwrap();
    let address = address.as_embed().unwrap().clone();

    address.delete().unwrap();
    assert_eq!(
        address.get("city").unwrap().and_then(|v| v.as_value().cloned()),
        Some(Value::Text("London".to_string()))
    );
}

#[test]
fn structural_hash_tracks_content_not_identity() {
    let (session, _) = test_support::session();

    let a = session.create_embed(&test_support::phone_schema()).unwrap();
    let b = session.create_embed(&test_support::phone_schema()).unwrap();
    a.set("number", "001").unwrap();
    b.set("number", "001").unwrap();

    assert_eq!(
        a.structural_hash().unwrap(),
        b.structural_hash().unwrap(),
        "distinct embeds with equal content must hash alike"
    );

    b.set("number", "002").unwrap();
    assert_ne!(a.structural_hash().unwrap(), b.structural_hash().unwrap());
}

// ----------------------------------------------------------------------
// Observability
// ----------------------------------------------------------------------

#[test]
fn hydration_paths_report_through_the_metrics_sink() {
    let sink = CountingSink::leaked();

    with_metrics_sink(sink, || {
        let (session, _) = test_support::session();

        let proxy = session.proxy("person", "1").unwrap();
        session.find("person", "1").unwrap();
        assert!(proxy.is_loaded());

        let pets = proxy.get("pets").unwrap().unwrap();
        pets.as_models().unwrap().models().unwrap();
    });

    assert_eq!(sink.record_fetches(), 1);
    assert_eq!(sink.proxy_upgrades(), 1);
    assert_eq!(sink.batch_fetches(), 1);
}
