//! Shared fixtures for core tests: a small contacts-flavored schema set
//! (people, polymorphic animals, address/phone embeds), seeded in-memory
//! persisters, and a counting metrics sink.

use crate::{
    error::Error,
    model::AnyModel,
    obs::{MetricsEvent, MetricsSink},
    persist::{MemoryPersister, Record},
    schema::{EmbedSchema, EntitySchema, SchemaRegistry},
    session::Session,
    value::{DataType, Value},
};
use serde_json::json;
use std::{cell::RefCell, rc::Rc};

/// Calculated resolver used by the `person.greeting` attribute.
fn greeting(model: &AnyModel) -> Result<Option<Value>, Error> {
    let name = model
        .get("name")?
        .and_then(|value| value.as_value().and_then(Value::as_text).map(String::from));

    Ok(name.map(|name| Value::Text(format!("Hello, {name}!"))))
}

#[must_use]
pub fn geo_schema() -> Rc<EmbedSchema> {
    Rc::new(
        EmbedSchema::new("geo")
            .with_attribute("lat", DataType::Float)
            .with_attribute("lon", DataType::Float),
    )
}

#[must_use]
pub fn address_schema() -> Rc<EmbedSchema> {
    Rc::new(
        EmbedSchema::new("address")
            .with_attribute("street", DataType::String)
            .with_attribute("city", DataType::String)
            .with_embed_one("geo", geo_schema()),
    )
}

#[must_use]
pub fn phone_schema() -> Rc<EmbedSchema> {
    Rc::new(
        EmbedSchema::new("phone")
            .with_attribute("label", DataType::String)
            .with_attribute("number", DataType::String),
    )
}

/// The registry every core test runs against.
#[must_use]
pub fn contact_registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();

    registry
        .register(
            EntitySchema::new("person")
                .with_attribute("name", DataType::String)
                .with_attribute("age", DataType::Integer)
                .with_attribute("joined", DataType::Date)
                .with_default("active", DataType::Boolean, Value::Bool(true))
                .with_calculated("greeting", DataType::String, greeting)
                .with_has_one("best_friend", "person")
                .with_has_many("pets", "animal")
                .with_embed_one("address", address_schema())
                .with_embed_many("phones", phone_schema()),
        )
        .expect("register person");

    registry
        .register(
            EntitySchema::new("animal")
                .abstract_type()
                .polymorphic(["dog", "cat"])
                .with_attribute("name", DataType::String),
        )
        .expect("register animal");

    registry
        .register(
            EntitySchema::new("dog")
                .with_attribute("name", DataType::String)
                .with_attribute("bark", DataType::String),
        )
        .expect("register dog");

    registry
        .register(EntitySchema::new("cat").with_attribute("name", DataType::String))
        .expect("register cat");

    registry
}

/// A persister seeded with the standard fixture records.
#[must_use]
pub fn seeded_persister() -> Rc<MemoryPersister> {
    let persister = MemoryPersister::new();

    persister.insert(
        Record::new("person", "1")
            .with_property("name", json!("Ada"))
            .with_property("age", json!(36))
            .with_property("joined", json!("1843-09-05T00:00:00Z"))
            .with_property("best_friend", json!({"type": "person", "id": "2"}))
            .with_property(
                "pets",
                json!([
                    {"type": "dog", "id": "d1"},
                    {"type": "cat", "id": "c1"},
                ]),
            )
            .with_property(
                "address",
                json!({
                    "street": "12 Analytical Row",
                    "city": "London",
                    "geo": {"lat": 51.5, "lon": -0.1},
                }),
            )
            .with_property(
                "phones",
                json!([
                    {"label": "home", "number": "001"},
                    {"label": "work", "number": "002"},
                ]),
            ),
    );

    persister.insert(
        Record::new("person", "2")
            .with_property("name", json!("Grace"))
            .with_property("age", json!(37)),
    );

    persister.insert(
        Record::new("dog", "d1")
            .with_property("name", json!("Rex"))
            .with_property("bark", json!("loud")),
    );

    persister.insert(Record::new("cat", "c1").with_property("name", json!("Mog")));

    Rc::new(persister)
}

/// A ready-to-use session over the standard fixtures, with its persister
/// handle kept out for fetch-count assertions.
#[must_use]
pub fn session() -> (Session, Rc<MemoryPersister>) {
    let persister = seeded_persister();
    let session = Session::new(contact_registry(), persister.clone());

    (session, persister)
}

///
/// CountingSink
///
/// Metrics sink that captures every event for later assertion. Leak one to
/// obtain the `&'static` the sink registry wants.
///

#[derive(Default)]
pub struct CountingSink {
    events: RefCell<Vec<MetricsEvent>>,
}

impl CountingSink {
    #[must_use]
    pub fn leaked() -> &'static Self {
        Box::leak(Box::new(Self::default()))
    }

    #[must_use]
    pub fn batch_fetches(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| matches!(event, MetricsEvent::BatchFetch { .. }))
            .count()
    }

    #[must_use]
    pub fn record_fetches(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| matches!(event, MetricsEvent::RecordFetch { .. }))
            .count()
    }

    #[must_use]
    pub fn proxy_upgrades(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| matches!(event, MetricsEvent::ProxyUpgrade { .. }))
            .count()
    }
}

impl MetricsSink for CountingSink {
    fn record(&self, event: &MetricsEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}
