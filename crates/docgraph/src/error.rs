use crate::{
    model::ModelError,
    model::collection::CollectionError,
    model::properties::PropertyError,
    persist::PersistError,
    schema::SchemaError,
    session::SessionError,
    session::loader::LoaderError,
    value::CoercionError,
};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///
/// Every failure is raised synchronously to the immediate caller and none is
/// retried at this layer; callers treat these as usage or schema errors, not
/// transient faults.
///

#[derive(Clone, Debug, Deserialize, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    /// A persisted record's type is incompatible with the requested type:
    /// persister/schema drift, fatal.
    SchemaMismatch,

    /// A new model was created for an identity already in the cache.
    IdentityConflict,

    /// An abstract type was instantiated directly.
    AbstractInstantiation,

    /// A direct set on a many-cardinality key, or a push/set violating the
    /// slot's type constraints.
    InvalidMutation,

    /// A New (unsaved) model was deleted.
    IllegalDelete,

    /// Save, scalar rollback, and change-set export are out of scope.
    Unsupported,

    /// The persistence layer had no matching record.
    NotFound,

    /// A raw value could not be coerced into its declared data type.
    Coercion,

    /// Unknown type or property; a schema usage error.
    Schema,

    /// The owning session was dropped while instances were still live.
    SessionClosed,

    /// The caller cannot remediate this.
    Internal,
}

///
/// ErrorOrigin
/// Public origin taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Collection,
    Loader,
    Model,
    Persister,
    Properties,
    Schema,
    Session,
    Value,
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Self::new(ErrorKind::Schema, ErrorOrigin::Schema, err.to_string())
    }
}

impl From<PersistError> for Error {
    fn from(err: PersistError) -> Self {
        let kind = match err {
            PersistError::NotFound { .. } => ErrorKind::NotFound,
            PersistError::Backend(_) => ErrorKind::Internal,
        };

        Self::new(kind, ErrorOrigin::Persister, err.to_string())
    }
}

impl From<CoercionError> for Error {
    fn from(err: CoercionError) -> Self {
        Self::new(ErrorKind::Coercion, ErrorOrigin::Value, err.to_string())
    }
}

impl From<LoaderError> for Error {
    fn from(err: LoaderError) -> Self {
        let kind = match err {
            LoaderError::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            LoaderError::IdentityConflict { .. } => ErrorKind::IdentityConflict,
            LoaderError::AbstractInstantiation { .. } => ErrorKind::AbstractInstantiation,
        };

        Self::new(kind, ErrorOrigin::Loader, err.to_string())
    }
}

impl From<PropertyError> for Error {
    fn from(err: PropertyError) -> Self {
        let kind = match err {
            PropertyError::ManyCardinality { .. }
            | PropertyError::NotHasMany { .. }
            | PropertyError::ValueKind { .. } => ErrorKind::InvalidMutation,
            PropertyError::MalformedReference { .. } => ErrorKind::Coercion,
        };

        Self::new(kind, ErrorOrigin::Properties, err.to_string())
    }
}

impl From<CollectionError> for Error {
    fn from(err: CollectionError) -> Self {
        Self::new(
            ErrorKind::InvalidMutation,
            ErrorOrigin::Collection,
            err.to_string(),
        )
    }
}

impl From<ModelError> for Error {
    fn from(err: ModelError) -> Self {
        let kind = match err {
            ModelError::DeleteNew { .. } => ErrorKind::IllegalDelete,
            ModelError::Unsupported { .. } => ErrorKind::Unsupported,
        };

        Self::new(kind, ErrorOrigin::Model, err.to_string())
    }
}

impl From<SessionError> for Error {
    fn from(err: SessionError) -> Self {
        Self::new(
            ErrorKind::SessionClosed,
            ErrorOrigin::Session,
            err.to_string(),
        )
    }
}
