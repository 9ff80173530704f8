//! # Models
//!
//! Durable data types of the relay. A [`RequestRecord`] is persisted as one JSON
//! document per file by [`crate::store::FileRequestStore`].

pub mod request;

pub use request::{
    IngestContext, NewRequest, RemoteContext, RequestKind, RequestPayload, RequestRecord,
    StepChange, DEFAULT_INGEST_ACTION, GENERIC_SERVER_ERROR,
};
