use std::io;

use thiserror::Error;

use crate::loader::EntityKind;

/// The page could not be retrieved or never became ready.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("couldn't load {url}: {source}")]
    Navigation {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("couldn't decode {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: io::Error,
    },
    #[error("ready marker `{marker}` never appeared on {url}")]
    MarkerMissing { url: String, marker: String },
    #[error("invalid ready marker `{0}`")]
    InvalidMarker(String),
}

/// The page was retrieved but does not have the expected structure.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unknown schema `{0}`")]
    UnknownSchema(String),
    #[error("schema `{schema}` found no {what} for {entity_id}")]
    MissingStructure {
        schema: String,
        entity_id: String,
        what: String,
    },
    #[error("schema `{schema}` is missing required field `{field}` for {entity_id}")]
    MissingField {
        schema: String,
        entity_id: String,
        field: String,
    },
}

#[derive(Debug, Error)]
pub enum LoadCause {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Failure to load one entity, whatever the stage.
#[derive(Debug, Error)]
#[error("failed to load {kind} {id}: {cause}")]
pub struct LoadError {
    pub kind: EntityKind,
    pub id: String,
    #[source]
    pub cause: LoadCause,
}

impl LoadError {
    pub fn new(kind: EntityKind, id: &str, cause: impl Into<LoadCause>) -> Self {
        Self {
            kind,
            id: id.to_string(),
            cause: cause.into(),
        }
    }
}
