use std::time::Duration;

use mongodb::error::{Error as MongoError, ErrorKind};

/// Errors raised while bootstrapping the catalog.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("collection `{collection}` already exists")]
    CollectionAlreadyExists { collection: String },

    #[error("validator for `{collection}` rejected: {reason}")]
    ValidationSchemaRejected { collection: String, reason: String },

    #[error("index `{index}` on `{collection}` conflicts with an existing index: {reason}")]
    IndexConflict {
        collection: String,
        index: String,
        reason: String,
    },

    #[error("cannot reach the store: {0}")]
    ConnectionFailure(String),

    #[error("step `{step}` timed out after {after:?}")]
    Timeout { step: String, after: Duration },

    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("store error: {0}")]
    Store(String),
}

/// Writes rejected by the store's constraints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    #[error("document failed validation at `{path}`: {reason}")]
    DocumentValidation { path: String, reason: String },

    #[error("E11000 duplicate key error collection: {collection} index: {index}")]
    DuplicateKey { collection: String, index: String },
}

// server error codes used below
const BAD_VALUE: i32 = 2;
const FAILED_TO_PARSE: i32 = 9;
const NAMESPACE_EXISTS: i32 = 48;
const INDEX_OPTIONS_CONFLICT: i32 = 85;
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;

/// What the failing driver call was doing, so server codes can be mapped.
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    Connect,
    CreateCollection(&'a str),
    CreateIndex { collection: &'a str, index: &'a str },
    Catalog,
}

impl BootstrapError {
    pub fn from_mongo(err: MongoError, op: Operation<'_>) -> Self {
        let msg = err.to_string();

        match err.kind.as_ref() {
            ErrorKind::Io(_)
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::ServerSelection { .. }
            | ErrorKind::ConnectionPoolCleared { .. }
            | ErrorKind::Authentication { .. } => return BootstrapError::ConnectionFailure(msg),
            ErrorKind::Command(cmd) => match (cmd.code, op) {
                (NAMESPACE_EXISTS, Operation::CreateCollection(name)) => {
                    return BootstrapError::CollectionAlreadyExists {
                        collection: name.to_string(),
                    };
                }
                (BAD_VALUE | FAILED_TO_PARSE, Operation::CreateCollection(name)) => {
                    return BootstrapError::ValidationSchemaRejected {
                        collection: name.to_string(),
                        reason: cmd.message.clone(),
                    };
                }
                (
                    INDEX_OPTIONS_CONFLICT | INDEX_KEY_SPECS_CONFLICT,
                    Operation::CreateIndex { collection, index },
                ) => {
                    return BootstrapError::IndexConflict {
                        collection: collection.to_string(),
                        index: index.to_string(),
                        reason: cmd.message.clone(),
                    };
                }
                _ => {}
            },
            _ => {}
        }

        match op {
            Operation::Connect => BootstrapError::ConnectionFailure(msg),
            _ => BootstrapError::Store(msg),
        }
    }
}
