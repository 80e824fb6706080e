//! Validated, regex-aware dispatch of insert, find and update operations

use bson::{Bson, Document as BsonDocument};
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_common::{Result, TesseraError};
use tracing::{debug, warn};

use crate::connection::ConnectionManager;
use crate::normalize::normalize_regex;
use crate::object::DatabaseObject;
use crate::store::{OperationOptions, UpdateOutcome};

/// Operation applied to a [`DatabaseObject`]
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Insert `values` as a new document
    Insert,
    /// Find documents matching `values`
    Find,
    /// Update the first document matching `values`
    UpdateOne(BsonDocument),
}

impl Operation {
    /// Tag used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Find => "find",
            Operation::UpdateOne(_) => "updateOne",
        }
    }
}

/// Raw result of a dispatched operation
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    Inserted(Bson),
    Found(Vec<BsonDocument>),
    Updated(UpdateOutcome),
}

/// Validates, normalizes and runs operations on the shared store handle
pub struct OperationDispatcher {
    connections: Arc<ConnectionManager>,
    aliases: BTreeMap<String, String>,
}

impl OperationDispatcher {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self {
            connections,
            aliases: BTreeMap::new(),
        }
    }

    /// Route logical collection names to physical ones
    pub fn with_aliases(mut self, aliases: BTreeMap<String, String>) -> Self {
        self.aliases = aliases;
        self
    }

    fn physical<'a>(&'a self, collection: &'a str) -> &'a str {
        self.aliases
            .get(collection)
            .map(String::as_str)
            .unwrap_or(collection)
    }

    /// Run `operation` against `object`.
    ///
    /// `object.values` (and the update document) have their regex markers
    /// rewritten in place. A validation failure returns before the store is
    /// touched.
    pub async fn dispatch(
        &self,
        operation: Operation,
        options: &OperationOptions,
        object: &mut DatabaseObject,
    ) -> Result<OperationOutcome> {
        object.validate()?;
        let rewritten = normalize_regex(&mut object.values)?;

        let operation = match operation {
            Operation::UpdateOne(mut update) => {
                normalize_regex(&mut update)?;
                Operation::UpdateOne(with_operators(update))
            }
            other => other,
        };

        let name = operation.name();
        let collection = self.physical(&object.collection).to_string();
        debug!(
            operation = name,
            collection = %collection,
            regex_markers = rewritten,
            "dispatching"
        );

        let values = object.values.clone();
        let result = self
            .connections
            .run(|store| async move {
                match operation {
                    Operation::Insert => store
                        .insert_one(&collection, values, options)
                        .await
                        .map(OperationOutcome::Inserted),
                    Operation::Find => store
                        .find(&collection, values, options)
                        .await
                        .map(OperationOutcome::Found),
                    Operation::UpdateOne(update) => store
                        .update_one(&collection, values, update, options)
                        .await
                        .map(OperationOutcome::Updated),
                }
            })
            .await;

        if let Err(error) = &result {
            warn!(operation = name, collection = %object.collection, %error, "operation failed");
        }
        result
    }

    /// Find primitive shared with the aggregator
    pub async fn find(
        &self,
        options: &OperationOptions,
        object: &mut DatabaseObject,
    ) -> Result<Vec<BsonDocument>> {
        match self.dispatch(Operation::Find, options, object).await? {
            OperationOutcome::Found(documents) => Ok(documents),
            other => Err(unexpected("find", &other)),
        }
    }

    pub async fn insert(
        &self,
        options: &OperationOptions,
        object: &mut DatabaseObject,
    ) -> Result<Bson> {
        match self.dispatch(Operation::Insert, options, object).await? {
            OperationOutcome::Inserted(id) => Ok(id),
            other => Err(unexpected("insert", &other)),
        }
    }

    pub async fn update_one(
        &self,
        update: BsonDocument,
        options: &OperationOptions,
        filter: &mut DatabaseObject,
    ) -> Result<UpdateOutcome> {
        match self
            .dispatch(Operation::UpdateOne(update), options, filter)
            .await?
        {
            OperationOutcome::Updated(outcome) => Ok(outcome),
            other => Err(unexpected("updateOne", &other)),
        }
    }
}

fn unexpected(operation: &str, outcome: &OperationOutcome) -> TesseraError {
    TesseraError::Internal(format!("{} produced {:?}", operation, outcome))
}

/// Wrap a plain replacement-style update in `$set`
fn with_operators(update: BsonDocument) -> BsonDocument {
    if update.keys().any(|k| k.starts_with('$')) {
        update
    } else {
        let mut wrapped = BsonDocument::new();
        wrapped.insert("$set", update);
        wrapped
    }
}
