//! The generic `{ collection, values }` payload every operation works on

use bson::{Bson, Document as BsonDocument};
use serde::{Deserialize, Serialize};
use tessera_common::{Result, TesseraError};
use tessera_validation::{schemas, validate, Value};
use tracing::warn;

/// A target collection plus the document (or filter) to apply there
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseObject {
    pub collection: String,
    #[serde(default)]
    pub values: BsonDocument,
}

impl DatabaseObject {
    pub fn new(collection: impl Into<String>, values: BsonDocument) -> Self {
        Self {
            collection: collection.into(),
            values,
        }
    }

    /// Build from JSON after checking it against the database object schema
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        report(Value::from(json))?;
        let document = match bson::to_bson(json)? {
            Bson::Document(document) => document,
            other => {
                return Err(TesseraError::Validation(format!(
                    "database object must be an object, got {:?}",
                    other.element_type()
                )))
            }
        };
        Self::from_document(document)
    }

    /// Build from a BSON document after checking it against the schema
    pub fn from_document(document: BsonDocument) -> Result<Self> {
        report(Value::from(&document))?;
        Ok(bson::from_document(document)?)
    }

    /// Check against the database object schema
    pub fn validate(&self) -> Result<()> {
        // Any document is a valid `values`
        report(Value::Object(vec![(
            "collection".to_string(),
            Value::String(self.collection.clone()),
        )]))
    }
}

fn report(value: Value) -> Result<()> {
    validate(&value, schemas::database_object()).map_err(|errors| {
        for message in errors.messages() {
            warn!(%message, "database object rejected");
        }
        TesseraError::Validation(errors.messages().join("; "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde_json::json;

    #[test]
    fn test_from_json() {
        let object = DatabaseObject::from_json(&json!({
            "collection": "users",
            "values": { "name": { "$regex": ["^jo", "i"] }, "age": 30 }
        }))
        .unwrap();
        assert_eq!(object.collection, "users");
        assert_eq!(
            object.values.get("name"),
            Some(&Bson::Document(doc! { "$regex": ["^jo", "i"] }))
        );
        assert!(matches!(
            object.values.get("age"),
            Some(Bson::Int32(30)) | Some(Bson::Int64(30))
        ));
    }

    #[test]
    fn test_values_default_to_empty() {
        let object = DatabaseObject::from_json(&json!({ "collection": "users" })).unwrap();
        assert!(object.values.is_empty());
    }

    #[test]
    fn test_from_json_rejects_bad_shapes() {
        for bad in [
            json!({ "values": {} }),
            json!({ "collection": "" }),
            json!({ "collection": "system.users" }),
            json!({ "collection": "users", "values": [1, 2] }),
            json!(["users"]),
        ] {
            let err = DatabaseObject::from_json(&bad).unwrap_err();
            assert!(matches!(err, TesseraError::Validation(_)), "{}", bad);
        }
    }

    #[test]
    fn test_from_document() {
        let object =
            DatabaseObject::from_document(doc! { "collection": "orders", "values": { "n": 1 } })
                .unwrap();
        assert_eq!(object, DatabaseObject::new("orders", doc! { "n": 1 }));

        let err = DatabaseObject::from_document(doc! { "collection": 5 }).unwrap_err();
        assert!(matches!(err, TesseraError::Validation(_)));
    }

    #[test]
    fn test_validate_accepts_binary_values() {
        let data = Bson::Binary(bson::Binary {
            subtype: bson::spec::BinarySubtype::Generic,
            bytes: vec![0u8; 4096],
        });
        let object = DatabaseObject::new("blobs", doc! { "data": data });
        assert!(object.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(DatabaseObject::new("orders", doc! {}).validate().is_ok());

        let err = DatabaseObject::new("bad$name", doc! {}).validate().unwrap_err();
        match err {
            TesseraError::Validation(message) => assert!(message.contains("collection")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
