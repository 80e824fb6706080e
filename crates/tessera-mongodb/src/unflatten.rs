//! Dotted-key metadata to nested documents

use bson::{Bson, Document as BsonDocument};
use thiserror::Error;
use tracing::{debug, warn};

/// Why a document could not be unflattened
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnflattenError {
    #[error("key '{0}' has an empty path segment")]
    EmptySegment(String),

    #[error("key '{0}' collides with a non-document value")]
    Conflict(String),
}

/// Nest every dotted key of `document`.
///
/// `{"a.b": 1, "a.c": 2}` becomes `{"a": {"b": 1, "c": 2}}`. Input that
/// cannot be interpreted is returned unchanged and logged.
pub fn unflatten(document: &BsonDocument) -> BsonDocument {
    match try_unflatten(document) {
        Ok(nested) => nested,
        Err(error) => {
            warn!(%error, "metadata kept flat");
            document.clone()
        }
    }
}

/// [`unflatten`] for any value; non-documents pass through
pub fn unflatten_value(value: &Bson) -> Bson {
    match value {
        Bson::Document(document) => Bson::Document(unflatten(document)),
        other => {
            debug!(element_type = ?other.element_type(), "nothing to unflatten");
            other.clone()
        }
    }
}

pub fn try_unflatten(document: &BsonDocument) -> Result<BsonDocument, UnflattenError> {
    let mut nested = BsonDocument::new();
    for (key, value) in document {
        let value = match value {
            Bson::Document(inner) => Bson::Document(try_unflatten(inner)?),
            other => other.clone(),
        };
        let path: Vec<&str> = key.split('.').collect();
        if path.iter().any(|segment| segment.is_empty()) {
            return Err(UnflattenError::EmptySegment(key.clone()));
        }
        insert_path(&mut nested, &path, value, key)?;
    }
    Ok(nested)
}

fn insert_path(
    target: &mut BsonDocument,
    path: &[&str],
    value: Bson,
    key: &str,
) -> Result<(), UnflattenError> {
    let Some((head, rest)) = path.split_first() else {
        return Ok(());
    };

    if !target.contains_key(*head) {
        let value = if rest.is_empty() {
            value
        } else {
            let mut child = BsonDocument::new();
            insert_path(&mut child, rest, value, key)?;
            Bson::Document(child)
        };
        target.insert(*head, value);
        return Ok(());
    }

    match (target.get_mut(*head), rest.is_empty(), value) {
        (Some(Bson::Document(existing)), true, Bson::Document(incoming)) => {
            for (child_key, child_value) in incoming {
                insert_path(existing, &[child_key.as_str()], child_value, key)?;
            }
            Ok(())
        }
        (Some(Bson::Document(existing)), false, value) => insert_path(existing, rest, value, key),
        _ => Err(UnflattenError::Conflict(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_nested_paths() {
        let flat = doc! { "a.b.c": 1, "x": { "y.z": 2 } };
        assert_eq!(
            unflatten(&flat),
            doc! { "a": { "b": { "c": 1 } }, "x": { "y": { "z": 2 } } }
        );
    }

    #[test]
    fn test_siblings_merge() {
        let flat = doc! { "author.name": "Ada", "author.year": 1843, "title": "Notes" };
        assert_eq!(
            unflatten(&flat),
            doc! { "author": { "name": "Ada", "year": 1843 }, "title": "Notes" }
        );
    }

    #[test]
    fn test_nested_and_dotted_merge() {
        let flat = doc! { "a": { "x": 1 }, "a.y": 2 };
        assert_eq!(unflatten(&flat), doc! { "a": { "x": 1, "y": 2 } });

        let flat = doc! { "a.y": 2, "a": { "x": 1 } };
        assert_eq!(unflatten(&flat), doc! { "a": { "y": 2, "x": 1 } });
    }

    #[test]
    fn test_already_nested_unchanged() {
        let nested = doc! { "a": { "b": { "c": [1, 2] } }, "d": "e" };
        assert_eq!(unflatten(&nested), nested);
        assert_eq!(unflatten(&unflatten(&doc! { "p.q": 1 })), doc! { "p": { "q": 1 } });
    }

    #[test]
    fn test_malformed_returned_unchanged() {
        for flat in [
            doc! { "a..b": 1 },
            doc! { ".a": 1 },
            doc! { "a.": 1 },
            doc! { "a": 1, "a.b": 2 },
            doc! { "a.b": 2, "a": 1 },
        ] {
            assert!(try_unflatten(&flat).is_err(), "{}", flat);
            assert_eq!(unflatten(&flat), flat);
        }
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            try_unflatten(&doc! { "a..b": 1 }).unwrap_err(),
            UnflattenError::EmptySegment("a..b".to_string())
        );
        assert_eq!(
            try_unflatten(&doc! { "a": 1, "a.b": 2 }).unwrap_err(),
            UnflattenError::Conflict("a.b".to_string())
        );
    }

    #[test]
    fn test_non_document_values() {
        assert_eq!(unflatten_value(&Bson::Int32(5)), Bson::Int32(5));
        assert_eq!(
            unflatten_value(&Bson::Document(doc! { "k.v": true })),
            Bson::Document(doc! { "k": { "v": true } })
        );
    }

    #[test]
    fn test_arrays_are_leaves() {
        let flat = doc! { "list.items": [ { "x.y": 1 } ] };
        assert_eq!(unflatten(&flat), doc! { "list": { "items": [ { "x.y": 1 } ] } });
    }
}
