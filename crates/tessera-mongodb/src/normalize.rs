//! Rewrites `{ "$regex": [pattern, flags] }` markers into BSON regular expressions

use bson::{Bson, Document as BsonDocument, Regex};
use tessera_common::{Result, TesseraError};

const MARKER: &str = "$regex";

/// Flags MongoDB accepts on a regular expression
const KNOWN_FLAGS: &str = "ilmsux";

/// Replace every array-form `$regex` marker in `document`, at any depth.
///
/// Returns the number of markers rewritten. A `$regex` whose value is not an
/// array is left alone (it is already in the store's native form). Every
/// marker is checked before any is rewritten, so on error `document` is
/// untouched.
pub fn normalize_regex(document: &mut BsonDocument) -> Result<usize> {
    for (_, value) in document.iter() {
        check_value(value)?;
    }
    Ok(rewrite_document(document))
}

fn check_value(value: &Bson) -> Result<()> {
    match value {
        Bson::Document(inner) => {
            if marker(inner)?.is_none() {
                for (_, value) in inner.iter() {
                    check_value(value)?;
                }
            }
            Ok(())
        }
        Bson::Array(items) => items.iter().try_for_each(check_value),
        _ => Ok(()),
    }
}

fn rewrite_document(document: &mut BsonDocument) -> usize {
    document.iter_mut().map(|(_, value)| rewrite_value(value)).sum()
}

fn rewrite_value(value: &mut Bson) -> usize {
    match value {
        Bson::Document(inner) => match marker(inner) {
            Ok(Some(regex)) => {
                *value = Bson::RegularExpression(regex);
                1
            }
            // Already checked
            _ => rewrite_document(inner),
        },
        Bson::Array(items) => items.iter_mut().map(rewrite_value).sum(),
        _ => 0,
    }
}

fn marker(document: &BsonDocument) -> Result<Option<Regex>> {
    let Some(Bson::Array(parts)) = document.get(MARKER) else {
        return Ok(None);
    };
    if document.len() != 1 {
        return Err(TesseraError::Validation(format!(
            "{} marker must be the only key of its object",
            MARKER
        )));
    }

    let (pattern, flags) = match parts.as_slice() {
        [Bson::String(pattern)] => (pattern.as_str(), ""),
        [Bson::String(pattern), Bson::String(flags)] => (pattern.as_str(), flags.as_str()),
        _ => {
            return Err(TesseraError::Validation(format!(
                "{} marker must be [pattern] or [pattern, flags] strings",
                MARKER
            )))
        }
    };

    if let Some(flag) = flags.chars().find(|c| !KNOWN_FLAGS.contains(*c)) {
        return Err(TesseraError::Validation(format!(
            "unknown regular expression flag '{}'",
            flag
        )));
    }

    // BSON requires regex options in alphabetical order
    let mut options: Vec<char> = flags.chars().collect();
    options.sort_unstable();
    options.dedup();

    Ok(Some(Regex {
        pattern: pattern.to_string(),
        options: options.into_iter().collect(),
    }))
}
