//! Table field bindings
//!
//! Each binding ties a JSON query key to one field of [`MsgLogTblData`].
//! Loading walks the bindings against the flattened key/value pairs of the
//! parsed table file and writes every value that converts cleanly into the
//! staging record. A value of the wrong type or size is a miss for that field
//! only; the caller decides whether the resulting count is acceptable.

use crate::table::MsgLogTblData;
use crate::{MsgLogError, Result, FILE_EXT_MAX_LEN, OS_MAX_PATH_LEN};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Expected JSON type of a bound value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Unsigned integer that must fit in a `u16`
    Number,
    /// String no longer than `max_len` bytes
    Text { max_len: usize },
}

/// Table field a binding writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTag {
    PathBaseName,
    Extension,
    EntryCnt,
    PlaybkDelay,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldBinding {
    pub tag: FieldTag,
    pub key: &'static str,
    pub kind: FieldKind,
}

/// Bindings for the Message Log table
pub const MSGLOG_TBL_FIELDS: &[FieldBinding] = &[
    FieldBinding {
        tag: FieldTag::PathBaseName,
        key: "file.path-base-name",
        kind: FieldKind::Text {
            max_len: OS_MAX_PATH_LEN,
        },
    },
    FieldBinding {
        tag: FieldTag::Extension,
        key: "file.extension",
        kind: FieldKind::Text {
            max_len: FILE_EXT_MAX_LEN,
        },
    },
    FieldBinding {
        tag: FieldTag::EntryCnt,
        key: "file.entry-cnt",
        kind: FieldKind::Number,
    },
    FieldBinding {
        tag: FieldTag::PlaybkDelay,
        key: "playbk-delay",
        kind: FieldKind::Number,
    },
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FieldError {
    #[error("expected {expected}, found {found}")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
    #[error("value {0} does not fit in 16 bits")]
    OutOfRange(u64),
    #[error("string is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error("binding for {tag:?} declared as {kind:?}")]
    KindMismatch { tag: FieldTag, kind: FieldKind },
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn number(raw: &Value) -> std::result::Result<u16, FieldError> {
    let n = raw.as_u64().ok_or(FieldError::WrongType {
        expected: "unsigned integer",
        found: json_type_name(raw),
    })?;
    u16::try_from(n).map_err(|_| FieldError::OutOfRange(n))
}

fn text(raw: &Value, max_len: usize) -> std::result::Result<String, FieldError> {
    let s = raw.as_str().ok_or(FieldError::WrongType {
        expected: "string",
        found: json_type_name(raw),
    })?;
    // Buffer sizes count the terminator, so the longest value is one less
    if s.len() >= max_len {
        return Err(FieldError::TooLong {
            len: s.len(),
            max: max_len.saturating_sub(1),
        });
    }
    Ok(s.to_string())
}

impl FieldBinding {
    /// Convert `raw` and store it in `data`. `data` is untouched on error.
    pub fn apply(
        &self,
        data: &mut MsgLogTblData,
        raw: &Value,
    ) -> std::result::Result<(), FieldError> {
        match (self.tag, self.kind) {
            (FieldTag::PathBaseName, FieldKind::Text { max_len }) => {
                data.file.path_base_name = text(raw, max_len)?;
            }
            (FieldTag::Extension, FieldKind::Text { max_len }) => {
                data.file.extension = text(raw, max_len)?;
            }
            (FieldTag::EntryCnt, FieldKind::Number) => data.file.entry_cnt = number(raw)?,
            (FieldTag::PlaybkDelay, FieldKind::Number) => data.playbk_delay = number(raw)?,
            (tag, kind) => return Err(FieldError::KindMismatch { tag, kind }),
        }
        Ok(())
    }
}

/// Parse table text into dotted key/value pairs.
///
/// Nested objects are flattened (`{"file": {"extension": ".txt"}}` becomes
/// `("file.extension", ".txt")`). Pairs keep object iteration order, so when
/// two entries flatten to the same key the earlier one is found first.
pub fn parse(text: &str) -> Result<Vec<(String, Value)>> {
    let root: Value = serde_json::from_str(text)?;
    let Value::Object(map) = root else {
        let err = <serde_json::Error as serde::de::Error>::custom("table root must be a JSON object");
        return Err(MsgLogError::Json(err));
    };

    let mut pairs = Vec::new();
    flatten("", &map, &mut pairs);
    Ok(pairs)
}

fn flatten(prefix: &str, map: &Map<String, Value>, out: &mut Vec<(String, Value)>) {
    for (key, value) in map {
        let full = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) => flatten(&full, inner, out),
            other => out.push((full, other.clone())),
        }
    }
}

/// Apply every binding found in `pairs` to `data`; returns how many fields
/// were populated. The first pair matching a binding's key is used.
pub fn load_fields(
    bindings: &[FieldBinding],
    pairs: &[(String, Value)],
    data: &mut MsgLogTblData,
) -> usize {
    let mut populated = 0;

    for binding in bindings {
        let Some((_, raw)) = pairs.iter().find(|(key, _)| key == binding.key) else {
            debug!(key = binding.key, "Table key not present");
            continue;
        };

        match binding.apply(data, raw) {
            Ok(()) => populated += 1,
            Err(e) => warn!(key = binding.key, "Rejected table value: {}", e),
        }
    }

    populated
}
