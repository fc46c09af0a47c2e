use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::reply::Reply;

/// Result shape requested by the caller. Replaces the runtime class token
/// of reflective client APIs with an explicit enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnKind {
    Text,
    Integer,
    Void,
    List,
    Map,
}

/// Verb-keyed response reshaping applied before projection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transform {
    None,
    /// Alternating field/value array becomes an object (HGETALL).
    ArrayToObject,
    /// Sectioned bulk text becomes a two-level object (INFO).
    Info,
}

impl Transform {
    /// Case-insensitive: wrappers commonly send lower-case verbs.
    pub fn for_verb(verb: &str) -> Transform {
        match verb.to_ascii_uppercase().as_str() {
            "HGETALL" => Transform::ArrayToObject,
            "INFO" => Transform::Info,
            _ => Transform::None,
        }
    }
}

/// Shape a raw reply into the caller's requested return kind. Server error
/// replies surface here as `Error::Server`, touching only this command.
pub fn project(reply: Reply, kind: ReturnKind, transform: Transform) -> Result<Value> {
    let reply = match reply {
        Reply::Error(message) => return Err(Error::Server(message)),
        other => other,
    };

    match transform {
        Transform::Info => {
            if let Reply::Bulk(data) = reply {
                return Ok(match data {
                    Some(text) => info_to_map(&String::from_utf8_lossy(&text)),
                    None => Value::Null,
                });
            }
            Err(incompatible("info text", &reply))
        }
        Transform::ArrayToObject => {
            if let Reply::Array(items) = reply {
                return pairs_to_object(items);
            }
            Err(incompatible("map", &reply))
        }
        Transform::None => match kind {
            ReturnKind::Void => Ok(Value::Null),
            ReturnKind::Text => match reply {
                Reply::Simple(s) => Ok(Value::String(s)),
                Reply::Bulk(Some(data)) => {
                    Ok(Value::String(String::from_utf8_lossy(&data).into_owned()))
                }
                Reply::Bulk(None) => Ok(Value::Null),
                Reply::Integer(i) => Ok(Value::String(i.to_string())),
                other => Err(incompatible("text", &other)),
            },
            ReturnKind::Integer => match reply {
                Reply::Integer(i) => Ok(Value::from(i)),
                Reply::Simple(ref s) => s
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| incompatible("integer", &reply)),
                Reply::Bulk(Some(ref data)) => String::from_utf8_lossy(data)
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| incompatible("integer", &reply)),
                other => Err(incompatible("integer", &other)),
            },
            ReturnKind::List => match reply {
                Reply::Array(Some(items)) => {
                    Ok(Value::Array(items.into_iter().map(value_of).collect()))
                }
                Reply::Array(None) => Ok(Value::Null),
                other => Err(incompatible("list", &other)),
            },
            ReturnKind::Map => match reply {
                Reply::Array(items) => pairs_to_object(items),
                other => Err(incompatible("map", &other)),
            },
        },
    }
}

// Element projection used inside lists and map values: scalars follow the
// text projection (integers render base-10), nulls stay null, nested
// arrays recurse.
fn value_of(reply: Reply) -> Value {
    match reply {
        Reply::Simple(s) | Reply::Error(s) => Value::String(s),
        Reply::Integer(i) => Value::String(i.to_string()),
        Reply::Bulk(Some(data)) => Value::String(String::from_utf8_lossy(&data).into_owned()),
        Reply::Bulk(None) | Reply::Array(None) => Value::Null,
        Reply::Array(Some(items)) => Value::Array(items.into_iter().map(value_of).collect()),
    }
}

fn pairs_to_object(items: Option<Vec<Reply>>) -> Result<Value> {
    let Some(items) = items else {
        return Ok(Value::Null);
    };
    if items.len() % 2 != 0 {
        return Err(Error::Projection(format!(
            "array of {} elements cannot form a map",
            items.len()
        )));
    }

    let mut object = Map::with_capacity(items.len() / 2);
    let mut items = items.into_iter();
    while let (Some(field), Some(value)) = (items.next(), items.next()) {
        let field = field
            .as_text()
            .ok_or_else(|| incompatible("map field", &field))?;
        object.insert(field, value_of(value));
    }
    Ok(Value::Object(object))
}

/// Parse an INFO text block into `{section → {key → value}}`. A `#` line
/// opens a section, a blank line closes it, and key/value lines outside
/// any section land at the top level. Lines without a `:` are skipped.
fn info_to_map(text: &str) -> Value {
    let mut top = Map::new();
    let mut section: Option<String> = None;

    for line in text.lines() {
        if line.is_empty() {
            section = None;
            continue;
        }
        if let Some(rest) = line.strip_prefix('#') {
            let name = rest.trim().to_lowercase();
            top.insert(name.clone(), Value::Object(Map::new()));
            section = Some(name);
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let entry = Value::String(value.to_string());
        match section.as_ref().and_then(|name| top.get_mut(name)) {
            Some(Value::Object(fields)) => {
                fields.insert(key.to_string(), entry);
            }
            _ => {
                top.insert(key.to_string(), entry);
            }
        }
    }

    Value::Object(top)
}

fn incompatible(expected: &str, reply: &Reply) -> Error {
    Error::Projection(format!("{:?} is not {}", reply, expected))
}
