//! Decoding of the per-model legacy part documents.
//!
//! Two shapes occur in stored data:
//!
//! ```text
//! {"Upper Assembly": {"type": "required", "sub_parts": {"Barrel": "required"}}}
//! {"Magazines and Feeding Devices": {"Drum Magazine": "optional"}}
//! ```
//!
//! In the first, children live under `sub_parts`; in the second they are the
//! node's own keys. This module is the only place that touches untyped JSON;
//! everything downstream works on [`LegacyNode`].

use serde_json::{Map, Value};

use crate::error::{CatalogError, Result};

const TYPE_KEY: &str = "type";
const SUB_PARTS_KEY: &str = "sub_parts";
const ID_KEY: &str = "id";
const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyNode {
    pub name: String,
    pub children: Vec<LegacyNode>,
}

impl LegacyNode {
    /// Depth-first, parents before children.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a LegacyNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

/// Decodes a stored document. Blank text and `null` decode to no nodes; any
/// top level other than an object is a parse error.
pub fn decode_document(raw: &str) -> Result<Vec<LegacyNode>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|err| CatalogError::Parse(err.to_string()))?;
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => decode_entries(&map, 0),
        other => Err(CatalogError::Parse(format!(
            "expected an object at the top level, found {}",
            kind(&other)
        ))),
    }
}

pub fn decode_optional_document(raw: Option<&str>) -> Result<Vec<LegacyNode>> {
    match raw {
        Some(raw) => decode_document(raw),
        None => Ok(Vec::new()),
    }
}

fn decode_entries(map: &Map<String, Value>, depth: usize) -> Result<Vec<LegacyNode>> {
    if depth > MAX_DEPTH {
        return Err(CatalogError::Parse(format!(
            "document nests deeper than {MAX_DEPTH} levels"
        )));
    }

    let mut nodes = Vec::new();
    for (name, value) in map {
        if let Some(node) = decode_entry(name, value, depth)? {
            nodes.push(node);
        }
    }
    Ok(nodes)
}

fn decode_entry(name: &str, value: &Value, depth: usize) -> Result<Option<LegacyNode>> {
    let node = match value {
        // The string is a required/optional marker; membership in the
        // document decides the flag.
        Value::String(_) => LegacyNode {
            name: name.to_string(),
            children: Vec::new(),
        },
        Value::Object(fields) => {
            let children = match fields.get(SUB_PARTS_KEY) {
                Some(Value::Object(sub_parts)) => decode_entries(sub_parts, depth + 1)?,
                Some(_) => Vec::new(),
                None => {
                    let inline: Map<String, Value> = fields
                        .iter()
                        .filter(|(key, _)| !matches!(key.as_str(), TYPE_KEY | ID_KEY))
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect();
                    decode_entries(&inline, depth + 1)?
                }
            };

            LegacyNode {
                name: name.to_string(),
                children,
            }
        }
        // Numbers, booleans and arrays are annotations, not categories.
        _ => return Ok(None),
    };
    Ok(Some(node))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
