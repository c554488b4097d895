//! Evaluation of `$jsonSchema` collection validators.
//!
//! Covers the keyword subset used by this catalog: `bsonType`, `required`,
//! `properties`, `items`, `additionalProperties`, `enum`, plus the
//! annotation keywords `title` and `description`. Anything else is refused
//! when the validator is attached, the same way the server refuses it.

use mongodb::bson::{Bson, Document};

const KNOWN_TYPES: &[&str] = &[
    "double", "string", "object", "array", "binData", "objectId", "bool", "date", "null",
    "regex", "int", "timestamp", "long", "decimal", "number",
];

const KNOWN_KEYWORDS: &[&str] = &[
    "bsonType",
    "required",
    "properties",
    "items",
    "additionalProperties",
    "enum",
    "title",
    "description",
];

/// Where a document broke the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub reason: String,
}

impl Violation {
    fn new(path: &str, reason: impl Into<String>) -> Self {
        Violation {
            path: if path.is_empty() { "$".to_string() } else { path.to_string() },
            reason: reason.into(),
        }
    }
}

/// Checks that a validator only uses supported keywords and type aliases.
pub fn check_validator(validator: &Document) -> Result<(), String> {
    let schema = json_schema(validator)?;
    check_schema(schema, "")
}

/// Validates `doc` against a validator previously accepted by [`check_validator`].
pub fn validate(validator: &Document, doc: &Document) -> Result<(), Violation> {
    let schema = json_schema(validator).map_err(|reason| Violation::new("", reason))?;
    eval(schema, &Bson::Document(doc.clone()), "")
}

fn json_schema(validator: &Document) -> Result<&Document, String> {
    if validator.len() != 1 {
        return Err("validator must contain exactly one `$jsonSchema` expression".to_string());
    }
    match validator.get("$jsonSchema") {
        Some(Bson::Document(schema)) => Ok(schema),
        Some(_) => Err("`$jsonSchema` must be an object".to_string()),
        None => Err("only `$jsonSchema` validators are supported".to_string()),
    }
}

fn join(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", path, field)
    }
}

fn check_schema(schema: &Document, path: &str) -> Result<(), String> {
    for (key, value) in schema.iter() {
        if !KNOWN_KEYWORDS.contains(&key.as_str()) {
            return Err(format!("unknown $jsonSchema keyword `{}` at {}", key, display(path)));
        }

        match key.as_str() {
            "bsonType" => {
                for alias in type_aliases(value)
                    .ok_or_else(|| format!("`bsonType` at {} must be a string or array of strings", display(path)))?
                {
                    if !KNOWN_TYPES.contains(&alias) {
                        return Err(format!("unknown bsonType `{}` at {}", alias, display(path)));
                    }
                }
            }
            "required" => {
                let ok = matches!(value, Bson::Array(items)
                    if !items.is_empty() && items.iter().all(|f| matches!(f, Bson::String(_))));
                if !ok {
                    return Err(format!(
                        "`required` at {} must be a non-empty array of strings",
                        display(path)
                    ));
                }
            }
            "properties" => {
                let Bson::Document(props) = value else {
                    return Err(format!("`properties` at {} must be an object", display(path)));
                };
                for (field, sub) in props.iter() {
                    let Bson::Document(sub) = sub else {
                        return Err(format!("schema for `{}` must be an object", join(path, field)));
                    };
                    check_schema(sub, &join(path, field))?;
                }
            }
            "items" => {
                let Bson::Document(sub) = value else {
                    return Err(format!("`items` at {} must be an object", display(path)));
                };
                check_schema(sub, &join(path, "[]"))?;
            }
            "additionalProperties" => {
                if !matches!(value, Bson::Boolean(_)) {
                    return Err(format!("`additionalProperties` at {} must be a bool", display(path)));
                }
            }
            "enum" => {
                if !matches!(value, Bson::Array(items) if !items.is_empty()) {
                    return Err(format!("`enum` at {} must be a non-empty array", display(path)));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn eval(schema: &Document, value: &Bson, path: &str) -> Result<(), Violation> {
    if let Some(aliases) = schema.get("bsonType").and_then(type_aliases) {
        if !aliases.iter().any(|alias| type_matches(alias, value)) {
            return Err(Violation::new(
                path,
                format!("expected bsonType {}, found {}", aliases.join(" | "), type_name(value)),
            ));
        }
    }

    if let Some(Bson::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            return Err(Violation::new(path, "value is not one of the enumerated values"));
        }
    }

    if let Bson::Document(doc) = value {
        if let Some(Bson::Array(required)) = schema.get("required") {
            for field in required.iter().filter_map(Bson::as_str) {
                if !doc.contains_key(field) {
                    return Err(Violation::new(&join(path, field), "required field is missing"));
                }
            }
        }

        let props = match schema.get("properties") {
            Some(Bson::Document(props)) => Some(props),
            _ => None,
        };

        if let Some(props) = props {
            for (field, sub) in props.iter() {
                if let (Some(v), Bson::Document(sub)) = (doc.get(field), sub) {
                    eval(sub, v, &join(path, field))?;
                }
            }
        }

        if let Some(Bson::Boolean(false)) = schema.get("additionalProperties") {
            let extra = doc
                .keys()
                .find(|k| k.as_str() != "_id" && !props.is_some_and(|p| p.contains_key(k.as_str())));
            if let Some(field) = extra {
                return Err(Violation::new(&join(path, field), "additional property not allowed"));
            }
        }
    }

    if let (Bson::Array(items), Some(Bson::Document(item_schema))) = (value, schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            eval(item_schema, item, &join(path, &i.to_string()))?;
        }
    }

    Ok(())
}

fn type_aliases(value: &Bson) -> Option<Vec<&str>> {
    match value {
        Bson::String(alias) => Some(vec![alias.as_str()]),
        Bson::Array(items) if !items.is_empty() => items.iter().map(Bson::as_str).collect(),
        _ => None,
    }
}

fn type_matches(alias: &str, value: &Bson) -> bool {
    match (alias, value) {
        ("double", Bson::Double(_))
        | ("string", Bson::String(_))
        | ("object", Bson::Document(_))
        | ("array", Bson::Array(_))
        | ("binData", Bson::Binary(_))
        | ("objectId", Bson::ObjectId(_))
        | ("bool", Bson::Boolean(_))
        | ("date", Bson::DateTime(_))
        | ("null", Bson::Null)
        | ("regex", Bson::RegularExpression(_))
        | ("int", Bson::Int32(_))
        | ("timestamp", Bson::Timestamp(_))
        | ("long", Bson::Int64(_))
        | ("decimal", Bson::Decimal128(_)) => true,
        ("number", Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_)) => true,
        _ => false,
    }
}

fn type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::Boolean(_) => "bool",
        Bson::DateTime(_) => "date",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::Int32(_) => "int",
        Bson::Timestamp(_) => "timestamp",
        Bson::Int64(_) => "long",
        Bson::Decimal128(_) => "decimal",
        _ => "other",
    }
}

fn display(path: &str) -> &str {
    if path.is_empty() { "$" } else { path }
}
