//! Conversion between AMF values and JSON.
//!
//! Kinds JSON has no native form for are written as single-key objects:
//! `{"$date": millis}`, `{"$bytes": "hex"}`, `{"$xml": "..."}`,
//! `{"$vector": {"kind": "int", "fixed": false, "items": [...]}}` and
//! `{"$dictionary": {"weak_keys": false, "entries": [[key, value], ...]}}`.
//! Object vectors carry their element class in `type_name`. Arrays with named
//! entries become `{"$array": [...], "name": value, ...}`. Class names travel
//! in a `$class` member. Doubles JSON cannot hold are written as strings.

use amf::{AmfObject, Array, AsObject, Dictionary, Value, Vector, VectorItems};
use anyhow::{Context, Result};
use serde_json::{Map, Number, json};

use crate::cli::OutputFormat;

const CLASS_KEY: &str = "$class";

pub fn format_values(values: &[Value], format: OutputFormat, pretty: bool) -> Result<String> {
    match format {
        OutputFormat::Debug => Ok(values
            .iter()
            .map(|v| format!("{v:#?}"))
            .collect::<Vec<_>>()
            .join("\n")),
        OutputFormat::JsonCompact => {
            let lines = values
                .iter()
                .map(|v| serde_json::to_string(&to_json(v)))
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to serialize JSON")?;
            Ok(lines.join("\n"))
        }
        OutputFormat::Json => {
            let document = match values {
                [single] => to_json(single),
                _ => serde_json::Value::Array(values.iter().map(to_json).collect()),
            };
            let text = if pretty {
                serde_json::to_string_pretty(&document)
            } else {
                serde_json::to_string(&document)
            };
            text.context("Failed to serialize JSON")
        }
    }
}

fn number(value: f64) -> serde_json::Value {
    Number::from_f64(value)
        .map(serde_json::Value::Number)
        .unwrap_or_else(|| json!(value.to_string()))
}

/// Read a double written by [`number`].
fn double(json: &serde_json::Value) -> Option<f64> {
    json.as_f64().or_else(|| json.as_str()?.parse().ok())
}

fn members_to_json<'a>(
    class_name: &str,
    members: impl Iterator<Item = (&'a str, Value)>,
) -> Map<String, serde_json::Value> {
    let mut map = Map::new();
    if !class_name.is_empty() {
        map.insert(CLASS_KEY.to_owned(), json!(class_name));
    }
    for (key, value) in members {
        map.insert(key.to_owned(), to_json(&value));
    }
    map
}

fn object_to_json(object: &AmfObject) -> serde_json::Value {
    match object {
        AmfObject::Dynamic(bag) => serde_json::Value::Object(members_to_json(
            &bag.class_name,
            bag.members.iter().map(|(k, v)| (k.as_str(), v.clone())),
        )),
        AmfObject::Typed(instance) => {
            let info = instance.class_info();
            if info.externalizable {
                let mut map = members_to_json(&info.name, std::iter::empty());
                map.insert("$external".to_owned(), json!(format!("{instance:?}")));
                return serde_json::Value::Object(map);
            }

            let sealed = info
                .members
                .iter()
                .filter_map(|m| Some((m.as_str(), instance.get_member(m)?)));
            let mut map = members_to_json(&info.name, sealed);
            for (key, value) in instance.dynamic_members().unwrap_or_default() {
                map.insert(key, to_json(&value));
            }
            serde_json::Value::Object(map)
        }
    }
}

/// Render a value as JSON. Shared instances are written out at every use.
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Undefined | Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => json!(b),
        Value::Integer(i) => json!(i),
        Value::Double(d) => number(*d),
        Value::String(s) => json!(s),
        Value::Date(date) => json!({ "$date": number(date.millis) }),
        Value::Array(array) if array.assoc.is_empty() => {
            serde_json::Value::Array(array.dense.iter().map(to_json).collect())
        }
        Value::Array(array) => {
            let mut map = Map::new();
            map.insert(
                "$array".to_owned(),
                serde_json::Value::Array(array.dense.iter().map(to_json).collect()),
            );
            for (key, value) in &array.assoc {
                map.insert(key.clone(), to_json(value));
            }
            serde_json::Value::Object(map)
        }
        Value::Object(object) => object_to_json(object),
        Value::ByteArray(bytes) => json!({ "$bytes": hex::encode(bytes.as_ref()) }),
        Value::Vector(vector) => {
            let mut body = Map::new();
            let (kind, items): (_, Vec<serde_json::Value>) = match &vector.items {
                VectorItems::Int(items) => ("int", items.iter().map(|i| json!(i)).collect()),
                VectorItems::UInt(items) => ("uint", items.iter().map(|i| json!(i)).collect()),
                VectorItems::Double(items) => {
                    ("double", items.iter().map(|d| number(*d)).collect())
                }
                VectorItems::Object { type_name, items } => {
                    body.insert("type_name".to_owned(), json!(type_name));
                    ("object", items.iter().map(to_json).collect())
                }
            };
            body.insert("kind".to_owned(), json!(kind));
            body.insert("fixed".to_owned(), json!(vector.fixed));
            body.insert("items".to_owned(), serde_json::Value::Array(items));
            json!({ "$vector": body })
        }
        Value::Dictionary(dictionary) => {
            let entries: Vec<serde_json::Value> = dictionary
                .entries
                .iter()
                .map(|(k, v)| json!([to_json(k), to_json(v)]))
                .collect();
            json!({
                "$dictionary": { "weak_keys": dictionary.weak_keys, "entries": entries }
            })
        }
        Value::Xml(xml) => json!({ "$xml": xml.source }),
    }
}

/// Build a value from JSON, the inverse of [`to_json`] for the kinds it marks.
pub fn from_json(json: &serde_json::Value) -> Result<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => match n.as_i64().map(i32::try_from) {
            Some(Ok(i)) => Value::Integer(i),
            _ => Value::Double(n.as_f64().context("Number out of range")?),
        },
        serde_json::Value::String(s) => Value::from(s.as_str()),
        serde_json::Value::Array(items) => {
            Value::array(items.iter().map(from_json).collect::<Result<_>>()?)
        }
        serde_json::Value::Object(map) => object_from_json(map)?,
    })
}

fn object_from_json(map: &Map<String, serde_json::Value>) -> Result<Value> {
    if map.len() == 1 {
        if let Some(millis) = map.get("$date") {
            return Ok(Value::date(double(millis).context("$date must be a number")?));
        }
        if let Some(bytes) = map.get("$bytes") {
            let text = bytes.as_str().context("$bytes must be a hex string")?;
            return Ok(Value::byte_array(hex::decode(text).context("Invalid $bytes")?));
        }
        if let Some(source) = map.get("$xml") {
            return Ok(Value::xml(source.as_str().context("$xml must be a string")?));
        }
        if let Some(vector) = map.get("$vector") {
            return vector_from_json(vector);
        }
        if let Some(dictionary) = map.get("$dictionary") {
            return dictionary_from_json(dictionary);
        }
    }

    if let Some(dense) = map.get("$array") {
        let dense = match from_json(dense)? {
            Value::Array(array) => array.dense.clone(),
            _ => anyhow::bail!("$array must be a JSON array"),
        };
        let assoc = map
            .iter()
            .filter(|(k, _)| k.as_str() != "$array")
            .map(|(k, v)| Ok::<_, anyhow::Error>((k.clone(), from_json(v)?)))
            .collect::<Result<_>>()?;
        return Ok(Value::from(Array { dense, assoc }));
    }

    let class_name = match map.get(CLASS_KEY) {
        Some(name) => name.as_str().context("$class must be a string")?,
        None => "",
    };
    let mut bag = AsObject::named(class_name);
    for (key, value) in map.iter().filter(|(k, _)| k.as_str() != CLASS_KEY) {
        bag.insert(key.as_str(), from_json(value)?);
    }
    Ok(Value::from(bag))
}

fn vector_from_json(json: &serde_json::Value) -> Result<Value> {
    let kind = json["kind"].as_str().context("$vector needs a kind")?;
    let fixed = json["fixed"].as_bool().unwrap_or(false);
    let items = json["items"]
        .as_array()
        .context("$vector needs an items array")?;

    let items = match kind {
        "int" => VectorItems::Int(
            items
                .iter()
                .map(|i| {
                    i.as_i64()
                        .and_then(|i| i32::try_from(i).ok())
                        .context("int vector item out of range")
                })
                .collect::<Result<_>>()?,
        ),
        "uint" => VectorItems::UInt(
            items
                .iter()
                .map(|u| {
                    u.as_u64()
                        .and_then(|u| u32::try_from(u).ok())
                        .context("uint vector item out of range")
                })
                .collect::<Result<_>>()?,
        ),
        "double" => VectorItems::Double(
            items
                .iter()
                .map(|d| double(d).context("double vector item is not a number"))
                .collect::<Result<_>>()?,
        ),
        "object" => VectorItems::Object {
            type_name: json["type_name"].as_str().unwrap_or_default().to_owned(),
            items: items.iter().map(from_json).collect::<Result<_>>()?,
        },
        other => anyhow::bail!("Unknown $vector kind {other:?}"),
    };

    Ok(Value::vector(Vector { fixed, items }))
}

fn dictionary_from_json(json: &serde_json::Value) -> Result<Value> {
    let weak_keys = json["weak_keys"].as_bool().unwrap_or(false);
    let entries = json["entries"]
        .as_array()
        .context("$dictionary needs an entries array")?
        .iter()
        .map(|entry| match entry.as_array().map(Vec::as_slice) {
            Some([key, value]) => Ok((from_json(key)?, from_json(value)?)),
            _ => anyhow::bail!("$dictionary entries must be [key, value] pairs"),
        })
        .collect::<Result<_>>()?;

    Ok(Value::dictionary(Dictionary { weak_keys, entries }))
}
