//! Field-level access to decoded objects.
//!
//! Objects are decoded into a [`serde_json::Value`] whose maps keep the type tree's field order,
//! so a tree can be modified and encoded again with the same type tree. The helpers here replace
//! "does this attribute exist" probing with explicit lookups that report what is missing.

use serde_json::{Map, Value};

#[derive(Debug, PartialEq)]
pub enum FieldError {
    Missing(String),
    WrongType {
        path: String,
        expected: &'static str,
    },
}
impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldError::Missing(path) => write!(f, "field `{path}` is missing"),
            FieldError::WrongType { path, expected } => {
                write!(f, "field `{path}` is not {expected}")
            }
        }
    }
}
impl std::error::Error for FieldError {}

fn display_path(path: &[&str]) -> String {
    path.join(".")
}

pub fn get<'a>(tree: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(tree, |node, key| node.get(key))
}

pub fn get_mut<'a>(tree: &'a mut Value, path: &[&str]) -> Option<&'a mut Value> {
    path.iter().try_fold(tree, |node, key| node.get_mut(key))
}

fn require<'a>(tree: &'a Value, path: &[&str]) -> Result<&'a Value, FieldError> {
    get(tree, path).ok_or_else(|| FieldError::Missing(display_path(path)))
}

pub fn get_str<'a>(tree: &'a Value, path: &[&str]) -> Result<&'a str, FieldError> {
    require(tree, path)?
        .as_str()
        .ok_or_else(|| FieldError::WrongType {
            path: display_path(path),
            expected: "a string",
        })
}

pub fn get_u64(tree: &Value, path: &[&str]) -> Result<u64, FieldError> {
    require(tree, path)?
        .as_u64()
        .ok_or_else(|| FieldError::WrongType {
            path: display_path(path),
            expected: "an unsigned integer",
        })
}

pub fn get_i64(tree: &Value, path: &[&str]) -> Result<i64, FieldError> {
    require(tree, path)?
        .as_i64()
        .ok_or_else(|| FieldError::WrongType {
            path: display_path(path),
            expected: "an integer",
        })
}

/// `m_Name`, if the object has a non-empty one.
pub fn name(tree: &Value) -> Option<&str> {
    tree.get("m_Name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
}

pub fn object_mut<'a>(
    tree: &'a mut Value,
    path: &[&str],
) -> Result<&'a mut Map<String, Value>, FieldError> {
    get_mut(tree, path)
        .ok_or_else(|| FieldError::Missing(display_path(path)))?
        .as_object_mut()
        .ok_or_else(|| FieldError::WrongType {
            path: display_path(path),
            expected: "an object",
        })
}

/// Overwrites an existing field. Never adds fields, since the result has to match the type tree.
pub fn set(tree: &mut Value, path: &[&str], value: impl Into<Value>) -> Result<(), FieldError> {
    let slot = get_mut(tree, path).ok_or_else(|| FieldError::Missing(display_path(path)))?;
    *slot = value.into();
    Ok(())
}

/// Like [`set`], but a missing field is not an error. Returns whether the field existed.
pub fn set_if_present(tree: &mut Value, path: &[&str], value: impl Into<Value>) -> bool {
    match get_mut(tree, path) {
        Some(slot) => {
            *slot = value.into();
            true
        }
        None => false,
    }
}

/// Copies the top-level `keys` that exist in `source` over `tree`, returning the copied keys.
pub fn copy_fields<'k>(tree: &mut Value, source: &Value, keys: &[&'k str]) -> Vec<&'k str> {
    let mut copied = Vec::new();
    let Some(tree) = tree.as_object_mut() else {
        return copied;
    };
    for &key in keys {
        if let Some(value) = source.get(key) {
            tree.insert(key.to_owned(), value.clone());
            copied.push(key);
        }
    }
    copied
}

/// The two encodings a `pair<string, T>` entry of a map-like vector can decode to.
fn pair_key(entry: &Value) -> Option<&str> {
    match entry {
        Value::Array(items) => items.first()?.as_str(),
        Value::Object(map) => map.get("first")?.as_str(),
        _ => None,
    }
}

fn pair_value_mut(entry: &mut Value) -> Option<&mut Value> {
    match entry {
        Value::Array(items) => items.get_mut(1),
        Value::Object(map) => map.get_mut("second"),
        _ => None,
    }
}

fn new_pair_like(template: Option<&Value>, key: &str, value: Value) -> Value {
    match template {
        Some(Value::Array(_)) => Value::Array(vec![Value::from(key), value]),
        _ => {
            let mut map = Map::new();
            map.insert("first".to_owned(), Value::from(key));
            map.insert("second".to_owned(), value);
            Value::Object(map)
        }
    }
}

/// Sets `key` in a vector of `(key, value)` pairs, appending an entry if the key isn't present.
/// Appended entries use the encoding of the existing entries.
pub fn upsert_pair(pairs: &mut Vec<Value>, key: &str, value: impl Into<Value>) {
    let value = value.into();
    for entry in pairs.iter_mut() {
        if pair_key(entry) == Some(key)
            && let Some(slot) = pair_value_mut(entry)
        {
            *slot = value;
            return;
        }
    }
    let entry = new_pair_like(pairs.first(), key, value);
    pairs.push(entry);
}

pub fn pair_lookup<'a>(pairs: &'a [Value], key: &str) -> Option<&'a Value> {
    pairs.iter().find(|entry| pair_key(entry) == Some(key)).and_then(|entry| match entry {
        Value::Array(items) => items.get(1),
        Value::Object(map) => map.get("second"),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn nested_access() {
        let mut tree = json!({
            "m_Name": "chinese_body Atlas",
            "m_StreamData": { "offset": 1000, "size": 64, "path": "archive:/CAB-a/CAB-a.resS" }
        });
        assert_eq!(name(&tree), Some("chinese_body Atlas"));
        assert_eq!(get_u64(&tree, &["m_StreamData", "offset"]), Ok(1000));
        assert_eq!(
            get_str(&tree, &["m_StreamData", "path"]),
            Ok("archive:/CAB-a/CAB-a.resS")
        );
        assert_eq!(
            get_str(&tree, &["m_StreamData", "offset"]),
            Err(FieldError::WrongType {
                path: "m_StreamData.offset".into(),
                expected: "a string"
            })
        );

        set(&mut tree, &["m_StreamData", "offset"], 0).unwrap();
        assert_eq!(get_u64(&tree, &["m_StreamData", "offset"]), Ok(0));
        assert_eq!(
            set(&mut tree, &["m_StreamData", "missing"], 1),
            Err(FieldError::Missing("m_StreamData.missing".into()))
        );
        assert!(!set_if_present(&mut tree, &["image data"], json!([])));
    }

    #[test]
    fn empty_name_is_none() {
        assert_eq!(name(&json!({ "m_Name": "" })), None);
        assert_eq!(name(&json!({ "m_Script": "x" })), None);
    }

    #[test]
    fn copy_only_present_fields() {
        let mut tree = json!({ "m_Name": "chinese_body", "m_fontInfo": { "Name": "old" }, "m_glyphInfoList": [] });
        let source = json!({ "m_fontInfo": { "Name": "new" }, "unrelated": 1 });
        let copied = copy_fields(&mut tree, &source, &["m_fontInfo", "m_glyphInfoList"]);
        assert_eq!(copied, ["m_fontInfo"]);
        assert_eq!(tree["m_fontInfo"]["Name"], "new");
        assert_eq!(tree["m_glyphInfoList"], json!([]));
        assert!(tree.get("unrelated").is_none());
    }

    #[test]
    fn upsert_array_pairs() {
        let mut pairs = vec![json!(["_TextureHeight", 1024.0]), json!(["_Sharpness", 0.5])];
        upsert_pair(&mut pairs, "_TextureHeight", 4096.0);
        upsert_pair(&mut pairs, "_TextureWidth", 4096.0);
        assert_eq!(
            pairs,
            vec![
                json!(["_TextureHeight", 4096.0]),
                json!(["_Sharpness", 0.5]),
                json!(["_TextureWidth", 4096.0]),
            ]
        );
    }

    #[test]
    fn upsert_object_pairs() {
        let mut pairs = vec![json!({ "first": "_TextureWidth", "second": 512.0 })];
        upsert_pair(&mut pairs, "_TextureWidth", 4096.0);
        upsert_pair(&mut pairs, "_TextureHeight", 4096.0);
        assert_eq!(pair_lookup(&pairs, "_TextureWidth"), Some(&json!(4096.0)));
        assert_eq!(
            pairs[1],
            json!({ "first": "_TextureHeight", "second": 4096.0 })
        );

        let mut empty = Vec::new();
        upsert_pair(&mut empty, "_TextureHeight", 4096.0);
        assert_eq!(empty, vec![json!({ "first": "_TextureHeight", "second": 4096.0 })]);
    }
}
