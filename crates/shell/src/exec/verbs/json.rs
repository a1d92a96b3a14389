use serde_json::Value;

use crate::{
    error::{Error, Result},
    script::Verb,
};

use super::{VerbOutput, arg};

fn parse(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| Error::message(format!("invalid JSON: {e}")))
}

/// JSON pointers accept both `/a/b` and dotted `a.b` forms.
fn pointer(raw: &str) -> String {
    if raw.starts_with('/') {
        raw.to_string()
    } else {
        format!("/{}", raw.replace('.', "/"))
    }
}

pub fn run(verb: Verb, args: &[String]) -> Result<VerbOutput> {
    let out = match verb {
        Verb::JsonParse => {
            let value = parse(arg(args, 0, verb)?)?;
            match &value {
                Value::Object(map) => format!("object with {} keys", map.len()),
                Value::Array(items) => format!("array with {} items", items.len()),
                other => format!("{other}"),
            }
        },
        Verb::JsonGet => {
            let value = parse(arg(args, 0, verb)?)?;
            let path = pointer(arg(args, 1, verb)?);
            match value.pointer(&path) {
                Some(Value::String(s)) => s.clone(),
                Some(found) => found.to_string(),
                None => return Err(Error::message(format!("no value at {path:?}"))),
            }
        },
        Verb::JsonSet => {
            let mut value = parse(arg(args, 0, verb)?)?;
            let path = pointer(arg(args, 1, verb)?);
            let new_value: Value = serde_json::from_str(arg(args, 2, verb)?)
                .unwrap_or_else(|_| Value::String(arg(args, 2, verb).unwrap_or_default().to_string()));
            let Some(slot) = value.pointer_mut(&path) else {
                return Err(Error::message(format!("no value at {path:?}")));
            };
            *slot = new_value;
            value.to_string()
        },
        Verb::JsonMerge => {
            let mut base = parse(arg(args, 0, verb)?)?;
            let overlay = parse(arg(args, 1, verb)?)?;
            merge(&mut base, overlay);
            base.to_string()
        },
        Verb::JsonKeys => {
            let value = parse(arg(args, 0, verb)?)?;
            match value {
                Value::Object(map) => {
                    let mut keys: Vec<String> = map.keys().cloned().collect();
                    keys.sort();
                    keys.join("\n")
                },
                _ => return Err(Error::message("JsonKeys needs an object")),
            }
        },
        Verb::JsonLength => {
            let value = parse(arg(args, 0, verb)?)?;
            match value {
                Value::Object(map) => map.len().to_string(),
                Value::Array(items) => items.len().to_string(),
                Value::String(s) => s.chars().count().to_string(),
                _ => return Err(Error::message("JsonLength needs an object, array, or string")),
            }
        },
        Verb::JsonPretty => {
            let value = parse(arg(args, 0, verb)?)?;
            serde_json::to_string_pretty(&value)?
        },
        Verb::JsonMinify => parse(arg(args, 0, verb)?)?.to_string(),
        Verb::JsonAppend => {
            let mut value = parse(arg(args, 0, verb)?)?;
            let path = pointer(arg(args, 1, verb)?);
            let item: Value = serde_json::from_str(arg(args, 2, verb)?)
                .unwrap_or_else(|_| Value::String(arg(args, 2, verb).unwrap_or_default().to_string()));
            let Some(Value::Array(items)) = value.pointer_mut(&path) else {
                return Err(Error::message(format!("no array at {path:?}")));
            };
            items.push(item);
            value.to_string()
        },
        other => return Err(Error::message(format!("{other} is not a JSON verb"))),
    };
    Ok(VerbOutput::text(out))
}

/// Deep-merge `overlay` into `base`; objects merge recursively, everything
/// else replaces.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base_map.insert(key, value);
                    },
                }
            }
        },
        (slot, value) => *slot = value,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn a(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn text(verb: Verb, args: &[&str]) -> String {
        run(verb, &a(args)).unwrap().stdout
    }

    #[test]
    fn test_parse_and_shape() {
        assert_eq!(text(Verb::JsonParse, &[r#"{"a":1,"b":2}"#]), "object with 2 keys");
        assert_eq!(text(Verb::JsonParse, &["[1,2,3]"]), "array with 3 items");
        assert!(run(Verb::JsonParse, &a(&["{broken"])).is_err());
    }

    #[test]
    fn test_get_both_pointer_forms() {
        let doc = r#"{"server":{"port":8080,"name":"api"}}"#;
        assert_eq!(text(Verb::JsonGet, &[doc, "server.port"]), "8080");
        assert_eq!(text(Verb::JsonGet, &[doc, "/server/name"]), "api");
        assert!(run(Verb::JsonGet, &a(&[doc, "server.missing"])).is_err());
    }

    #[test]
    fn test_set_and_append() {
        let doc = r#"{"a":1,"list":[1]}"#;
        let set = text(Verb::JsonSet, &[doc, "a", "5"]);
        assert!(set.contains(r#""a":5"#));
        let appended = text(Verb::JsonAppend, &[doc, "list", "2"]);
        assert!(appended.contains("[1,2]"));
        // Non-JSON third arg becomes a string value.
        let set_str = text(Verb::JsonSet, &[doc, "a", "hello world"]);
        assert!(set_str.contains(r#""a":"hello world""#));
    }

    #[test]
    fn test_merge_deep() {
        let merged = text(
            Verb::JsonMerge,
            &[r#"{"a":{"x":1,"y":2},"keep":true}"#, r#"{"a":{"y":9,"z":3}}"#],
        );
        let value: Value = serde_json::from_str(&merged).unwrap();
        assert_eq!(value["a"]["x"], 1);
        assert_eq!(value["a"]["y"], 9);
        assert_eq!(value["a"]["z"], 3);
        assert_eq!(value["keep"], true);
    }

    #[test]
    fn test_keys_length_pretty() {
        assert_eq!(text(Verb::JsonKeys, &[r#"{"b":1,"a":2}"#]), "a\nb");
        assert_eq!(text(Verb::JsonLength, &["[1,2,3,4]"]), "4");
        let pretty = text(Verb::JsonPretty, &[r#"{"a":1}"#]);
        assert!(pretty.contains("\n"));
        assert_eq!(text(Verb::JsonMinify, &[&pretty]), r#"{"a":1}"#);
    }
}
