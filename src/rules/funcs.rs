//! Template Function Library
//!
//! Every rule template is rendered with the same function library. Tera
//! built-ins already cover joins, `urlencode`, `json_encode`, `trim` and
//! `default`; the helpers here add what observability rules need on top.
//! The library is part of the rule-file contract and changes to it are
//! breaking:
//!
//! | name | kind | usage |
//! |------|------|-------|
//! | `label` | function | `label(map=labels, key="app", default="")` |
//! | `k8s_path` | function | `k8s_path(version="v1", namespace=ns, resource="pods", name=n)` |
//! | `regex_match` | function | `regex_match(value=name, pattern="^kube-")` |
//! | `selector` | filter | `{{ labels \| selector }}` → `a="1",b="2"` (keys sorted) |

use regex::Regex;
use std::collections::HashMap;
use tera::{Result, Tera, Value};

/// A fresh template set with the shared function library registered and
/// autoescaping off (rules render queries, not HTML).
pub fn new_templates() -> Tera {
    let mut tera = Tera::default();
    tera.autoescape_on(vec![]);
    tera.register_function("label", label);
    tera.register_function("k8s_path", k8s_path);
    tera.register_function("regex_match", regex_match);
    tera.register_filter("selector", selector);
    tera
}

fn string_arg(args: &HashMap<String, Value>, name: &str) -> Result<Option<String>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(v) => Err(tera::Error::msg(format!(
            "argument `{name}` must be a string, got {v}"
        ))),
    }
}

fn required_arg(args: &HashMap<String, Value>, name: &str) -> Result<String> {
    string_arg(args, name)?
        .ok_or_else(|| tera::Error::msg(format!("missing argument `{name}`")))
}

/// Label or annotation lookup with a default.
fn label(args: &HashMap<String, Value>) -> Result<Value> {
    let key = required_arg(args, "key")?;
    let default = string_arg(args, "default")?.unwrap_or_default();
    let found = match args.get("map") {
        Some(Value::Object(map)) => map.get(&key).cloned(),
        None | Some(Value::Null) => None,
        Some(v) => {
            return Err(tera::Error::msg(format!(
                "argument `map` must be a map, got {v}"
            )))
        }
    };
    Ok(match found {
        Some(Value::String(s)) => Value::String(s),
        Some(v) => Value::String(v.to_string()),
        None => Value::String(default),
    })
}

/// Kubernetes REST path: `/api/v1/...` for the core group,
/// `/apis/GROUP/VERSION/...` otherwise, with optional namespace and name.
fn k8s_path(args: &HashMap<String, Value>) -> Result<Value> {
    let group = string_arg(args, "group")?.unwrap_or_default();
    let version = string_arg(args, "version")?.unwrap_or_else(|| "v1".to_string());
    let resource = required_arg(args, "resource")?;
    let mut path = if group.is_empty() {
        format!("/api/{version}")
    } else {
        format!("/apis/{group}/{version}")
    };
    if let Some(namespace) = string_arg(args, "namespace")? {
        if !namespace.is_empty() {
            path.push_str("/namespaces/");
            path.push_str(&namespace);
        }
    }
    path.push('/');
    path.push_str(&resource);
    if let Some(name) = string_arg(args, "name")? {
        if !name.is_empty() {
            path.push('/');
            path.push_str(&name);
        }
    }
    Ok(Value::String(path))
}

/// Regular expression test.
fn regex_match(args: &HashMap<String, Value>) -> Result<Value> {
    let value = required_arg(args, "value")?;
    let pattern = required_arg(args, "pattern")?;
    let re = Regex::new(&pattern)
        .map_err(|e| tera::Error::msg(format!("invalid pattern `{pattern}`: {e}")))?;
    Ok(Value::Bool(re.is_match(&value)))
}

/// Render a map as a label-selector body: `k="v",k2="v2"`, keys sorted.
fn selector(value: &Value, _args: &HashMap<String, Value>) -> Result<Value> {
    let map = match value {
        Value::Object(map) => map,
        Value::Null => return Ok(Value::String(String::new())),
        v => {
            return Err(tera::Error::msg(format!(
                "selector expects a map, got {v}"
            )))
        }
    };
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    let parts: Vec<String> = keys
        .into_iter()
        .map(|k| {
            let v = match &map[k] {
                Value::String(s) => s.clone(),
                v => v.to_string(),
            };
            format!("{k}={v:?}")
        })
        .collect();
    Ok(Value::String(parts.join(",")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tera::Context;

    fn render(template: &str, object: serde_json::Value) -> tera::Result<String> {
        let mut tera = new_templates();
        tera.add_raw_template("t", template).unwrap();
        let mut context = Context::new();
        if let serde_json::Value::Object(map) = &object {
            for (k, v) in map {
                context.insert(k, v);
            }
        }
        tera.render("t", &context)
    }

    #[test]
    fn test_label_lookup_and_default() {
        let o = json!({"labels": {"app": "web"}});
        assert_eq!(
            "web",
            render(r#"{{ label(map=labels, key="app") }}"#, o.clone()).unwrap()
        );
        assert_eq!(
            "none",
            render(
                r#"{{ label(map=labels, key="tier", default="none") }}"#,
                o
            )
            .unwrap()
        );
    }

    #[test]
    fn test_k8s_path_core_group() {
        let o = json!({"ns": "prod", "n": "web-1"});
        assert_eq!(
            "/api/v1/namespaces/prod/pods/web-1",
            render(
                r#"{{ k8s_path(namespace=ns, resource="pods", name=n) }}"#,
                o
            )
            .unwrap()
        );
    }

    #[test]
    fn test_k8s_path_named_group() {
        assert_eq!(
            "/apis/apps/v1/deployments",
            render(
                r#"{{ k8s_path(group="apps", version="v1", resource="deployments") }}"#,
                json!({})
            )
            .unwrap()
        );
    }

    #[test]
    fn test_regex_match() {
        let o = json!({"name": "kube-proxy-x2f"});
        assert_eq!(
            "yes",
            render(
                r#"{% if regex_match(value=name, pattern="^kube-") %}yes{% endif %}"#,
                o
            )
            .unwrap()
        );
        assert!(render(r#"{{ regex_match(value="x", pattern="(") }}"#, json!({})).is_err());
    }

    #[test]
    fn test_selector_filter_sorts_keys() {
        let o = json!({"labels": {"b": "2", "a": "1"}});
        assert_eq!(
            r#"a="1",b="2""#,
            render("{{ labels | selector }}", o).unwrap()
        );
    }

    #[test]
    fn test_builtin_urlencode_available() {
        let o = json!({"q": "a b"});
        assert_eq!("a%20b", render("{{ q | urlencode }}", o).unwrap());
    }
}
