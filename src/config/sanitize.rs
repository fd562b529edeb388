//! Secret stripping for anything that leaves the registry boundary.

use serde_json::Value;

/// Keys removed from every exported or logged configuration snapshot.
pub const SENSITIVE_FIELDS: &[&str] = &[
    "api_key",
    "apikey",
    "authorization",
    "token",
    "access_token",
    "refresh_token",
    "secret",
    "client_secret",
    "password",
];

pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_FIELDS.contains(&lower.as_str())
}

/// Recursively drop sensitive keys from a JSON value in place.
pub fn sanitize_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|k, _| !is_sensitive_key(k));
            for v in map.values_mut() {
                sanitize_json(v);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(sanitize_json),
        _ => {}
    }
}

/// Owned variant of [`sanitize_json`].
pub fn sanitized(mut value: Value) -> Value {
    sanitize_json(&mut value);
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_nested_and_camel_case_keys() {
        let out = sanitized(json!({
            "apiKey": "sk-1",
            "base_url": "http://x",
            "nested": {"Authorization": "Bearer abc", "keep": 1},
            "list": [{"password": "p", "name": "n"}]
        }));
        assert_eq!(
            out,
            json!({
                "base_url": "http://x",
                "nested": {"keep": 1},
                "list": [{"name": "n"}]
            })
        );
    }
}
