//! OpenAPI-style query parameter serialization.
//!
//! Generated SDKs describe each query parameter with a value, a `style` and an
//! `explode` flag. [`encode_query_param`] turns that description into one or more
//! entries of a [`QueryParams`] map. Sequence values produced by exploded `form`
//! parameters are later sent as a repeated key by the transport.
//!
//! The same rules drive `application/x-www-form-urlencoded` request bodies, see
//! [`to_form_urlencoded`].

use crate::{Error, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Encoded query parameters, keyed by parameter name.
///
/// Inserting an existing key replaces its value.
pub type QueryParams = BTreeMap<String, QueryValue>;

/// A single encoded query entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    /// One string value, sent as `key=value`.
    Single(String),
    /// Several values, sent as `key=a&key=b`.
    Multi(Vec<String>),
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Single(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Single(value)
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(values: Vec<String>) -> Self {
        QueryValue::Multi(values)
    }
}

/// Serialization styles for query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryStyle {
    /// `form` (the OpenAPI default for query parameters).
    #[default]
    Form,
    /// `spaceDelimited`
    SpaceDelimited,
    /// `pipeDelimited`
    PipeDelimited,
    /// `deepObject`
    DeepObject,
}

impl QueryStyle {
    /// The OpenAPI name of this style.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStyle::Form => "form",
            QueryStyle::SpaceDelimited => "spaceDelimited",
            QueryStyle::PipeDelimited => "pipeDelimited",
            QueryStyle::DeepObject => "deepObject",
        }
    }

    /// The `explode` value OpenAPI assumes when none is given.
    pub fn default_explode(&self) -> bool {
        matches!(self, QueryStyle::Form)
    }
}

impl fmt::Display for QueryStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryStyle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "form" => Ok(QueryStyle::Form),
            "spaceDelimited" => Ok(QueryStyle::SpaceDelimited),
            "pipeDelimited" => Ok(QueryStyle::PipeDelimited),
            "deepObject" => Ok(QueryStyle::DeepObject),
            other => Err(Error::UnsupportedStyle(other.to_string())),
        }
    }
}

/// Encodes one parameter given its style by name.
///
/// # Errors
///
/// Returns [`Error::UnsupportedStyle`] when `style` is not a known OpenAPI style.
///
/// # Examples
///
/// ```
/// use sdk_dispatch::query::{encode_query_param, QueryParams, QueryValue};
/// use serde_json::json;
///
/// let mut params = QueryParams::new();
/// encode_query_param(&mut params, "id", &json!([1, 2, 3]), "pipeDelimited", false).unwrap();
/// assert_eq!(params["id"], QueryValue::Single("1|2|3".to_string()));
///
/// assert!(encode_query_param(&mut params, "id", &json!(1), "matrix", false).is_err());
/// ```
pub fn encode_query_param(
    params: &mut QueryParams,
    key: &str,
    value: &Value,
    style: &str,
    explode: bool,
) -> Result<()> {
    let style: QueryStyle = style.parse()?;
    encode(params, key, value, style, explode);
    Ok(())
}

/// Encodes one parameter with an already-parsed style.
pub fn encode(
    params: &mut QueryParams,
    key: &str,
    value: &Value,
    style: QueryStyle,
    explode: bool,
) {
    match style {
        QueryStyle::Form => encode_form(params, key, value, explode),
        QueryStyle::SpaceDelimited => encode_delimited(params, key, value, explode, " "),
        QueryStyle::PipeDelimited => encode_delimited(params, key, value, explode, "|"),
        QueryStyle::DeepObject => encode_deep_object(params, key, value, explode),
    }
}

/// Renders a value the way it appears inside a query string.
///
/// Booleans render as `true`/`false`, null as `null`, strings verbatim, numbers
/// in their natural form and containers as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn encode_form(params: &mut QueryParams, key: &str, value: &Value, explode: bool) {
    match value {
        Value::Array(items) if explode => {
            let values = items.iter().map(stringify).collect();
            params.insert(key.to_string(), QueryValue::Multi(values));
        }
        Value::Array(items) => {
            params.insert(key.to_string(), QueryValue::Single(join(items.iter(), ",")));
        }
        Value::Object(map) if explode => {
            for (sub_key, sub_value) in map {
                params.insert(sub_key.clone(), QueryValue::Single(stringify(sub_value)));
            }
        }
        Value::Object(map) => {
            // Entries keep the insertion order of the source object.
            let flat: Vec<String> = map
                .iter()
                .flat_map(|(k, v)| [k.clone(), stringify(v)])
                .collect();
            params.insert(key.to_string(), QueryValue::Single(flat.join(",")));
        }
        scalar => {
            params.insert(key.to_string(), QueryValue::Single(stringify(scalar)));
        }
    }
}

fn encode_delimited(
    params: &mut QueryParams,
    key: &str,
    value: &Value,
    explode: bool,
    delimiter: &str,
) {
    match value {
        Value::Array(items) if !explode => {
            params.insert(key.to_string(), QueryValue::Single(join(items.iter(), delimiter)));
        }
        _ => encode_form(params, key, value, explode),
    }
}

fn encode_deep_object(params: &mut QueryParams, key: &str, value: &Value, explode: bool) {
    match value {
        Value::Object(_) | Value::Array(_) => encode_deep_object_key(params, key, value),
        _ => encode_form(params, key, value, explode),
    }
}

fn encode_deep_object_key(params: &mut QueryParams, key: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (sub_key, sub_value) in map {
                encode_deep_object_key(params, &format!("{key}[{sub_key}]"), sub_value);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                encode_deep_object_key(params, &format!("{key}[{index}]"), item);
            }
        }
        scalar => {
            params.insert(key.to_string(), QueryValue::Single(stringify(scalar)));
        }
    }
}

fn join<'a>(items: impl Iterator<Item = &'a Value>, delimiter: &str) -> String {
    items.map(stringify).collect::<Vec<_>>().join(delimiter)
}

/// Encodes an object as `application/x-www-form-urlencoded` fields.
///
/// Each top-level field is encoded with its entry in `styles` (default `form`)
/// and `explode` (default: the style's OpenAPI default).
///
/// # Errors
///
/// Returns [`Error::SerializationFailed`] if `value` is not an object, and
/// [`Error::UnsupportedStyle`] for unknown style names.
pub fn to_form_urlencoded(
    value: &Value,
    styles: &HashMap<String, String>,
    explode: &HashMap<String, bool>,
) -> Result<QueryParams> {
    let Value::Object(map) = value else {
        return Err(Error::SerializationFailed(
            "x-www-form-urlencoded data must be an object".to_string(),
        ));
    };

    let mut params = QueryParams::new();
    for (key, field) in map {
        let style = match styles.get(key) {
            Some(name) => name.parse()?,
            None => QueryStyle::Form,
        };
        let field_explode = explode
            .get(key)
            .copied()
            .unwrap_or_else(|| style.default_explode());
        encode(&mut params, key, field, style, field_explode);
    }
    Ok(params)
}

/// Flattens encoded parameters into `(key, value)` pairs, repeating keys for sequences.
pub fn to_pairs(params: &QueryParams) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len());
    for (key, value) in params {
        match value {
            QueryValue::Single(v) => pairs.push((key.clone(), v.clone())),
            QueryValue::Multi(values) => {
                pairs.extend(values.iter().map(|v| (key.clone(), v.clone())));
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn single(v: &str) -> QueryValue {
        QueryValue::Single(v.to_string())
    }

    fn encoded(key: &str, value: Value, style: &str, explode: bool) -> QueryParams {
        let mut params = QueryParams::new();
        encode_query_param(&mut params, key, &value, style, explode).unwrap();
        params
    }

    #[test]
    fn test_stringify() {
        assert_eq!(stringify(&json!("hello world")), "hello world");
        assert_eq!(stringify(&json!(42)), "42");
        assert_eq!(stringify(&json!(2.5)), "2.5");
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&json!(false)), "false");
        assert_eq!(stringify(&Value::Null), "null");
        assert_eq!(stringify(&json!([1, 2, 3])), "[1,2,3]");
        assert_eq!(stringify(&json!({"key": "value"})), r#"{"key":"value"}"#);
    }

    #[test]
    fn test_form_scalar() {
        let params = encoded("name", json!("value"), "form", true);
        assert_eq!(params, QueryParams::from([("name".to_string(), single("value"))]));
    }

    #[test]
    fn test_form_list() {
        let params = encoded("id", json!([1, 2, 3]), "form", true);
        assert_eq!(
            params["id"],
            QueryValue::Multi(vec!["1".into(), "2".into(), "3".into()])
        );

        let params = encoded("id", json!([1, 2, 3]), "form", false);
        assert_eq!(params["id"], single("1,2,3"));

        let params = encoded("mixed", json!(["a", 1, true]), "form", false);
        assert_eq!(params["mixed"], single("a,1,true"));
    }

    #[test]
    fn test_form_object() {
        let params = encoded("obj", json!({"key1": "val1", "key2": "val2"}), "form", true);
        assert_eq!(params.len(), 2);
        assert_eq!(params["key1"], single("val1"));
        assert_eq!(params["key2"], single("val2"));

        let params = encoded("obj", json!({"key1": "val1", "key2": "val2"}), "form", false);
        assert_eq!(params["obj"], single("key1,val1,key2,val2"));
    }

    #[test]
    fn test_form_empty_containers() {
        assert_eq!(encoded("empty", json!([]), "form", false)["empty"], single(""));
        assert_eq!(encoded("empty", json!({}), "form", false)["empty"], single(""));
    }

    #[test]
    fn test_delimited_styles() {
        assert_eq!(encoded("id", json!([1, 2, 3]), "spaceDelimited", false)["id"], single("1 2 3"));
        assert_eq!(encoded("id", json!([1, 2, 3]), "pipeDelimited", false)["id"], single("1|2|3"));
        assert_eq!(encoded("empty", json!([]), "pipeDelimited", false)["empty"], single(""));
    }

    #[test]
    fn test_delimited_styles_fall_back_to_form() {
        assert_eq!(
            encoded("id", json!([1, 2, 3]), "spaceDelimited", true)["id"],
            QueryValue::Multi(vec!["1".into(), "2".into(), "3".into()])
        );
        let params = encoded("name", json!("value"), "pipeDelimited", false);
        assert_eq!(params["name"], single("value"));

        let params = encoded("obj", json!({"key": "value"}), "pipeDelimited", true);
        assert_eq!(params, QueryParams::from([("key".to_string(), single("value"))]));
    }

    #[test]
    fn test_deep_object() {
        let params = encoded("obj", json!({"key": "value"}), "deepObject", true);
        assert_eq!(params, QueryParams::from([("obj[key]".to_string(), single("value"))]));

        let params = encoded("obj", json!({"level1": {"level2": "value"}}), "deepObject", true);
        assert_eq!(params["obj[level1][level2]"], single("value"));

        let params = encoded("arr", json!([1, 2, 3]), "deepObject", true);
        assert_eq!(params["arr[0]"], single("1"));
        assert_eq!(params["arr[2]"], single("3"));

        let nested = json!({"users": [{"name": "alice", "age": 30}]});
        let params = encoded("data", nested, "deepObject", true);
        assert_eq!(params.len(), 2);
        assert_eq!(params["data[users][0][name]"], single("alice"));
        assert_eq!(params["data[users][0][age]"], single("30"));
    }

    #[test]
    fn test_deep_object_edge_cases() {
        assert_eq!(encoded("name", json!("value"), "deepObject", true)["name"], single("value"));
        assert!(encoded("empty", json!({}), "deepObject", true).is_empty());
        assert!(encoded("empty", json!([]), "deepObject", true).is_empty());
    }

    #[test]
    fn test_unknown_style() {
        let mut params = QueryParams::new();
        let err =
            encode_query_param(&mut params, "name", &json!("value"), "invalid", true).unwrap_err();
        assert!(matches!(err, Error::UnsupportedStyle(ref s) if s == "invalid"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_form_urlencoded() {
        let data = json!({
            "simple": "value",
            "list": [1, 2],
            "ids": [1, 2, 3],
            "user": {"name": "john", "age": 30}
        });
        let styles = HashMap::from([
            ("ids".to_string(), "pipeDelimited".to_string()),
            ("user".to_string(), "deepObject".to_string()),
        ]);
        let explode = HashMap::from([("user".to_string(), true)]);

        let params = to_form_urlencoded(&data, &styles, &explode).unwrap();

        assert_eq!(params["simple"], single("value"));
        assert_eq!(params["list"], QueryValue::Multi(vec!["1".into(), "2".into()]));
        assert_eq!(params["ids"], single("1|2|3"));
        assert_eq!(params["user[name]"], single("john"));
        assert_eq!(params["user[age]"], single("30"));
    }

    #[test]
    fn test_form_urlencoded_rejects_non_object() {
        let err =
            to_form_urlencoded(&json!([1, 2, 3]), &HashMap::new(), &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("x-www-form-urlencoded data must be an object"));
    }

    #[test]
    fn test_to_pairs_repeats_keys() {
        let mut params = QueryParams::new();
        params.insert("id".into(), QueryValue::Multi(vec!["1".into(), "2".into()]));
        params.insert("q".into(), "rust".into());

        assert_eq!(
            to_pairs(&params),
            vec![
                ("id".to_string(), "1".to_string()),
                ("id".to_string(), "2".to_string()),
                ("q".to_string(), "rust".to_string()),
            ]
        );
    }
}
