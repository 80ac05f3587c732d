use crate::error::FormError;
use crate::schema::FormDefinition;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// E-mail validation pattern that authoring tools leak into payloads in its
/// JSON-escaped form; it is not valid inside a JSON document and is dropped.
const EMAIL_PATTERN_NOISE: &str = r#"^(([^<>()\\[\\]\\\\.,;:\\s@\"]+(\\.[^<>()\\[\\]\\\\.,;:\\s@\"]+)*)|(\".+\"))@((\\[[0-9]{1,3}\\.[0-9]{1,3}\\.[0-9]{1,3}\\.[0-9]{1,3}])|(([a-zA-Z\\-0-9]+\\.)\+[a-zA-Z]{2,}))$"#;

static NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x{83}\n|\n|\s\s+|[\x00-\x08\x0B\x0C\x0E-\x1F]").expect("valid regex")
});

/// Parses a raw definition payload into a JSON tree.
///
/// Payloads wrapped in quotes are JSON strings holding JSON and are parsed
/// twice. Anything else goes through [`clean_up`] first.
pub fn decode(raw: &str) -> Result<Value, FormError> {
    let content = raw.trim();
    if content.len() >= 2 && content.starts_with('"') && content.ends_with('"') {
        debug!("Decoding double-encoded form definition");
        let inner: String = serde_json::from_str(content)
            .map_err(|e| FormError::MalformedDefinition(e.to_string()))?;
        return serde_json::from_str(&inner)
            .map_err(|e| FormError::MalformedDefinition(e.to_string()));
    }
    serde_json::from_str(&clean_up(content))
        .map_err(|e| FormError::MalformedDefinition(e.to_string()))
}

/// [`decode`] followed by conversion into the typed definition.
pub fn decode_definition(raw: &str) -> Result<FormDefinition, FormError> {
    FormDefinition::from_value(decode(raw)?)
}

/// Drops the leaked e-mail pattern, control characters, newlines and runs of
/// whitespace.
pub fn clean_up(content: &str) -> String {
    let without_pattern = content.replace(EMAIL_PATTERN_NOISE, "");
    NOISE.replace_all(&without_pattern, "").into_owned()
}

/// Source of the page request the form is rendered for.
pub trait RequestEnvironment {
    /// Query string, with or without the leading `?`.
    fn search(&self) -> anyhow::Result<String>;
    /// Raw `Cookie` header value (`a=1; b=2`).
    fn cookies(&self) -> anyhow::Result<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StaticRequest {
    pub search: String,
    pub cookies: String,
}

impl StaticRequest {
    pub fn new(search: impl Into<String>, cookies: impl Into<String>) -> Self {
        Self {
            search: search.into(),
            cookies: cookies.into(),
        }
    }
}

impl RequestEnvironment for StaticRequest {
    fn search(&self) -> anyhow::Result<String> {
        Ok(self.search.clone())
    }

    fn cookies(&self) -> anyhow::Result<String> {
        Ok(self.cookies.clone())
    }
}

/// Copies query parameters (lower-cased keys) and cookies into
/// `properties.queryParams` / `properties.cookies`.
///
/// Read failures are logged; the definition keeps whatever was collected.
pub fn add_request_context(definition: &mut Value, env: &dyn RequestEnvironment) {
    let Value::Object(root) = definition else {
        return;
    };
    let properties = root
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    if !properties.is_object() {
        *properties = Value::Object(Map::new());
    }
    let Value::Object(properties) = properties else {
        return;
    };

    match env.search() {
        Ok(search) => {
            let params = properties
                .entry("queryParams")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(params) = params {
                let query = search.trim_start_matches('?');
                for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                    params.insert(key.to_lowercase(), Value::String(value.into_owned()));
                }
            }
        }
        Err(e) => warn!("Error reading URL parameters: {:#}", e),
    }

    match env.cookies() {
        Ok(header) => {
            let mut cookies = Map::new();
            for cookie in header.split(';') {
                let cookie = cookie.trim();
                if cookie.is_empty() {
                    continue;
                }
                let mut parts = cookie.split('=');
                let key = parts.next().unwrap_or_default().trim();
                let value = parts.next().unwrap_or_default();
                cookies.insert(key.to_string(), Value::String(value.to_string()));
            }
            properties.insert("cookies".to_string(), Value::Object(cookies));
        }
        Err(e) => warn!("Error reading cookies: {:#}", e),
    }
}
