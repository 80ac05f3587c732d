use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

const ALLOWED_TAGS: &str =
    "<h1><h2><h3><h4><h5><h6><a><b><p><i><em><strong><ul><li><ol><br><hr><u><sup><sub><s>";

static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</?([a-z][a-z0-9]*)\b[^>]*>").expect("valid regex"));
static COMMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<!--[\s\S]*?-->").expect("valid regex"));
static ALLOWED_LIST: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[a-z][a-z0-9]*>").expect("valid regex"));

/// Removes markup except the allowed tags. `None` keeps the default rich-text
/// whitelist; `Some("")` strips every tag.
pub fn strip_tags(input: &str, allowed: Option<&str>) -> String {
    let allowed = allowed.unwrap_or(ALLOWED_TAGS).to_lowercase();
    let allowed: String = ALLOWED_LIST
        .find_iter(&allowed)
        .map(|m| m.as_str())
        .collect();
    let without_comments = COMMENTS.replace_all(input, "");
    let stripped = TAGS.replace_all(&without_comments, |caps: &regex::Captures| {
        let tag = format!("<{}>", caps[1].to_lowercase());
        if allowed.contains(&tag) {
            caps[0].to_string()
        } else {
            String::new()
        }
    });
    stripped.replace("&nbsp;", "").trim().to_string()
}

/// Sanitizes a string for use as a class name or id slug.
pub fn to_class_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        let c = if c.is_ascii_alphanumeric() { c } else { '-' };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('-').to_string()
}

/// Hands out unique element ids per slug: `name`, `name-1`, `name-2`, ...
#[derive(Default, Debug)]
pub struct IdGenerator {
    counts: Mutex<HashMap<String, usize>>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, name: &str) -> String {
        let slug = to_class_name(name);
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let count = counts.entry(slug.clone()).or_insert(0);
        let id = if *count == 0 {
            slug
        } else {
            format!("{slug}-{count}")
        };
        *count += 1;
        id
    }

    pub fn reset(&self) {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Last path segment of a form action, used as the form id.
pub fn extract_id_from_url(url: &str) -> String {
    url.rsplit('/').next().unwrap_or_default().to_string()
}

/// `/content/site/contact-us/jcr:content/root/form` -> `contact_us`
pub fn site_page_name(path: Option<&str>) -> String {
    let Some(path) = path else {
        return String::new();
    };
    let Some(index) = path.rfind("/jcr:content") else {
        return String::new();
    };
    path[..index]
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .replace('-', "_")
}

/// Prefixes a service path with the configured base URL, if any.
pub fn externalize(base: Option<&str>, path: &str) -> String {
    match base {
        Some(base) if !base.is_empty() => format!("{}{}", base.trim_end_matches('/'), path),
        _ => path.to_string(),
    }
}
