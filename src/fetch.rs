//! Form retrieval: a linked form document is fetched and turned into a raw
//! definition, either directly (JSON) or from the page's `<pre><code>` block.

use log::{debug, warn};
use once_cell::sync::Lazy;
use ox_forms::decode::decode;
use ox_forms::dom::Element;
use ox_forms::error::FormError;
use ox_forms::http::HttpClient;
use regex::Regex;
use serde_json::Value;

/// Location of the form fragment inside an authored page.
pub const FORM_FRAGMENT: &str = "/jcr:content/root/section/form.html";

static CODE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<pre\b[^>]*>\s*<code\b[^>]*>(.*?)</code>").expect("valid regex")
});

/// URL the form behind `href` is fetched from. Same-origin pages that are
/// not JSON resolve to their form fragment.
pub fn form_url(href: &str, origin: Option<&str>) -> String {
    let same_origin = origin.map(|o| !o.is_empty() && href.starts_with(o)).unwrap_or(false);
    if !same_origin || href.contains(".json") {
        return href.to_string();
    }
    let page = href.strip_suffix(".html").unwrap_or(href);
    format!("{page}{FORM_FRAGMENT}")
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Text content of the first `<pre><code>` block of an HTML page.
pub fn extract_code_block(html: &str) -> Option<String> {
    CODE_BLOCK
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| unescape(m.as_str()))
        .filter(|content| !content.trim().is_empty())
}

/// The embedded definition of a block: the `<pre>` element it came from and
/// the decoded content of its `<code>` child.
pub fn extract_form_definition(block: &Element) -> Result<Option<(Element, Value)>, FormError> {
    let Some(container) = block.query(|e| e.is("pre")) else {
        return Ok(None);
    };
    let content = container
        .query(|e| e.is("code"))
        .map(|code| code.text_content())
        .filter(|content| !content.trim().is_empty());
    match content {
        Some(content) => Ok(Some((container, decode(&content)?))),
        None => Ok(None),
    }
}

/// Fetches the definition behind `href`. Responses that are neither JSON
/// nor HTML carry no definition.
pub async fn fetch_form(http: &dyn HttpClient, href: &str, origin: Option<&str>) -> Result<Option<Value>, FormError> {
    let url = form_url(href, origin);
    let response = http.get(&url).await?;
    if response.is_json() {
        debug!("Form definition for {} served as JSON", url);
        return response.json().map(Some);
    }
    if response.is_html() {
        return match extract_code_block(&response.body) {
            Some(content) => decode(&content).map(Some),
            None => {
                warn!("No form definition found in page {}", url);
                Ok(None)
            }
        };
    }
    warn!(
        "Unsupported content type {:?} for form {} (status {})",
        response.content_type, url, response.status
    );
    Ok(None)
}
