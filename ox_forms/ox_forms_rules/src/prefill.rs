use log::{debug, warn};
use ox_forms::config::FormsConfig;
use ox_forms::http::HttpClient;
use serde_json::Value;

/// Picks the prefill payload out of a data service response: the bound data
/// under `data.afData.afBoundData.data` when it is non-empty, else `data`,
/// else the whole document.
pub fn extract_prefill(json: Value) -> Option<Value> {
    let bound = json
        .pointer("/data/afData/afBoundData/data")
        .filter(|data| data.as_object().is_some_and(|map| !map.is_empty()))
        .cloned();
    if bound.is_some() {
        return bound;
    }
    match json.get("data") {
        Some(data) if !data.is_null() => Some(data.clone()),
        _ if json.is_null() => None,
        _ => Some(json),
    }
}

/// Fetches prefill data for `form_id`. Network failures, non-success
/// statuses and unparsable bodies all mean "no prefill".
pub async fn fetch_prefill(http: &dyn HttpClient, config: &FormsConfig, form_id: &str, search: &str) -> Option<Value> {
    if form_id.is_empty() {
        return None;
    }
    let url = config.externalize(&format!("/adobe/forms/af/data/{form_id}{search}"));
    let response = match http.get(&url).await {
        Ok(response) => response,
        Err(e) => {
            warn!("Prefill for '{}' unavailable: {}", form_id, e);
            return None;
        }
    };
    if !response.is_success() {
        warn!("Prefill request {} returned status {}", url, response.status);
        return None;
    }
    match response.json() {
        Ok(json) => {
            debug!("Prefill data received for '{}'", form_id);
            extract_prefill(json)
        }
        Err(e) => {
            warn!("Prefill response for '{}' is not JSON: {}", form_id, e);
            None
        }
    }
}
