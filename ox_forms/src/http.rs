use crate::error::FormError;
use async_trait::async_trait;
use log::debug;
use url::Url;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|c| c.contains("application/json"))
            .unwrap_or(false)
    }

    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|c| c.contains("text/html"))
            .unwrap_or(false)
    }

    pub fn json(&self) -> Result<serde_json::Value, FormError> {
        serde_json::from_str(&self.body)
            .map_err(|e| FormError::MalformedDefinition(e.to_string()))
    }
}

/// Outbound GET used for form definitions, prefill data and option lists.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, FormError>;

    /// JSON POST, used by sheet-backed submissions.
    async fn post_json(&self, url: &str, _body: &serde_json::Value) -> Result<HttpResponse, FormError> {
        Err(FormError::network(url, "POST is not supported by this client"))
    }
}

/// `reqwest` backed client. Relative URLs resolve against `origin`.
pub struct ReqwestClient {
    client: reqwest::Client,
    origin: Option<Url>,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            origin: None,
        }
    }

    pub fn with_origin(origin: &str) -> Result<Self, FormError> {
        let origin = Url::parse(origin).map_err(|e| FormError::Config(e.to_string()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            origin: Some(origin),
        })
    }

    fn resolve(&self, url: &str) -> Result<Url, FormError> {
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.origin {
                Some(origin) => origin.join(url).map_err(|e| FormError::network(url, e)),
                None => Err(FormError::network(url, "relative URL without an origin")),
            },
            Err(e) => Err(FormError::network(url, e)),
        }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, FormError> {
        let target = self.resolve(url)?;
        debug!("GET {}", target);
        let response = self
            .client
            .get(target.clone())
            .send()
            .await
            .map_err(|e| FormError::network(target.as_str(), e))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| FormError::network(target.as_str(), e))?;
        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpResponse, FormError> {
        let target = self.resolve(url)?;
        debug!("POST {}", target);
        let response = self
            .client
            .post(target.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| FormError::network(target.as_str(), e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FormError::network(target.as_str(), e))?;
        Ok(HttpResponse {
            status,
            content_type: None,
            body,
        })
    }
}

/// Client for environments without network access: every request fails.
#[derive(Default)]
pub struct OfflineClient;

#[async_trait]
impl HttpClient for OfflineClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, FormError> {
        Err(FormError::network(url, "offline"))
    }
}
