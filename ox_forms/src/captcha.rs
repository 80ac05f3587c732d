//! reCAPTCHA integration: configuration, script loading and token retrieval.

use crate::dom::Element;
use crate::error::FormError;
use crate::schema::{value_to_string, FieldDescriptor};
use crate::traits::PageHost;
use crate::util::site_page_name;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};

const RECAPTCHA_SCRIPT: &str = "https://www.google.com/recaptcha/api.js";

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptchaConfig {
    #[serde(default)]
    pub site_key: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl CaptchaConfig {
    /// `properties["fd:captcha"].config`, else `value`/`uri`/`version` of the
    /// descriptor itself.
    pub fn from_field(field: &FieldDescriptor) -> Self {
        let configured = field
            .property("fd:captcha")
            .and_then(|c| c.get("config"))
            .and_then(|c| serde_json::from_value::<CaptchaConfig>(c.clone()).ok());
        if let Some(config) = configured {
            return config;
        }
        let text = |v: Option<&Value>| v.map(value_to_string).filter(|s| !s.is_empty());
        CaptchaConfig {
            site_key: text(field.value.as_ref()),
            uri: text(field.extra.get("uri")),
            version: text(field.extra.get("version")),
        }
    }

    pub fn is_enterprise(&self) -> bool {
        self.version.as_deref() == Some("enterprise")
    }
}

/// Executes the captcha challenge for a site key and action.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn execute(&self, site_key: &str, action: &str) -> Result<String, FormError>;
}

/// Token source for hosts without a captcha provider.
#[derive(Default)]
pub struct UnavailableTokenSource;

#[async_trait]
impl TokenSource for UnavailableTokenSource {
    async fn execute(&self, _site_key: &str, action: &str) -> Result<String, FormError> {
        Err(FormError::CaptchaUnavailable(format!(
            "no captcha provider for action '{action}'"
        )))
    }
}

pub struct ReCaptcha {
    config: CaptchaConfig,
    id: String,
    name: String,
    form_name: String,
    tokens: Arc<dyn TokenSource>,
    script: Mutex<Option<String>>,
}

impl ReCaptcha {
    pub fn new(field: &FieldDescriptor, tokens: Arc<dyn TokenSource>) -> Self {
        let page = field
            .property("fd:path")
            .and_then(Value::as_str);
        Self {
            config: CaptchaConfig::from_field(field),
            id: field.id.clone(),
            name: field.name_or_empty().to_string(),
            form_name: site_page_name(page),
            tokens,
            script: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &CaptchaConfig {
        &self.config
    }

    /// Script URL requested by [`load_captcha`](Self::load_captcha), if any.
    pub fn script_url(&self) -> Option<String> {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Action reported with enterprise tokens.
    pub fn submit_action(&self) -> String {
        if self.config.is_enterprise() {
            format!("submit_{}_{}", self.form_name, self.name)
        } else {
            "submit".to_string()
        }
    }

    fn script_for(&self, site_key: &str) -> String {
        match (&self.config.uri, self.config.is_enterprise()) {
            (Some(uri), true) => format!("{uri}?render={site_key}"),
            _ => format!("{RECAPTCHA_SCRIPT}?render={site_key}"),
        }
    }

    /// Prepares the captcha for `form`. A missing site key or submit button is
    /// reported to the author through the page host.
    pub fn load_captcha(&self, form: &Element, page: &dyn PageHost) -> Result<(), FormError> {
        let Some(site_key) = self.config.site_key.as_deref() else {
            warn!("Captcha configuration in missing.");
            page.alert("Captcha can not be loaded. Captcha configuration in missing.");
            return Err(FormError::CaptchaUnavailable("missing site key".to_string()));
        };
        let submit = form.query(|e| e.is("button") && e.attr("type").as_deref() == Some("submit"));
        if submit.is_none() {
            warn!("Captcha can not be loaded. Submit button is missing.");
            page.alert("Captcha can not be loaded. Add Submit button.");
            return Err(FormError::CaptchaUnavailable("missing submit button".to_string()));
        }
        let url = self.script_for(site_key);
        debug!("Loading captcha script {}", url);
        *self.script.lock().unwrap_or_else(PoisonError::into_inner) = Some(url);
        Ok(())
    }

    /// Fetches a token; `None` without a site key or when the provider fails.
    pub async fn get_token(&self) -> Option<String> {
        let site_key = self.config.site_key.as_deref()?;
        match self.tokens.execute(site_key, &self.submit_action()).await {
            Ok(token) => Some(token),
            Err(e) => {
                warn!("Captcha token unavailable: {}", e);
                None
            }
        }
    }
}
