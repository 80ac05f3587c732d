use crate::error::FormError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Messages shown for native constraint violations; `$0` is replaced by the
/// violated constraint value.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ErrorMessages {
    pub required: String,
    pub pattern: String,
    pub minimum: String,
    pub maximum: String,
    pub min_length: String,
    pub max_length: String,
}

impl Default for ErrorMessages {
    fn default() -> Self {
        Self {
            required: "Please fill in this field.".to_string(),
            pattern: "Specify the value in allowed format : $0.".to_string(),
            minimum: "Value must be greater than or equal to $0.".to_string(),
            maximum: "Value must be less than or equal to $0.".to_string(),
            min_length: "Please lengthen this text to $0 characters or more.".to_string(),
            max_length: "Please shorten this text to $0 characters or less.".to_string(),
        }
    }
}

impl ErrorMessages {
    /// Message for a violation key (`required`, `pattern`, `minLength`, ...).
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "required" => Some(&self.required),
            "pattern" => Some(&self.pattern),
            "minimum" => Some(&self.minimum),
            "maximum" => Some(&self.maximum),
            "minLength" => Some(&self.min_length),
            "maxLength" => Some(&self.max_length),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct FormsConfig {
    /// Prefix for form actions and service calls (prefill, submit).
    pub submit_base_url: Option<String>,
    /// Base URL for spreadsheet-backed submissions.
    pub submission_service: String,
    /// Run form initialization on a background task when possible.
    pub use_worker: bool,
    pub log_level: Option<String>,
    pub error_messages: ErrorMessages,
    /// Host suffixes allowed to serve drop-down options by URL.
    pub remote_option_hosts: Vec<String>,
    pub submit_error_message: String,
}

impl Default for FormsConfig {
    fn default() -> Self {
        Self {
            submit_base_url: None,
            submission_service: "https://forms.adobe.com/adobe/forms/af/submit/".to_string(),
            use_worker: true,
            log_level: None,
            error_messages: ErrorMessages::default(),
            remote_option_hosts: vec![
                "hlx.page".to_string(),
                "hlx.live".to_string(),
                "aem.page".to_string(),
                "aem.live".to_string(),
            ],
            submit_error_message: "Some error occurred while submitting the form".to_string(),
        }
    }
}

impl FormsConfig {
    /// Loads YAML (`.yaml`/`.yml`) or JSON (`.json`) configuration.
    pub fn load(path: &Path) -> Result<Self, FormError> {
        debug!("Loading forms config from: {:?}", path);
        if !path.exists() {
            return Err(FormError::Config(format!("file not found: {}", path.display())));
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| FormError::Config(format!("error reading {}: {}", path.display(), e)))?;

        match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => {
                debug!("Parsing as YAML");
                serde_yaml::from_str(&contents).map_err(|e| FormError::Config(e.to_string()))
            }
            Some("json") => {
                debug!("Parsing as JSON");
                serde_json::from_str(&contents).map_err(|e| FormError::Config(e.to_string()))
            }
            other => Err(FormError::Config(format!(
                "unsupported configuration format: {:?}",
                other
            ))),
        }
    }

    pub fn externalize(&self, path: &str) -> String {
        crate::util::externalize(self.submit_base_url.as_deref(), path)
    }

    pub fn allows_option_host(&self, host: &str) -> bool {
        self.remote_option_hosts.iter().any(|suffix| host.ends_with(suffix.as_str()))
    }
}
