use std::{fs::File, io::BufReader, path::Path};

use anyhow::Context as _;

use crate::error::{WallprinterError, WallprinterResult};

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_EDIT_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_GENERATE_MODEL: &str = "imagen-4.0-generate-001";
pub const DEFAULT_UNSPLASH_API_BASE: &str = "https://api.unsplash.com";
pub const DEFAULT_WORKING_SIZE: u32 = 1024;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub edit_model: String,
    pub generate_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsplash_access_key: Option<String>,
    pub unsplash_api_base: String,
    pub working_size: u32,
    pub request_timeout_secs: u64,
    pub transport_retries: usize,
    pub retry_backoff_secs: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            edit_model: DEFAULT_EDIT_MODEL.to_string(),
            generate_model: DEFAULT_GENERATE_MODEL.to_string(),
            unsplash_access_key: None,
            unsplash_api_base: DEFAULT_UNSPLASH_API_BASE.to_string(),
            working_size: DEFAULT_WORKING_SIZE,
            request_timeout_secs: 120,
            transport_retries: 2,
            retry_backoff_secs: 1.0,
        }
    }
}

impl Config {
    /// Defaults, then the optional JSON file, then the process environment.
    pub fn load(path: Option<&Path>) -> WallprinterResult<Self> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> WallprinterResult<Self> {
        let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
        serde_json::from_reader(BufReader::new(f))
            .map_err(|e| WallprinterError::serde(format!("config '{}': {e}", path.display())))
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(key) = get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")) {
            self.gemini_api_key = Some(key);
        }
        if let Some(base) = get("GEMINI_API_BASE") {
            self.gemini_api_base = base;
        }
        if let Some(model) = get("WALLPRINTER_EDIT_MODEL") {
            self.edit_model = model;
        }
        if let Some(model) = get("WALLPRINTER_GENERATE_MODEL") {
            self.generate_model = model;
        }
        if let Some(key) = get("UNSPLASH_ACCESS_KEY") {
            self.unsplash_access_key = Some(key);
        }
        if let Some(base) = get("UNSPLASH_API_BASE") {
            self.unsplash_api_base = base;
        }
        if let Some(size) = get("WALLPRINTER_WORKING_SIZE") {
            match size.parse() {
                Ok(v) => self.working_size = v,
                Err(_) => {
                    tracing::warn!(value = %size, "ignoring unparsable WALLPRINTER_WORKING_SIZE")
                }
            }
        }
    }

    pub fn validate(&self) -> WallprinterResult<()> {
        if !(64..=4096).contains(&self.working_size) {
            return Err(WallprinterError::validation(format!(
                "working_size must be within 64..=4096, got {}",
                self.working_size
            )));
        }
        if self.gemini_api_base.trim().is_empty() {
            return Err(WallprinterError::validation("gemini_api_base must not be empty"));
        }
        if self.unsplash_api_base.trim().is_empty() {
            return Err(WallprinterError::validation(
                "unsplash_api_base must not be empty",
            ));
        }
        if !self.retry_backoff_secs.is_finite() || self.retry_backoff_secs < 0.0 {
            return Err(WallprinterError::validation(
                "retry_backoff_secs must be a non-negative number",
            ));
        }
        Ok(())
    }
}
