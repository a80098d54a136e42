use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Deserialize;

use crate::content::SeoPolicy;
use crate::refine::PromptSet;
use crate::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::store::LoadPolicy;

pub const ENV_PREFIX: &str = "REFINER";
pub const DEFAULT_CONFIG_FILE: &str = "refiner.toml";

const FOCUS_KEYWORD_KEY: &str = "_yoast_wpseo_focuskw";

/// Which flavour of the job to run. Picks pagination, prompt wording and the
/// SEO metadata keys unless those are set explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Single unpaginated listing, title and description metadata only.
    #[default]
    Classic,
    /// Paginated listing, focus keyword written alongside title and description.
    Focus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub variant: Variant,
    pub run: RunSettings,
    pub catalog: CatalogSettings,
    pub refiner: RefinerSettings,
    pub seo: SeoSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub preview: bool,
    pub limit: Option<usize>,
    pub item_delay_ms: u64,
    pub max_retries: u32,
    pub checkpoint_file: PathBuf,
    pub audit_file: PathBuf,
    pub strict_stores: bool,
    pub show_progress: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            preview: false,
            limit: None,
            item_delay_ms: 1000,
            max_retries: DEFAULT_MAX_ATTEMPTS,
            checkpoint_file: PathBuf::from("processed_items.json"),
            audit_file: PathBuf::from("update_logs.json"),
            strict_stores: false,
            show_progress: true,
        }
    }
}

impl RunSettings {
    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_item_delay(self.max_retries, self.item_delay())
    }

    pub fn load_policy(&self) -> LoadPolicy {
        if self.strict_stores {
            LoadPolicy::Strict
        } else {
            LoadPolicy::Lenient
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub base_url: String,
    /// Base64 `user:secret` for HTTP basic auth.
    pub auth: Option<String>,
    /// Overrides the variant's choice when set.
    pub paginate: Option<bool>,
    pub per_page: u32,
    pub page_delay_ms: u64,
    pub list_timeout_secs: u64,
    pub update_timeout_secs: u64,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            base_url: "https://wk-reifen.de/wp-json/wc/v3".to_string(),
            auth: None,
            paginate: None,
            per_page: 100,
            page_delay_ms: 500,
            list_timeout_secs: 60,
            update_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefinerSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_secs: u64,
    /// Replaces the variant's built-in prompts when set.
    pub prompts: Option<PromptSet>,
}

impl Default for RefinerSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
            max_tokens: 150,
            temperature: 0.7,
            timeout_secs: 60,
            prompts: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SeoSettings {
    pub title_suffix: String,
    pub title_key: String,
    pub description_key: String,
    /// Overrides the variant's choice when set; an empty string disables it.
    pub focus_keyword_key: Option<String>,
}

impl Default for SeoSettings {
    fn default() -> Self {
        Self {
            title_suffix: " - WK Reifen".to_string(),
            title_key: "_yoast_wpseo_title".to_string(),
            description_key: "_yoast_wpseo_metadesc".to_string(),
            focus_keyword_key: None,
        }
    }
}

impl Settings {
    /// Defaults, then the optional config file, then `REFINER__*` variables.
    /// Service secrets fall back to `WOOCOMMERCE_AUTH` and `OPENAI_API_KEY`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (file, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        let raw = ::config::Config::builder()
            .add_source(::config::File::from(file.as_path()).required(required))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to read configuration from {}", file.display()))?;
        let mut settings: Settings = raw
            .try_deserialize()
            .context("invalid configuration")?;
        settings.fill_secrets_from(|name| std::env::var(name).ok());
        Ok(settings)
    }

    fn fill_secrets_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.catalog.auth.is_none() {
            self.catalog.auth = lookup("WOOCOMMERCE_AUTH");
        }
        if self.refiner.api_key.is_none() {
            self.refiner.api_key = lookup("OPENAI_API_KEY");
        }
    }

    pub fn paginate(&self) -> bool {
        self.catalog
            .paginate
            .unwrap_or(self.variant == Variant::Focus)
    }

    pub fn prompts(&self) -> PromptSet {
        self.refiner
            .prompts
            .clone()
            .unwrap_or_else(|| PromptSet::for_variant(self.variant))
    }

    pub fn seo_policy(&self) -> SeoPolicy {
        let focus_keyword_key = match &self.seo.focus_keyword_key {
            Some(key) if key.is_empty() => None,
            Some(key) => Some(key.clone()),
            None => (self.variant == Variant::Focus).then(|| FOCUS_KEYWORD_KEY.to_string()),
        };
        SeoPolicy {
            title_suffix: self.seo.title_suffix.clone(),
            title_key: self.seo.title_key.clone(),
            description_key: self.seo.description_key.clone(),
            focus_keyword_key,
        }
    }
}
