//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (BARRIO_*, nested keys split on `__`)
//! 2. TOML config file (if BARRIO_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! The loaded record is immutable for the lifetime of a worker instance.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::Partition;

mod validation;

pub use validation::ConfigError;

/// Time-to-live per resource category, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TtlConfig {
    pub static_ms: u64,
    pub assets_ms: u64,
    pub api_ms: u64,
    pub business_ms: u64,
    pub dynamic_ms: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            static_ms: 24 * 60 * 60 * 1000,
            assets_ms: 24 * 60 * 60 * 1000,
            api_ms: 2 * 60 * 1000,
            business_ms: 10 * 60 * 1000,
            dynamic_ms: 5 * 60 * 1000,
        }
    }
}

/// Maximum item count per partition. Zero disables enforcement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitConfig {
    pub static_items: usize,
    pub assets_items: usize,
    pub api_items: usize,
    pub business_items: usize,
    pub dynamic_items: usize,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self { static_items: 0, assets_items: 100, api_items: 30, business_items: 50, dynamic_items: 50 }
    }
}

/// Network retry policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt for request-time fetches.
    pub max_retries: u32,
    /// Delay before the first retry; doubles per attempt.
    pub base_delay_ms: u64,
    /// Upper bound for a single backoff delay.
    pub max_delay_ms: u64,
    /// Base delay for install-time precache retries.
    pub precache_base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 1000, max_delay_ms: 5000, precache_base_delay_ms: 500 }
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (BARRIO_*)
/// 2. TOML config file (if BARRIO_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Origin the worker serves, e.g. `https://www.tubarrioaunclik.com`.
    ///
    /// Requests to any other origin are never intercepted.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Path prefix the site is deployed under (`""` at the domain root).
    #[serde(default)]
    pub base_path: String,

    /// Path the worker script is served from. Decides the app context.
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Version tag appended to every partition name.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Path to SQLite cache database.
    ///
    /// Set via BARRIO_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Served localities, in detection order.
    #[serde(default = "default_localities")]
    pub localities: Vec<String>,

    #[serde(default)]
    pub ttl: TtlConfig,

    #[serde(default)]
    pub limits: LimitConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Paths (without base path) that are always precached and never evicted.
    #[serde(default = "default_critical_resources")]
    pub critical_resources: Vec<String>,

    /// Data files precached for a locality context, under `/<locality>/data/`.
    #[serde(default = "default_locality_data_files")]
    pub locality_data_files: Vec<String>,

    /// Pages refreshed by `REFRESH_CONTENT`, under `/<locality>/`.
    #[serde(default = "default_locality_pages")]
    pub locality_pages: Vec<String>,

    /// Path fragments that identify business listing files.
    #[serde(default = "default_business_keywords")]
    pub business_keywords: Vec<String>,

    /// Pages listed per locality in the generated sitemap (`""` is the index).
    #[serde(default = "default_sitemap_pages")]
    pub sitemap_pages: Vec<String>,

    /// Offline document served when a page cannot be fetched.
    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    /// Placeholder served when an image cannot be fetched.
    #[serde(default = "default_fallback_image")]
    pub fallback_image: String,

    /// Activate right after install instead of waiting for old clients.
    #[serde(default = "default_true")]
    pub skip_waiting_on_install: bool,

    /// Messages kept per page inbox; the oldest are dropped past this.
    #[serde(default = "default_inbox_limit")]
    pub inbox_limit: usize,
}

fn default_origin() -> String {
    "https://www.tubarrioaunclik.com".into()
}

fn default_scope() -> String {
    "/sw.js".into()
}

fn default_cache_version() -> String {
    "v60-multi".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./barrio-cache.sqlite")
}

fn default_user_agent() -> String {
    "barrio-sw/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_true() -> bool {
    true
}

fn default_inbox_limit() -> usize {
    200
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn default_localities() -> Vec<String> {
    strings(&["castelar", "moron", "ituzaingo", "ciudadela", "merlo", "haedo", "ramos-mejia"])
}

fn default_critical_resources() -> Vec<String> {
    strings(&[
        "/",
        "/index.html",
        "/manifest.json",
        "/robots.txt",
        "/shared/css/styles.css",
        "/shared/css/fondo.css",
        "/shared/css/negocios.css",
        "/shared/js/main-2.js",
        "/shared/js/install-app.js",
        "/shared/img/icon-192x192.png",
        "/shared/img/icon-512x512.png",
        "/shared/img/icon-abeja-sola.png",
        "/shared/img/fallback-image.png",
    ])
}

const BUSINESS_CATEGORIES: &[&str] = &[
    "panaderias",
    "pastas",
    "verdulerias",
    "fiambrerias",
    "kioscos",
    "mascotas",
    "barberias",
    "ferreterias",
    "tiendas",
    "veterinarias",
    "carnicerias",
    "profesiones",
    "farmacias",
    "cafeterias",
    "talleres",
    "librerias",
    "mates",
    "florerias",
    "comidas",
    "granja",
    "muebles",
    "uñas",
];

fn default_locality_data_files() -> Vec<String> {
    let mut files = vec!["comercios.json".to_string(), "carousel.json".to_string()];
    files.extend(BUSINESS_CATEGORIES.iter().map(|c| format!("{c}.json")));
    files
}

fn default_locality_pages() -> Vec<String> {
    strings(&[
        "index.html",
        "comunidad.html",
        "emprendimientos.html",
        "inscripcion.html",
        "oficios-profeciones.html",
        "offline.html",
    ])
}

fn default_business_keywords() -> Vec<String> {
    let mut keywords = vec!["comercios".to_string(), "negocios".to_string()];
    keywords.extend(BUSINESS_CATEGORIES.iter().map(|c| (*c).to_string()));
    keywords
}

fn default_sitemap_pages() -> Vec<String> {
    strings(&["", "comunidad.html", "emprendimientos.html", "oficios-profesiones.html", "inscripcion.html"])
}

fn default_offline_page() -> String {
    "/shared/offline.html".into()
}

fn default_fallback_image() -> String {
    "/shared/img/fallback-image.png".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            base_path: String::new(),
            scope: default_scope(),
            cache_version: default_cache_version(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            localities: default_localities(),
            ttl: TtlConfig::default(),
            limits: LimitConfig::default(),
            retry: RetryConfig::default(),
            critical_resources: default_critical_resources(),
            locality_data_files: default_locality_data_files(),
            locality_pages: default_locality_pages(),
            business_keywords: default_business_keywords(),
            sitemap_pages: default_sitemap_pages(),
            offline_page: default_offline_page(),
            fallback_image: default_fallback_image(),
            skip_waiting_on_install: true,
            inbox_limit: default_inbox_limit(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Prefix a site path with the deployment base path.
    pub fn full_path(&self, path: &str) -> String {
        if path.starts_with('/') { format!("{}{}", self.base_path, path) } else { format!("{}/{}", self.base_path, path) }
    }

    /// Absolute URL string for a site path.
    pub fn absolute_url(&self, path: &str) -> String {
        format!("{}{}", self.origin.trim_end_matches('/'), self.full_path(path))
    }

    /// Hosting environment label reported to pages.
    pub fn environment(&self) -> &'static str {
        if self.origin.contains("github.io") { "github-pages" } else { "netlify" }
    }

    /// Versioned storage name of a partition, e.g. `business-v60-multi`.
    pub fn partition_name(&self, partition: Partition) -> String {
        partition.versioned(&self.cache_version)
    }

    /// Names of every partition owned by the current version.
    pub fn current_partition_names(&self) -> Vec<String> {
        Partition::ALL.iter().map(|p| self.partition_name(*p)).collect()
    }

    /// Freshness window for a partition's entries.
    pub fn ttl_for(&self, partition: Partition) -> Duration {
        let ms = match partition {
            Partition::Static => self.ttl.static_ms,
            Partition::Assets => self.ttl.assets_ms,
            Partition::Api => self.ttl.api_ms,
            Partition::Business => self.ttl.business_ms,
            Partition::Dynamic => self.ttl.dynamic_ms,
        };
        Duration::from_millis(ms)
    }

    /// Item-count limit for a partition (zero = unbounded).
    pub fn limit_for(&self, partition: Partition) -> usize {
        match partition {
            Partition::Static => self.limits.static_items,
            Partition::Assets => self.limits.assets_items,
            Partition::Api => self.limits.api_items,
            Partition::Business => self.limits.business_items,
            Partition::Dynamic => self.limits.dynamic_items,
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `BARRIO_`
    /// 2. TOML file from `BARRIO_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("BARRIO_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("BARRIO_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.origin, "https://www.tubarrioaunclik.com");
        assert_eq!(config.base_path, "");
        assert_eq!(config.cache_version, "v60-multi");
        assert_eq!(config.db_path, PathBuf::from("./barrio-cache.sqlite"));
        assert_eq!(config.localities.len(), 7);
        assert_eq!(config.locality_data_files.len(), 24);
        assert!(config.skip_waiting_on_install);
    }

    #[test]
    fn test_ttl_and_limits_per_partition() {
        let config = AppConfig::default();
        assert_eq!(config.ttl_for(Partition::Business), Duration::from_secs(600));
        assert_eq!(config.ttl_for(Partition::Api), Duration::from_secs(120));
        assert_eq!(config.ttl_for(Partition::Dynamic), Duration::from_secs(300));
        assert_eq!(config.ttl_for(Partition::Assets), Duration::from_secs(86_400));
        assert_eq!(config.limit_for(Partition::Static), 0);
        assert_eq!(config.limit_for(Partition::Assets), 100);
        assert_eq!(config.limit_for(Partition::Api), 30);
    }

    #[test]
    fn test_full_path_with_base() {
        let config = AppConfig { base_path: "/Zona-Tu-Barrio".into(), ..Default::default() };
        assert_eq!(config.full_path("/index.html"), "/Zona-Tu-Barrio/index.html");
        assert_eq!(config.full_path("shared/offline.html"), "/Zona-Tu-Barrio/shared/offline.html");

        let root = AppConfig::default();
        assert_eq!(root.full_path("/"), "/");
        assert_eq!(root.absolute_url("/castelar/"), "https://www.tubarrioaunclik.com/castelar/");
    }

    #[test]
    fn test_environment_label() {
        let config = AppConfig { origin: "https://someone.github.io".into(), ..Default::default() };
        assert_eq!(config.environment(), "github-pages");
        assert_eq!(AppConfig::default().environment(), "netlify");
    }

    #[test]
    fn test_current_partition_names() {
        let names = AppConfig::default().current_partition_names();
        assert_eq!(
            names,
            vec!["static-v60-multi", "assets-v60-multi", "api-v60-multi", "business-v60-multi", "dynamic-v60-multi"]
        );
    }
}
