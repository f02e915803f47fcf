//! Resource classification.
//!
//! Maps a request path to exactly one resource class. Categories overlap
//! (a business listing also lives under a data folder), so the checks run
//! in a fixed order:
//!
//! 1. Critical allow-list
//! 2. Business data
//! 3. Generic API/data
//! 4. Image
//! 5. Static asset
//! 6. Anything else is a dynamic page

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::Partition;
use crate::config::AppConfig;

static STATIC_EXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(html|css|js|xml|woff2?|ttf|eot|json|txt)$").expect("static extension pattern is valid")
});

static IMAGE_EXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(png|jpe?g|gif|webp|avif|svg|ico)$").expect("image extension pattern is valid"));

const API_MARKERS: &[&str] = &["/data/", "/datos/", "/api/", "/negocios/"];

/// Category a request falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
    Static,
    Image,
    Api,
    Business,
    Dynamic,
}

impl ResourceClass {
    /// Partition that stores entries of this class.
    pub fn partition(self) -> Partition {
        match self {
            ResourceClass::Static => Partition::Static,
            ResourceClass::Image => Partition::Assets,
            ResourceClass::Api => Partition::Api,
            ResourceClass::Business => Partition::Business,
            ResourceClass::Dynamic => Partition::Dynamic,
        }
    }
}

/// Classifier output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub class: ResourceClass,
    /// On the critical allow-list: precached, never evicted, served cache-first.
    pub critical: bool,
}

/// Which site instance a path belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AppContext {
    Locality(String),
    Selector,
}

impl AppContext {
    pub fn locality(&self) -> Option<&str> {
        match self {
            AppContext::Locality(name) => Some(name),
            AppContext::Selector => None,
        }
    }
}

impl fmt::Display for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppContext::Locality(name) => f.write_str(name),
            AppContext::Selector => f.write_str("selector"),
        }
    }
}

/// Percent-encode a path the way it appears in a parsed request URL.
fn encode_path(path: &str) -> String {
    match Url::parse("http://localhost/") {
        Ok(mut u) => {
            u.set_path(path);
            u.path().to_string()
        }
        Err(_) => path.to_string(),
    }
}

/// Deterministic, side-effect-free request classifier.
#[derive(Debug, Clone)]
pub struct Classifier {
    critical: HashSet<String>,
    business_markers: Vec<String>,
    localities: Vec<String>,
}

impl Classifier {
    pub fn new(config: &AppConfig) -> Self {
        let critical = config
            .critical_resources
            .iter()
            .map(|p| encode_path(&config.full_path(p)))
            .collect();

        let business_markers = config
            .business_keywords
            .iter()
            .flat_map(|k| {
                let raw = format!("/{k}");
                let encoded = encode_path(&raw);
                if encoded == raw { vec![raw] } else { vec![raw, encoded] }
            })
            .collect();

        Self { critical, business_markers, localities: config.localities.clone() }
    }

    pub fn classify(&self, path: &str) -> Classification {
        if self.is_critical(path) {
            let class = if is_image(path) { ResourceClass::Image } else { ResourceClass::Static };
            return Classification { class, critical: true };
        }

        let class = if self.is_business_data(path) {
            ResourceClass::Business
        } else if is_api(path) {
            ResourceClass::Api
        } else if is_image(path) {
            ResourceClass::Image
        } else if is_static_asset(path) {
            ResourceClass::Static
        } else {
            ResourceClass::Dynamic
        };

        Classification { class, critical: false }
    }

    pub fn is_critical(&self, path: &str) -> bool {
        self.critical.contains(path)
    }

    /// Critical check for a full URL string (storage keys are URLs).
    pub fn is_critical_url(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(u) => self.is_critical(u.path()),
            Err(_) => self.is_critical(url),
        }
    }

    pub fn is_business_data(&self, path: &str) -> bool {
        self.business_markers.iter().any(|m| path.contains(m.as_str()))
    }

    /// Locality a path belongs to, or the selector page.
    pub fn app_context(&self, path: &str) -> AppContext {
        for locality in &self.localities {
            if path.contains(&format!("/{locality}/")) || path.contains(&format!("/{locality}.html")) {
                return AppContext::Locality(locality.clone());
            }
        }

        if let Some(first) = path.split('/').find(|part| !part.is_empty())
            && self.localities.iter().any(|l| l == first)
        {
            return AppContext::Locality(first.to_string());
        }

        AppContext::Selector
    }

    pub fn is_locality(&self, name: &str) -> bool {
        self.localities.iter().any(|l| l == name)
    }
}

pub fn is_api(path: &str) -> bool {
    API_MARKERS.iter().any(|m| path.contains(m))
}

pub fn is_image(path: &str) -> bool {
    IMAGE_EXT.is_match(path)
}

pub fn is_static_asset(path: &str) -> bool {
    STATIC_EXT.is_match(path) || path.contains("/manifest.json")
}
