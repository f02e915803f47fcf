//! Offline fallback responses.

use std::collections::BTreeMap;

use bytes::Bytes;
use url::Url;

use barrio_core::ResourceClass;

use crate::engine::{CacheEngine, ResponseSource, SiteResponse};

pub const OFFLINE_HTML: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <title>Modo Offline</title>
    <style>body{font-family: Arial, sans-serif; text-align: center; padding: 50px;}</style>
  </head>
  <body>
    <h1>Estás offline</h1>
    <p>Algunas funciones pueden no estar disponibles.</p>
    <p>Revisa tu conexión a internet.</p>
  </body>
</html>
"#;

pub const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="200" viewBox="0 0 200 200"><rect width="200" height="200" fill="#eeeeee"/><text x="100" y="105" font-family="Arial, sans-serif" font-size="14" text-anchor="middle" fill="#888888">Imagen no disponible</text></svg>"##;

const DATA_OFFLINE_MESSAGE: &str = "No se pueden cargar los datos en este momento";

/// Shape of the fallback a failed request gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
    /// Offline HTML page.
    Document,
    /// JSON error envelope.
    Data,
    /// Placeholder image.
    Image,
    /// Plain 503.
    Generic,
}

impl FallbackKind {
    pub fn for_request(url: &Url, navigate: bool, class: ResourceClass) -> Self {
        let path = url.path();
        if navigate || path.ends_with(".html") || path.ends_with('/') {
            return FallbackKind::Document;
        }
        match class {
            ResourceClass::Image => FallbackKind::Image,
            ResourceClass::Api | ResourceClass::Business => FallbackKind::Data,
            ResourceClass::Static | ResourceClass::Dynamic => FallbackKind::Generic,
        }
    }
}

fn built_in(url: &Url, status: u16, content_type: &str, body: impl Into<Bytes>) -> SiteResponse {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), content_type.to_string());
    SiteResponse { url: url.to_string(), status, headers, body: body.into(), source: ResponseSource::Fallback }
}

impl CacheEngine {
    /// Minimal valid response for a request that could not be served.
    pub async fn fallback(&self, kind: FallbackKind, url: &Url) -> SiteResponse {
        match kind {
            FallbackKind::Document => match self.cached_site_asset(&self.config().offline_page).await {
                Some(page) => page,
                None => built_in(url, 503, "text/html; charset=utf-8", OFFLINE_HTML),
            },
            FallbackKind::Data => {
                let body = serde_json::json!({
                    "error": "offline",
                    "message": DATA_OFFLINE_MESSAGE,
                    "timestamp": self.now_ms(),
                });
                built_in(url, 503, "application/json", body.to_string())
            }
            FallbackKind::Image => match self.cached_site_asset(&self.config().fallback_image).await {
                Some(image) => image,
                None => built_in(url, 404, "image/svg+xml", PLACEHOLDER_SVG),
            },
            FallbackKind::Generic => built_in(url, 503, "text/plain; charset=utf-8", "Recurso no disponible"),
        }
    }

    /// A site asset from any current partition, marked as a fallback.
    async fn cached_site_asset(&self, path: &str) -> Option<SiteResponse> {
        let url = self.site_url(path).ok()?;
        match self.db().match_any(&self.config().current_partition_names(), url.as_str()).await {
            Ok(entry) => entry.map(|e| SiteResponse::from_entry(e, ResponseSource::Fallback)),
            Err(e) => {
                tracing::warn!(path, error = %e, "fallback asset lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::harness;
    use barrio_core::{CacheEntry, Partition};

    fn url(path: &str) -> Url {
        Url::parse("https://www.tubarrioaunclik.com").unwrap().join(path).unwrap()
    }

    #[test]
    fn test_kind_for_request() {
        assert_eq!(FallbackKind::for_request(&url("/castelar/"), false, ResourceClass::Dynamic), FallbackKind::Document);
        assert_eq!(FallbackKind::for_request(&url("/castelar/comunidad"), true, ResourceClass::Dynamic), FallbackKind::Document);
        assert_eq!(FallbackKind::for_request(&url("/a/data/x.json"), false, ResourceClass::Business), FallbackKind::Data);
        assert_eq!(FallbackKind::for_request(&url("/img/x.png"), false, ResourceClass::Image), FallbackKind::Image);
        assert_eq!(FallbackKind::for_request(&url("/shared/js/x.js"), false, ResourceClass::Static), FallbackKind::Generic);
    }

    #[tokio::test]
    async fn test_data_fallback_envelope() {
        let h = harness().await;
        let response = h.engine.fallback(FallbackKind::Data, &url("/castelar/data/farmacias.json")).await;

        assert_eq!(response.status, 503);
        assert_eq!(response.source, ResponseSource::Fallback);
        assert_eq!(response.content_type(), Some("application/json"));
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["error"], "offline");
        assert!(body["timestamp"].is_i64());
    }

    #[tokio::test]
    async fn test_document_fallback_built_in_and_cached() {
        let h = harness().await;
        let target = url("/castelar/comunidad.html");

        let built_in = h.engine.fallback(FallbackKind::Document, &target).await;
        assert_eq!(built_in.status, 503);
        assert!(String::from_utf8_lossy(&built_in.body).contains("Modo Offline"));

        let offline = CacheEntry {
            url: "https://www.tubarrioaunclik.com/shared/offline.html".into(),
            status: 200,
            headers: BTreeMap::new(),
            body: b"<p>offline</p>".to_vec(),
            inserted_at: 1,
        };
        h.engine.db().put(&h.engine.partition_name(Partition::Static), &offline).await.unwrap();

        let cached = h.engine.fallback(FallbackKind::Document, &target).await;
        assert_eq!(cached.status, 200);
        assert_eq!(cached.body, Bytes::from_static(b"<p>offline</p>"));
        assert_eq!(cached.source, ResponseSource::Fallback);
    }

    #[tokio::test]
    async fn test_generic_fallback() {
        let h = harness().await;
        let response = h.engine.fallback(FallbackKind::Generic, &url("/shared/js/x.js")).await;
        assert_eq!(response.status, 503);
        assert_eq!(response.body, Bytes::from_static(b"Recurso no disponible"));
    }
}
