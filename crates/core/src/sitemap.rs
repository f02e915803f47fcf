//! sitemap.xml generation for the multi-locality site.

use std::fmt::Write;

use chrono::NaiveDate;
use serde::Serialize;

/// One `<url>` element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SitemapUrl {
    pub loc: String,
    pub changefreq: &'static str,
    pub priority: &'static str,
}

/// URLs listed in the sitemap: the selector page, then every locality × page.
///
/// The first page of the list is treated as the locality index.
pub fn urls(base_url: &str, localities: &[String], pages: &[String]) -> Vec<SitemapUrl> {
    let base = base_url.trim_end_matches('/');
    let mut urls = vec![SitemapUrl { loc: format!("{base}/"), changefreq: "weekly", priority: "1.0" }];

    for locality in localities {
        for (index, page) in pages.iter().enumerate() {
            let loc = if page.is_empty() { format!("{base}/{locality}/") } else { format!("{base}/{locality}/{page}") };
            let (changefreq, priority) = if index == 0 {
                ("daily", "0.9")
            } else if page == "inscripcion.html" {
                ("monthly", "0.8")
            } else {
                ("weekly", "0.8")
            };
            urls.push(SitemapUrl { loc, changefreq, priority });
        }
    }

    urls
}

/// Render the sitemap document with every `lastmod` set to `date`.
pub fn generate(base_url: &str, localities: &[String], pages: &[String], date: NaiveDate) -> String {
    let lastmod = date.format("%Y-%m-%d");
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\"\n        \
         xmlns:xhtml=\"http://www.w3.org/1999/xhtml\">\n",
    );

    for url in urls(base_url, localities, pages) {
        let _ = write!(
            xml,
            "    <url>\n        <loc>{}</loc>\n        <lastmod>{lastmod}</lastmod>\n        \
             <changefreq>{}</changefreq>\n        <priority>{}</priority>\n    </url>\n",
            escape(&url.loc),
            url.changefreq,
            url.priority
        );
    }

    xml.push_str("</urlset>\n");
    xml
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_url_count_and_priorities() {
        let config = AppConfig::default();
        let urls = urls(&config.origin, &config.localities, &config.sitemap_pages);

        assert_eq!(urls.len(), config.localities.len() * config.sitemap_pages.len() + 1);
        assert_eq!(urls[0].loc, "https://www.tubarrioaunclik.com/");
        assert_eq!(urls[0].priority, "1.0");

        let index = &urls[1];
        assert_eq!(index.loc, "https://www.tubarrioaunclik.com/castelar/");
        assert_eq!((index.changefreq, index.priority), ("daily", "0.9"));

        let signup = urls.iter().find(|u| u.loc.ends_with("/castelar/inscripcion.html")).unwrap();
        assert_eq!((signup.changefreq, signup.priority), ("monthly", "0.8"));

        let community = urls.iter().find(|u| u.loc.ends_with("/moron/comunidad.html")).unwrap();
        assert_eq!((community.changefreq, community.priority), ("weekly", "0.8"));
    }

    #[test]
    fn test_generate_document() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let xml = generate("https://e.com/", &["haedo".to_string()], &["".to_string()], date);

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<loc>https://e.com/haedo/</loc>"));
        assert_eq!(xml.matches("<lastmod>2026-03-01</lastmod>").count(), 2);
        assert!(xml.trim_end().ends_with("</urlset>"));
    }
}
