use std::sync::LazyLock;

use regex::Regex;
use reqwest::{Client, StatusCode, header::CONTENT_TYPE};
use tracing::debug;
use url::Url;

static ICON_REL_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<link[^>]*rel\s*=\s*["']icon["'][^>]*\shref\s*=\s*["'](.*?)["']"#)
        .expect("ICON_REL_FIRST should compile - this is a bug")
});

static ICON_HREF_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<link[^>]*\shref\s*=\s*["'](.*?)["'][^>]*rel\s*=\s*["']icon["']"#)
        .expect("ICON_HREF_FIRST should compile - this is a bug")
});

/// Origin of `url` as a page url: same scheme, host and port, path `/`.
pub(crate) fn site_root(url: &Url) -> Url {
    let mut root = url.clone();
    root.set_path("/");
    root.set_query(None);
    root.set_fragment(None);
    root
}

/// Look up the `<link rel="icon">` of the HTML page at `page` and confirm the
/// icon is actually served. Any miss along the way is `None`.
pub(crate) async fn fetch_favicon(client: &Client, page: &Url) -> Option<Url> {
    let response = client.get(page.clone()).send().await.ok()?;
    if response.status() != StatusCode::OK || !is_html(&response) {
        debug!(%page, status = %response.status(), "no html page to read an icon from");
        return None;
    }

    let html = response.text().await.ok()?;
    let href = icon_href(&html)?;
    let icon = page.join(href).ok()?;

    let head = client.head(icon.clone()).send().await.ok()?;
    if !head.status().is_success() {
        debug!(%icon, status = %head.status(), "advertised icon is not served");
        return None;
    }
    Some(icon)
}

fn is_html(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|mime| mime.to_ascii_lowercase().contains("html"))
}

fn icon_href(html: &str) -> Option<&str> {
    [&*ICON_REL_FIRST, &*ICON_HREF_FIRST]
        .into_iter()
        .find_map(|pattern| pattern.captures(html))
        .and_then(|captures| captures.get(1))
        .map(|href| href.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_icon_href_in_either_attribute_order() {
        let rel_first = r#"<head><link rel="icon" type="image/png" href="/static/f.png"></head>"#;
        assert_eq!(icon_href(rel_first), Some("/static/f.png"));

        let href_first = r#"<link href='favicon.ico' rel='icon'>"#;
        assert_eq!(icon_href(href_first), Some("favicon.ico"));
    }

    #[test]
    fn ignores_other_links_and_data_attributes() {
        assert_eq!(icon_href(r#"<link rel="stylesheet" href="/a.css">"#), None);
        assert_eq!(icon_href(r#"<link rel="icon" data-href="/x.png">"#), None);
        assert_eq!(icon_href("<html></html>"), None);
    }

    #[test]
    fn site_root_drops_path_and_query() {
        let discovery =
            Url::parse("https://sso.example:8443/o/app/.well-known/openid-configuration?x=1#f")
                .unwrap();
        assert_eq!(site_root(&discovery).as_str(), "https://sso.example:8443/");
    }
}
