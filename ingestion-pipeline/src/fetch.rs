//! Downloads a statute page and stores its article text in the corpus.

use std::{
    net::IpAddr,
    path::{Path, PathBuf},
    time::Instant,
};

use common::error::AppError;
use dom_smoothie::{Article, Readability, TextMode};
use tracing::{info, warn};

pub const DEFAULT_LABOR_LAW_URL: &str = "http://www.gov.cn/banshi/2005-05/25/content_905.htm";
pub const DEFAULT_OUTPUT_FILE: &str = "labor_law_full.txt";

/// Footer markers on gov.cn pages; the statute ends before the first one.
const FOOTER_MARKERS: [&str; 3] = ["【E-mail推荐", "【打印】", "【关闭】"];

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.110 Safari/537.36";

/// Fetches `url`, extracts the readable text and writes it to
/// `corpus_dir/file_name`. Returns the written path.
pub async fn fetch_statute(
    url: &str,
    corpus_dir: &Path,
    file_name: &str,
) -> Result<PathBuf, AppError> {
    let parsed_url =
        url::Url::parse(url).map_err(|_| AppError::Validation("Invalid URL".to_string()))?;
    let host = ensure_fetch_url_allowed(&parsed_url)?;
    if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name == ".." {
        return Err(AppError::Validation(format!(
            "output file name {file_name:?} must be a plain file name"
        )));
    }

    info!(%url, host, "Fetching statute page");
    let now = Instant::now();

    let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
    let raw_content = client
        .get(parsed_url.clone())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let config = dom_smoothie::Config {
        text_mode: TextMode::Formatted,
        ..Default::default()
    };
    let mut readability = Readability::new(raw_content, Some(parsed_url.as_str()), Some(config))?;
    let article: Article = readability.parse()?;
    let text = clean_statute_text(&article.text_content);
    if text.is_empty() {
        return Err(AppError::Processing(format!(
            "no statute text could be extracted from {url}"
        )));
    }

    tokio::fs::create_dir_all(corpus_dir).await?;
    let path = corpus_dir.join(file_name);
    tokio::fs::write(&path, &text).await?;

    info!(
        %url,
        path = %path.display(),
        chars = text.chars().count(),
        elapsed = ?now.elapsed(),
        "Saved statute text"
    );
    Ok(path)
}

/// Trims every line, drops blank ones and cuts the text at the page footer.
pub fn clean_statute_text(raw: &str) -> String {
    raw.lines()
        .take_while(|line| !FOOTER_MARKERS.iter().any(|marker| line.contains(marker)))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn ensure_fetch_url_allowed(url: &url::Url) -> Result<String, AppError> {
    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            warn!(%url, %scheme, "Rejected fetch URL due to unsupported scheme");
            return Err(AppError::Validation(
                "Unsupported URL scheme for fetching".to_string(),
            ));
        }
    }

    let Some(host) = url.host_str() else {
        warn!(%url, "Rejected fetch URL missing host");
        return Err(AppError::Validation(
            "URL is missing a host component".to_string(),
        ));
    };

    if host.eq_ignore_ascii_case("localhost") {
        warn!(%url, host, "Rejected fetch URL to localhost");
        return Err(AppError::Validation(
            "Fetch URL host is not allowed".to_string(),
        ));
    }

    let bare_host = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare_host.parse::<IpAddr>() {
        let is_disallowed = match ip {
            IpAddr::V4(v4) => v4.is_private() || v4.is_link_local(),
            IpAddr::V6(v6) => v6.is_unique_local() || v6.is_unicast_link_local(),
        };

        if ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() || is_disallowed {
            warn!(%url, host, %ip, "Rejected fetch URL pointing to restricted network range");
            return Err(AppError::Validation(
                "Fetch URL host is not allowed".to_string(),
            ));
        }
    }

    Ok(host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleaning_stops_at_footer_and_drops_blank_lines() {
        let raw = "  中华人民共和国劳动法 \n\n第一条 为了保护劳动者的合法权益。\n   \n第二条 适用本法。\n【E-mail推荐】【打印】\n版权所有";
        assert_eq!(
            clean_statute_text(raw),
            "中华人民共和国劳动法\n第一条 为了保护劳动者的合法权益。\n第二条 适用本法。"
        );
    }

    #[test]
    fn cleaning_without_footer_keeps_everything() {
        assert_eq!(clean_statute_text("甲\n乙"), "甲\n乙");
        assert_eq!(clean_statute_text("【关闭】\n甲"), "");
    }

    #[test]
    fn rejects_unsupported_scheme() {
        let url = url::Url::parse("ftp://example.com").expect("url");
        assert!(ensure_fetch_url_allowed(&url).is_err());
    }

    #[test]
    fn rejects_localhost_and_loopback() {
        for raw in ["http://localhost/law.htm", "http://127.0.0.1/law.htm", "http://[::1]/law.htm"] {
            let url = url::Url::parse(raw).expect("url");
            assert!(ensure_fetch_url_allowed(&url).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn rejects_private_ipv4() {
        let url = url::Url::parse("http://192.168.1.10/index.html").expect("url");
        assert!(ensure_fetch_url_allowed(&url).is_err());
    }

    #[test]
    fn allows_the_default_source() {
        let url = url::Url::parse(DEFAULT_LABOR_LAW_URL).expect("url");
        assert_eq!(
            ensure_fetch_url_allowed(&url).expect("allowed"),
            "www.gov.cn"
        );
    }

    #[tokio::test]
    async fn rejects_path_like_output_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = fetch_statute(DEFAULT_LABOR_LAW_URL, dir.path(), "../escape.txt").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
