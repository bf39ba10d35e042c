use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::{Client, Url};
use uuid::Uuid;

use crate::core::error::{UpdaterError, UpdaterResult};

pub const APP_USER_AGENT: &str = concat!("Launchpad/", env!("CARGO_PKG_VERSION"));

/// Shared client for manifest fetches and artifact downloads.
///
/// `identity` encoding keeps `Content-Length` equal to the bytes we write,
/// which download progress depends on.
pub fn build_http_client(connect_timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .connect_timeout(connect_timeout)
        .build()
}

/// Append `v=<1..=999>` so no CDN or proxy serves a stale manifest or package.
pub fn add_cache_busting_suffix(url: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}v={}", cache_busting_number())
}

fn cache_busting_number() -> u32 {
    (Uuid::new_v4().as_u128() % 999) as u32 + 1
}

/// Last path segment of `url`, used as the on-disk archive name.
pub fn file_name_from_url(url: &str) -> UpdaterResult<String> {
    let parsed = Url::parse(url).map_err(|e| UpdaterError::Download {
        url: url.to_string(),
        reason: format!("invalid URL: {e}"),
    })?;

    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| UpdaterError::Download {
            url: url.to_string(),
            reason: "URL has no file name".into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suffix_value(busted: &str) -> u32 {
        busted.rsplit("v=").next().unwrap().parse().unwrap()
    }

    #[test]
    fn cache_busting_uses_question_mark_without_query() {
        let busted = add_cache_busting_suffix("https://cdn.example.com/config.json");
        assert!(busted.starts_with("https://cdn.example.com/config.json?v="));
    }

    #[test]
    fn cache_busting_appends_to_existing_query() {
        let busted = add_cache_busting_suffix("https://cdn.example.com/config.json?channel=beta");
        assert!(busted.starts_with("https://cdn.example.com/config.json?channel=beta&v="));
    }

    #[test]
    fn cache_busting_number_stays_in_range() {
        for _ in 0..2_000 {
            let value = suffix_value(&add_cache_busting_suffix("https://a/b"));
            assert!((1..=999).contains(&value), "out of range: {value}");
        }
    }

    #[test]
    fn file_name_ignores_query_string() {
        let name = file_name_from_url("https://cdn.example.com/games/alpha/patch-3.7z?token=x").unwrap();
        assert_eq!(name, "patch-3.7z");
    }

    #[test]
    fn file_name_rejects_directory_urls() {
        assert!(file_name_from_url("https://cdn.example.com/games/").is_err());
        assert!(file_name_from_url("not a url").is_err());
    }
}
