use reqwest::Client;
use std::time::Duration;

const MAX_API_ERROR_CHARS: usize = 200;
const REDACTED: &str = "[REDACTED]";

/// Markers after which a credential value follows.
const SECRET_MARKERS: [&str; 8] = [
    "x-api-key: ",
    "Authorization: Bearer ",
    "authorization: bearer ",
    "api_key=",
    "apiKey=",
    "\"api_key\":\"",
    "\"apiKey\":\"",
    "\"token\":\"",
];

pub fn build_http_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+' | '/' | '=')
}

fn scrub_after_marker(scrubbed: &mut String, marker: &str) {
    let mut search_from = 0;
    while let Some(rel) = scrubbed[search_from..].find(marker) {
        let content_start = search_from + rel + marker.len();
        let token_len: usize = scrubbed[content_start..]
            .chars()
            .take_while(|c| is_secret_char(*c))
            .map(char::len_utf8)
            .sum();

        if token_len == 0 {
            search_from = content_start;
            continue;
        }

        scrubbed.replace_range(content_start..content_start + token_len, REDACTED);
        search_from = content_start + REDACTED.len();
    }
}

/// Redact credentials echoed back by a server and cap the length, so error
/// bodies can be logged and shown.
pub fn sanitize_api_error(input: &str) -> String {
    let mut scrubbed = input.to_string();
    for marker in SECRET_MARKERS {
        scrub_after_marker(&mut scrubbed, marker);
    }
    super::truncate_with_ellipsis(scrubbed.trim(), MAX_API_ERROR_CHARS)
}
