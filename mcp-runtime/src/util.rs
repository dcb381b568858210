pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

/// Explicit flag value first, then `DEVREV_API_KEY`. Blank values count as
/// unset.
pub fn resolve_api_key(explicit: Option<String>) -> Option<String> {
    non_blank(explicit).or_else(|| non_blank(std::env::var("DEVREV_API_KEY").ok()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}
