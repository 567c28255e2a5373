use url::Url;

/// Query parameters the protocol reserves for list filtering. Document URLs
/// must not carry them.
pub const RESERVED_QUERY_PARAMS: &[&str] = &[
    "startdate",
    "enddate",
    "listformat",
    "subject",
    "predicate",
    "object",
];

/// Returns the reserved parameter names present in the URL's query, in the
/// order they appear
pub fn reserved_params(url: &Url) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for (key, _) in url.query_pairs() {
        let key = key.to_lowercase();
        if RESERVED_QUERY_PARAMS.contains(&key.as_str()) && !found.contains(&key) {
            found.push(key);
        }
    }
    found
}
