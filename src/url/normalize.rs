use crate::UrlError;
use url::Url;

/// Normalizes a document URL into the form used as a dedup key
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Accept only `http` and `https`
/// 3. Require a host (the parser lowercases it)
/// 4. Remove the fragment
///
/// The path and query are kept as given. OParl identifiers are opaque, so
/// `/bodies/1` and `/bodies/1/` are different documents.
///
/// # Examples
///
/// ```
/// use oparl_validator::url::normalize_url;
///
/// let url = normalize_url("https://API.Example.org/body/1#top").unwrap();
/// assert_eq!(url.as_str(), "https://api.example.org/body/1");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);

    Ok(url)
}

/// Returns true unless the URL is plain `http`
pub fn is_tls(url: &Url) -> bool {
    url.scheme() != "http"
}
