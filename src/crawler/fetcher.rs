//! HTTP fetcher
//!
//! This module handles all HTTP requests of a run:
//! - Building the HTTP client with the configured user agent and timeout
//! - GET requests for documents and list pages, through the cache
//! - HEAD requests for the endpoint probe and file reachability
//! - Decoding gzip and deflate bodies by hand, so the `Content-Encoding`
//!   the server chose stays visible to the protocol checks
//! - Feeding latency and encoding telemetry to the report

use crate::cache::Cache;
use crate::config::CrawlerConfig;
use crate::output::ResultAggregator;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONTENT_DISPOSITION, CONTENT_ENCODING, LAST_MODIFIED};
use reqwest::{Client, Response, StatusCode};
use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Compressions every response must be able to use
pub const SUPPORTED_ENCODINGS: &[&str] = &["gzip", "deflate"];

/// `Accept-Encoding` value sent with every GET
pub const ACCEPT_ENCODING_VALUE: &str = "gzip, deflate";

/// Status code reported for bodies served from the cache
pub const CACHED_STATUS: u16 = 304;

/// Why a fetch produced no body
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to decode {encoding} body from {url}: {reason}")]
    Decode {
        url: String,
        encoding: String,
        reason: String,
    },

    #[error("{url} used unsupported Content-Encoding '{encoding}'")]
    UnsupportedEncoding { url: String, encoding: String },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            Self::Transport { url, .. }
            | Self::Timeout { url }
            | Self::Status { url, .. }
            | Self::Decode { url, .. }
            | Self::UnsupportedEncoding { url, .. } => url,
        }
    }

    /// Describes the failure without the URL, so equal failures merge in
    /// the report
    pub fn summary(&self) -> String {
        match self {
            Self::Transport { .. } => "connection failed".to_string(),
            Self::Timeout { .. } => "request timed out".to_string(),
            Self::Status { status, .. } => format!("HTTP status {}", status),
            Self::Decode { encoding, .. } => format!("{} body could not be decoded", encoding),
            Self::UnsupportedEncoding { encoding, .. } => {
                format!("unsupported Content-Encoding '{}'", encoding)
            }
        }
    }

    fn from_reqwest(url: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Transport {
                url: url.to_string(),
                reason: error.to_string(),
            }
        }
    }
}

/// Response metadata the protocol checks need
#[derive(Debug, Clone, PartialEq)]
pub struct HttpMeta {
    pub status: u16,
    /// `Content-Encoding` of the response, lowercased
    pub content_encoding: Option<String>,
    /// `Accept-Encoding` of the request
    pub requested_encoding: Option<String>,
    pub from_cache: bool,
    pub latency_ms: f64,
}

/// A successfully retrieved body
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub url: String,
    pub body: String,
    pub http: HttpMeta,
}

/// The headers of a HEAD response the file checks look at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadResponse {
    pub status: u16,
    pub last_modified: Option<String>,
    pub content_disposition: Option<String>,
}

/// Builds the HTTP client used for a run
///
/// Automatic decompression stays off (the gzip/deflate features of reqwest
/// are not enabled), redirects are followed.
pub fn build_http_client(config: &CrawlerConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.request_timeout())
        .connect_timeout(config.request_timeout().min(Duration::from_secs(10)))
        .build()
}

/// Fetches documents through the cache and records network telemetry
pub struct DocumentFetcher {
    client: Client,
    cache: Arc<Cache>,
    timeout: Duration,
    telemetry: Option<Arc<ResultAggregator>>,
}

impl DocumentFetcher {
    pub fn new(client: Client, cache: Arc<Cache>, timeout: Duration) -> Self {
        Self {
            client,
            cache,
            timeout,
            telemetry: None,
        }
    }

    /// Reports latency and encodings of every network response
    pub fn with_telemetry(mut self, aggregator: Arc<ResultAggregator>) -> Self {
        self.telemetry = Some(aggregator);
        self
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// Retrieves a document body
    ///
    /// # Request Flow
    ///
    /// 1. Cache hit: return the cached body with status 304, no request
    /// 2. GET with `Accept-Encoding: gzip, deflate` and the run timeout
    /// 3. Status outside 200..400: `FetchError::Status`
    /// 4. Decode the body according to `Content-Encoding`
    /// 5. Store the decoded body in the cache, record telemetry
    pub async fn fetch(&self, url: &str) -> Result<FetchedBody, FetchError> {
        if let Some(body) = self.cache.get(url) {
            tracing::trace!("Cache hit for {}", url);
            return Ok(FetchedBody {
                url: url.to_string(),
                body,
                http: HttpMeta {
                    status: CACHED_STATUS,
                    content_encoding: None,
                    requested_encoding: None,
                    from_cache: true,
                    latency_ms: 0.0,
                },
            });
        }

        let started = Instant::now();
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .header(ACCEPT_ENCODING, ACCEPT_ENCODING_VALUE)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let status = response.status();
        let content_encoding = header_value(&response, CONTENT_ENCODING.as_str())
            .map(|v| v.trim().to_ascii_lowercase());

        if let Some(telemetry) = &self.telemetry {
            telemetry.record_network(latency_ms, content_encoding.as_deref());
        }

        if !is_acceptable(status) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        let decoded = decode_body(url, content_encoding.as_deref(), &bytes)?;
        let body = String::from_utf8(decoded).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            encoding: "utf-8".to_string(),
            reason: e.to_string(),
        })?;

        self.cache.set(url, &body, None);
        tracing::debug!("Fetched {} ({} bytes, {:.0} ms)", url, body.len(), latency_ms);

        Ok(FetchedBody {
            url: url.to_string(),
            body,
            http: HttpMeta {
                status: status.as_u16(),
                content_encoding,
                requested_encoding: Some(ACCEPT_ENCODING_VALUE.to_string()),
                from_cache: false,
                latency_ms,
            },
        })
    }

    /// Issues a HEAD request; statuses outside 200..400 are errors
    pub async fn head(&self, url: &str) -> Result<HeadResponse, FetchError> {
        let response = self
            .client
            .head(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !is_acceptable(status) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(HeadResponse {
            status: status.as_u16(),
            last_modified: header_value(&response, LAST_MODIFIED.as_str()),
            content_disposition: header_value(&response, CONTENT_DISPOSITION.as_str()),
        })
    }

    /// Checks that the endpoint answers HEAD with 200 or 304
    pub async fn probe(&self, url: &str) -> Result<u16, FetchError> {
        let response = self
            .client
            .head(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        match response.status() {
            StatusCode::OK | StatusCode::NOT_MODIFIED => Ok(response.status().as_u16()),
            other => Err(FetchError::Status {
                url: url.to_string(),
                status: other.as_u16(),
            }),
        }
    }
}

fn is_acceptable(status: StatusCode) -> bool {
    (200..400).contains(&status.as_u16())
}

fn header_value(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Undoes the response's content coding
///
/// `deflate` is tried as zlib-wrapped first, as the HTTP standard demands,
/// then as raw deflate, which some servers send instead.
pub fn decode_body(url: &str, encoding: Option<&str>, bytes: &[u8]) -> Result<Vec<u8>, FetchError> {
    let decode_error = |encoding: &str, e: std::io::Error| FetchError::Decode {
        url: url.to_string(),
        encoding: encoding.to_string(),
        reason: e.to_string(),
    };

    match encoding {
        None | Some("identity") => Ok(bytes.to_vec()),
        Some("gzip") | Some("x-gzip") => {
            let mut out = Vec::new();
            GzDecoder::new(bytes)
                .read_to_end(&mut out)
                .map_err(|e| decode_error("gzip", e))?;
            Ok(out)
        }
        Some("deflate") => {
            let mut out = Vec::new();
            if ZlibDecoder::new(bytes).read_to_end(&mut out).is_ok() {
                return Ok(out);
            }
            out.clear();
            DeflateDecoder::new(bytes)
                .read_to_end(&mut out)
                .map_err(|e| decode_error("deflate", e))?;
            Ok(out)
        }
        Some(other) => Err(FetchError::UnsupportedEncoding {
            url: url.to_string(),
            encoding: other.to_string(),
        }),
    }
}
