//! Last.fm top-tracks client and the per-artist ranking fetcher.
//!
//! `LastfmClient` talks to the REST API (`artist.getTopTracks`).
//! `RankingFetcher` wraps any `RankingSource` and collapses per-artist
//! failures into an empty ranking, counting them for the run summary.

use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::LastfmConfig;
use crate::error::LastfmError;
use crate::models::RankedTitle;
use crate::rate_limiter::RateLimiter;

const API_ROOT: &str = "https://ws.audioscrobbler.com/2.0/";
const USER_AGENT: &str = concat!("navidrome-popularity/", env!("CARGO_PKG_VERSION"));

/// Last.fm asks clients to stay below ~5 requests per second.
const MIN_REQUEST_INTERVAL_MS: u64 = 200;

// Last.fm error codes (https://www.last.fm/api/errorcodes)
const ERR_INVALID_PARAMETERS: i64 = 6;
const ERR_INVALID_API_KEY: i64 = 10;
const ERR_SERVICE_OFFLINE: i64 = 11;
const ERR_TEMPORARY: i64 = 16;
const ERR_SUSPENDED_API_KEY: i64 = 26;
const ERR_RATE_LIMIT_EXCEEDED: i64 = 29;

// ============================================================================
// Ranking Source
// ============================================================================

/// A remote popularity ranking, queried per artist.
pub trait RankingSource: Sync {
    /// Check credentials once before any fetching.
    fn validate(&self) -> Result<(), LastfmError>;

    /// Top titles for `artist`, most popular first, at most `limit` entries.
    fn top_tracks(&self, artist: &str, limit: u32) -> Result<Vec<RankedTitle>, LastfmError>;
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiError {
    error: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct TopTracksResponse {
    toptracks: TopTracks,
}

#[derive(Debug, Deserialize)]
struct TopTracks {
    #[serde(default)]
    track: OneOrMany<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    name: String,
}

/// Last.fm returns a bare object instead of an array for single results.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(v) => v,
            OneOrMany::One(t) => vec![t],
        }
    }
}

/// Map an API error payload to a typed error. `artist` is set for
/// per-artist calls, where "invalid parameters" means the artist is unknown.
fn classify_api_error(err: ApiError, artist: Option<&str>) -> LastfmError {
    match (err.error, artist) {
        (ERR_INVALID_API_KEY | ERR_SUSPENDED_API_KEY, _) => LastfmError::InvalidCredentials(err.message),
        (ERR_INVALID_PARAMETERS, Some(artist)) => LastfmError::ArtistNotFound(artist.to_string()),
        (code, _) => LastfmError::Api {
            code,
            message: err.message,
        },
    }
}

/// Whether a reply asks the client to slow down: HTTP 429, a server error,
/// or one of the API's temporary error codes.
fn is_throttled(status: u16, body: &str) -> bool {
    if status == 429 || status >= 500 {
        return true;
    }
    serde_json::from_str::<ApiError>(body)
        .map(|err| matches!(err.error, ERR_SERVICE_OFFLINE | ERR_TEMPORARY | ERR_RATE_LIMIT_EXCEEDED))
        .unwrap_or(false)
}

/// Parse an `artist.getTopTracks` body. Ranks are list positions, so they
/// are contiguous from 1 regardless of what the payload claims.
pub fn parse_top_tracks(body: &str, artist: &str, limit: u32) -> Result<Vec<RankedTitle>, LastfmError> {
    if let Ok(err) = serde_json::from_str::<ApiError>(body) {
        return Err(classify_api_error(err, Some(artist)));
    }

    let response: TopTracksResponse =
        serde_json::from_str(body).map_err(|e| LastfmError::Decode(e.to_string()))?;

    let titles = response
        .toptracks
        .track
        .into_vec()
        .into_iter()
        .map(|t| t.name)
        .filter(|name| !name.is_empty())
        .take(limit as usize);

    Ok(RankedTitle::from_ordered(titles))
}

// ============================================================================
// Client
// ============================================================================

pub struct LastfmClient {
    config: LastfmConfig,
    api_root: String,
    agent: ureq::Agent,
    limiter: Mutex<RateLimiter>,
}

impl LastfmClient {
    /// Fails immediately when either credential is missing.
    pub fn new(config: LastfmConfig) -> Result<Self, LastfmError> {
        Self::with_api_root(config, API_ROOT)
    }

    pub fn with_api_root(config: LastfmConfig, api_root: &str) -> Result<Self, LastfmError> {
        if !config.is_complete() {
            return Err(LastfmError::MissingCredentials);
        }
        Ok(Self {
            config,
            api_root: api_root.to_string(),
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(20))
                .user_agent(USER_AGENT)
                .build(),
            limiter: Mutex::new(RateLimiter::from_millis("Last.fm", MIN_REQUEST_INTERVAL_MS)),
        })
    }

    /// GET with the rate limiter applied; returns the body for both success
    /// and HTTP error statuses, since Last.fm puts error payloads in both.
    fn get(&self, params: &[(&str, &str)]) -> Result<String, LastfmError> {
        self.limiter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .wait_if_needed();

        let mut request = self
            .agent
            .get(&self.api_root)
            .query("api_key", &self.config.api_key)
            .query("format", "json");
        for (key, value) in params {
            request = request.query(key, value);
        }

        let result = match request.call() {
            Ok(response) => {
                let status = response.status();
                response
                    .into_string()
                    .map(|body| (status, body))
                    .map_err(|e| LastfmError::Transport(e.to_string()))
            }
            Err(ureq::Error::Status(code, response)) => match response.into_string() {
                Ok(body) if !body.is_empty() => Ok((code, body)),
                _ => Err(LastfmError::Transport(format!("HTTP status {}", code))),
            },
            Err(e) => Err(LastfmError::Transport(e.to_string())),
        };

        let throttled = match &result {
            Ok((status, body)) => is_throttled(*status, body),
            Err(_) => true,
        };
        let mut limiter = self.limiter.lock().unwrap_or_else(|e| e.into_inner());
        if throttled {
            limiter.report_failure();
        } else {
            limiter.report_success();
        }
        result.map(|(_, body)| body)
    }
}

impl RankingSource for LastfmClient {
    /// A one-item chart query: any call authenticated by the API key will
    /// reject an invalid or suspended key.
    fn validate(&self) -> Result<(), LastfmError> {
        let body = self.get(&[("method", "chart.gettopartists"), ("limit", "1")])?;
        if let Ok(err) = serde_json::from_str::<ApiError>(&body) {
            return Err(classify_api_error(err, None));
        }
        Ok(())
    }

    fn top_tracks(&self, artist: &str, limit: u32) -> Result<Vec<RankedTitle>, LastfmError> {
        let limit_param = limit.to_string();
        let body = self.get(&[
            ("method", "artist.gettoptracks"),
            ("artist", artist),
            ("limit", &limit_param),
        ])?;
        parse_top_tracks(&body, artist, limit)
    }
}

// ============================================================================
// Fetcher
// ============================================================================

/// Per-artist fetch that never fails: not-found and remote errors become an
/// empty ranking and are counted.
pub struct RankingFetcher<'a> {
    source: &'a dyn RankingSource,
    limit: u32,
    empty: AtomicUsize,
    failed: AtomicUsize,
}

impl<'a> RankingFetcher<'a> {
    pub fn new(source: &'a dyn RankingSource, limit: u32) -> Self {
        Self {
            source,
            limit,
            empty: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    pub fn fetch(&self, artist: &str) -> Vec<RankedTitle> {
        match self.source.top_tracks(artist, self.limit) {
            Ok(mut ranked) => {
                ranked.truncate(self.limit as usize);
                if ranked.is_empty() {
                    tracing::debug!("no top tracks for '{}'", artist);
                    self.empty.fetch_add(1, Ordering::Relaxed);
                }
                ranked
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!("skipping '{}': {}", artist, e);
                self.empty.fetch_add(1, Ordering::Relaxed);
                Vec::new()
            }
            Err(e) => {
                tracing::warn!("skipping '{}': {}", artist, e);
                self.empty.fetch_add(1, Ordering::Relaxed);
                self.failed.fetch_add(1, Ordering::Relaxed);
                Vec::new()
            }
        }
    }

    /// Artists that ended with an empty ranking, for any reason.
    pub fn artists_without_ranking(&self) -> usize {
        self.empty.load(Ordering::Relaxed)
    }

    /// Artists whose fetch failed for a reason other than "not found".
    pub fn artists_failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;

    struct FixedSource;

    impl RankingSource for FixedSource {
        fn validate(&self) -> Result<(), LastfmError> {
            Ok(())
        }

        fn top_tracks(&self, artist: &str, _limit: u32) -> Result<Vec<RankedTitle>, LastfmError> {
            match artist {
                "Known" => Ok(RankedTitle::from_ordered(["a", "b", "c"])),
                "Unknown" => Err(LastfmError::ArtistNotFound(artist.to_string())),
                "Quiet" => Ok(Vec::new()),
                _ => Err(LastfmError::Transport("connection reset".into())),
            }
        }
    }

    #[test]
    fn test_parse_top_tracks() {
        let body = r#"{"toptracks":{"track":[
            {"name":"Alpha","playcount":"100","@attr":{"rank":"1"}},
            {"name":"Gamma","playcount":"50","@attr":{"rank":"2"}}
        ],"@attr":{"artist":"Test Artist","page":"1"}}}"#;
        let ranked = parse_top_tracks(body, "Test Artist", 50).unwrap();
        assert_eq!(ranked, RankedTitle::from_ordered(["Alpha", "Gamma"]));
    }

    #[test]
    fn test_parse_top_tracks_single_object_and_limit() {
        let single = r#"{"toptracks":{"track":{"name":"Only"}}}"#;
        assert_eq!(parse_top_tracks(single, "X", 50).unwrap().len(), 1);

        let many = r#"{"toptracks":{"track":[{"name":"a"},{"name":"b"},{"name":"c"}]}}"#;
        let ranked = parse_top_tracks(many, "X", 2).unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[1].rank, 2);

        let empty = r#"{"toptracks":{"track":[],"@attr":{"artist":"X"}}}"#;
        assert!(parse_top_tracks(empty, "X", 50).unwrap().is_empty());
    }

    #[test]
    fn test_parse_top_tracks_errors() {
        let not_found = r#"{"error":6,"message":"The artist you supplied could not be found"}"#;
        assert!(parse_top_tracks(not_found, "Nobody", 50).unwrap_err().is_not_found());

        let bad_key = r#"{"error":10,"message":"Invalid API key"}"#;
        assert!(matches!(
            parse_top_tracks(bad_key, "X", 50),
            Err(LastfmError::InvalidCredentials(_))
        ));

        let busy = r#"{"error":29,"message":"Rate limit exceeded"}"#;
        assert!(matches!(
            parse_top_tracks(busy, "X", 50),
            Err(LastfmError::Api { code: 29, .. })
        ));

        assert!(matches!(
            parse_top_tracks("<html>", "X", 50),
            Err(LastfmError::Decode(_))
        ));
    }

    fn credentials() -> LastfmConfig {
        LastfmConfig::new(Some("key".into()), Some("secret".into()))
    }

    /// Local HTTP server answering one connection per canned reply, in order.
    fn serve(replies: Vec<(&'static str, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for (status, body) in replies {
                let (mut stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
                    line.clear();
                }
                write!(
                    stream,
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                )
                .unwrap();
            }
        });
        format!("http://{}/2.0/", addr)
    }

    fn client_for(root: &str, base_ms: u64) -> LastfmClient {
        let mut client = LastfmClient::with_api_root(credentials(), root).unwrap();
        client.limiter = Mutex::new(RateLimiter::from_millis("test", base_ms));
        client
    }

    fn interval(client: &LastfmClient) -> Duration {
        client.limiter.lock().unwrap().current_interval()
    }

    #[test]
    fn test_is_throttled() {
        assert!(is_throttled(429, ""));
        assert!(is_throttled(503, "<html>"));
        assert!(is_throttled(200, r#"{"error":29,"message":"Rate limit exceeded"}"#));
        assert!(is_throttled(200, r#"{"error":16,"message":"Try again"}"#));
        assert!(is_throttled(200, r#"{"error":11,"message":"Offline"}"#));
        assert!(!is_throttled(200, r#"{"error":6,"message":"Artist not found"}"#));
        assert!(!is_throttled(200, r#"{"toptracks":{"track":[]}}"#));
    }

    #[test]
    fn test_rate_limit_replies_back_off() {
        let body = r#"{"error":29,"message":"Rate limit exceeded"}"#;
        let root = serve(vec![("429 Too Many Requests", body); 3]);
        let client = client_for(&root, 5);

        for _ in 0..3 {
            assert!(matches!(
                client.top_tracks("X", 10),
                Err(LastfmError::Api { code: 29, .. })
            ));
        }
        assert_eq!(interval(&client), Duration::from_millis(40));
    }

    #[test]
    fn test_temporary_error_in_ok_reply_backs_off() {
        let root = serve(vec![("200 OK", r#"{"error":16,"message":"Temporary error"}"#)]);
        let client = client_for(&root, 5);

        assert!(client.top_tracks("X", 10).is_err());
        assert_eq!(interval(&client), Duration::from_millis(10));
    }

    #[test]
    fn test_successful_reply_keeps_base_interval() {
        let root = serve(vec![
            ("200 OK", r#"{"toptracks":{"track":[{"name":"Hit"}]}}"#),
            ("200 OK", r#"{"error":6,"message":"The artist you supplied could not be found"}"#),
        ]);
        let client = client_for(&root, 5);

        assert_eq!(client.top_tracks("X", 10).unwrap(), RankedTitle::from_ordered(["Hit"]));
        assert!(client.top_tracks("Nobody", 10).unwrap_err().is_not_found());
        assert_eq!(interval(&client), Duration::from_millis(5));
    }

    #[test]
    fn test_client_requires_credentials() {
        let missing = LastfmConfig::new(Some("key".into()), None);
        assert!(matches!(
            LastfmClient::new(missing),
            Err(LastfmError::MissingCredentials)
        ));
    }

    #[test]
    fn test_fetcher_collapses_failures() {
        let source = FixedSource;
        let fetcher = RankingFetcher::new(&source, 2);

        assert_eq!(fetcher.fetch("Known").len(), 2);
        assert!(fetcher.fetch("Unknown").is_empty());
        assert!(fetcher.fetch("Quiet").is_empty());
        assert!(fetcher.fetch("Offline").is_empty());

        assert_eq!(fetcher.artists_without_ranking(), 3);
        assert_eq!(fetcher.artists_failed(), 1);
    }
}
