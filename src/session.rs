//! Session identity: the opaque per-visitor token and the source tag.
//!
//! Both values are resolved up front and handed to
//! [`StreamClient::start`](crate::stream::StreamClient::start) in a
//! [`SessionContext`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::client::ClientError;
use crate::options::SecretString;

/// Name of the cookie carrying the visitor token.
pub const COOKIE_NAME: &str = "JSUNPACK_TMP_UID";

/// Source tag used when the page URL names none.
pub const DEFAULT_ORIGIN: &str = "web";

const COOKIE_TTL_DAYS: i64 = 365;

/// Identity attached to every outbound completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    /// Opaque visitor token, used for correlation only
    pub token: SecretString,

    /// Where the visitor came from (`from`/`ref` query parameter)
    pub origin: String,
}

impl SessionContext {
    pub fn new(token: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            token: SecretString::new(token.into()),
            origin: origin.into(),
        }
    }

    /// Resolve the token from `identity` and the origin from `page_url`.
    pub fn for_page(identity: &CookieIdentity, page_url: &str) -> Result<Self, ClientError> {
        Ok(Self {
            token: identity.load_or_generate()?,
            origin: origin_from_url(page_url)?,
        })
    }
}

/// Source tag from a query string: `from`, else `ref`, else `"web"`.
///
/// Empty values count as missing.
///
/// # Example
/// ```
/// use jsunpack::session::origin_from_query;
///
/// assert_eq!(origin_from_query("?ref=twitter"), "twitter");
/// assert_eq!(origin_from_query("from=&ref=hn"), "hn");
/// assert_eq!(origin_from_query(""), "web");
/// ```
pub fn origin_from_query(query: &str) -> String {
    let query = query.strip_prefix('?').unwrap_or(query);
    let first = |key: &str| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty())
    };

    first("from")
        .or_else(|| first("ref"))
        .unwrap_or_else(|| DEFAULT_ORIGIN.to_string())
}

/// Source tag from a full page URL.
pub fn origin_from_url(page_url: &str) -> Result<String, ClientError> {
    let url = url::Url::parse(page_url)
        .map_err(|e| ClientError::Config(format!("invalid page URL {page_url}: {e}")))?;
    Ok(origin_from_query(url.query().unwrap_or_default()))
}

/// Persisted form of the visitor cookie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredCookie {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// File-backed visitor cookie.
///
/// The token is generated once and reused until the cookie expires, one
/// year after it was written.
#[derive(Debug, Clone)]
pub struct CookieIdentity {
    path: PathBuf,
}

impl CookieIdentity {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored cookie. A missing or unreadable cookie is `None`.
    pub fn load(&self) -> Result<Option<StoredCookie>, ClientError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<StoredCookie>(&raw) {
            Ok(cookie) if cookie.name == COOKIE_NAME => Ok(Some(cookie)),
            Ok(cookie) => {
                warn!(name = %cookie.name, "ignoring cookie with unexpected name");
                Ok(None)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt cookie file");
                Ok(None)
            }
        }
    }

    /// Return the stored token, generating and persisting one if needed.
    pub fn load_or_generate(&self) -> Result<SecretString, ClientError> {
        self.load_or_generate_at(Utc::now())
    }

    /// As [`load_or_generate`](Self::load_or_generate), with an explicit clock.
    pub fn load_or_generate_at(&self, now: DateTime<Utc>) -> Result<SecretString, ClientError> {
        if let Some(cookie) = self.load()? {
            if !cookie.is_expired(now) {
                return Ok(SecretString::new(cookie.value));
            }
            debug!(expired_at = %cookie.expires_at, "visitor cookie expired");
        }

        let cookie = StoredCookie {
            name: COOKIE_NAME.to_string(),
            value: Uuid::new_v4().simple().to_string(),
            expires_at: now + Duration::days(COOKIE_TTL_DAYS),
        };
        self.store(&cookie)?;
        debug!(path = %self.path.display(), "generated new visitor token");

        Ok(SecretString::new(cookie.value))
    }

    fn store(&self, cookie: &StoredCookie) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(cookie)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_from_query() {
        assert_eq!(origin_from_query("from=producthunt"), "producthunt");
        assert_eq!(origin_from_query("?ref=x&from=y"), "y");
        assert_eq!(origin_from_query("from=&ref="), "web");
        assert_eq!(origin_from_query("from=a%20b"), "a b");
        assert_eq!(origin_from_query("lang=zh"), "web");
    }

    #[test]
    fn test_origin_from_url() {
        assert_eq!(
            origin_from_url("https://jsunpack.example/?from=wechat").unwrap(),
            "wechat"
        );
        assert_eq!(origin_from_url("https://jsunpack.example/").unwrap(), "web");
        assert!(origin_from_url("not a url").is_err());
    }

    #[test]
    fn test_token_is_generated_once() {
        let dir = tempfile::tempdir().unwrap();
        let identity = CookieIdentity::new(dir.path().join("nested").join("cookie.json"));

        let first = identity.load_or_generate().unwrap();
        let second = identity.load_or_generate().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.expose_secret().len(), 32);

        let stored = identity.load().unwrap().unwrap();
        assert_eq!(stored.name, COOKIE_NAME);
        assert_eq!(stored.value, first.expose_secret());
    }

    #[test]
    fn test_expired_token_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let identity = CookieIdentity::new(dir.path().join("cookie.json"));
        let now = Utc::now();

        let first = identity.load_or_generate_at(now).unwrap();
        let still_valid = identity
            .load_or_generate_at(now + Duration::days(364))
            .unwrap();
        let renewed = identity
            .load_or_generate_at(now + Duration::days(366))
            .unwrap();

        assert_eq!(first, still_valid);
        assert_ne!(first, renewed);
    }

    #[test]
    fn test_corrupt_cookie_is_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookie.json");
        std::fs::write(&path, "{not json").unwrap();

        let identity = CookieIdentity::new(&path);
        assert!(identity.load().unwrap().is_none());

        let token = identity.load_or_generate().unwrap();
        assert_eq!(identity.load().unwrap().unwrap().value, token.expose_secret());
    }

    #[test]
    fn test_for_page() {
        let dir = tempfile::tempdir().unwrap();
        let identity = CookieIdentity::new(dir.path().join("cookie.json"));

        let context = SessionContext::for_page(&identity, "https://jsunpack.example/?ref=hn").unwrap();
        assert_eq!(context.origin, "hn");
        assert_eq!(
            context.token.expose_secret(),
            identity.load().unwrap().unwrap().value
        );
    }
}
