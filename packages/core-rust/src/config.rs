//! Tracking options: client token, identity extraction strategy, IP header.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors raised while building [`TrackingOptions`] from raw configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("analytics client token must not be empty")]
    EmptyToken,
    #[error("only one of header/session/user/cookie may be set, found: {found}")]
    ConflictingStrategies { found: String },
    #[error("{field} selector must not be empty")]
    EmptySelector { field: &'static str },
    #[error("unknown ip header {0:?}; expected X-Forwarded-For, X-Real-IP or Forwarded")]
    UnknownIpHeader(String),
}

// ---------------------------------------------------------------------------
// ExtractionStrategy
// ---------------------------------------------------------------------------

/// Where the distinct user identifier lives in the request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExtractionStrategy {
    /// Request header name, matched case-insensitively.
    Header(String),
    /// Dot-path inside the session object.
    Session(String),
    /// Dot-path inside the authenticated user object.
    User(String),
    /// Cookie name.
    Cookie(String),
    /// No field configured; the context id is used.
    #[default]
    None,
}

impl ExtractionStrategy {
    /// Short label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Header(_) => "header",
            Self::Session(_) => "session",
            Self::User(_) => "user",
            Self::Cookie(_) => "cookie",
            Self::None => "none",
        }
    }
}

// ---------------------------------------------------------------------------
// IpHeader
// ---------------------------------------------------------------------------

/// Header consulted for the client IP address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IpHeader {
    /// First entry of `X-Forwarded-For`.
    #[default]
    #[serde(rename = "X-Forwarded-For")]
    XForwardedFor,
    /// `X-Real-IP`, verbatim.
    #[serde(rename = "X-Real-IP")]
    XRealIp,
    /// `for=` parameter of the RFC 7239 `Forwarded` header.
    #[serde(rename = "Forwarded")]
    Forwarded,
}

impl IpHeader {
    /// Canonical header name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::XForwardedFor => "X-Forwarded-For",
            Self::XRealIp => "X-Real-IP",
            Self::Forwarded => "Forwarded",
        }
    }
}

impl fmt::Display for IpHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IpHeader {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::XForwardedFor, Self::XRealIp, Self::Forwarded]
            .into_iter()
            .find(|h| h.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownIpHeader(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// TrackingOptions
// ---------------------------------------------------------------------------

/// Fully resolved configuration for the tracking facade.
///
/// Deserializes from the flat shape
/// `{ token, initConfig?, header? | session? | user? | cookie?, ipHeader? }`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawTrackingOptions")]
pub struct TrackingOptions {
    /// Opaque analytics project token.
    pub token: String,
    /// Passed through to the analytics client untouched.
    pub init_config: Option<Value>,
    pub strategy: ExtractionStrategy,
    pub ip_header: IpHeader,
}

impl TrackingOptions {
    /// Options with no extraction field and the default IP header.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            init_config: None,
            strategy: ExtractionStrategy::None,
            ip_header: IpHeader::default(),
        }
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: ExtractionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_init_config(mut self, init_config: Value) -> Self {
        self.init_config = Some(init_config);
        self
    }

    #[must_use]
    pub fn with_ip_header(mut self, ip_header: IpHeader) -> Self {
        self.ip_header = ip_header;
        self
    }
}

/// Wire shape before the strategy fields are collapsed into an enum.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawTrackingOptions {
    token: String,
    #[serde(default)]
    init_config: Option<Value>,
    #[serde(default)]
    header: Option<String>,
    #[serde(default)]
    session: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    cookie: Option<String>,
    #[serde(default)]
    ip_header: Option<IpHeader>,
}

impl TryFrom<RawTrackingOptions> for TrackingOptions {
    type Error = ConfigError;

    fn try_from(raw: RawTrackingOptions) -> Result<Self, Self::Error> {
        if raw.token.trim().is_empty() {
            return Err(ConfigError::EmptyToken);
        }

        let candidates = [
            ("header", raw.header.map(ExtractionStrategy::Header)),
            ("session", raw.session.map(ExtractionStrategy::Session)),
            ("user", raw.user.map(ExtractionStrategy::User)),
            ("cookie", raw.cookie.map(ExtractionStrategy::Cookie)),
        ];
        let mut present: Vec<(&'static str, ExtractionStrategy)> = candidates
            .into_iter()
            .filter_map(|(field, strategy)| strategy.map(|s| (field, s)))
            .collect();

        if present.len() > 1 {
            let found = present
                .iter()
                .map(|(field, _)| *field)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ConfigError::ConflictingStrategies { found });
        }

        let strategy = match present.pop() {
            None => ExtractionStrategy::None,
            Some((field, strategy)) => {
                let selector = match &strategy {
                    ExtractionStrategy::Header(s)
                    | ExtractionStrategy::Session(s)
                    | ExtractionStrategy::User(s)
                    | ExtractionStrategy::Cookie(s) => s.as_str(),
                    ExtractionStrategy::None => "",
                };
                if selector.trim().is_empty() {
                    return Err(ConfigError::EmptySelector { field });
                }
                strategy
            }
        };

        Ok(Self {
            token: raw.token,
            init_config: raw.init_config,
            strategy,
            ip_header: raw.ip_header.unwrap_or_default(),
        })
    }
}
