use std::time::Duration;

/// Default validity of an issued bearer token (7 days).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default bound on any single credential store or catalog call.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Default prefix joined onto a segment's stored audio reference.
pub const DEFAULT_AUDIO_BASE_PATH: &str = "/data/audio/";

/// Minimum accepted password length at registration.
pub const DEFAULT_MIN_PASSWORD_LEN: usize = 6;

/// Options that control the annotation core.
///
/// This struct represents *library-level configuration*, not CLI flags directly.
/// The binaries map their flags and environment into this type so that:
/// - the library remains reusable outside of a server context
/// - tests can construct options programmatically (e.g. a tiny timeout)
#[derive(Debug, Clone)]
pub struct Opts {
    /// How long an issued token stays valid.
    pub token_ttl: Duration,

    /// Upper bound on every credential store / catalog call.
    ///
    /// Expiry is surfaced as [`crate::Error::Upstream`].
    pub upstream_timeout: Duration,

    /// Prefix used to resolve a segment's audio reference into a playable path.
    pub audio_base_path: String,

    /// Passwords shorter than this are rejected at registration.
    pub min_password_len: usize,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            token_ttl: DEFAULT_TOKEN_TTL,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            audio_base_path: DEFAULT_AUDIO_BASE_PATH.to_owned(),
            min_password_len: DEFAULT_MIN_PASSWORD_LEN,
        }
    }
}

impl Opts {
    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn with_audio_base_path(mut self, base: impl Into<String>) -> Self {
        self.audio_base_path = base.into();
        self
    }
}
