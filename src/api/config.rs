//! Immutable gateway configuration, built once at startup and shared by `Arc`.

use secrecy::SecretString;
use std::{fmt, str::FromStr, time::Duration};

use super::origin::AllowSet;
use crate::session::{
    cookie::CookiePolicy, store::MIN_PRUNE_INTERVAL, CookieSigner, DEFAULT_MAX_AGE_SECONDS,
    MAX_AGE_LIMIT_SECONDS,
};

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);
const MIN_STORE_TIMEOUT: Duration = Duration::from_millis(1);
const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(15 * 60);
const DEFAULT_BODY_LIMIT_BYTES: usize = 100 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeMode {
    #[default]
    Development,
    Production,
}

impl RuntimeMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" | "test" => Ok(Self::Development),
            other => Err(format!("invalid runtime mode: {other}")),
        }
    }
}

#[derive(Clone)]
pub struct GatewayConfig {
    mode: RuntimeMode,
    trust_proxy: bool,
    secure_cookie: bool,
    allow_set: AllowSet,
    signer: CookieSigner,
    max_age_seconds: i64,
    rolling: bool,
    store_timeout: Duration,
    prune_interval: Duration,
    body_limit_bytes: usize,
}

impl GatewayConfig {
    #[must_use]
    pub fn new(mode: RuntimeMode, session_secret: SecretString) -> Self {
        Self {
            mode,
            trust_proxy: false,
            secure_cookie: false,
            allow_set: AllowSet::baseline(),
            signer: CookieSigner::new(session_secret),
            max_age_seconds: DEFAULT_MAX_AGE_SECONDS,
            rolling: false,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            prune_interval: DEFAULT_PRUNE_INTERVAL,
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
        }
    }

    #[must_use]
    pub fn with_trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    #[must_use]
    pub fn with_secure_cookie(mut self, secure_cookie: bool) -> Self {
        self.secure_cookie = secure_cookie;
        self
    }

    #[must_use]
    pub fn with_allow_set(mut self, allow_set: AllowSet) -> Self {
        self.allow_set = allow_set;
        self
    }

    /// Clamped to `1..=MAX_AGE_LIMIT_SECONDS`.
    #[must_use]
    pub fn with_max_age_seconds(mut self, seconds: i64) -> Self {
        self.max_age_seconds = seconds.clamp(1, MAX_AGE_LIMIT_SECONDS);
        self
    }

    #[must_use]
    pub fn with_rolling(mut self, rolling: bool) -> Self {
        self.rolling = rolling;
        self
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout.max(MIN_STORE_TIMEOUT);
        self
    }

    #[must_use]
    pub fn with_prune_interval(mut self, interval: Duration) -> Self {
        self.prune_interval = interval.max(MIN_PRUNE_INTERVAL);
        self
    }

    #[must_use]
    pub fn with_body_limit_bytes(mut self, bytes: usize) -> Self {
        self.body_limit_bytes = bytes;
        self
    }

    #[must_use]
    pub fn mode(&self) -> RuntimeMode {
        self.mode
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        self.mode == RuntimeMode::Production
    }

    /// Secure cookies only take effect in production.
    #[must_use]
    pub fn cookie_policy(&self) -> CookiePolicy {
        CookiePolicy::new(self.max_age_seconds, self.is_production(), self.secure_cookie)
    }

    /// Whether `X-Forwarded-*` headers from one upstream hop are believed.
    /// Forced on while secure cookies are in effect, otherwise every request
    /// behind a TLS-terminating proxy would look like plain HTTP.
    #[must_use]
    pub fn trust_proxy(&self) -> bool {
        self.trust_proxy || self.cookie_policy().secure
    }

    /// True when the configured proxy flag had to be overridden.
    #[must_use]
    pub fn trust_proxy_forced(&self) -> bool {
        !self.trust_proxy && self.cookie_policy().secure
    }

    #[must_use]
    pub fn allow_set(&self) -> &AllowSet {
        &self.allow_set
    }

    #[must_use]
    pub fn signer(&self) -> &CookieSigner {
        &self.signer
    }

    #[must_use]
    pub fn max_age_seconds(&self) -> i64 {
        self.max_age_seconds
    }

    #[must_use]
    pub fn rolling(&self) -> bool {
        self.rolling
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    #[must_use]
    pub fn prune_interval(&self) -> Duration {
        self.prune_interval
    }

    #[must_use]
    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_bytes
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("mode", &self.mode)
            .field("trust_proxy", &self.trust_proxy())
            .field("secure_cookie", &self.cookie_policy().secure)
            .field("allow_set", &self.allow_set)
            .field("session_secret", &"***")
            .field("max_age_seconds", &self.max_age_seconds)
            .field("rolling", &self.rolling)
            .field("store_timeout", &self.store_timeout)
            .field("prune_interval", &self.prune_interval)
            .field("body_limit_bytes", &self.body_limit_bytes)
            .finish()
    }
}
