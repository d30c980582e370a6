use std::collections::HashMap;
use std::env;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::pool::{DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_IDLE, PoolOptions};

pub const DEFAULT_REDIS_PORT: u16 = 6379;

const URL_KEY: &str = "redis.url";
const HOST_KEY: &str = "redis.host";
const PORT_KEY: &str = "redis.port";
const PASSWORD_KEY: &str = "redis.password";

/// `redis://[user:password@]host:port`
static REDIS_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^redis://(.*:.*@)?[^@]*:[0-9]+$").expect("valid regex"));

/// Where settings come from. Keys are dotted (`redis.host`).
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads `redis.host` from `REDIS_HOST`, and so on.
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        let name = key.replace('.', "_").to_ascii_uppercase();
        env::var(name).ok().filter(|v| !v.is_empty())
    }
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).filter(|v| !v.is_empty()).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No tier produced a host.
    MissingHost,
    /// `REDIS_URL` looks like it carries credentials or an address but can't
    /// be split into them. Holds the URL with credentials masked.
    MalformedUrl(String),
}

impl std::error::Error for ConfigError {}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingHost => {
                write!(f, "no redis host configured (set REDIS_URL or REDIS_HOST)")
            }
            ConfigError::MalformedUrl(url) => write!(f, "REDIS_URL format was incorrect ({})", url),
        }
    }
}

/// The resolved Redis endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
}

impl Endpoint {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connection URL without credentials; authentication is a separate step.
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Resolve the endpoint: `REDIS_URL` first, then the `redis.*` keys, then
/// the default port.
pub fn resolve_endpoint(source: &impl ConfigSource) -> Result<Endpoint, ConfigError> {
    let mut host = String::new();
    let mut port: u16 = 0;
    let mut password = String::new();

    if let Some(url) = source.get(URL_KEY) {
        match parse_redis_url(&url)? {
            Some(parsed) => {
                host = parsed.host;
                port = parsed.port;
                password = parsed.password;
            }
            None => {
                tracing::warn!(url = %mask_credentials(&url), "ignoring REDIS_URL that is not a redis:// url");
            }
        }
    }

    if host.is_empty() {
        host = source.get(HOST_KEY).ok_or(ConfigError::MissingHost)?;
    }
    if password.is_empty() {
        password = source.get(PASSWORD_KEY).unwrap_or_default();
    }
    if port == 0 {
        port = parse_or(source, PORT_KEY, DEFAULT_REDIS_PORT);
        if port == 0 {
            port = DEFAULT_REDIS_PORT;
        }
    }

    Ok(Endpoint {
        host,
        port,
        password: Some(password).filter(|p| !p.is_empty()),
    })
}

struct ParsedUrl {
    host: String,
    /// Zero when the port did not parse; the caller falls back to config.
    port: u16,
    password: String,
}

/// Returns `Ok(None)` for values that are not redis URLs at all, which the
/// caller ignores. Anything with an `@` is assumed to be meant as one and must
/// parse.
fn parse_redis_url(url: &str) -> Result<Option<ParsedUrl>, ConfigError> {
    if !REDIS_URL.is_match(url) {
        if url.contains('@') {
            return Err(ConfigError::MalformedUrl(mask_credentials(url)));
        }
        return Ok(None);
    }

    let rest = url.trim_start_matches("redis://");
    let (address, password) = match rest.rsplit_once('@') {
        Some((credentials, address)) => {
            let password = credentials
                .split_once(':')
                .map(|(_, password)| password)
                .unwrap_or_default();
            (address, password.to_string())
        }
        None => (rest, String::new()),
    };

    let parts: Vec<&str> = address.split(':').collect();
    let [host, port] = parts.as_slice() else {
        return Err(ConfigError::MalformedUrl(mask_credentials(url)));
    };

    Ok(Some(ParsedUrl {
        host: host.to_string(),
        port: port.parse().unwrap_or(0),
        password,
    }))
}

fn mask_credentials(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        (None, Some(at)) => format!("***{}", &url[at..]),
        _ => url.to_string(),
    }
}

fn parse_or<T: std::str::FromStr>(source: &impl ConfigSource, key: &str, default: T) -> T {
    match source.get(key) {
        Some(v) => match v.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!("invalid {} value '{}', using default", key, v);
                default
            }
        },
        None => default,
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: Endpoint,
    pub pool: PoolOptions,
    pub dial_timeout: Duration,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&EnvSource)
    }

    pub fn from_source(source: &impl ConfigSource) -> Result<Self, ConfigError> {
        let endpoint = resolve_endpoint(source)?;

        let max_idle: usize = parse_or(source, "redis.max_idle", DEFAULT_MAX_IDLE);
        let idle_timeout_secs: u64 = parse_or(
            source,
            "redis.idle_timeout_secs",
            DEFAULT_IDLE_TIMEOUT.as_secs(),
        );
        let max_idle_lifetime_secs: u64 = parse_or(source, "redis.max_idle_lifetime_secs", 0);
        let dial_timeout_ms: u64 = parse_or(source, "redis.dial_timeout_ms", 5000);

        let port: u16 = parse_or(source, "port", 3000);

        let mut pool = PoolOptions::new()
            .with_max_idle(max_idle)
            .with_idle_timeout(Duration::from_secs(idle_timeout_secs));
        if max_idle_lifetime_secs > 0 {
            pool = pool.with_max_idle_lifetime(Duration::from_secs(max_idle_lifetime_secs));
        }

        Ok(Self {
            endpoint,
            pool,
            dial_timeout: Duration::from_millis(dial_timeout_ms),
            port,
        })
    }
}
