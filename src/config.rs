//! Configuration types.

use std::str::FromStr;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default click key that issues worker credentials.
pub const DEFAULT_CREDENTIALS_KEY: &str = "getPwd";

/// Default reply to a subscribe event.
pub const DEFAULT_GREETING: &str = "谢谢关注喵~";

/// What to do when a callback signature does not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Reject the request with 401.
    #[default]
    Strict,
    /// Log a warning and process the request anyway. Debug deployments only.
    Relaxed,
}

impl FromStr for AuthMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(AuthMode::Strict),
            "relaxed" => Ok(AuthMode::Relaxed),
            other => Err(ConfigError::InvalidValue {
                key: "WXGATE_AUTH_MODE".to_string(),
                message: format!("expected `strict` or `relaxed`, got `{other}`"),
            }),
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Shared secret configured on the platform side.
    pub token: SecretString,
    /// Signature failure policy.
    pub auth_mode: AuthMode,
    /// HTTP listen port.
    pub port: u16,
    /// Menu click key that triggers credential issuance.
    pub credentials_key: String,
    /// Reply sent to new subscribers.
    pub greeting: String,
    /// Worker pool settings.
    pub workers: WorkerConfig,
}

/// Worker pool bootstrap settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Command template used to start a worker. `{port}` and `{password}`
    /// are substituted. `None` leaves the pool empty.
    pub command: Option<String>,
    /// Port of the first worker; subsequent workers count up from here.
    pub base_port: u16,
    /// Number of workers registered at startup.
    pub count: u32,
    /// Length of generated worker passwords.
    pub password_len: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command: None,
            base_port: 8388,
            count: 1,
            password_len: 16,
        }
    }
}

impl GatewayConfig {
    /// Build a config with the given token and defaults for everything else.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            auth_mode: AuthMode::default(),
            port: 8080,
            credentials_key: DEFAULT_CREDENTIALS_KEY.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
            workers: WorkerConfig::default(),
        }
    }

    /// Load configuration from `WXGATE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("WXGATE_TOKEN")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("WXGATE_TOKEN".to_string()))?;

        let mut config = Self::new(token);

        if let Some(mode) = lookup("WXGATE_AUTH_MODE") {
            config.auth_mode = mode.parse()?;
        }
        if let Some(port) = parse_var(&lookup, "WXGATE_PORT")? {
            config.port = port;
        }
        if let Some(key) = lookup("WXGATE_CREDENTIALS_KEY").filter(|k| !k.is_empty()) {
            config.credentials_key = key;
        }
        if let Some(greeting) = lookup("WXGATE_GREETING") {
            config.greeting = greeting;
        }

        config.workers.command = lookup("WXGATE_WORKER_COMMAND")
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if let Some(base_port) = parse_var(&lookup, "WXGATE_WORKER_BASE_PORT")? {
            config.workers.base_port = base_port;
        }
        if let Some(count) = parse_var(&lookup, "WXGATE_WORKER_COUNT")? {
            config.workers.count = count;
        }
        if let Some(len) = parse_var(&lookup, "WXGATE_WORKER_PASSWORD_LEN")? {
            if len == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "WXGATE_WORKER_PASSWORD_LEN".to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
            config.workers.password_len = len;
        }

        Ok(config)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
    }
}
