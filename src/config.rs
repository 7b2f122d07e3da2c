use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,

    // Auth
    pub admin_token: String,

    // Cryptographic policy
    pub key_expiry_minutes: i64,
    pub pow_difficulty: usize,

    // Background sweeper
    pub sweep_interval_secs: u64,

    // Persistence
    pub vault_dir: String,
    pub data_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let admin_token = require_env("ADMIN_TOKEN")?;

        let key_expiry_minutes: i64 = parse_env_or("KEY_EXPIRY_MINUTES", 60)?;
        if key_expiry_minutes < 0 {
            return Err(ConfigError::Invalid(
                "KEY_EXPIRY_MINUTES".into(),
                "must be >= 0".into(),
            ));
        }

        let pow_difficulty: usize = parse_env_or("POW_DIFFICULTY", 6)?;
        if pow_difficulty > 16 {
            return Err(ConfigError::Invalid(
                "POW_DIFFICULTY".into(),
                "must be <= 16".into(),
            ));
        }

        let sweep_interval_secs: u64 = parse_env_or("SWEEP_INTERVAL_SECS", 60)?;
        if sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "SWEEP_INTERVAL_SECS".into(),
                "must be > 0".into(),
            ));
        }

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()
                .map_err(|_| {
                    ConfigError::Invalid("PORT".into(), "must be a valid port number".into())
                })?,
            admin_token,
            key_expiry_minutes,
            pow_difficulty,
            sweep_interval_secs,
            vault_dir: env::var("VAULT_DIR").unwrap_or_else(|_| "./vault".into()),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "./data".into()),
        })
    }

    /// Constant-time admin token comparison to prevent timing side-channel attacks.
    pub fn is_admin_token_valid(&self, token: &str) -> bool {
        use subtle::ConstantTimeEq;
        let given = token.as_bytes();
        let expected = self.admin_token.as_bytes();
        given.len() == expected.len() && given.ct_eq(expected).into()
    }
}

fn require_env(name: &str) -> Result<String, ConfigError> {
    env::var(name)
        .map_err(|_| ConfigError::Missing(name.into()))
        .and_then(|v| {
            if v.is_empty() {
                Err(ConfigError::Missing(name.into()))
            } else {
                Ok(v)
            }
        })
}

fn parse_env_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(v) if !v.is_empty() => v
            .parse()
            .map_err(|_| ConfigError::Invalid(name.into(), format!("could not parse '{v}'"))),
        _ => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(String),
    Invalid(String, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(name) => write!(f, "missing required env var: {name}"),
            ConfigError::Invalid(name, reason) => write!(f, "invalid env var {name}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}
