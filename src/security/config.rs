use std::net::IpAddr;

use anyhow::bail;
use tracing::warn;

use crate::security::password::{HashCost, PasswordPolicy};

const DEV_SECRET: &str = "dev-secret-change-me-dev-secret-change-me";
const MIN_SECRET_LEN: usize = 32;

#[derive(Clone, Debug)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_hours: i64,
}

#[derive(Clone, Debug)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window_secs: u64,
    /// Peers whose `X-Forwarded-For` header is believed.
    pub trusted_proxies: Vec<IpAddr>,
}

#[derive(Clone, Debug)]
pub struct AdminSeed {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Process-wide security settings, read once at startup.
#[derive(Clone, Debug)]
pub struct SecurityConfig {
    pub jwt: JwtSettings,
    pub password_policy: PasswordPolicy,
    pub hash_cost: HashCost,
    pub rate_limit: RateLimitSettings,
    pub admin: AdminSeed,
}

impl SecurityConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let secret = env_string("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set; using the development secret");
            DEV_SECRET.into()
        });
        if secret.len() < MIN_SECRET_LEN {
            bail!("JWT_SECRET must be at least {MIN_SECRET_LEN} bytes");
        }

        let ttl_hours = env_parse("JWT_EXPIRATION_HOURS").unwrap_or(3);
        if ttl_hours <= 0 {
            bail!("JWT_EXPIRATION_HOURS must be positive");
        }

        let jwt = JwtSettings {
            secret,
            issuer: env_string("JWT_ISSUER").unwrap_or_else(|| "company-site".into()),
            audience: env_string("JWT_AUDIENCE").unwrap_or_else(|| "company-site-clients".into()),
            ttl_hours,
        };

        let defaults = PasswordPolicy::default();
        let password_policy = PasswordPolicy {
            min_length: env_parse("PASSWORD_MIN_LENGTH").unwrap_or(defaults.min_length),
            min_unique_chars: env_parse("PASSWORD_MIN_UNIQUE_CHARS")
                .unwrap_or(defaults.min_unique_chars),
            ..defaults
        };

        let cost = HashCost::default();
        let hash_cost = HashCost {
            memory_kib: env_parse("ARGON2_MEMORY_KIB").unwrap_or(cost.memory_kib),
            iterations: env_parse("ARGON2_ITERATIONS").unwrap_or(cost.iterations),
            parallelism: env_parse("ARGON2_PARALLELISM").unwrap_or(cost.parallelism),
        };

        let rate_limit = RateLimitSettings {
            max_requests: env_parse("AUTH_RATE_LIMIT_MAX").unwrap_or(20),
            window_secs: env_parse("AUTH_RATE_LIMIT_WINDOW_SECS").unwrap_or(60),
            trusted_proxies: trusted_proxies(),
        };

        let admin = AdminSeed {
            username: env_string("ADMIN_USERNAME").unwrap_or_else(|| "admin".into()),
            email: env_string("ADMIN_EMAIL").unwrap_or_else(|| "admin@example.com".into()),
            password: env_string("ADMIN_PASSWORD").unwrap_or_else(|| {
                warn!("ADMIN_PASSWORD not set; the bootstrap admin uses the default password");
                "Admin@123".into()
            }),
        };

        Ok(SecurityConfig {
            jwt,
            password_policy,
            hash_cost,
            rate_limit,
            admin,
        })
    }
}

/// `TRUSTED_PROXIES` is a comma-separated list of IP addresses.
fn trusted_proxies() -> Vec<IpAddr> {
    let Some(raw) = env_string("TRUSTED_PROXIES") else {
        return Vec::new();
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse() {
            Ok(ip) => Some(ip),
            Err(_) => {
                warn!("ignoring unparsable TRUSTED_PROXIES entry {s}");
                None
            }
        })
        .collect()
}

pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring unparsable {key}={raw}");
            None
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> SecurityConfig {
    SecurityConfig {
        jwt: JwtSettings {
            secret: "test-secret-test-secret-test-secret!".into(),
            issuer: "company-site".into(),
            audience: "company-site-clients".into(),
            ttl_hours: 1,
        },
        password_policy: PasswordPolicy::default(),
        hash_cost: HashCost::cheap(),
        rate_limit: RateLimitSettings {
            max_requests: 1_000,
            window_secs: 60,
            trusted_proxies: Vec::new(),
        },
        admin: AdminSeed {
            username: "admin".into(),
            email: "admin@example.com".into(),
            password: "Admin@123".into(),
        },
    }
}
