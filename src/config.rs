use std::net::SocketAddr;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HS512 secret. When absent a random key is generated for the process.
    pub secret: Option<String>,
    /// Token lifetime. When absent tokens carry no `exp` claim.
    pub expiration_ms: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Postgres URL; the in-memory store is used when unset.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub public_user_creation: bool,
    pub seed_demo_data: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")
                .ok()
                .filter(|v| !v.is_empty()),
            expiration_ms: match std::env::var("JWT_EXPIRATION_MS") {
                Ok(v) => Some(v.parse::<i64>().map_err(|e| {
                    anyhow::anyhow!("JWT_EXPIRATION_MS must be an integer: {e}")
                })?),
                Err(_) => None,
            },
        };
        let port = match std::env::var("APP_PORT") {
            Ok(v) => v
                .trim()
                .parse::<u16>()
                .with_context(|| format!("APP_PORT must be a port number, got {v:?}"))?,
            Err(_) => 8080,
        };
        Ok(Self {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            database_url,
            jwt,
            public_user_creation: env_flag("PUBLIC_USER_CREATION", true),
            seed_demo_data: env_flag("SEED_DEMO_DATA", false),
        })
    }

    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| parse_flag(&v).unwrap_or(default))
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_flag_spellings() {
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag(" YES "), Some(true));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn listen_addr_joins_host_and_port() {
        let cfg = AppConfig {
            host: "127.0.0.1".into(),
            port: 9090,
            database_url: None,
            jwt: JwtConfig {
                secret: None,
                expiration_ms: None,
            },
            public_user_creation: true,
            seed_demo_data: false,
        };
        assert_eq!(cfg.listen_addr().unwrap().to_string(), "127.0.0.1:9090");

        let bad = AppConfig {
            host: "not a host".into(),
            ..cfg
        };
        assert!(bad.listen_addr().is_err());
    }
}
