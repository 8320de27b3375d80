use std::env;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

pub const DEFAULT_MAX_ASSET_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub server_host: String,
    pub server_port: u16,
    pub app_url: String,
    pub logout_path: String,
    pub storage_root: PathBuf,
    pub storage_timeout_secs: u64,
    pub max_asset_bytes: usize,
    pub max_request_bytes: usize,
    pub catalog_refresh_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 从任意键值来源构建配置，`from_env` 与测试共用
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));
        let or_default = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.into());

        let config = Config {
            database_url: required("DATABASE_URL")?,
            database_max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            server_host: or_default("SERVER_HOST", "0.0.0.0"),
            server_port: parse_var(&lookup, "SERVER_PORT", 3000)?,
            app_url: required("APP_URL")?,
            logout_path: or_default("AUTHENTIK_LOGOUT_URL", "/outpost.goauthentik.io/sign_out"),
            storage_root: or_default("STORAGE_ROOT", "storage/app/public").into(),
            storage_timeout_secs: parse_var(&lookup, "STORAGE_TIMEOUT_SECS", 30)?,
            max_asset_bytes: parse_var(&lookup, "MAX_ASSET_BYTES", DEFAULT_MAX_ASSET_BYTES)?,
            max_request_bytes: parse_var(&lookup, "MAX_REQUEST_BYTES", 64 * 1024 * 1024)?,
            catalog_refresh_secs: parse_var(&lookup, "CATALOG_REFRESH_SECS", 60)?,
        };

        // 启动时就校验登出地址，避免请求时才发现配置错误
        config.logout_url()?;
        Ok(config)
    }

    /// 登出/重新认证地址：APP_URL + AUTHENTIK_LOGOUT_URL
    pub fn logout_url(&self) -> Result<Url, ConfigError> {
        let joined = format!("{}{}", self.app_url.trim_end_matches('/'), self.logout_path);
        Url::parse(&joined).map_err(|e| ConfigError::Invalid {
            name: "AUTHENTIK_LOGOUT_URL",
            reason: format!("{joined}: {e}"),
        })
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }

    pub fn catalog_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.catalog_refresh_secs)
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_absent() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/portfolio"),
            ("APP_URL", "https://portfolio.example.com"),
        ]))
        .expect("config");

        assert_eq!(config.server_port, 3000);
        assert_eq!(config.max_asset_bytes, 10_485_760);
        assert_eq!(config.storage_timeout(), Duration::from_secs(30));
        assert_eq!(
            config.logout_url().unwrap().as_str(),
            "https://portfolio.example.com/outpost.goauthentik.io/sign_out"
        );
    }

    #[test]
    fn logout_url_joins_base_and_path_without_double_slash() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/portfolio"),
            ("APP_URL", "https://portfolio.example.com/"),
            ("AUTHENTIK_LOGOUT_URL", "/logout"),
        ]))
        .expect("config");

        assert_eq!(
            config.logout_url().unwrap().as_str(),
            "https://portfolio.example.com/logout"
        );
    }

    #[test]
    fn missing_required_var_is_reported() {
        let err = Config::from_lookup(lookup_from(&[("APP_URL", "https://x.example")]))
            .expect_err("database url is required");
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn unparsable_number_is_reported() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/portfolio"),
            ("APP_URL", "https://x.example"),
            ("SERVER_PORT", "not-a-port"),
        ]))
        .expect_err("port must parse");
        assert!(matches!(err, ConfigError::Invalid { name: "SERVER_PORT", .. }));
    }

    #[test]
    fn relative_app_url_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/portfolio"),
            ("APP_URL", "portfolio"),
        ]))
        .expect_err("logout url must be absolute");
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
