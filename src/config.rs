use std::env;

use crate::engine::coordinator::DispatchSettings;
use crate::engine::location_index::DEFAULT_RADIUS_M;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub search_radius_m: f64,
    pub history_page_limit: usize,
    pub history_max_limit: usize,
    /// Bearer credential bound to an admin actor at start-up.
    pub admin_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: parse_log_format(env::var("LOG_FORMAT").ok().as_deref())?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            search_radius_m: parse_or_default("SEARCH_RADIUS_METERS", DEFAULT_RADIUS_M)?,
            history_page_limit: parse_or_default("HISTORY_PAGE_LIMIT", 20)?,
            history_max_limit: parse_or_default("HISTORY_MAX_LIMIT", 100)?,
            admin_token: env::var("ADMIN_TOKEN")
                .ok()
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !self.search_radius_m.is_finite() || self.search_radius_m <= 0.0 {
            return Err(AppError::Internal(
                "SEARCH_RADIUS_METERS must be > 0".to_string(),
            ));
        }
        if self.history_max_limit == 0 {
            return Err(AppError::Internal("HISTORY_MAX_LIMIT must be > 0".to_string()));
        }
        if self.history_page_limit == 0 || self.history_page_limit > self.history_max_limit {
            return Err(AppError::Internal(
                "HISTORY_PAGE_LIMIT must be between 1 and HISTORY_MAX_LIMIT".to_string(),
            ));
        }
        Ok(())
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            search_radius_m: self.search_radius_m,
            history_page_limit: self.history_page_limit,
            history_max_limit: self.history_max_limit,
        }
    }
}

fn parse_log_format(raw: Option<&str>) -> Result<LogFormat, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(LogFormat::Compact),
        Some(value) if value.eq_ignore_ascii_case("compact") => Ok(LogFormat::Compact),
        Some(value) if value.eq_ignore_ascii_case("json") => Ok(LogFormat::Json),
        Some(other) => Err(AppError::Internal(format!(
            "invalid LOG_FORMAT: {other}, expected compact or json"
        ))),
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
