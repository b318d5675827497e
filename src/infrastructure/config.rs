use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use url::Url;

const DEFAULT_API_BASE_URL: &str = "https://spark-adhd-api.vercel.app";

const API_BASE_URL_VAR: &str = "SPARK_API_BASE_URL";
const ENVIRONMENT_VAR: &str = "SPARK_ENV";
const TIMEZONE_VAR: &str = "SPARK_TIMEZONE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

/// Environment-driven startup configuration. Only the API base URL,
/// environment label, and timezone are load-bearing for the services.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base_url: Url,
    pub environment: Environment,
    pub timezone: Tz,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, InfraError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, InfraError> {
        let raw_base_url = lookup(API_BASE_URL_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let api_base_url = Url::parse(&raw_base_url).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid api base url '{raw_base_url}': {error}"))
        })?;

        let environment = match lookup(ENVIRONMENT_VAR).as_deref().map(str::trim) {
            Some("development") => Environment::Development,
            Some("staging") => Environment::Staging,
            _ => Environment::Production,
        };

        let timezone = match lookup(TIMEZONE_VAR).map(|value| value.trim().to_string()) {
            Some(raw) if !raw.is_empty() => raw.parse::<Tz>().map_err(|_| {
                InfraError::InvalidConfig(format!("invalid timezone '{raw}'"))
            })?,
            _ => chrono_tz::UTC,
        };

        Ok(Self {
            api_base_url,
            environment,
            timezone,
        })
    }

    pub fn timezone_label(&self) -> &'static str {
        self.timezone.name()
    }
}
