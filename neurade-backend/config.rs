use std::path::PathBuf;
use std::time::Duration;

/// Server configuration loaded from environment variables.
pub struct Config {
    pub port: u16,
    pub relay_port: u16,
    pub sentry_dsn: Option<String>,
    pub environment: String,
    pub database_path: PathBuf,
    pub endpoints: ServiceEndpoints,
    pub storage: StorageConfig,
    pub relay: RelayConfig,
}

/// Base URLs of the external LLM services.
#[derive(Debug, Clone, Default)]
pub struct ServiceEndpoints {
    /// LLM agent exposing `/api/review` and `/api/review-auto`.
    pub review: Option<String>,
    /// Chat service exposing `/api/chat`.
    pub chat: Option<String>,
    /// Credential validation service exposing `/api/v1/validate-key`.
    pub llm_service: Option<String>,
}

/// S3-compatible object store (MinIO) holding answer and convention files.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Base URL including scheme and port, e.g. `http://minio:9000`.
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub presign_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub secret_token: Option<String>,
    pub backend_endpoint: Option<String>,
}

/// Raw, unparsed values as they would come from env vars.
#[derive(Default)]
pub struct RawConfig<'a> {
    pub port: Option<&'a str>,
    pub relay_port: Option<&'a str>,
    pub sentry_dsn: Option<&'a str>,
    pub environment: Option<&'a str>,
    pub database_path: Option<&'a str>,
    pub review_endpoint: Option<&'a str>,
    pub chat_endpoint: Option<&'a str>,
    pub llm_service_endpoint: Option<&'a str>,
    pub storage_endpoint: Option<&'a str>,
    pub storage_region: Option<&'a str>,
    pub storage_bucket: Option<&'a str>,
    pub storage_access_key: Option<&'a str>,
    pub storage_secret_key: Option<&'a str>,
    pub presign_ttl_secs: Option<&'a str>,
    pub secret_token: Option<&'a str>,
    pub backend_endpoint: Option<&'a str>,
}

impl Config {
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok();
        let port = var("PORT");
        let relay_port = var("RELAY_PORT");
        let sentry_dsn = var("SENTRY_DSN");
        let environment = var("ENVIRONMENT");
        let database_path = var("DATABASE_PATH");
        let review_endpoint = var("REVIEW_ENDPOINT");
        let chat_endpoint = var("CHAT_ENDPOINT");
        let llm_service_endpoint = var("LLM_SERVICE_ENDPOINT");
        let storage_endpoint = var("STORAGE_ENDPOINT");
        let storage_region = var("STORAGE_REGION");
        let storage_bucket = var("STORAGE_BUCKET");
        let storage_access_key = var("STORAGE_ACCESS_KEY");
        let storage_secret_key = var("STORAGE_SECRET_KEY");
        let presign_ttl_secs = var("PRESIGN_TTL_SECS");
        let secret_token = var("SECRET_TOKEN");
        let backend_endpoint = var("BACKEND_ENDPOINT");

        Self::from_raw_values(RawConfig {
            port: port.as_deref(),
            relay_port: relay_port.as_deref(),
            sentry_dsn: sentry_dsn.as_deref(),
            environment: environment.as_deref(),
            database_path: database_path.as_deref(),
            review_endpoint: review_endpoint.as_deref(),
            chat_endpoint: chat_endpoint.as_deref(),
            llm_service_endpoint: llm_service_endpoint.as_deref(),
            storage_endpoint: storage_endpoint.as_deref(),
            storage_region: storage_region.as_deref(),
            storage_bucket: storage_bucket.as_deref(),
            storage_access_key: storage_access_key.as_deref(),
            storage_secret_key: storage_secret_key.as_deref(),
            presign_ttl_secs: presign_ttl_secs.as_deref(),
            secret_token: secret_token.as_deref(),
            backend_endpoint: backend_endpoint.as_deref(),
        })
    }

    /// Build a Config from raw string values (as they would come from env vars).
    /// Used directly in tests to avoid mutating process-global environment.
    pub fn from_raw_values(raw: RawConfig<'_>) -> Self {
        let port = raw.port.and_then(|v| v.parse().ok()).unwrap_or(8081);
        let relay_port = raw.relay_port.and_then(|v| v.parse().ok()).unwrap_or(8080);

        let environment = non_empty(raw.environment).unwrap_or_else(|| "local".to_string());

        let database_path = non_empty(raw.database_path)
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path);

        let presign_ttl = raw
            .presign_ttl_secs
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(3600));

        Config {
            port,
            relay_port,
            sentry_dsn: non_empty(raw.sentry_dsn),
            environment,
            database_path,
            endpoints: ServiceEndpoints {
                review: non_empty(raw.review_endpoint).map(trim_trailing_slash),
                chat: non_empty(raw.chat_endpoint).map(trim_trailing_slash),
                llm_service: non_empty(raw.llm_service_endpoint).map(trim_trailing_slash),
            },
            storage: StorageConfig {
                endpoint: non_empty(raw.storage_endpoint).map(trim_trailing_slash),
                region: non_empty(raw.storage_region).unwrap_or_else(|| "us-east-1".to_string()),
                bucket: non_empty(raw.storage_bucket).unwrap_or_else(|| "neurade".to_string()),
                access_key: non_empty(raw.storage_access_key),
                secret_key: non_empty(raw.storage_secret_key),
                presign_ttl,
            },
            relay: RelayConfig {
                secret_token: non_empty(raw.secret_token),
                backend_endpoint: non_empty(raw.backend_endpoint).map(trim_trailing_slash),
            },
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn trim_trailing_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".neurade")
        .join("neurade.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_invalid_port_uses_default() {
        let config = Config::from_raw_values(RawConfig {
            port: Some("not-a-number"),
            ..Default::default()
        });
        assert_eq!(config.port, 8081);
        assert_eq!(config.relay_port, 8080);
    }

    #[test]
    fn test_config_valid_ports() {
        let config = Config::from_raw_values(RawConfig {
            port: Some("3000"),
            relay_port: Some("9000"),
            ..Default::default()
        });
        assert_eq!(config.port, 3000);
        assert_eq!(config.relay_port, 9000);
    }

    #[test]
    fn test_config_empty_sentry_dsn_is_none() {
        let config = Config::from_raw_values(RawConfig {
            sentry_dsn: Some(""),
            ..Default::default()
        });
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn test_config_default_environment() {
        let config = Config::from_raw_values(RawConfig::default());
        assert_eq!(config.environment, "local");
        assert!(config.database_path.ends_with("neurade.db"));
    }

    #[test]
    fn test_config_endpoints_trim_trailing_slash() {
        let config = Config::from_raw_values(RawConfig {
            review_endpoint: Some("http://agent:8000/"),
            chat_endpoint: Some("http://chat:8001"),
            backend_endpoint: Some("http://backend:8081//"),
            ..Default::default()
        });
        assert_eq!(config.endpoints.review.as_deref(), Some("http://agent:8000"));
        assert_eq!(config.endpoints.chat.as_deref(), Some("http://chat:8001"));
        assert!(config.endpoints.llm_service.is_none());
        assert_eq!(
            config.relay.backend_endpoint.as_deref(),
            Some("http://backend:8081")
        );
    }

    #[test]
    fn test_config_blank_secret_is_none() {
        let config = Config::from_raw_values(RawConfig {
            secret_token: Some("   "),
            ..Default::default()
        });
        assert!(config.relay.secret_token.is_none());
    }

    #[test]
    fn test_config_presign_ttl() {
        let config = Config::from_raw_values(RawConfig {
            presign_ttl_secs: Some("600"),
            ..Default::default()
        });
        assert_eq!(config.storage.presign_ttl, Duration::from_secs(600));

        let config = Config::from_raw_values(RawConfig {
            presign_ttl_secs: Some("0"),
            ..Default::default()
        });
        assert_eq!(config.storage.presign_ttl, Duration::from_secs(3600));
        assert_eq!(config.storage.bucket, "neurade");
    }

    #[test]
    fn test_config_storage_credentials() {
        let config = Config::from_raw_values(RawConfig {
            storage_endpoint: Some("http://minio:9000/"),
            storage_access_key: Some("access"),
            storage_secret_key: Some(" "),
            ..Default::default()
        });
        assert_eq!(config.storage.endpoint.as_deref(), Some("http://minio:9000"));
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.storage.access_key.as_deref(), Some("access"));
        assert!(config.storage.secret_key.is_none());
    }
}
