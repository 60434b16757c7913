use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub environment: String,
    pub port: u16,
    pub mongo_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    pub jwt_ttl_seconds: i64,
    pub cors_allowed_origins: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub admin_seed_file: Option<String>,
    /// `user:pass` required on /metrics
    pub metrics_auth: String,
    pub otlp_endpoint: Option<String>,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_seconds: 15 * 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

const DEV_JWT_SECRET: &str = "dev-secret-only-for-local-testing";
const DEV_METRICS_AUTH: &str = "admin:changeme";

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let environment = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/{env}.toml is optional, APP__SECTION__KEY overrides it
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", environment)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let port = settings
            .get_int("server.port")
            .ok()
            .and_then(|p| u16::try_from(p).ok())
            .or_else(|| env::var("PORT").ok().and_then(|p| p.parse().ok()))
            .unwrap_or(5001);

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGODB_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGODB_DB"))
            .unwrap_or_else(|_| "lms".to_string());

        let jwt_secret = match settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
        {
            Ok(secret) if !secret.is_empty() => secret,
            _ if environment == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ));
            }
            _ => {
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                DEV_JWT_SECRET.to_string()
            }
        };

        let jwt_ttl_seconds = settings
            .get_int("auth.jwt_ttl_seconds")
            .ok()
            .or_else(|| {
                env::var("JWT_TTL_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(7 * 24 * 3600);

        let cors_allowed_origins = settings
            .get_string("cors.allowed_origins")
            .or_else(|_| env::var("CORS_ALLOWED_ORIGINS"))
            .map(|v| split_list(&v))
            .unwrap_or_else(|_| default_cors_origins());

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            max_requests: settings
                .get_int("rate_limit.max_requests")
                .ok()
                .and_then(|v| u32::try_from(v).ok())
                .or_else(|| env::var("RATE_LIMIT_MAX").ok().and_then(|v| v.parse().ok()))
                .unwrap_or(defaults.max_requests),
            window_seconds: settings
                .get_int("rate_limit.window_seconds")
                .ok()
                .and_then(|v| u64::try_from(v).ok())
                .or_else(|| {
                    env::var("RATE_LIMIT_WINDOW_SECONDS")
                        .ok()
                        .and_then(|v| v.parse().ok())
                })
                .unwrap_or(defaults.window_seconds),
        };

        let admin_seed_file = settings
            .get_string("seed.admin_file")
            .or_else(|_| env::var("ADMIN_SEED_FILE"))
            .ok()
            .filter(|s| !s.is_empty());

        let metrics_auth = match settings
            .get_string("metrics.auth")
            .or_else(|_| env::var("METRICS_AUTH"))
        {
            Ok(credentials) if credentials.contains(':') => credentials,
            Ok(_) => {
                return Err(config::ConfigError::Message(
                    "METRICS_AUTH must have the form user:password".to_string(),
                ));
            }
            Err(_) if environment == "prod" => {
                return Err(config::ConfigError::Message(
                    "METRICS_AUTH must be set in production".to_string(),
                ));
            }
            Err(_) => {
                eprintln!("WARNING: Using default METRICS_AUTH (dev mode only!)");
                DEV_METRICS_AUTH.to_string()
            }
        };

        let otlp_endpoint = settings
            .get_string("telemetry.otlp_endpoint")
            .or_else(|_| env::var("OTEL_EXPORTER_OTLP_ENDPOINT"))
            .ok()
            .filter(|s| !s.is_empty());

        let log_format = settings
            .get_string("telemetry.log_format")
            .or_else(|_| env::var("LOG_FORMAT"))
            .map(|v| LogFormat::parse(&v))
            .unwrap_or_default();

        Ok(Config {
            environment,
            port,
            mongo_uri,
            mongo_database,
            jwt_secret,
            jwt_ttl_seconds,
            cors_allowed_origins,
            rate_limit,
            admin_seed_file,
            metrics_auth,
            otlp_endpoint,
            log_format,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "prod"
    }
}
