use std::time::Duration;

const DEFAULT_TOKEN_DAYS: u64 = 7;
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;
const MAX_TOKEN_SECS: u64 = 365 * SECONDS_PER_DAY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Remote object storage for listing images. Absent means images are inlined.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub public_base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub public_base_url: String,
    pub s3: Option<S3Config>,
    pub email: Option<EmailConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::parse(&env_or("APP_ENV", "development"));

        let secret = match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ if environment.is_production() => anyhow::bail!("JWT_SECRET must be set in production"),
            _ => "dev-secret".into(),
        };
        let jwt = JwtConfig {
            secret,
            ttl: parse_token_ttl(&env_or("JWT_TTL", "7d")),
        };

        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL")?,
            max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(10),
        };

        let s3 = match (
            optional_env("S3_ENDPOINT"),
            optional_env("S3_BUCKET"),
            optional_env("S3_ACCESS_KEY"),
            optional_env("S3_SECRET_KEY"),
        ) {
            (Some(endpoint), Some(bucket), Some(access_key), Some(secret_key)) => Some(S3Config {
                endpoint,
                bucket,
                access_key,
                secret_key,
                region: env_or("S3_REGION", "us-east-1"),
                public_base_url: optional_env("S3_PUBLIC_BASE_URL"),
            }),
            _ => None,
        };

        let email = optional_env("EMAIL_API_URL").map(|api_url| EmailConfig {
            api_url,
            api_key: optional_env("EMAIL_API_KEY"),
            from: env_or("EMAIL_FROM", "noreply@campusshelf.com"),
        });

        Ok(Self {
            environment,
            database,
            jwt,
            public_base_url: env_or("PUBLIC_BASE_URL", "http://localhost:3000"),
            s3,
            email,
        })
    }
}

/// Session lifetime from either a day count (`"7d"`) or a raw second count (`"3600"`).
/// Anything else falls back to seven days; lifetimes are capped at a year.
pub fn parse_token_ttl(raw: &str) -> Duration {
    let raw = raw.trim();
    let secs = match raw.strip_suffix('d') {
        Some(days) => days
            .parse::<u64>()
            .ok()
            .filter(|d| *d > 0)
            .map(|d| d.checked_mul(SECONDS_PER_DAY).unwrap_or(u64::MAX)),
        None => raw.parse::<u64>().ok().filter(|s| *s > 0),
    };
    let secs = secs.unwrap_or(DEFAULT_TOKEN_DAYS * SECONDS_PER_DAY);
    Duration::from_secs(secs.min(MAX_TOKEN_SECS))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    optional_env(key).unwrap_or_else(|| default.to_string())
}
