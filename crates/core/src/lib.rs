pub mod domain;
pub mod enrich;
pub mod ingest;
pub mod storage;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone, Default)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub karenai_api_key: Option<String>,
        pub finnhub_api_key: Option<String>,
        pub alpha_vantage_api_key: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: non_empty_var("DATABASE_URL"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                karenai_api_key: non_empty_var("KARENAI_API_KEY"),
                finnhub_api_key: non_empty_var("FINNHUB_API_KEY"),
                alpha_vantage_api_key: non_empty_var("ALPHA_VANTAGE_API_KEY"),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }
    }

    /// Reads an env var, treating an empty or whitespace-only value as unset.
    pub fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Reads and parses an env var, falling back to `default` when unset or unparsable.
    pub fn parsed_var<T: std::str::FromStr>(key: &str, default: T) -> T {
        non_empty_var(key)
            .and_then(|s| s.parse::<T>().ok())
            .unwrap_or(default)
    }
}
