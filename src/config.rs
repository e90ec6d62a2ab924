#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres URL. Without one the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub port: u16,
    pub db_max_connections: u32,
    /// Shared secret expected in the `X-Intake-Token` header.
    pub intake_token: Option<String>,
    pub max_batch_size: usize,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 3000,
            db_max_connections: 10,
            intake_token: None,
            max_batch_size: 100,
            rate_limit_per_second: 10,
            rate_limit_burst: 20,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            database_url: lookup("DATABASE_URL")
                .or_else(|| lookup("DB_URL"))
                .filter(|s| !s.trim().is_empty())
                .map(|url| {
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })
                .transpose()?,
            port: match lookup("PORT") {
                Some(port) => port
                    .parse()
                    .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
                None => defaults.port,
            },
            db_max_connections: match lookup("DB_MAX_CONNECTIONS") {
                Some(raw) => raw
                    .parse::<u32>()
                    .ok()
                    .filter(|n| (1..=100).contains(n))
                    .ok_or_else(|| {
                        anyhow::anyhow!("DB_MAX_CONNECTIONS must be a number between 1-100")
                    })?,
                None => defaults.db_max_connections,
            },
            intake_token: lookup("INTAKE_TOKEN").filter(|s| !s.trim().is_empty()),
            max_batch_size: match lookup("MAX_BATCH_SIZE") {
                Some(raw) => raw
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n >= 1)
                    .ok_or_else(|| anyhow::anyhow!("MAX_BATCH_SIZE must be a positive number"))?,
                None => defaults.max_batch_size,
            },
            rate_limit_per_second: match lookup("RATE_LIMIT_PER_SECOND") {
                Some(raw) => raw
                    .parse::<u64>()
                    .ok()
                    .filter(|n| *n >= 1)
                    .ok_or_else(|| {
                        anyhow::anyhow!("RATE_LIMIT_PER_SECOND must be a positive number")
                    })?,
                None => defaults.rate_limit_per_second,
            },
            rate_limit_burst: match lookup("RATE_LIMIT_BURST") {
                Some(raw) => raw
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n >= 1)
                    .ok_or_else(|| anyhow::anyhow!("RATE_LIMIT_BURST must be a positive number"))?,
                None => defaults.rate_limit_burst,
            },
        };

        // Log successful configuration load (without sensitive values)
        match config.database_url {
            Some(ref url) => {
                tracing::debug!("Database URL: {}...", redacted_prefix(url));
            }
            None => {
                tracing::warn!("DATABASE_URL not set, leads will be kept in memory only");
            }
        }
        if config.intake_token.is_none() {
            tracing::warn!("INTAKE_TOKEN not set, intake endpoints accept unauthenticated requests");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

/// First 20 characters of a connection URL, safe on multibyte input.
fn redacted_prefix(url: &str) -> String {
    url.chars().take(20).collect()
}
