use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::{anyhow, Context};
use tracing::{info, warn};

const DEFAULT_FOOTER: &str = "\n\nShopping list generated by Foodgram";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub media_root: PathBuf,
    pub media_url: String,
    /// Default page size and default `recipes_limit` for subscriptions.
    pub page_size: i64,
    /// Appended verbatim after the last line of a downloaded shopping list.
    pub shopping_list_footer: String,
    pub ingredients_file: Option<PathBuf>,
    /// Requests per second; 0 disables the limiter.
    pub rate_limit_per_sec: u64,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let page_size: i64 = try_load("PAGE_SIZE", "6")?;
        if page_size < 1 {
            return Err(anyhow!("PAGE_SIZE must be at least 1, got {page_size}"));
        }

        Ok(Self {
            port: try_load("PORT", "8000")?,
            database_url: try_load("DATABASE_URL", "sqlite://foodgram.db?mode=rwc")?,
            media_root: try_load::<String>("MEDIA_ROOT", "media")?.into(),
            media_url: try_load::<String>("MEDIA_URL", "/media")?
                .trim_end_matches('/')
                .to_string(),
            page_size,
            shopping_list_footer: var("SHOPPING_LIST_FOOTER")
                .unwrap_or_else(|_| DEFAULT_FOOTER.to_string()),
            ingredients_file: var("INGREDIENTS_FILE").ok().map(PathBuf::from),
            rate_limit_per_sec: try_load("RATE_LIMIT_PER_SEC", "0")?,
        })
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        info!("Environment variable {key} not found");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            anyhow!("{e}")
        })
        .with_context(|| format!("environment variable {key} is misconfigured"))
}
