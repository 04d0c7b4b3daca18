use std::env;

/// Startup configuration. The only tunable is the list page size.
#[derive(Debug, Clone)]
pub struct Config {
    pub page_size: i64,
}

const DEFAULT_PAGE_SIZE: i64 = 10;

impl Config {
    pub fn from_env() -> Self {
        let page_size = env::var("SCHOOLRECD_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        Self { page_size }
    }
}
