use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::env;
use std::path::PathBuf;

use chow_core::catalog::DEFAULT_DELIMITER;
use chow_core::sync::DEFAULT_VALIDITY_DAYS;

const DEFAULT_CATALOG_URL: &str = "https://catalog.chow-tools.dev/products.csv";

pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub cache_path: PathBuf,
    pub state_path: PathBuf,
    pub catalog_url: String,
    pub validity_days: u32,
    pub delimiter: u8,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "chow").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let catalog_url =
            env::var("CHOW_CATALOG_URL").unwrap_or_else(|_| DEFAULT_CATALOG_URL.to_string());
        let validity_days = env::var("CHOW_CACHE_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_VALIDITY_DAYS);
        let delimiter = env::var("CHOW_CATALOG_DELIM")
            .ok()
            .and_then(|v| v.into_bytes().first().copied())
            .unwrap_or(DEFAULT_DELIMITER);

        Ok(Config {
            db_path: data_dir.join("chow.db"),
            cache_path: data_dir.join("catalog_cache.csv"),
            state_path: data_dir.join("sync_state.json"),
            data_dir,
            catalog_url,
            validity_days,
            delimiter,
        })
    }
}
