use anyhow::Result;
use serde::Serialize;

use chow_core::db::Database;
use chow_core::sync::{FreshnessTracker, PayloadCache, SyncConfig, SyncManager};

use crate::config::Config;
use crate::fetch::HttpCatalogClient;

/// Default catalog shipped with the binary; used only when the network,
/// the on-disk cache, and the existing store all came up empty.
const BUNDLED_CATALOG: &str = include_str!("../../assets/products.csv");

pub(crate) fn build_sync_manager<'a>(db: &'a Database, config: &Config) -> SyncManager<'a> {
    SyncManager::new(
        db,
        FreshnessTracker::new(&config.state_path),
        PayloadCache::new(&config.cache_path),
        SyncConfig {
            validity_days: config.validity_days,
            delimiter: config.delimiter,
            bundled_catalog: Some(BUNDLED_CATALOG.to_string()),
        },
    )
}

pub(crate) fn cmd_sync(
    db: &Database,
    config: &Config,
    force: bool,
    reset: bool,
    json: bool,
) -> Result<()> {
    let manager = build_sync_manager(db, config);
    if reset {
        manager.tracker().reset()?;
    }

    let client = HttpCatalogClient::new(config.catalog_url.clone())?;
    if force {
        manager.refresh(&client);
    } else {
        manager.initialize(&client);
    }

    report(db, &manager, json)
}

pub(crate) fn cmd_status(db: &Database, config: &Config, json: bool) -> Result<()> {
    let manager = build_sync_manager(db, config);
    report(db, &manager, json)
}

fn report(db: &Database, manager: &SyncManager<'_>, json: bool) -> Result<()> {
    #[derive(Serialize)]
    struct StatusReport {
        products: i64,
        categories: usize,
        last_fetch: String,
    }

    let report = StatusReport {
        products: db.count()?,
        categories: db.distinct_categories()?.len(),
        last_fetch: manager.tracker().last_fetch_display(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} products in {} categories. Last fetch: {}",
            report.products, report.categories, report.last_fetch
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chow_core::catalog::{DEFAULT_DELIMITER, parse_catalog};

    #[test]
    fn test_bundled_catalog_parses() {
        let products = parse_catalog(BUNDLED_CATALOG.as_bytes(), DEFAULT_DELIMITER).unwrap();
        assert!(products.len() >= 2);
        assert!(products.iter().all(|p| !p.id.is_empty()));
        assert!(products.iter().all(|p| p.nutrition.available));
        assert!(products.iter().all(|p| p.source == "bundled"));
    }
}
