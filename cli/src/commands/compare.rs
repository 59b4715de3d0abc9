use anyhow::{Result, bail};

use chow_core::db::Database;
use chow_core::models::Product;

use super::helpers::print_comparison_table;

/// Resolve a product by exact id, then by exact (case-insensitive) name,
/// then by a unique substring match.
fn resolve_product(db: &Database, key: &str) -> Result<Product> {
    if let Some(product) = db.get_product(key)? {
        return Ok(product);
    }

    let matches = db.search(key)?;
    if matches.is_empty() {
        bail!("No product matching '{key}'");
    }
    if let Some(exact) = matches.iter().find(|p| p.name.eq_ignore_ascii_case(key)) {
        return Ok(exact.clone());
    }
    if matches.len() == 1 {
        return Ok(matches.into_iter().next().expect("one match"));
    }

    let names: Vec<String> = matches
        .iter()
        .take(5)
        .map(|p| format!("{} ({})", p.name, p.id))
        .collect();
    bail!(
        "'{key}' is ambiguous, matches {} products: {}",
        matches.len(),
        names.join(", ")
    )
}

pub(crate) fn cmd_compare(db: &Database, first: &str, second: &str, json: bool) -> Result<()> {
    let a = resolve_product(db, first)?;
    let b = resolve_product(db, second)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&[&a, &b])?);
    } else {
        print_comparison_table(&a, &b);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chow_core::models::Nutrition;

    fn product(id: &str, name: &str) -> Product {
        Product {
            id: id.to_string(),
            name: name.to_string(),
            brand: "Acme".to_string(),
            category: "Snacks".to_string(),
            subcategory: None,
            size_value: None,
            size_unit: None,
            price: None,
            source: "catalog".to_string(),
            source_url: None,
            ingredients: None,
            image_url: None,
            last_updated: None,
            search_count: 0,
            estimated_nutrition: false,
            quality_score: 0,
            nutrition: Nutrition::unavailable("csv_upload"),
        }
    }

    #[test]
    fn test_resolve_by_id() {
        let db = Database::open_in_memory().unwrap();
        db.insert_all(&[product("p1", "Dark Chocolate"), product("p2", "Milk Chocolate")])
            .unwrap();

        assert_eq!(resolve_product(&db, "p2").unwrap().name, "Milk Chocolate");
    }

    #[test]
    fn test_resolve_by_exact_name_beats_substring() {
        let db = Database::open_in_memory().unwrap();
        db.insert_all(&[product("p1", "Chocolate"), product("p2", "Chocolate Spread")])
            .unwrap();

        assert_eq!(resolve_product(&db, "chocolate").unwrap().id, "p1");
    }

    #[test]
    fn test_resolve_unique_substring() {
        let db = Database::open_in_memory().unwrap();
        db.insert_all(&[product("p1", "Dark Chocolate"), product("p2", "Oat Milk")])
            .unwrap();

        assert_eq!(resolve_product(&db, "oat").unwrap().id, "p2");
    }

    #[test]
    fn test_resolve_ambiguous_fails() {
        let db = Database::open_in_memory().unwrap();
        db.insert_all(&[product("p1", "Dark Chocolate"), product("p2", "Milk Chocolate")])
            .unwrap();

        let err = resolve_product(&db, "chocolate").unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn test_resolve_missing_fails() {
        let db = Database::open_in_memory().unwrap();
        assert!(resolve_product(&db, "nothing").is_err());
    }
}
