use anyhow::Result;
use std::process;

use chow_core::db::Database;
use chow_core::models::Product;

use super::helpers::print_product_table;

pub(crate) fn cmd_categories(db: &Database, json: bool) -> Result<()> {
    let categories = db.distinct_categories()?;

    if categories.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No categories found. Run 'chow sync' first.");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&categories)?);
    } else {
        for category in &categories {
            println!("{category}");
        }
    }

    Ok(())
}

pub(crate) fn cmd_browse(db: &Database, category: &str, json: bool) -> Result<()> {
    let products = db.products_by_category(category)?;

    if products.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No products in category '{category}'");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&products)?);
    } else {
        let refs: Vec<&Product> = products.iter().collect();
        print_product_table(&refs);
    }

    Ok(())
}

pub(crate) fn cmd_search(db: &Database, query: &str, json: bool) -> Result<()> {
    let products = db.search(query)?;

    if products.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No products matching '{query}'");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&products)?);
    } else {
        let refs: Vec<&Product> = products.iter().collect();
        print_product_table(&refs);
    }

    Ok(())
}
