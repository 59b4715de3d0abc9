//! Core library for chow: product models, the local catalog store,
//! the catalog parser, and the sync manager with its fallback chain.

pub mod catalog;
pub mod db;
pub mod models;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::{Nutrition, Product};

    pub(crate) fn sample_product(id: &str, category: &str) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {id}"),
            brand: "Acme".to_string(),
            category: category.to_string(),
            subcategory: None,
            size_value: Some(500.0),
            size_unit: Some("g".to_string()),
            price: Some(2.49),
            source: "catalog".to_string(),
            source_url: None,
            ingredients: None,
            image_url: None,
            last_updated: None,
            search_count: 0,
            estimated_nutrition: false,
            quality_score: 80,
            nutrition: Nutrition {
                available: true,
                energy_kcal: Some(250.0),
                protein_g: Some(8.0),
                ..Nutrition::unavailable("csv_upload")
            },
        }
    }
}
