use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Unit convention for all stored nutrition values.
pub const STANDARD_UNIT: &str = "per100g";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub subcategory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub size_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub size_unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub price: Option<f64>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ingredients: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub search_count: i64,
    #[serde(default)]
    pub estimated_nutrition: bool,
    #[serde(default)]
    pub quality_score: i64,
    pub nutrition: Nutrition,
}

/// Per-100g nutrition snapshot embedded in a [`Product`].
///
/// Each numeric field is independently nullable: `None` means unknown,
/// never zero. When `available` is false the numeric fields must not be
/// treated as meaningful even if populated from stale data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nutrition {
    pub available: bool,
    pub standard_unit: String,
    pub nutrition_source: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_checked: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub energy_kcal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fat_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub saturated_fat_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub carbs_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sugars_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub protein_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub salt_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fiber_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sodium_mg: Option<f64>,
}

impl Nutrition {
    /// An empty record with no usable values, tagged with its provenance.
    #[must_use]
    pub fn unavailable(source: &str) -> Self {
        Self {
            available: false,
            standard_unit: STANDARD_UNIT.to_string(),
            nutrition_source: source.to_string(),
            last_checked: None,
            energy_kcal: None,
            fat_g: None,
            saturated_fat_g: None,
            carbs_g: None,
            sugars_g: None,
            protein_g: None,
            salt_g: None,
            fiber_g: None,
            sodium_mg: None,
        }
    }

    /// Label/value pairs for the nine tracked nutrients, in display order.
    #[must_use]
    pub fn nutrients(&self) -> [(&'static str, Option<f64>); 9] {
        [
            ("Energy (kcal)", self.energy_kcal),
            ("Fat (g)", self.fat_g),
            ("Saturated fat (g)", self.saturated_fat_g),
            ("Carbohydrates (g)", self.carbs_g),
            ("Sugars (g)", self.sugars_g),
            ("Protein (g)", self.protein_g),
            ("Salt (g)", self.salt_g),
            ("Fiber (g)", self.fiber_g),
            ("Sodium (mg)", self.sodium_mg),
        ]
    }

    #[must_use]
    pub fn has_any_value(&self) -> bool {
        self.nutrients().iter().any(|(_, v)| v.is_some())
    }
}

/// Validate a catalog product: non-empty id and name, non-negative counters,
/// non-negative nutrition values where present.
pub fn validate_product(product: &Product) -> Result<()> {
    if product.id.trim().is_empty() {
        bail!("Product id must not be empty");
    }
    if product.name.trim().is_empty() {
        bail!("Product name must not be empty");
    }
    if product.search_count < 0 {
        bail!("search_count must not be negative");
    }
    if product.quality_score < 0 {
        bail!("quality_score must not be negative");
    }
    for (label, value) in product.nutrition.nutrients() {
        if value.is_some_and(|v| v < 0.0) {
            bail!("{label} must not be negative");
        }
    }
    Ok(())
}
