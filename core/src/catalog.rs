use std::io::Read;

use anyhow::{Context, Result, bail};
use tracing::warn;

use crate::models::{Nutrition, Product};

/// Default field delimiter for catalog payloads.
pub const DEFAULT_DELIMITER: u8 = b',';

/// Provenance tag stamped on nutrition records built by this parser.
const NUTRITION_SOURCE: &str = "csv_upload";

/// Parse a raw catalog payload into products.
///
/// Columns are mapped by header name, case-insensitive, so column order is
/// free to vary between catalog revisions. Required columns: `id`, `name`,
/// `category`. Everything else is optional.
///
/// Malformed rows never abort the parse: rows that cannot be decoded, rows
/// with fewer fields than the header, and rows missing an id or name are
/// dropped with a diagnostic. Numeric fields that fail to parse become
/// absent, not zero.
pub fn parse_catalog<R: Read>(reader: R, delimiter: u8) -> Result<Vec<Product>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .context("Failed to read catalog headers")?
        .clone();

    let required = ["id", "name", "category"];
    for name in &required {
        if !headers.iter().any(|h| h.eq_ignore_ascii_case(name)) {
            bail!("Missing required column: {name}");
        }
    }

    let col =
        |name: &str| -> Option<usize> { headers.iter().position(|h| h.eq_ignore_ascii_case(name)) };

    let idx_id = col("id").context("Missing 'id' column")?;
    let idx_name = col("name").context("Missing 'name' column")?;
    let idx_category = col("category").context("Missing 'category' column")?;
    let idx_brand = col("brand");
    let idx_subcategory = col("subcategory");
    let idx_size_value = col("size_value");
    let idx_size_unit = col("size_unit");
    let idx_price = col("price");
    let idx_source = col("source");
    let idx_source_url = col("source_url");
    let idx_ingredients = col("ingredients");
    let idx_nutrition = col("nutrition");
    let idx_image_url = col("image_url");
    let idx_last_updated = col("last_updated");
    let idx_search_count = col("search_count");
    let idx_estimated = col("estimated_nutrition");
    let idx_quality = col("quality_score");

    let mut products = Vec::new();

    for (line_num, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping unreadable catalog row {}: {e}", line_num + 2);
                continue;
            }
        };

        if record.len() < headers.len() {
            warn!(
                "Skipping catalog row {}: {} fields, expected {}",
                line_num + 2,
                record.len(),
                headers.len()
            );
            continue;
        }

        let field = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or("");
        let opt_str = |idx: Option<usize>| -> Option<String> {
            let v = field(idx);
            if v.is_empty() { None } else { Some(v.to_string()) }
        };
        let opt_f64 = |idx: Option<usize>| -> Option<f64> { field(idx).parse::<f64>().ok() };

        let id = field(Some(idx_id)).to_string();
        let name = field(Some(idx_name)).to_string();
        if id.is_empty() || name.is_empty() {
            warn!("Skipping catalog row {}: missing id or name", line_num + 2);
            continue;
        }

        products.push(Product {
            id,
            name,
            brand: field(idx_brand).to_string(),
            category: field(Some(idx_category)).to_string(),
            subcategory: opt_str(idx_subcategory),
            size_value: opt_f64(idx_size_value),
            size_unit: opt_str(idx_size_unit),
            price: opt_f64(idx_price),
            source: field(idx_source).to_string(),
            source_url: opt_str(idx_source_url),
            ingredients: opt_str(idx_ingredients),
            image_url: opt_str(idx_image_url),
            last_updated: opt_str(idx_last_updated),
            search_count: field(idx_search_count).parse::<i64>().ok().unwrap_or(0).max(0),
            estimated_nutrition: field(idx_estimated).eq_ignore_ascii_case("true"),
            quality_score: field(idx_quality).parse::<i64>().ok().unwrap_or(0).max(0),
            nutrition: parse_nutrition(field(idx_nutrition)),
        });
    }

    Ok(products)
}

/// Parse the embedded nutrition JSON object from a catalog row.
///
/// Each of the nine numeric fields is extracted independently; a field that
/// is missing or non-numeric is simply absent. `available` is true iff at
/// least one field parsed. Malformed JSON yields an unavailable record.
fn parse_nutrition(raw: &str) -> Nutrition {
    if raw.is_empty() || raw == "{}" {
        return Nutrition::unavailable(NUTRITION_SOURCE);
    }

    let json: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("Malformed nutrition JSON, treating as unavailable: {e}");
            return Nutrition::unavailable(NUTRITION_SOURCE);
        }
    };

    let num = |key: &str| -> Option<f64> { json.get(key).and_then(serde_json::Value::as_f64) };

    let mut nutrition = Nutrition {
        energy_kcal: num("energy_kcal"),
        fat_g: num("fat_g"),
        saturated_fat_g: num("saturated_fat_g"),
        carbs_g: num("carbs_g"),
        sugars_g: num("sugars_g"),
        protein_g: num("protein_g"),
        salt_g: num("salt_g"),
        fiber_g: num("fiber_g"),
        sodium_mg: num("sodium_mg"),
        ..Nutrition::unavailable(NUTRITION_SOURCE)
    };
    nutrition.available = nutrition.has_any_value();
    nutrition
}
