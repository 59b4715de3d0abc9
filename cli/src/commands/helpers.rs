use tabled::{
    Table, Tabled,
    builder::Builder,
    settings::{Alignment, Modify, Style, object::Columns},
};

use chow_core::models::Product;

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

/// Render a nutrient value, honoring the availability flag: values from an
/// unavailable record are never shown.
pub(crate) fn fmt_nutrient(value: Option<f64>, available: bool) -> String {
    if !available {
        return "-".to_string();
    }
    value.map_or("-".into(), |v| format!("{v:.1}"))
}

pub(crate) fn print_product_table(products: &[&Product]) {
    #[derive(Tabled)]
    struct ProductRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Brand")]
        brand: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "kcal/100g")]
        energy: String,
        #[tabled(rename = "Protein/100g")]
        protein: String,
        #[tabled(rename = "Price")]
        price: String,
    }

    let rows: Vec<ProductRow> = products
        .iter()
        .enumerate()
        .map(|(i, p)| ProductRow {
            idx: i + 1,
            id: p.id.clone(),
            name: truncate(&p.name, 35),
            brand: truncate(&p.brand, 20),
            category: truncate(&p.category, 20),
            energy: fmt_nutrient(p.nutrition.energy_kcal, p.nutrition.available),
            protein: fmt_nutrient(p.nutrition.protein_g, p.nutrition.available),
            price: p.price.map_or("-".into(), |v| format!("{v:.2}")),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(5..8)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

/// Side-by-side nutrient table for two products, per 100g.
pub(crate) fn print_comparison_table(a: &Product, b: &Product) {
    let mut builder = Builder::default();
    builder.push_record([String::new(), truncate(&a.name, 30), truncate(&b.name, 30)]);
    builder.push_record([
        "Brand".to_string(),
        truncate(&a.brand, 30),
        truncate(&b.brand, 30),
    ]);
    builder.push_record([
        "Size".to_string(),
        fmt_size(a.size_value, a.size_unit.as_deref()),
        fmt_size(b.size_value, b.size_unit.as_deref()),
    ]);
    builder.push_record([
        "Price".to_string(),
        a.price.map_or("-".into(), |v| format!("{v:.2}")),
        b.price.map_or("-".into(), |v| format!("{v:.2}")),
    ]);

    for ((label, va), (_, vb)) in a
        .nutrition
        .nutrients()
        .into_iter()
        .zip(b.nutrition.nutrients())
    {
        builder.push_record([
            label.to_string(),
            fmt_nutrient(va, a.nutrition.available),
            fmt_nutrient(vb, b.nutrition.available),
        ]);
    }

    let table = builder
        .build()
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    for p in [a, b] {
        if !p.nutrition.available {
            println!("Note: no nutrition data available for {}", p.name);
        } else if p.estimated_nutrition {
            println!("Note: nutrition for {} was estimated", p.name);
        }
    }
}

fn fmt_size(value: Option<f64>, unit: Option<&str>) -> String {
    match (value, unit) {
        (Some(v), Some(u)) => format!("{v:.0} {u}"),
        (Some(v), None) => format!("{v:.0}"),
        _ => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly-10", 10), "exactly-10");
        assert_eq!(truncate("a much longer name", 10), "a much lo…");
    }

    #[test]
    fn test_fmt_nutrient_hides_unavailable_values() {
        assert_eq!(fmt_nutrient(Some(12.34), true), "12.3");
        assert_eq!(fmt_nutrient(None, true), "-");
        // Stale numbers behind an unavailable flag must not leak.
        assert_eq!(fmt_nutrient(Some(12.34), false), "-");
    }

    #[test]
    fn test_fmt_size() {
        assert_eq!(fmt_size(Some(500.0), Some("g")), "500 g");
        assert_eq!(fmt_size(None, None), "-");
    }
}
