use std::path::Path;
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use tracing::warn;

use crate::models::{Nutrition, Product};

/// Query shapes a live subscription can observe.
#[derive(Debug, Clone, PartialEq, Eq)]
enum WatchQuery {
    Category(String),
    Search(String),
}

struct ProductWatcher {
    query: WatchQuery,
    sender: Sender<Vec<Product>>,
}

struct CategoryWatcher {
    sender: Sender<Vec<String>>,
}

/// Local catalog store over sqlite.
///
/// Mutating operations re-run every live subscription and push the full
/// latest result set to its receiver (a snapshot, not a diff). The
/// delete-and-insert replace runs in one transaction, so observers only
/// ever see pre- or post-replace snapshots.
pub struct Database {
    conn: Connection,
    product_watchers: Mutex<Vec<ProductWatcher>>,
    category_watchers: Mutex<Vec<CategoryWatcher>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Self::from_conn(conn);
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Self::from_conn(Connection::open_in_memory()?);
        db.migrate()?;
        Ok(db)
    }

    fn from_conn(conn: Connection) -> Self {
        Self {
            conn,
            product_watchers: Mutex::new(Vec::new()),
            category_watchers: Mutex::new(Vec::new()),
        }
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS products (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    brand TEXT NOT NULL,
                    category TEXT NOT NULL,
                    subcategory TEXT,
                    size_value REAL,
                    size_unit TEXT,
                    price REAL,
                    source TEXT NOT NULL,
                    source_url TEXT,
                    ingredients TEXT,
                    image_url TEXT,
                    last_updated TEXT,
                    search_count INTEGER NOT NULL DEFAULT 0,
                    estimated_nutrition INTEGER NOT NULL DEFAULT 0,
                    quality_score INTEGER NOT NULL DEFAULT 0,
                    nutrition_available INTEGER NOT NULL DEFAULT 0,
                    standard_unit TEXT NOT NULL DEFAULT 'per100g',
                    nutrition_source TEXT NOT NULL DEFAULT '',
                    last_checked INTEGER,
                    energy_kcal REAL,
                    fat_g REAL,
                    saturated_fat_g REAL,
                    carbs_g REAL,
                    sugars_g REAL,
                    protein_g REAL,
                    salt_g REAL,
                    fiber_g REAL,
                    sodium_mg REAL
                );

                CREATE INDEX IF NOT EXISTS idx_products_category ON products(category);
                CREATE INDEX IF NOT EXISTS idx_products_name ON products(name);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn product_from_row(row: &rusqlite::Row) -> rusqlite::Result<Product> {
        Ok(Product {
            id: row.get(0)?,
            name: row.get(1)?,
            brand: row.get(2)?,
            category: row.get(3)?,
            subcategory: row.get(4)?,
            size_value: row.get(5)?,
            size_unit: row.get(6)?,
            price: row.get(7)?,
            source: row.get(8)?,
            source_url: row.get(9)?,
            ingredients: row.get(10)?,
            image_url: row.get(11)?,
            last_updated: row.get(12)?,
            search_count: row.get(13)?,
            estimated_nutrition: row.get(14)?,
            quality_score: row.get(15)?,
            nutrition: Nutrition {
                available: row.get(16)?,
                standard_unit: row.get(17)?,
                nutrition_source: row.get(18)?,
                last_checked: row.get(19)?,
                energy_kcal: row.get(20)?,
                fat_g: row.get(21)?,
                saturated_fat_g: row.get(22)?,
                carbs_g: row.get(23)?,
                sugars_g: row.get(24)?,
                protein_g: row.get(25)?,
                salt_g: row.get(26)?,
                fiber_g: row.get(27)?,
                sodium_mg: row.get(28)?,
            },
        })
    }

    fn insert_with(tx: &Connection, product: &Product) -> rusqlite::Result<()> {
        tx.execute(
            "INSERT OR REPLACE INTO products (
                id, name, brand, category, subcategory, size_value, size_unit, price,
                source, source_url, ingredients, image_url, last_updated,
                search_count, estimated_nutrition, quality_score,
                nutrition_available, standard_unit, nutrition_source, last_checked,
                energy_kcal, fat_g, saturated_fat_g, carbs_g, sugars_g,
                protein_g, salt_g, fiber_g, sodium_mg
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                      ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26,
                      ?27, ?28, ?29)",
            params![
                product.id,
                product.name,
                product.brand,
                product.category,
                product.subcategory,
                product.size_value,
                product.size_unit,
                product.price,
                product.source,
                product.source_url,
                product.ingredients,
                product.image_url,
                product.last_updated,
                product.search_count,
                product.estimated_nutrition,
                product.quality_score,
                product.nutrition.available,
                product.nutrition.standard_unit,
                product.nutrition.nutrition_source,
                product.nutrition.last_checked,
                product.nutrition.energy_kcal,
                product.nutrition.fat_g,
                product.nutrition.saturated_fat_g,
                product.nutrition.carbs_g,
                product.nutrition.sugars_g,
                product.nutrition.protein_g,
                product.nutrition.salt_g,
                product.nutrition.fiber_g,
                product.nutrition.sodium_mg,
            ],
        )?;
        Ok(())
    }

    // --- Catalog mutation ---

    /// Bulk insert, replacing on conflicting id. One transaction.
    pub fn insert_all(&self, products: &[Product]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for product in products {
            Self::insert_with(&tx, product)?;
        }
        tx.commit()?;
        self.notify_watchers();
        Ok(())
    }

    /// Atomically swap the whole catalog: delete-all plus insert-all in a
    /// single transaction, so a concurrent reader never observes the empty
    /// intermediate state.
    pub fn replace_all(&self, products: &[Product]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM products", [])?;
        for product in products {
            Self::insert_with(&tx, product)?;
        }
        tx.commit()?;
        self.notify_watchers();
        Ok(())
    }

    pub fn delete_all(&self) -> Result<()> {
        self.conn.execute("DELETE FROM products", [])?;
        self.notify_watchers();
        Ok(())
    }

    // --- Queries ---

    pub fn count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn get_product(&self, id: &str) -> Result<Option<Product>> {
        let mut stmt = self.conn.prepare("SELECT * FROM products WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::product_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn products_by_category(&self, category: &str) -> Result<Vec<Product>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM products WHERE category = ?1 ORDER BY name")?;
        let products = stmt
            .query_map(params![category], Self::product_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(products)
    }

    /// Case-insensitive substring match against name or brand.
    pub fn search(&self, query: &str) -> Result<Vec<Product>> {
        let escaped = query
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{escaped}%");
        let mut stmt = self.conn.prepare(
            "SELECT * FROM products WHERE name LIKE ?1 ESCAPE '\\' OR brand LIKE ?1 ESCAPE '\\' ORDER BY name",
        )?;
        let products = stmt
            .query_map(params![pattern], Self::product_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(products)
    }

    pub fn distinct_categories(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT category FROM products ORDER BY category")?;
        let categories = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(categories)
    }

    // --- Observed queries ---
    //
    // Each subscription is re-run and pushed on every mutation; receivers
    // that have been dropped are pruned on the next push.

    pub fn watch_category(&self, category: &str) -> Receiver<Vec<Product>> {
        self.watch_products(WatchQuery::Category(category.to_string()))
    }

    pub fn watch_search(&self, query: &str) -> Receiver<Vec<Product>> {
        self.watch_products(WatchQuery::Search(query.to_string()))
    }

    pub fn watch_categories(&self) -> Receiver<Vec<String>> {
        let (sender, receiver) = mpsc::channel();
        if let Ok(snapshot) = self.distinct_categories() {
            let _ = sender.send(snapshot);
        }
        self.category_watchers
            .lock()
            .expect("category watcher lock poisoned")
            .push(CategoryWatcher { sender });
        receiver
    }

    fn watch_products(&self, query: WatchQuery) -> Receiver<Vec<Product>> {
        let (sender, receiver) = mpsc::channel();
        if let Ok(snapshot) = self.run_watch_query(&query) {
            let _ = sender.send(snapshot);
        }
        self.product_watchers
            .lock()
            .expect("product watcher lock poisoned")
            .push(ProductWatcher { query, sender });
        receiver
    }

    fn run_watch_query(&self, query: &WatchQuery) -> Result<Vec<Product>> {
        match query {
            WatchQuery::Category(category) => self.products_by_category(category),
            WatchQuery::Search(text) => self.search(text),
        }
    }

    fn notify_watchers(&self) {
        let mut product_watchers = self
            .product_watchers
            .lock()
            .expect("product watcher lock poisoned");
        product_watchers.retain(|watcher| match self.run_watch_query(&watcher.query) {
            Ok(snapshot) => watcher.sender.send(snapshot).is_ok(),
            Err(e) => {
                warn!("Observed query failed, keeping subscription: {e:#}");
                true
            }
        });
        drop(product_watchers);

        let mut category_watchers = self
            .category_watchers
            .lock()
            .expect("category watcher lock poisoned");
        match self.distinct_categories() {
            Ok(snapshot) => {
                category_watchers.retain(|watcher| watcher.sender.send(snapshot.clone()).is_ok());
            }
            Err(e) => warn!("Category query failed, keeping subscriptions: {e:#}"),
        }
    }
}
