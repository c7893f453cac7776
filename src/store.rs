//! Item store: persistence and ranked full-text queries.
//!
//! The [`ItemStore`] trait is the only way the loader and the query service
//! touch the index. [`SqliteItemStore`] backs it with the `items` table and
//! its FTS5 index (see [`migrate`](crate::migrate)).
//!
//! Match expressions passed in are FTS5 query strings, already built by
//! [`search::to_match_expression`](crate::search::to_match_expression).

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Row, SqlitePool};

/// One persisted row of the `items` table.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRecord {
    pub id: String,
    pub collection: String,
    pub title: String,
    pub image_url: Option<String>,
    pub date: NaiveDate,
    pub year: i32,
    pub full_text: String,
}

/// A ranked match. `score` is the FTS5 bm25 rank; lower is better.
#[derive(Debug, Clone)]
pub struct RankedRow {
    pub id: String,
    pub collection: String,
    pub title: String,
    pub date: String,
    pub year: i32,
    pub full_text: String,
    pub score: f64,
}

/// Abstract item store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_item`](ItemStore::upsert_item) | Insert or replace one item and its search vector |
/// | [`get_item`](ItemStore::get_item) | Fetch one item by identifier |
/// | [`count_items`](ItemStore::count_items) | Number of indexed items |
/// | [`search_ranked`](ItemStore::search_ranked) | One page of ranked matches |
/// | [`count_matches`](ItemStore::count_matches) | Total matches for a query |
/// | [`year_facet`](ItemStore::year_facet) | Match counts grouped by year |
/// | [`collection_facet`](ItemStore::collection_facet) | Match counts grouped by collection |
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Insert or update an item. The search vector is recomputed in the
    /// same statement, so readers never see a row without it.
    async fn upsert_item(&self, item: &ItemRecord) -> Result<(), sqlx::Error>;

    async fn get_item(&self, id: &str) -> Result<Option<ItemRecord>, sqlx::Error>;

    async fn count_items(&self) -> Result<i64, sqlx::Error>;

    /// Matches ordered by rank, then identifier.
    async fn search_ranked(
        &self,
        match_expr: &str,
        year: Option<i32>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RankedRow>, sqlx::Error>;

    async fn count_matches(&self, match_expr: &str, year: Option<i32>)
        -> Result<i64, sqlx::Error>;

    /// Ignores any year filter. Ordered by count desc, then year.
    async fn year_facet(&self, match_expr: &str) -> Result<Vec<(i32, i64)>, sqlx::Error>;

    /// Ordered by count desc, then collection name.
    async fn collection_facet(&self, match_expr: &str)
        -> Result<Vec<(String, i64)>, sqlx::Error>;
}

#[derive(Clone)]
pub struct SqliteItemStore {
    pool: SqlitePool,
}

impl SqliteItemStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    async fn upsert_item(&self, item: &ItemRecord) -> Result<(), sqlx::Error> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO items (id, collection, title, image_url, date, year, full_text, harvested_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                collection = excluded.collection,
                title = excluded.title,
                image_url = excluded.image_url,
                date = excluded.date,
                year = excluded.year,
                full_text = excluded.full_text,
                harvested_at = excluded.harvested_at
            "#,
        )
        .bind(&item.id)
        .bind(&item.collection)
        .bind(&item.title)
        .bind(&item.image_url)
        .bind(item.date.format("%Y-%m-%d").to_string())
        .bind(item.year)
        .bind(&item.full_text)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_item(&self, id: &str) -> Result<Option<ItemRecord>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, collection, title, image_url, date, year, full_text FROM items WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let date: String = row.get("date");
        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(Some(ItemRecord {
            id: row.get("id"),
            collection: row.get("collection"),
            title: row.get("title"),
            image_url: row.get("image_url"),
            date,
            year: row.get("year"),
            full_text: row.get("full_text"),
        }))
    }

    async fn count_items(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM items")
            .fetch_one(&self.pool)
            .await
    }

    async fn search_ranked(
        &self,
        match_expr: &str,
        year: Option<i32>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RankedRow>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT i.id, i.collection, i.title, i.date, i.year, i.full_text,
                   bm25(items_fts) AS score
            FROM items_fts
            JOIN items i ON i.pk = items_fts.rowid
            WHERE items_fts MATCH ?1
              AND (?2 IS NULL OR i.year = ?2)
            ORDER BY score, i.id
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(match_expr)
        .bind(year)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| RankedRow {
                id: row.get("id"),
                collection: row.get("collection"),
                title: row.get("title"),
                date: row.get("date"),
                year: row.get("year"),
                full_text: row.get("full_text"),
                score: row.get("score"),
            })
            .collect())
    }

    async fn count_matches(
        &self,
        match_expr: &str,
        year: Option<i32>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM items_fts
            JOIN items i ON i.pk = items_fts.rowid
            WHERE items_fts MATCH ?1
              AND (?2 IS NULL OR i.year = ?2)
            "#,
        )
        .bind(match_expr)
        .bind(year)
        .fetch_one(&self.pool)
        .await
    }

    async fn year_facet(&self, match_expr: &str) -> Result<Vec<(i32, i64)>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT i.year AS year, COUNT(*) AS n
            FROM items_fts
            JOIN items i ON i.pk = items_fts.rowid
            WHERE items_fts MATCH ?
            GROUP BY i.year
            ORDER BY n DESC, i.year ASC
            "#,
        )
        .bind(match_expr)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| (r.get("year"), r.get("n"))).collect())
    }

    async fn collection_facet(
        &self,
        match_expr: &str,
    ) -> Result<Vec<(String, i64)>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT i.collection AS collection, COUNT(*) AS n
            FROM items_fts
            JOIN items i ON i.pk = items_fts.rowid
            WHERE items_fts MATCH ?
            GROUP BY i.collection
            ORDER BY n DESC, i.collection ASC
            "#,
        )
        .bind(match_expr)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| (r.get("collection"), r.get("n")))
            .collect())
    }
}
