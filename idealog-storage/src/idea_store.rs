//! Idea repository — CRUD and date-indexed queries over top-level notes.
//!
//! The `date_index` column stores the date with separators stripped
//! (`YYYYMMDD`); prefix matches against it service the month queries. It is
//! derived from `date` on every write and never settable on its own. When a
//! date-index query fails, the repository falls back to a range scan over
//! the canonical `date` column and contains the failure — index queries are
//! an optimization, not the source of truth.

use crate::error::StorageResult;
use crate::now_ms;
use chrono::NaiveDate;
use duckdb::{params, Connection};
use idealog_model::{Idea, IdeaPatch, NewIdea};
use std::sync::{Arc, Mutex};
use tracing::{error, warn};
use uuid::Uuid;

const IDEA_COLUMNS: &str = "id, hint, detail, date, category, completed, created_at, updated_at";

/// The derived date index: the date with separators stripped.
pub fn date_index(date: &NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

fn date_column(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// First and last day of a month. `None` for an out-of-range month.
fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next_first.pred_opt()?))
}

/// Repository over the `ideas` table.
#[derive(Clone)]
pub struct IdeaStore {
    conn: Arc<Mutex<Connection>>,
}

impl IdeaStore {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Inserts a new Idea, deriving its date index, and returns the
    /// assigned id.
    pub fn add(&self, idea: &NewIdea) -> StorageResult<String> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::new_v4().to_string();
        let now = now_ms();
        conn.execute(
            r#"
            INSERT INTO ideas (id, hint, detail, date, date_index, category, completed, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                id,
                idea.hint,
                idea.detail,
                date_column(&idea.date),
                date_index(&idea.date),
                idea.category.as_deref(),
                idea.completed,
                now,
                now,
            ],
        )?;
        Ok(id)
    }

    /// Applies only the supplied fields. An empty patch performs no write
    /// at all; any supplied field also refreshes `updated_at`, and a
    /// supplied date recomputes the derived index in the same statement.
    pub fn update(&self, id: &str, patch: &IdeaPatch) -> StorageResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let conn = self.conn.lock().unwrap();
        let date = patch.date.as_ref().map(date_column);
        let index = patch.date.as_ref().map(date_index);
        conn.execute(
            r#"
            UPDATE ideas SET
                hint = COALESCE(?, hint),
                detail = COALESCE(?, detail),
                date = COALESCE(?, date),
                date_index = COALESCE(?, date_index),
                category = COALESCE(?, category),
                completed = COALESCE(?, completed),
                updated_at = ?
            WHERE id = ?
            "#,
            params![
                patch.hint.as_deref(),
                patch.detail.as_deref(),
                date.as_deref(),
                index.as_deref(),
                patch.category.as_deref(),
                patch.completed,
                now_ms(),
                id,
            ],
        )?;
        Ok(())
    }

    /// Deletes an Idea and every Block it owns, atomically.
    pub fn delete(&self, id: &str) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM blocks WHERE idea_id = ?", params![id])?;
        tx.execute("DELETE FROM ideas WHERE id = ?", params![id])?;
        tx.commit()?;
        Ok(())
    }

    /// Fetches a single Idea.
    pub fn get(&self, id: &str) -> StorageResult<Option<Idea>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            &format!("SELECT {IDEA_COLUMNS} FROM ideas WHERE id = ?"),
            params![id],
            row_to_idea,
        );
        match result {
            Ok(idea) => Ok(Some(idea)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All Ideas on an exact date, oldest first.
    pub fn get_by_date(&self, date: NaiveDate) -> StorageResult<Vec<Idea>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {IDEA_COLUMNS} FROM ideas WHERE date = ? ORDER BY created_at ASC"
        ))?;
        let ideas = stmt
            .query_map(params![date_column(&date)], row_to_idea)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ideas)
    }

    /// All Ideas in a month. Served from the derived date index when
    /// possible; an index failure falls back to a range scan over the
    /// canonical date column, and a fallback failure yields an empty list
    /// rather than an error.
    pub fn get_by_month(&self, year: i32, month: u32) -> StorageResult<Vec<Idea>> {
        let Some((first, last)) = month_bounds(year, month) else {
            return Ok(Vec::new());
        };
        match self.ideas_by_index_prefix(year, month) {
            Ok(ideas) => Ok(ideas),
            Err(e) => {
                warn!("[IDEAS] date-index month query failed, using range scan: {e}");
                match self.ideas_in_range(first, last) {
                    Ok(ideas) => Ok(ideas),
                    Err(e) => {
                        error!("[IDEAS] range-scan fallback failed: {e}");
                        Ok(Vec::new())
                    }
                }
            }
        }
    }

    /// All Ideas, newest date first, newest creation first within a date.
    pub fn get_all(&self) -> StorageResult<Vec<Idea>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {IDEA_COLUMNS} FROM ideas ORDER BY date DESC, created_at DESC"
        ))?;
        let ideas = stmt
            .query_map([], row_to_idea)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ideas)
    }

    /// Case-insensitive substring match against hint and detail.
    pub fn search(&self, keyword: &str) -> StorageResult<Vec<Idea>> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("%{keyword}%");
        let mut stmt = conn.prepare(&format!(
            "SELECT {IDEA_COLUMNS} FROM ideas \
             WHERE LOWER(hint) LIKE LOWER(?) OR LOWER(detail) LIKE LOWER(?) \
             ORDER BY date DESC, created_at DESC"
        ))?;
        let ideas = stmt
            .query_map(params![pattern, pattern], row_to_idea)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ideas)
    }

    /// Distinct dates having at least one Idea, ascending.
    pub fn get_dates_with_ideas(&self) -> StorageResult<Vec<NaiveDate>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT DISTINCT date FROM ideas ORDER BY date ASC")?;
        let dates = collect_dates(&mut stmt, [])?;
        Ok(dates)
    }

    /// Distinct dates in a month with at least one Idea, ascending. Same
    /// fast-path/fallback contract as `get_by_month`.
    pub fn get_dates_with_ideas_by_month(
        &self,
        year: i32,
        month: u32,
    ) -> StorageResult<Vec<NaiveDate>> {
        let Some((first, last)) = month_bounds(year, month) else {
            return Ok(Vec::new());
        };
        match self.dates_by_index_prefix(year, month) {
            Ok(dates) => Ok(dates),
            Err(e) => {
                warn!("[IDEAS] date-index dates query failed, using range scan: {e}");
                match self.get_dates_with_ideas_in_range(first, last) {
                    Ok(dates) => Ok(dates),
                    Err(e) => {
                        error!("[IDEAS] range-scan fallback failed: {e}");
                        Ok(Vec::new())
                    }
                }
            }
        }
    }

    /// Distinct dates inside an inclusive range, ascending. Also the range
    /// scan behind the month fallback path.
    pub fn get_dates_with_ideas_in_range(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> StorageResult<Vec<NaiveDate>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT DISTINCT date FROM ideas WHERE date BETWEEN ? AND ? ORDER BY date ASC")?;
        let dates = collect_dates(&mut stmt, params![date_column(&first), date_column(&last)])?;
        Ok(dates)
    }

    /// Bulk-deletes Ideas with no title text, cascading to their Blocks.
    /// Returns the number of Ideas removed.
    pub fn cleanup_empty_ideas(&self) -> StorageResult<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM blocks WHERE idea_id IN (SELECT id FROM ideas WHERE hint IS NULL OR hint = '')",
            [],
        )?;
        let removed = tx.execute("DELETE FROM ideas WHERE hint IS NULL OR hint = ''", [])?;
        tx.commit()?;
        Ok(removed)
    }

    /// Number of Ideas in the store.
    pub fn count(&self) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM ideas", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn ideas_by_index_prefix(&self, year: i32, month: u32) -> StorageResult<Vec<Idea>> {
        let conn = self.conn.lock().unwrap();
        let prefix = format!("{year:04}{month:02}%");
        let mut stmt = conn.prepare(&format!(
            "SELECT {IDEA_COLUMNS} FROM ideas WHERE date_index LIKE ? ORDER BY date ASC, created_at ASC"
        ))?;
        let ideas = stmt
            .query_map(params![prefix], row_to_idea)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ideas)
    }

    fn ideas_in_range(&self, first: NaiveDate, last: NaiveDate) -> StorageResult<Vec<Idea>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {IDEA_COLUMNS} FROM ideas WHERE date BETWEEN ? AND ? ORDER BY date ASC, created_at ASC"
        ))?;
        let ideas = stmt
            .query_map(params![date_column(&first), date_column(&last)], row_to_idea)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ideas)
    }

    fn dates_by_index_prefix(&self, year: i32, month: u32) -> StorageResult<Vec<NaiveDate>> {
        let conn = self.conn.lock().unwrap();
        let prefix = format!("{year:04}{month:02}%");
        let mut stmt = conn
            .prepare("SELECT DISTINCT date FROM ideas WHERE date_index LIKE ? ORDER BY date ASC")?;
        let dates = collect_dates(&mut stmt, params![prefix])?;
        Ok(dates)
    }
}

fn collect_dates<P: duckdb::Params>(
    stmt: &mut duckdb::Statement<'_>,
    params: P,
) -> StorageResult<Vec<NaiveDate>> {
    let dates = stmt
        .query_map(params, |row| row.get::<_, String>(0))?
        .filter_map(|r| r.ok())
        .filter_map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
        .collect();
    Ok(dates)
}

fn row_to_idea(row: &duckdb::Row<'_>) -> duckdb::Result<Idea> {
    let date_str: String = row.get(3)?;
    Ok(Idea {
        id: row.get(0)?,
        hint: row.get(1)?,
        detail: row.get(2)?,
        date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").unwrap_or_default(),
        category: row.get(4)?,
        completed: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
