/*!
The sheet store: the tabular persistence collaborator everything else
reads from and appends to.

Each sheet is a named tab holding an ordered sequence of rows; a row is a
flat JSON object keyed by column name. The interface is deliberately
narrow (whole-tab reads and row appends), so feature code is stuck with
the same linear-scan, append-only access the spreadsheet allowed.
*/
use rusqlite::Connection;
use std::path::Path;

use crate::db;

pub const USERS: &str = "Users";
pub const STUDENTS: &str = "Students";
pub const ATTENDANCE: &str = "Attendance";
pub const BEHAVIOR: &str = "Behavior";
pub const GRADES: &str = "Grades";
pub const HOMEWORK: &str = "Homework";
pub const NEWS: &str = "News";
pub const MESSAGES: &str = "Messages";

/// One sheet row: column name to value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Read a string-valued column, tolerating numeric cells the way the
/// spreadsheet did (a Student_ID cell may hold a bare number).
pub fn field_str(rec: &Record, key: &str) -> Option<String> {
    match rec.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreError(pub String);

impl StoreError {
    pub fn annotate(self, note: &str) -> StoreError {
        StoreError(format!("{}: {}", note, self.0))
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> StoreError {
        StoreError(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> StoreError {
        StoreError(e.to_string())
    }
}

/// The collaborator contract: full-tab snapshot reads and row appends,
/// keyed by sheet name. No filtering, no pagination, no updates.
pub trait RecordStore {
    fn fetch_all(&self, sheet: &str) -> Result<Vec<Record>, StoreError>;
    fn append_row(&self, sheet: &str, row: &Record) -> Result<(), StoreError>;
    fn append_rows(&self, sheet: &str, rows: &[Record]) -> Result<usize, StoreError>;
    fn headers(&self, sheet: &str) -> Result<Vec<String>, StoreError>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(workspace: &Path) -> anyhow::Result<SqliteStore> {
        let conn = db::open_db(workspace)?;
        Ok(SqliteStore { conn })
    }

    fn sheet_exists(&self, sheet: &str) -> Result<(), StoreError> {
        use rusqlite::OptionalExtension;

        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM sheets WHERE name = ?", [sheet], |r| {
                r.get(0)
            })
            .optional()?;
        if found.is_none() {
            return Err(StoreError(format!("no such sheet: {}", sheet)));
        }
        Ok(())
    }

    fn next_seq(&self, sheet: &str) -> Result<i64, StoreError> {
        let seq: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM sheet_rows WHERE sheet = ?",
            [sheet],
            |r| r.get(0),
        )?;
        Ok(seq)
    }
}

impl RecordStore for SqliteStore {
    fn fetch_all(&self, sheet: &str) -> Result<Vec<Record>, StoreError> {
        self.sheet_exists(sheet)?;

        let mut stmt = self
            .conn
            .prepare("SELECT data FROM sheet_rows WHERE sheet = ? ORDER BY seq")?;
        let rows = stmt
            .query_map([sheet], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for data in rows {
            let rec: Record = serde_json::from_str(&data)
                .map_err(|e| StoreError(e.to_string()).annotate("corrupt sheet row"))?;
            records.push(rec);
        }
        Ok(records)
    }

    fn append_row(&self, sheet: &str, row: &Record) -> Result<(), StoreError> {
        self.sheet_exists(sheet)?;

        let seq = self.next_seq(sheet)?;
        let data = serde_json::to_string(row)?;
        self.conn.execute(
            "INSERT INTO sheet_rows(sheet, seq, data) VALUES(?, ?, ?)",
            (sheet, seq, &data),
        )?;
        Ok(())
    }

    fn append_rows(&self, sheet: &str, rows: &[Record]) -> Result<usize, StoreError> {
        self.sheet_exists(sheet)?;

        let tx = self.conn.unchecked_transaction()?;
        let mut seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM sheet_rows WHERE sheet = ?",
            [sheet],
            |r| r.get(0),
        )?;
        for row in rows {
            let data = serde_json::to_string(row)?;
            tx.execute(
                "INSERT INTO sheet_rows(sheet, seq, data) VALUES(?, ?, ?)",
                (sheet, seq, &data),
            )?;
            seq += 1;
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn headers(&self, sheet: &str) -> Result<Vec<String>, StoreError> {
        let headers_json: String = self
            .conn
            .query_row("SELECT headers FROM sheets WHERE name = ?", [sheet], |r| {
                r.get(0)
            })
            .map_err(|_| StoreError(format!("no such sheet: {}", sheet)))?;
        let headers: Vec<String> = serde_json::from_str(&headers_json)?;
        Ok(headers)
    }
}
