use rusqlite::Connection;
use std::path::Path;

use crate::store;

pub const DB_FILE: &str = "schoolbook.sqlite3";

/// Sheets seeded into every new workspace, with their header rows.
/// Column names follow the spreadsheet the data was migrated from.
pub const SEED_SHEETS: &[(&str, &[&str])] = &[
    (
        store::USERS,
        &["Username", "Password", "Role", "Name", "Subjects"],
    ),
    (
        store::STUDENTS,
        &["Student_ID", "Name", "Class_Name", "Parent_Contact"],
    ),
    (
        store::ATTENDANCE,
        &["Date", "Student_ID", "Student_Name", "Status", "Recorded_By"],
    ),
    (
        store::BEHAVIOR,
        &[
            "Date",
            "Student_ID",
            "Student_Name",
            "Category",
            "Note",
            "Recorded_By",
        ],
    ),
    (
        store::GRADES,
        &[
            "Date",
            "Student_ID",
            "Student_Name",
            "Subject",
            "Term",
            "Score",
            "Out_Of",
            "Entered_By",
        ],
    ),
    (
        store::HOMEWORK,
        &[
            "Posted_At",
            "Class_Name",
            "Subject",
            "Title",
            "Details",
            "Due_Date",
            "Posted_By",
        ],
    ),
    (
        store::NEWS,
        &["Published_At", "Title", "Body", "Published_By"],
    ),
    (store::MESSAGES, &["Sent_At", "Student_ID", "Body", "Sender"]),
];

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sheets(
            name TEXT PRIMARY KEY,
            headers TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sheet_rows(
            sheet TEXT NOT NULL,
            seq INTEGER NOT NULL,
            data TEXT NOT NULL,
            PRIMARY KEY(sheet, seq),
            FOREIGN KEY(sheet) REFERENCES sheets(name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sheet_rows_sheet ON sheet_rows(sheet, seq)",
        [],
    )?;

    // Reopening an existing workspace must not disturb its rows.
    for (name, headers) in SEED_SHEETS {
        let headers_json = serde_json::to_string(headers)?;
        conn.execute(
            "INSERT OR IGNORE INTO sheets(name, headers) VALUES(?, ?)",
            (name, &headers_json),
        )?;
    }

    Ok(conn)
}
