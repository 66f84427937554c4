use std::path::PathBuf;

use serde_json::json;

use crate::auth::Capability;
use crate::backup;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    get_required_str, require_capability, require_session, require_store, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{field_str, RecordStore, SqliteStore};

fn handle_backup_export_workspace_bundle(
    _state: &mut AppState,
    req: &Request,
) -> serde_json::Value {
    let workspace = match get_required_str(&req.params, "workspacePath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e.response(&req.id),
    };
    let out_path = match get_required_str(&req.params, "outPath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e.response(&req.id),
    };

    match backup::export_workspace_bundle(&workspace, &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "path": out_path.to_string_lossy(),
                "bundleFormat": summary.bundle_format,
                "entryCount": summary.entry_count,
            }),
        ),
        Err(e) => err(&req.id, "backup_export_failed", format!("{e:#}"), None),
    }
}

fn handle_backup_import_workspace_bundle(
    state: &mut AppState,
    req: &Request,
) -> serde_json::Value {
    let workspace = match get_required_str(&req.params, "workspacePath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e.response(&req.id),
    };
    let in_path = match get_required_str(&req.params, "inPath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e.response(&req.id),
    };

    let summary = match backup::import_workspace_bundle(&in_path, &workspace) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "backup_import_failed", format!("{e:#}"), None),
    };

    // The imported file replaced the database under the open store; reopen
    // so later requests see the imported rows.
    if state.workspace.as_deref() == Some(workspace.as_path()) {
        match SqliteStore::open(&workspace) {
            Ok(store) => state.store = Some(store),
            Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
        }
    }

    ok(
        &req.id,
        json!({ "bundleFormatDetected": summary.bundle_format_detected }),
    )
}

fn exchange_export_sheet_csv(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, params)?;
    require_capability(&session, Capability::ExportSheets)?;

    let sheet = get_required_str(params, "sheet")?;
    let out_path = PathBuf::from(get_required_str(params, "outPath")?);

    let store = require_store(state)?;
    let headers = store.headers(&sheet)?;
    let rows = store.fetch_all(&sheet)?;

    let mut writer = csv::Writer::from_path(&out_path)
        .map_err(|e| HandlerErr::new("csv_write_failed", e.to_string()))?;
    writer
        .write_record(&headers)
        .map_err(|e| HandlerErr::new("csv_write_failed", e.to_string()))?;
    for row in &rows {
        let cells: Vec<String> = headers
            .iter()
            .map(|h| field_str(row, h).unwrap_or_default())
            .collect();
        writer
            .write_record(&cells)
            .map_err(|e| HandlerErr::new("csv_write_failed", e.to_string()))?;
    }
    writer
        .flush()
        .map_err(|e| HandlerErr::new("csv_write_failed", e.to_string()))?;

    Ok(json!({
        "path": out_path.to_string_lossy(),
        "sheet": sheet,
        "rows": rows.len(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_backup_export_workspace_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_backup_import_workspace_bundle(state, req)),
        "exchange.exportSheetCsv" => Some(match exchange_export_sheet_csv(state, &req.params) {
            Ok(v) => ok(&req.id, v),
            Err(e) => e.response(&req.id),
        }),
        _ => None,
    }
}
