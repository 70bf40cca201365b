use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::Value;

use crate::cache::SheetCache;
use crate::dataset::{ColumnSpec, Dataset, DatasetError, StudentRecord};
use crate::ipc::error::err;
use crate::matcher::{MatchOutcome, Query};
use crate::ipc::types::{AppState, Request};

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Absent and `null` are both `None`; any other non-string is rejected.
pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_str().map(|s| Some(s.to_string())).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be string or null", key),
                None,
            )
        }),
    }
}

pub fn required_f64(req: &Request, key: &str) -> Result<f64, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_f64())
        .filter(|v| v.is_finite())
        .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be a number", key), None))
}

pub fn optional_i64(req: &Request, key: &str) -> Result<Option<i64>, Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be integer", key),
                None,
            )
        }),
    }
}

pub fn optional_row(req: &Request) -> Result<Option<usize>, Value> {
    match optional_i64(req, "row")? {
        None => Ok(None),
        Some(n) if n >= 1 => Ok(Some(n as usize)),
        Some(_) => Err(err(&req.id, "bad_params", "row must be >= 1", None)),
    }
}

/// `YYYY-MM-DD` from params, or the local date when absent.
pub fn date_or_today(req: &Request, key: &str) -> Result<NaiveDate, Value> {
    match optional_str(req, key)? {
        None => Ok(chrono::Local::now().date_naive()),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be YYYY-MM-DD", key),
                None,
            )
        }),
    }
}

pub fn dataset_err(req: &Request, e: DatasetError) -> Value {
    log::warn!("sheet load failed: {}", e);
    let details = match &e {
        DatasetError::MissingColumn { column, found } => {
            Some(serde_json::json!({ "column": column, "found": found }))
        }
        DatasetError::DuplicateColumn { column } => Some(serde_json::json!({ "column": column })),
        _ => None,
    };
    err(&req.id, e.code(), e.to_string(), details)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SheetSource {
    Path(PathBuf),
    Inline(String),
}

pub fn sheet_source(req: &Request) -> Result<SheetSource, Value> {
    if let Some(text) = optional_str(req, "csv")? {
        return Ok(SheetSource::Inline(text));
    }
    if let Some(path) = optional_str(req, "sheetPath")? {
        return Ok(SheetSource::Path(PathBuf::from(path)));
    }
    Err(err(
        &req.id,
        "bad_params",
        "missing sheetPath or csv",
        None,
    ))
}

/// Inline sheets are parsed per call; path sheets go through the cache.
pub fn load_sheet(
    cache: &mut SheetCache,
    req: &Request,
    spec: &ColumnSpec,
    ttl: Duration,
) -> Result<Arc<Dataset>, Value> {
    let loaded = match sheet_source(req)? {
        SheetSource::Inline(text) => Dataset::from_csv_str(&text, spec).map(Arc::new),
        SheetSource::Path(path) => cache.load(&path, spec, ttl),
    };
    loaded.map_err(|e| dataset_err(req, e))
}

/// Query from `studentId` / `name`; at least one must survive normalization.
pub fn student_query(req: &Request) -> Result<Query, Value> {
    let id = optional_str(req, "studentId")?.unwrap_or_default();
    let name = optional_str(req, "name")?.unwrap_or_default();
    let query = Query::new(&id, &name);
    if query.is_empty() {
        return Err(err(
            &req.id,
            "bad_params",
            "enter a student number or a name",
            None,
        ));
    }
    Ok(query)
}

pub fn candidate_json(r: &StudentRecord) -> Value {
    serde_json::json!({
        "row": r.row,
        "studentId": r.raw_id,
        "name": r.raw_name,
        "classGroup": r.class_group
    })
}

/// Candidate list capped at `max`; the flag reports whether any were cut.
pub fn candidates_json(records: &[&StudentRecord], max: usize) -> (Vec<Value>, bool) {
    let list = records.iter().take(max).map(|r| candidate_json(r)).collect();
    (list, records.len() > max)
}

/// The record a page should show: the unique match, or the candidate the
/// caller picked by `row`. Ambiguity without a pick yields `None`.
pub fn pick_record<'a>(
    req: &Request,
    outcome: &MatchOutcome<'a, StudentRecord>,
    row: Option<usize>,
) -> Result<Option<&'a StudentRecord>, Value> {
    match row {
        Some(row) => outcome
            .records()
            .into_iter()
            .find(|r| r.row == row)
            .map(Some)
            .ok_or_else(|| {
                err(
                    &req.id,
                    "bad_params",
                    format!("row {} is not among the matched candidates", row),
                    None,
                )
            }),
        None => match outcome {
            MatchOutcome::Unique { record, .. } => Ok(Some(*record)),
            _ => Ok(None),
        },
    }
}
