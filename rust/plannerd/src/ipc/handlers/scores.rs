use crate::config::{LookupSettings, SheetSettings};
use crate::dataset::{Dataset, StudentRecord};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    candidate_json, candidates_json, load_sheet, optional_row, pick_record, student_query,
};
use crate::ipc::types::{AppState, Request};
use crate::matcher::{resolve, Query};
use crate::trend::{analyze, css_rgb, summary_stats, ScoreSeries, TrendModel};
use serde_json::{json, Value};

struct Loaded {
    sheets: SheetSettings,
    lookup: LookupSettings,
}

fn load_settings(state: &AppState, req: &Request) -> Result<Loaded, Value> {
    let conn = state.db.as_ref();
    let sheets = SheetSettings::load(conn)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    let lookup = LookupSettings::load(conn)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    Ok(Loaded { sheets, lookup })
}

/// Configured score columns, or every non-identity header in sheet order.
fn score_columns(
    req: &Request,
    sheets: &SheetSettings,
    dataset: &Dataset,
) -> Result<Vec<String>, Value> {
    let columns = match &sheets.score_values {
        Some(cols) => cols.clone(),
        None => dataset.remaining_columns(&sheets.score_spec()),
    };
    if columns.is_empty() {
        return Err(err(
            &req.id,
            "sheet_missing_column",
            "score sheet has no score columns",
            Some(json!({ "found": dataset.headers })),
        ));
    }
    Ok(columns)
}

fn trend_json(model: &TrendModel, record: &StudentRecord, columns: &[String]) -> Value {
    let points: Vec<Value> = model
        .points
        .iter()
        .zip(columns)
        .map(|(p, column)| {
            json!({
                "label": p.label,
                "value": p.value,
                "raw": record.field(column),
                "delta": p.delta.value(),
                "color": css_rgb(p.color)
            })
        })
        .collect();
    let segments: Vec<Value> = model
        .segments
        .iter()
        .map(|s| {
            json!({
                "from": s.from,
                "to": s.to,
                "delta": s.delta.value(),
                "color": css_rgb(s.color)
            })
        })
        .collect();
    json!({
        "points": points,
        "segments": segments,
        "hasValues": model.has_values(),
        "presentCount": model.present_count,
        "maxAbsDelta": model.max_abs_delta,
        "studentStats": summary_stats(model.points.iter().map(|p| p.value))
    })
}

fn handle_scores_lookup(state: &mut AppState, req: &Request) -> serde_json::Value {
    let settings = match load_settings(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let query = match student_query(req) {
        Ok(q) => q,
        Err(e) => return e,
    };
    let spec = settings.sheets.score_spec();
    let dataset = match load_sheet(&mut state.sheets, req, &spec, settings.sheets.cache_ttl) {
        Ok(d) => d,
        Err(e) => return e,
    };

    let outcome = resolve(&dataset.records, &query, settings.lookup.partial);
    let matched = outcome.records();
    let (candidates, truncated) = candidates_json(&matched, settings.lookup.max_candidates);
    ok(
        &req.id,
        json!({
            "status": outcome.status(),
            "stage": outcome.stage(),
            "matchCount": outcome.len(),
            "candidates": candidates,
            "candidatesTruncated": truncated
        }),
    )
}

fn handle_scores_trend(state: &mut AppState, req: &Request) -> serde_json::Value {
    let settings = match load_settings(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let row = match optional_row(req) {
        Ok(r) => r,
        Err(e) => return e,
    };
    // A bare `row` is enough once the caller already resolved the student.
    let query = match student_query(req) {
        Ok(q) => q,
        Err(e) if row.is_none() => return e,
        Err(_) => Query::default(),
    };

    let spec = settings.sheets.score_spec();
    let dataset = match load_sheet(&mut state.sheets, req, &spec, settings.sheets.cache_ttl) {
        Ok(d) => d,
        Err(e) => return e,
    };
    let columns = match score_columns(req, &settings.sheets, &dataset) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let (status, stage, matched) = if query.is_empty() {
        let hit: Vec<&StudentRecord> = row.and_then(|r| dataset.by_row(r)).into_iter().collect();
        let status = if hit.is_empty() { "not_found" } else { "found" };
        (status, None, hit)
    } else {
        let outcome = resolve(&dataset.records, &query, settings.lookup.partial);
        let picked = match pick_record(req, &outcome, row) {
            Ok(r) => r,
            Err(e) => return e,
        };
        match picked {
            Some(r) if row.is_some() => ("found", outcome.stage(), vec![r]),
            _ => (outcome.status(), outcome.stage(), outcome.records()),
        }
    };

    let Some(record) = (matched.len() == 1).then(|| matched[0]) else {
        let (candidates, truncated) = candidates_json(&matched, settings.lookup.max_candidates);
        return ok(
            &req.id,
            json!({
                "status": status,
                "stage": stage,
                "candidates": candidates,
                "candidatesTruncated": truncated,
                "student": Value::Null,
                "trend": Value::Null
            }),
        );
    };

    let series = ScoreSeries::from_cells(columns.iter().map(|c| (c.as_str(), record.field(c))));
    let model = analyze(&series);
    log::debug!(
        "score trend for row {}: {} of {} present",
        record.row,
        model.present_count,
        model.points.len()
    );

    ok(
        &req.id,
        json!({
            "status": "found",
            "stage": stage,
            "candidates": [candidate_json(record)],
            "candidatesTruncated": false,
            "student": candidate_json(record),
            "trend": trend_json(&model, record, &columns)
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.lookup" => Some(handle_scores_lookup(state, req)),
        "scores.trend" => Some(handle_scores_trend(state, req)),
        _ => None,
    }
}
