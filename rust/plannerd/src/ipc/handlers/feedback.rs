use crate::config::{ChartSettings, LookupSettings, SheetSettings};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{candidates_json, load_sheet, optional_row, pick_record, student_query};
use crate::ipc::types::{AppState, Request};
use crate::matcher::resolve;
use crate::trend::{compare, parse_score};
use serde_json::{json, Value};

fn handle_feedback_lookup(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = state.db.as_ref();
    let sheets = match SheetSettings::load(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let lookup = match LookupSettings::load(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let charts = match ChartSettings::load(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let query = match student_query(req) {
        Ok(q) => q,
        Err(e) => return e,
    };
    let row = match optional_row(req) {
        Ok(r) => r,
        Err(e) => return e,
    };

    let spec = sheets.feedback_spec();
    let dataset = match load_sheet(&mut state.sheets, req, &spec, sheets.cache_ttl) {
        Ok(d) => d,
        Err(e) => return e,
    };

    let outcome = resolve(&dataset.records, &query, lookup.partial);
    let matched = outcome.records();
    log::debug!(
        "feedback lookup: {} ({} hits)",
        outcome.status(),
        matched.len()
    );
    let (candidates, truncated) = candidates_json(&matched, lookup.max_candidates);

    let record = match pick_record(req, &outcome, row) {
        Ok(r) => r,
        Err(e) => return e,
    };

    let record_json = record.map(|r| {
        let raw_score = r.field(&sheets.feedback_score);
        let score = parse_score(raw_score);
        let population = dataset
            .records
            .iter()
            .map(|other| parse_score(other.field(&sheets.feedback_score)));
        let comparison = compare(score, population);
        let unavailable = if comparison.is_none() {
            Value::from("insufficient_scores")
        } else {
            Value::Null
        };
        json!({
            "row": r.row,
            "studentId": r.raw_id,
            "name": r.raw_name,
            "summary": r.field(&sheets.feedback_summary),
            "feedback": r.field(&sheets.feedback_text),
            "rawScore": raw_score,
            "score": score,
            "comparison": comparison.map(|c| json!({
                "studentScore": c.student_score,
                "mean": c.mean,
                "median": c.median,
                "barColor": charts.bar_color(),
                "axisMax": charts.score_axis_max
            })),
            "comparisonUnavailable": unavailable
        })
    });

    ok(
        &req.id,
        json!({
            "status": outcome.status(),
            "stage": outcome.stage(),
            "matchCount": outcome.len(),
            "candidates": candidates,
            "candidatesTruncated": truncated,
            "record": record_json
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "feedback.lookup" => Some(handle_feedback_lookup(state, req)),
        _ => None,
    }
}
