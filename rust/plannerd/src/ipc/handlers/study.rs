use crate::config::PlannerSettings;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{date_or_today, db_conn, required_f64};
use crate::ipc::session::Session;
use crate::ipc::types::{AppState, Request};
use crate::planner::{compare_study, week_bounds, StudyComparison};
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

fn comparison_json(c: Option<StudyComparison>) -> Value {
    match c {
        Some(c) => json!({
            "diffHours": c.diff_hours,
            "hours": c.hours,
            "minutes": c.minutes,
            "direction": if c.over { "over" } else { "under" }
        }),
        None => Value::Null,
    }
}

fn hours_param(req: &Request, key: &str, max: f64) -> Result<f64, Value> {
    let v = required_f64(req, key)?;
    if !(0.0..=max).contains(&v) {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} must be in 0..={}", key, max),
            None,
        ));
    }
    Ok(v)
}

fn handle_study_log(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let session = match Session::from_request(conn, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let planner = match PlannerSettings::load(Some(conn)) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let date = match date_or_today(req, "date") {
        Ok(d) => d,
        Err(e) => return e,
    };
    let goal = match hours_param(req, "goalHours", planner.max_study_hours) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let actual = match hours_param(req, "actualHours", planner.max_study_hours) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let entry_id = Uuid::new_v4().to_string();
    let entry_date = date.format("%Y-%m-%d").to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO study_time(id, user_id, name, entry_date, goal_hours, actual_hours, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &entry_id,
            &session.user_id,
            &session.user_name,
            &entry_date,
            goal,
            actual,
            db::now_timestamp(),
        ),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(
        &req.id,
        json!({
            "entryId": entry_id,
            "date": entry_date,
            "comparison": comparison_json(compare_study(goal, actual))
        }),
    )
}

fn handle_study_compare(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let goal = match required_f64(req, "goalHours") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let actual = match required_f64(req, "actualHours") {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({ "comparison": comparison_json(compare_study(goal, actual)) }),
    )
}

fn daily_means(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<Value>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |r| {
            let date: String = r.get(0)?;
            let hours: f64 = r.get(1)?;
            Ok(json!({ "date": date, "hours": hours }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn handle_study_week(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let session = match Session::from_request(conn, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let today = match date_or_today(req, "today") {
        Ok(d) => d,
        Err(e) => return e,
    };
    let (start, end) = week_bounds(today);
    let start = start.format("%Y-%m-%d").to_string();
    let end = end.format("%Y-%m-%d").to_string();

    let mine = match daily_means(
        conn,
        "SELECT entry_date, AVG(actual_hours)
         FROM study_time
         WHERE user_id = ? AND entry_date BETWEEN ? AND ?
         GROUP BY entry_date
         ORDER BY entry_date",
        (&session.user_id, &start, &end),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    // Users without a class group are compared against everyone.
    let class_average = match daily_means(
        conn,
        "SELECT s.entry_date, AVG(s.actual_hours)
         FROM study_time s
         JOIN users u ON u.id = s.user_id
         WHERE s.entry_date BETWEEN ? AND ?
           AND (?3 IS NULL OR u.class_group = ?3)
         GROUP BY s.entry_date
         ORDER BY s.entry_date",
        (&start, &end, &session.class_group),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "weekStart": start,
            "weekEnd": end,
            "classGroup": session.class_group,
            "hasEntries": !mine.is_empty(),
            "mine": mine,
            "classAverage": class_average
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "study.log" => Some(handle_study_log(state, req)),
        "study.compare" => Some(handle_study_compare(state, req)),
        "study.week" => Some(handle_study_week(state, req)),
        _ => None,
    }
}
