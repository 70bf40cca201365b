use crate::config::PlannerSettings;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{date_or_today, db_conn, optional_i64, optional_str, required_str};
use crate::ipc::session::Session;
use crate::ipc::types::{AppState, Request};
use crate::planner::{achievement, goals_for, GoalKind, TodoStatus};
use chrono::{Duration, NaiveDate};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

struct TodoRow {
    id: String,
    entry_date: String,
    subject: String,
    task: String,
    detail: String,
    status: String,
    progress: i64,
    sort_order: i64,
}

impl TodoRow {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "date": self.entry_date,
            "subject": self.subject,
            "task": self.task,
            "detail": self.detail,
            "status": self.status,
            "progress": self.progress,
            "sortOrder": self.sort_order
        })
    }
}

const TODO_COLUMNS: &str =
    "id, entry_date, subject, task, detail, status, progress, sort_order";

fn row_to_todo(r: &rusqlite::Row<'_>) -> rusqlite::Result<TodoRow> {
    Ok(TodoRow {
        id: r.get(0)?,
        entry_date: r.get(1)?,
        subject: r.get(2)?,
        task: r.get(3)?,
        detail: r.get(4)?,
        status: r.get(5)?,
        progress: r.get(6)?,
        sort_order: r.get(7)?,
    })
}

fn next_sort_order(conn: &Connection, user_id: &str, date: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(sort_order), 0) + 1 FROM todos WHERE user_id = ? AND entry_date = ?",
        (user_id, date),
        |r| r.get(0),
    )
}

fn insert_todo(
    conn: &Connection,
    session: &Session,
    date: &str,
    subject: &str,
    task: &str,
    detail: &str,
) -> rusqlite::Result<String> {
    let id = Uuid::new_v4().to_string();
    let sort_order = next_sort_order(conn, &session.user_id, date)?;
    conn.execute(
        "INSERT INTO todos(id, user_id, name, entry_date, subject, task, detail, status, progress, sort_order, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, '', 0, ?, ?)",
        (
            &id,
            &session.user_id,
            &session.user_name,
            date,
            subject,
            task,
            detail,
            sort_order,
            db::now_timestamp(),
        ),
    )?;
    Ok(id)
}

fn load_todo(conn: &Connection, user_id: &str, todo_id: &str) -> rusqlite::Result<Option<TodoRow>> {
    let sql = format!(
        "SELECT {} FROM todos WHERE id = ? AND user_id = ?",
        TODO_COLUMNS
    );
    conn.query_row(&sql, (todo_id, user_id), row_to_todo).optional()
}

fn subject_param(req: &Request, planner: &PlannerSettings) -> Result<String, Value> {
    let subject = required_str(req, "subject")?.trim().to_string();
    if !planner.subjects.contains(&subject) {
        return Err(err(
            &req.id,
            "bad_params",
            format!("unknown subject: {}", subject),
            Some(json!({ "subjects": planner.subjects })),
        ));
    }
    Ok(subject)
}

fn handle_todo_options(state: &mut AppState, req: &Request) -> serde_json::Value {
    let planner = match PlannerSettings::load(state.db.as_ref()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let subject = match subject_param(req, &planner) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let goals: Vec<Value> = goals_for(&subject, &planner.vocabulary_subjects)
        .into_iter()
        .map(|g| {
            let range = g.amount_range();
            json!({
                "goal": g.as_str(),
                "label": g.label(),
                "unit": range.map(|(_, _, unit)| unit),
                "min": range.map(|(min, _, _)| min),
                "max": range.map(|(_, max, _)| max)
            })
        })
        .collect();
    ok(
        &req.id,
        json!({ "subject": subject, "subjects": planner.subjects, "goals": goals }),
    )
}

fn handle_todo_add(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let subject = match subject_param(req, &planner) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let goal_raw = match required_str(req, "goal") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let goal = match GoalKind::parse(&goal_raw) {
        Some(g) if goals_for(&subject, &planner.vocabulary_subjects).contains(&g) => g,
        _ => {
            return err(
                &req.id,
                "bad_params",
                format!("goal {} is not offered for {}", goal_raw, subject),
                None,
            )
        }
    };
    let amount = match optional_i64(req, "amount") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let custom = match optional_str(req, "detail") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let detail = match goal.detail(amount, custom.as_deref()) {
        Ok(d) => d,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let date = match date_or_today(req, "date") {
        Ok(d) => d.format("%Y-%m-%d").to_string(),
        Err(e) => return e,
    };

    let todo_id = match insert_todo(conn, &session, &date, &subject, goal.label(), &detail) {
        Ok(id) => id,
        Err(e) => return err(&req.id, "db_insert_failed", e.to_string(), None),
    };
    match load_todo(conn, &session.user_id, &todo_id) {
        Ok(Some(t)) => ok(&req.id, json!({ "todo": t.to_json() })),
        Ok(None) => err(&req.id, "not_found", "todo not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_todo_today(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let session = match Session::from_request(conn, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let date = match date_or_today(req, "date") {
        Ok(d) => d.format("%Y-%m-%d").to_string(),
        Err(e) => return e,
    };

    let sql = format!(
        "SELECT {} FROM todos WHERE user_id = ? AND entry_date = ? ORDER BY sort_order",
        TODO_COLUMNS
    );
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let items: Vec<TodoRow> = match stmt
        .query_map((&session.user_id, &date), row_to_todo)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let progress: Vec<i64> = items.iter().map(|t| t.progress).collect();
    ok(
        &req.id,
        json!({
            "date": date,
            "items": items.iter().map(TodoRow::to_json).collect::<Vec<_>>(),
            "achievement": achievement(&progress)
        }),
    )
}

fn handle_todo_set_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let session = match Session::from_request(conn, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let todo_id = match required_str(req, "todoId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let status_raw = match required_str(req, "status") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(status) = TodoStatus::parse(status_raw.trim()) else {
        return err(
            &req.id,
            "bad_params",
            "status must be one of: \"\", O, X, →, △",
            None,
        );
    };
    let requested = match optional_i64(req, "progress") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let progress = match status.progress(requested) {
        Ok(p) => p,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let existing = match load_todo(conn, &session.user_id, &todo_id) {
        Ok(Some(t)) => t,
        Ok(None) => return err(&req.id, "not_found", "todo not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute(
        "UPDATE todos SET status = ?, progress = ? WHERE id = ?",
        (status.code(), progress, &existing.id),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    // Only a fresh postponement carries the item over; re-saving → does not.
    let was_postponed = TodoStatus::parse(&existing.status) == Some(TodoStatus::Postponed);
    let mut postponed_id = None;
    if status == TodoStatus::Postponed && !was_postponed {
        let next_day = match NaiveDate::parse_from_str(&existing.entry_date, "%Y-%m-%d") {
            Ok(d) => (d + Duration::days(1)).format("%Y-%m-%d").to_string(),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        match insert_todo(
            &tx,
            &session,
            &next_day,
            &existing.subject,
            &existing.task,
            &existing.detail,
        ) {
            Ok(id) => {
                log::info!("todo {} postponed to {} as {}", existing.id, next_day, id);
                postponed_id = Some(id);
            }
            Err(e) => return err(&req.id, "db_insert_failed", e.to_string(), None),
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    match load_todo(conn, &session.user_id, &todo_id) {
        Ok(Some(t)) => ok(
            &req.id,
            json!({ "todo": t.to_json(), "postponedTodoId": postponed_id }),
        ),
        Ok(None) => err(&req.id, "not_found", "todo not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "todo.options" => Some(handle_todo_options(state, req)),
        "todo.add" => Some(handle_todo_add(state, req)),
        "todo.today" => Some(handle_todo_today(state, req)),
        "todo.setStatus" => Some(handle_todo_set_status(state, req)),
        _ => None,
    }
}
