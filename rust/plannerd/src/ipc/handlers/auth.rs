use crate::dataset::{ColumnSpec, Dataset};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    dataset_err, db_conn, optional_str, required_str, sheet_source, SheetSource,
};
use crate::ipc::session::{Role, Session};
use crate::ipc::types::{AppState, Request};
use crate::matcher::normalize_name;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

struct NewUser<'a> {
    id: &'a str,
    password: &'a str,
    name: &'a str,
    role: Role,
    class_group: Option<&'a str>,
}

/// Returns true when the user did not exist before.
fn upsert_user(conn: &Connection, user: &NewUser) -> rusqlite::Result<bool> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE id = ?", [user.id], |r| r.get(0))
        .optional()?;
    conn.execute(
        "INSERT INTO users(id, password_hash, name, role, class_group, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           password_hash = excluded.password_hash,
           name = excluded.name,
           role = excluded.role,
           class_group = excluded.class_group,
           updated_at = excluded.updated_at",
        (
            user.id,
            db::hash_password(user.id, user.password),
            user.name,
            user.role.as_str(),
            user.class_group,
            db::now_timestamp(),
        ),
    )?;
    Ok(exists.is_none())
}

fn handle_users_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    let password = match required_str(req, "password") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => normalize_name(&v),
        Err(e) => return e,
    };
    if user_id.is_empty() || password.is_empty() || name.is_empty() {
        return err(
            &req.id,
            "bad_params",
            "userId, password and name must not be empty",
            None,
        );
    }
    let role = match optional_str(req, "role") {
        Ok(None) => Role::Student,
        Ok(Some(r)) => match Role::parse(&r) {
            Some(role) => role,
            None => return err(&req.id, "bad_params", "role must be student or teacher", None),
        },
        Err(e) => return e,
    };
    let class_group = match optional_str(req, "classGroup") {
        Ok(v) => v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        Err(e) => return e,
    };

    let user = NewUser {
        id: &user_id,
        password: &password,
        name: &name,
        role,
        class_group: class_group.as_deref(),
    };
    match upsert_user(conn, &user) {
        Ok(created) => ok(&req.id, json!({ "userId": user_id, "created": created })),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_users_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let spec = ColumnSpec {
        id: "id".to_string(),
        name: "name".to_string(),
        class_group: Some("class".to_string()),
        required: vec!["password".to_string(), "role".to_string()],
    };
    // Account sheets are read fresh on every import.
    let loaded = match sheet_source(req) {
        Ok(SheetSource::Inline(text)) => Dataset::from_csv_str(&text, &spec),
        Ok(SheetSource::Path(path)) => Dataset::from_path(&path, &spec),
        Err(e) => return e,
    };
    let dataset = match loaded {
        Ok(d) => d,
        Err(e) => return dataset_err(req, e),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let mut inserted = 0usize;
    let mut updated = 0usize;
    let mut skipped = Vec::new();
    for r in &dataset.records {
        let password = r.field("password");
        let role = Role::parse(r.field("role")).unwrap_or(Role::Student);
        if r.raw_id.is_empty() || r.name.is_empty() || password.is_empty() {
            skipped.push(json!({ "row": r.row, "reason": "missing id, name or password" }));
            continue;
        }
        let user = NewUser {
            id: &r.raw_id,
            password,
            name: &r.name,
            role,
            class_group: r.class_group.as_deref(),
        };
        match upsert_user(&tx, &user) {
            Ok(true) => inserted += 1,
            Ok(false) => updated += 1,
            Err(e) => {
                return err(
                    &req.id,
                    "db_insert_failed",
                    e.to_string(),
                    Some(json!({ "row": r.row })),
                )
            }
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    log::info!(
        "imported users: {} inserted, {} updated, {} skipped",
        inserted,
        updated,
        skipped.len()
    );
    ok(
        &req.id,
        json!({ "inserted": inserted, "updated": updated, "skipped": skipped }),
    )
}

fn handle_auth_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    let password = match required_str(req, "password") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let stored: Option<String> = match conn
        .query_row(
            "SELECT password_hash FROM users WHERE id = ?",
            [&user_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if stored.as_deref() != Some(db::hash_password(&user_id, &password).as_str()) {
        log::info!("login rejected for {}", user_id);
        return err(&req.id, "auth_failed", "wrong user id or password", None);
    }

    let token = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO sessions(token, user_id, created_at) VALUES(?, ?, ?)",
        (&token, &user_id, db::now_timestamp()),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    let session = match Session::open(conn, &token) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "not_found", "session vanished", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    log::info!("{} logged in as {}", session.user_id, session.role.as_str());
    ok(
        &req.id,
        json!({
            "sessionToken": token,
            "user": session.to_json(),
            "landing": session.role.landing_page()
        }),
    )
}

fn handle_auth_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let token = match required_str(req, "sessionToken") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match conn.execute("DELETE FROM sessions WHERE token = ?", [&token]) {
        Ok(n) => ok(&req.id, json!({ "loggedOut": n > 0 })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_session_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match Session::from_request(conn, req) {
        Ok(s) => ok(
            &req.id,
            json!({ "user": s.to_json(), "landing": s.role.landing_page() }),
        ),
        Err(e) => e,
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.upsert" => Some(handle_users_upsert(state, req)),
        "users.import" => Some(handle_users_import(state, req)),
        "auth.login" => Some(handle_auth_login(state, req)),
        "auth.logout" => Some(handle_auth_logout(state, req)),
        "session.get" => Some(handle_session_get(state, req)),
        _ => None,
    }
}
