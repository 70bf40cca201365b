use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_str};
use crate::ipc::session::Session;
use crate::ipc::types::{AppState, Request};
use crate::matcher::normalize_name;
use serde_json::json;

fn handle_profile_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match Session::from_request(conn, req) {
        Ok(s) => ok(&req.id, json!({ "profile": s.to_json() })),
        Err(e) => e,
    }
}

fn handle_profile_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let session = match Session::from_request(conn, req) {
        Ok(s) => s,
        Err(e) => return e,
    };

    let name = match optional_str(req, "name") {
        Ok(v) => v.map(|s| normalize_name(&s)),
        Err(e) => return e,
    };
    if name.as_deref() == Some("") {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }
    // Present-but-null clears the picture; absent leaves it alone.
    let image_given = req.params.get("profileImage").is_some();
    let image = match optional_str(req, "profileImage") {
        Ok(v) => v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        Err(e) => return e,
    };

    let new_name = name.unwrap_or_else(|| session.user_name.clone());
    let new_image = if image_given {
        image
    } else {
        session.profile_image.clone()
    };
    if let Err(e) = conn.execute(
        "UPDATE users SET name = ?, profile_image = ?, updated_at = ? WHERE id = ?",
        (&new_name, &new_image, db::now_timestamp(), &session.user_id),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    match Session::open(conn, &session.token) {
        Ok(Some(s)) => ok(&req.id, json!({ "profile": s.to_json() })),
        Ok(None) => err(&req.id, "unauthorized", "log in to use this page", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "profile.get" => Some(handle_profile_get(state, req)),
        "profile.update" => Some(handle_profile_update(state, req)),
        _ => None,
    }
}
