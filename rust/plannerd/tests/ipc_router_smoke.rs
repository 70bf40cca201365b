mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{error_code, fixture_path, login_fresh, request, spawn_sidecar};

#[test]
fn bad_json_and_unknown_methods_get_error_lines() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(value["ok"], false);
    assert_eq!(value["error"]["code"], "bad_json");

    let unknown = request(&mut stdin, &mut reader, "1", "grades.explode", json!({}));
    assert_eq!(error_code(&unknown), "not_implemented");

    let health = request(&mut stdin, &mut reader, "2", "health", json!({}));
    assert_eq!(health["ok"], true);
    assert!(health["result"]["workspacePath"].is_null());
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let token = login_fresh(&mut stdin, &mut reader, "planner-router-smoke", "s1", "1-1");
    let feedback = fixture_path("fixtures/sheets/feedback.csv")
        .to_string_lossy()
        .to_string();
    let scores = fixture_path("fixtures/sheets/scores.csv")
        .to_string_lossy()
        .to_string();

    let calls = vec![
        ("health", json!({})),
        ("setup.get", json!({})),
        ("session.get", json!({ "sessionToken": token })),
        ("profile.get", json!({ "sessionToken": token })),
        ("feedback.lookup", json!({ "sheetPath": feedback, "studentId": "10101" })),
        ("scores.lookup", json!({ "sheetPath": scores, "name": "이서연" })),
        ("scores.trend", json!({ "sheetPath": scores, "name": "이서연" })),
        ("study.compare", json!({ "goalHours": 1, "actualHours": 1 })),
        ("study.week", json!({ "sessionToken": token, "today": "2026-10-18" })),
        ("todo.options", json!({ "subject": "Korean" })),
        ("todo.today", json!({ "sessionToken": token, "date": "2026-10-18" })),
        ("auth.logout", json!({ "sessionToken": token })),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let res = request(&mut stdin, &mut reader, &format!("smoke-{}", i), method, params);
        assert_eq!(res["ok"], true, "{} failed: {}", method, res);
    }

    let health = request(&mut stdin, &mut reader, "end", "health", json!({}));
    // Feedback and score sheets are cached separately.
    assert_eq!(health["result"]["cachedSheets"], 2);
}
