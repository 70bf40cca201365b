mod test_support;

use serde_json::json;
use test_support::{error_code, fixture_path, request, request_ok, spawn_sidecar};

fn sheet() -> String {
    fixture_path("fixtures/sheets/feedback.csv")
        .to_string_lossy()
        .to_string()
}

#[test]
fn unique_id_returns_feedback_and_comparison() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "feedback.lookup",
        json!({ "sheetPath": sheet(), "studentId": " 10-101 " }),
    );
    assert_eq!(res["status"], "found");
    assert_eq!(res["stage"], "idOnly");
    let record = &res["record"];
    assert_eq!(record["row"], 1);
    assert_eq!(record["name"], "김 민수");
    assert_eq!(record["summary"], "Strong lab reports");
    assert_eq!(record["rawScore"], "85점");
    assert_eq!(record["score"].as_f64(), Some(85.0));

    let cmp = &record["comparison"];
    assert_eq!(cmp["studentScore"].as_f64(), Some(85.0));
    assert_eq!(cmp["mean"].as_f64(), Some(85.5));
    assert_eq!(cmp["median"].as_f64(), Some(87.5));
    assert_eq!(cmp["barColor"], "#1f77b4");
    assert_eq!(cmp["axisMax"].as_f64(), Some(100.0));
    assert!(record["comparisonUnavailable"].is_null());
}

#[test]
fn namesakes_are_ambiguous_until_a_row_is_picked() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "feedback.lookup",
        json!({ "sheetPath": sheet(), "name": "  김   민수 " }),
    );
    assert_eq!(res["status"], "ambiguous");
    assert_eq!(res["stage"], "nameOnly");
    assert_eq!(res["matchCount"], 2);
    assert!(res["record"].is_null());
    let rows: Vec<i64> = res["candidates"]
        .as_array()
        .expect("candidates")
        .iter()
        .filter_map(|c| c["row"].as_i64())
        .collect();
    assert_eq!(rows, vec![1, 3]);

    let picked = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "feedback.lookup",
        json!({ "sheetPath": sheet(), "name": "김 민수", "row": 3 }),
    );
    assert_eq!(picked["record"]["studentId"], "10103");
    assert_eq!(picked["record"]["score"].as_f64(), Some(90.0));

    let outside = request(
        &mut stdin,
        &mut reader,
        "3",
        "feedback.lookup",
        json!({ "sheetPath": sheet(), "name": "김 민수", "row": 2 }),
    );
    assert_eq!(error_code(&outside), "bad_params");

    // Whitespace runs collapse to one space; they are not removed.
    let squashed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "feedback.lookup",
        json!({ "sheetPath": sheet(), "name": "김민수" }),
    );
    assert_eq!(squashed["status"], "not_found");
}

#[test]
fn partial_and_missing_matches() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let partial = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "feedback.lookup",
        json!({ "sheetPath": sheet(), "studentId": "102" }),
    );
    assert_eq!(partial["status"], "ambiguous");
    assert_eq!(partial["stage"], "partial");
    assert_eq!(partial["matchCount"], 2);

    let none = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "feedback.lookup",
        json!({ "sheetPath": sheet(), "studentId": "99" }),
    );
    assert_eq!(none["status"], "not_found");
    assert!(none["stage"].is_null());
    assert_eq!(none["candidates"], json!([]));

    let empty = request(
        &mut stdin,
        &mut reader,
        "3",
        "feedback.lookup",
        json!({ "sheetPath": sheet(), "studentId": "abc", "name": "   " }),
    );
    assert_eq!(error_code(&empty), "bad_params");
}

#[test]
fn missing_score_explains_why_no_comparison() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "feedback.lookup",
        json!({ "sheetPath": sheet(), "studentId": "10104" }),
    );
    assert!(res["record"]["score"].is_null());
    assert!(res["record"]["comparison"].is_null());
    assert_eq!(res["record"]["comparisonUnavailable"], "insufficient_scores");
}

#[test]
fn inline_sheet_with_missing_column_is_rejected() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let res = request(
        &mut stdin,
        &mut reader,
        "1",
        "feedback.lookup",
        json!({ "csv": "id,name,score\n1,A,10\n", "studentId": "1" }),
    );
    assert_eq!(error_code(&res), "sheet_missing_column");
    assert_eq!(res["error"]["details"]["column"], "summary");

    let missing_file = request(
        &mut stdin,
        &mut reader,
        "2",
        "feedback.lookup",
        json!({ "sheetPath": "/nonexistent/feedback.csv", "studentId": "1" }),
    );
    assert_eq!(error_code(&missing_file), "sheet_read_failed");

    let repeated = request(
        &mut stdin,
        &mut reader,
        "3",
        "feedback.lookup",
        json!({
            "csv": "id,name,summary,score,feedback,score\n1,A,ok,85,fine,\n",
            "studentId": "1"
        }),
    );
    assert_eq!(error_code(&repeated), "sheet_duplicate_column");
    assert_eq!(repeated["error"]["details"]["column"], "score");
}
