use httpmock::prelude::*;
use papergrade::config::SheetsConfig;
use papergrade::error::GradeError;
use papergrade::sheet_server::{SheetServer, SheetServerHandle};
use papergrade::structs::submit::SubmissionRow;
use serde_json::json;

const CONFIG_PATH: &str = "/v4/spreadsheets/sheet-1/values/Config!A1:B1";
const LEDGER_PATH: &str = "/v4/spreadsheets/sheet-1/values/Sheet1!A:A";
const APPEND_PATH: &str = "/v4/spreadsheets/sheet-1/values/Sheet1!A1:append";

fn start_sheet_server(server: &MockServer) -> SheetServerHandle {
    let config = SheetsConfig {
        api_base: server.base_url(),
        spreadsheet_id: "sheet-1".to_string(),
        access_token: "token-1".to_string(),
        config_range: "Config!A1:B1".to_string(),
        ledger_sheet: "Sheet1".to_string(),
    };
    let (sheet_server, handle) = SheetServer::new(&config).unwrap();
    tokio::spawn(sheet_server.run());
    handle
}

async fn mock_ledger(server: &MockServer, ids: &[&str]) {
    let rows: Vec<_> = ids.iter().map(|id| json!([id])).collect();
    server
        .mock_async(|when, then| {
            when.method(GET).path(LEDGER_PATH);
            then.status(200)
                .json_body(json!({"range": "Sheet1!A1:A1000", "majorDimension": "ROWS", "values": rows}));
        })
        .await;
}

fn row(student_id: &str) -> SubmissionRow {
    SubmissionRow {
        student_id: student_id.to_string(),
        name: "Ana Perez".to_string(),
        timestamp: "2024-05-01 14:30".to_string(),
        score: 15.5,
        email: None,
    }
}

#[tokio::test]
async fn loads_answer_key_and_access_code() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(CONFIG_PATH)
                .header("authorization", "Bearer token-1");
            then.status(200).json_body(json!({
                "range": "Config!A1:B1",
                "majorDimension": "ROWS",
                "values": [["1) CBR = 8%\n2) SN = 3.2", "pav2024"]]
            }));
        })
        .await;

    let handle = start_sheet_server(&server);
    let exam = handle.load_exam().await.unwrap();

    mock.assert_async().await;
    assert_eq!(exam.answer_key, "1) CBR = 8%\n2) SN = 3.2");
    assert_eq!(exam.access_code, "pav2024");
}

#[tokio::test]
async fn empty_config_range_gives_empty_key() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(CONFIG_PATH);
            then.status(200).json_body(json!({"range": "Config!A1:B1", "majorDimension": "ROWS"}));
        })
        .await;

    let handle = start_sheet_server(&server);
    let exam = handle.load_exam().await.unwrap();
    assert!(exam.answer_key.is_empty());
    assert!(exam.access_code.is_empty());
}

#[tokio::test]
async fn sheet_errors_are_reported() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(CONFIG_PATH);
            then.status(403).body("PERMISSION_DENIED");
        })
        .await;

    let handle = start_sheet_server(&server);
    let err = handle.load_exam().await.unwrap_err();
    assert!(matches!(err, GradeError::Sheet(_)));
}

#[tokio::test]
async fn reserve_rejects_existing_identity() {
    let server = MockServer::start_async().await;
    mock_ledger(&server, &["ID", "A2023", "B2023"]).await;

    let handle = start_sheet_server(&server);
    let err = handle.reserve(" a2023 ".to_string()).await.unwrap_err();
    assert!(matches!(err, GradeError::Duplicate(_)));
    let reservation = handle.reserve("C2023".to_string()).await.unwrap();
    assert_eq!(reservation.student_id(), "C2023");
}

#[tokio::test]
async fn reserve_rejects_in_flight_identity_until_dropped() {
    let server = MockServer::start_async().await;
    mock_ledger(&server, &[]).await;

    let handle = start_sheet_server(&server);
    let reservation = handle.reserve("A2023".to_string()).await.unwrap();
    let err = handle.reserve("a2023".to_string()).await.unwrap_err();
    assert!(matches!(err, GradeError::Duplicate(_)));

    drop(reservation);
    handle.reserve("A2023".to_string()).await.unwrap();
}

#[tokio::test]
async fn record_appends_row_and_frees_reservation() {
    let server = MockServer::start_async().await;
    mock_ledger(&server, &[]).await;
    let append = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(APPEND_PATH)
                .query_param("valueInputOption", "RAW")
                .header("authorization", "Bearer token-1")
                .json_body(json!({"values": [["A2023", "Ana Perez", "2024-05-01 14:30", 15.5, ""]]}));
            then.status(200).json_body(json!({"spreadsheetId": "sheet-1"}));
        })
        .await;

    let handle = start_sheet_server(&server);
    let reservation = handle.reserve("A2023".to_string()).await.unwrap();
    handle.record(reservation, row("A2023")).await.unwrap();

    append.assert_async().await;
}

#[tokio::test]
async fn appended_cells_are_stored_verbatim() {
    let server = MockServer::start_async().await;
    mock_ledger(&server, &[]).await;
    let append = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(APPEND_PATH)
                .query_param("valueInputOption", "RAW")
                .json_body(json!({"values": [["00123", "=SUM(A1:A9)", "2024-05-01 14:30", 15.5, ""]]}));
            then.status(200).json_body(json!({"spreadsheetId": "sheet-1"}));
        })
        .await;

    let handle = start_sheet_server(&server);
    let reservation = handle.reserve("00123".to_string()).await.unwrap();
    let mut row = row("00123");
    row.name = "=SUM(A1:A9)".to_string();
    handle.record(reservation, row).await.unwrap();

    append.assert_async().await;
}

#[tokio::test]
async fn record_clears_in_flight_reservation() {
    let server = MockServer::start_async().await;
    let ledger = server
        .mock_async(|when, then| {
            when.method(GET).path(LEDGER_PATH);
            then.status(200).json_body(json!({"range": "Sheet1!A1:A1000", "values": []}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(APPEND_PATH);
            then.status(200).json_body(json!({}));
        })
        .await;

    let handle = start_sheet_server(&server);
    let reservation = handle.reserve("A2023".to_string()).await.unwrap();
    handle.record(reservation, row("A2023")).await.unwrap();
    // 登记后只剩成绩表中的记录起作用
    handle.reserve("A2023".to_string()).await.unwrap();
    ledger.assert_hits_async(2).await;
}

#[tokio::test]
async fn failed_append_is_an_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(APPEND_PATH);
            then.status(500).body("backend error");
        })
        .await;

    mock_ledger(&server, &[]).await;

    let handle = start_sheet_server(&server);
    let reservation = handle.reserve("A2023".to_string()).await.unwrap();
    let err = handle.record(reservation, row("A2023")).await.unwrap_err();
    assert!(matches!(err, GradeError::Sheet(_)));
    // 写入失败后学号不再被占用
    handle.reserve("A2023".to_string()).await.unwrap();
}
