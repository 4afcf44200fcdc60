use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use clinicbook::config::AppConfig;
use clinicbook::db::{self, queries};
use clinicbook::handlers;
use clinicbook::models::{ChatMessage, Intent, PatientId, RunState, Slot};
use clinicbook::services::ai::intent::{IntentExtractor, LlmIntentExtractor};
use clinicbook::services::ai::responder::{
    LlmToolResponder, RuleBasedResponder, ToolPlan, ToolRequest, ToolResponder,
};
use clinicbook::services::ai::{LlmProvider, Message};
use clinicbook::services::booking::RESPONDER_FAILURE;
use clinicbook::services::supervisor;
use clinicbook::state::AppState;

const PATIENT_A: i64 = 1234567;
const PATIENT_B: i64 = 7654321;

// ── Mock Provider ──

struct MockLlm;

/// Picks `DD-MM-YYYY HH:MM` pairs out of free text.
fn datetimes(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .windows(2)
        .filter(|w| w[0].len() == 10 && w[0].matches('-').count() == 2)
        .filter(|w| w[1].len() == 5 && w[1].contains(':'))
        .map(|w| format!("{} {}", w[0], w[1]))
        .collect()
}

fn availability_reply(last: &str) -> String {
    if last.contains("jane smith") {
        r#"{"type":"doctor","doctor_name":"jane smith","specialization":null,"date":"01-06-2025"}"#
            .to_string()
    } else if last.contains("orthodontist") {
        r#"```json
{"type":"specialization","doctor_name":null,"specialization":"orthodontist","date":"01-06-2025"}
```"#
            .to_string()
    } else {
        "I'm not sure what you are asking.".to_string()
    }
}

fn booking_reply(last: &str) -> String {
    let found = datetimes(last);
    if last.contains("reschedule") && found.len() >= 2 {
        return json!({"calls": [{
            "operation": "reschedule",
            "doctor_name": "jane smith",
            "old_datetime": found[0],
            "new_datetime": found[1],
        }]})
        .to_string();
    }
    let Some(datetime) = found.first() else {
        return json!({"calls": [], "reply": "Which time would you like?"}).to_string();
    };
    if last.contains("cancel") {
        return json!({"calls": [{
            "operation": "cancel",
            "doctor_name": "jane smith",
            "datetime": datetime,
        }]})
        .to_string();
    }
    // A model that tries to act for someone else; the extra field is ignored.
    json!({"calls": [{
        "operation": "book",
        "doctor_name": "Jane Smith",
        "datetime": datetime,
        "patient_id": 9999999,
    }]})
    .to_string()
}

#[async_trait]
impl LlmProvider for MockLlm {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<String> {
        let last = messages
            .last()
            .map(|m| m.content.to_lowercase())
            .unwrap_or_default();

        if system_prompt.contains("availability questions") {
            Ok(availability_reply(&last))
        } else {
            Ok(booking_reply(&last))
        }
    }
}

/// Never answers within the collaborator timeout.
struct SlowLlm;

#[async_trait]
impl LlmProvider for SlowLlm {
    async fn chat(&self, _system_prompt: &str, _messages: &[Message]) -> anyhow::Result<String> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok("{}".to_string())
    }
}

struct FailingLlm;

#[async_trait]
impl LlmProvider for FailingLlm {
    async fn chat(&self, _system_prompt: &str, _messages: &[Message]) -> anyhow::Result<String> {
        anyhow::bail!("connection refused")
    }
}

/// Counts calls and plans nothing.
struct CountingResponder {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ToolResponder for CountingResponder {
    async fn plan(&self, _request: &ToolRequest<'_>) -> anyhow::Result<ToolPlan> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ToolPlan {
            calls: vec![],
            reply: Some("Noted.".to_string()),
        })
    }
}

struct CountingExtractor {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl IntentExtractor for CountingExtractor {
    async fn extract_availability(&self, _text: &str) -> anyhow::Result<Intent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Intent::Unrecognized)
    }
}

// ── Helpers ──

fn seed(conn: &rusqlite::Connection) {
    for (date_slot, doctor, spec) in [
        ("01-06-2025 9.00", "jane smith", "orthodontist"),
        ("01-06-2025 10.00", "jane smith", "orthodontist"),
        ("01-06-2025 9.30", "john doe", "orthodontist"),
        ("01-06-2025 11.00", "jane smith", "orthodontist"),
        ("01-06-2025 8.00", "lisa brown", "general_dentist"),
    ] {
        queries::upsert_slot(conn, &Slot::open(date_slot, doctor, spec)).unwrap();
    }
}

fn build_state(
    config: AppConfig,
    extractor: Box<dyn IntentExtractor>,
    responder: Box<dyn ToolResponder>,
) -> Arc<AppState> {
    let conn = db::init_db(":memory:").unwrap();
    seed(&conn);
    Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config,
        extractor,
        responder,
    })
}

fn mock_extractor() -> Box<dyn IntentExtractor> {
    Box::new(LlmIntentExtractor::new(Arc::new(MockLlm)))
}

fn state_with_responder(responder: Box<dyn ToolResponder>) -> Arc<AppState> {
    build_state(AppConfig::default(), mock_extractor(), responder)
}

fn test_state() -> Arc<AppState> {
    state_with_responder(Box::new(LlmToolResponder::new(Arc::new(MockLlm))))
}

fn short_timeout() -> AppConfig {
    AppConfig {
        collaborator_timeout: Duration::from_millis(50),
        ..AppConfig::default()
    }
}

fn occupant(state: &AppState, doctor: &str, date_slot: &str) -> Option<PatientId> {
    let conn = state.db.lock().unwrap();
    let slot = queries::get_slot(&conn, doctor, date_slot).unwrap().unwrap();
    assert!(slot.is_consistent());
    slot.patient_to_attend
}

async fn send(state: &Arc<AppState>, req: Request<Body>) -> (StatusCode, Value) {
    let res = handlers::build_router(state.clone())
        .oneshot(req)
        .await
        .unwrap();
    let status = res.status();
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(state, req).await
}

async fn post(state: &Arc<AppState>, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(state, req).await
}

async fn start(state: &Arc<AppState>, user_id: i64, query: &str) -> (StatusCode, Value) {
    post(state, "/start", json!({"user_id": user_id, "query": query})).await
}

async fn confirm(state: &Arc<AppState>, user_id: i64, accept: bool) -> (StatusCode, Value) {
    post(state, "/confirm", json!({"user_id": user_id, "confirm": accept})).await
}

fn patient(raw: i64) -> Option<PatientId> {
    PatientId::new(raw)
}

// ── Health & validation ──

#[tokio::test]
async fn test_health() {
    let state = test_state();
    let (status, json) = get(&state, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_start_rejects_short_patient_id() {
    let state = test_state();
    let (status, json) = start(&state, 123, "book jane smith 01-06-2025 09:00").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "ID must be 7 or 8 digits");
    assert_eq!(occupant(&state, "jane smith", "01-06-2025 9.00"), None);
}

#[tokio::test]
async fn test_start_rejects_blank_query() {
    let state = test_state();
    let (status, json) = start(&state, PATIENT_A, "   ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Query must not be empty");
}

// ── Information path ──

#[tokio::test]
async fn test_availability_by_doctor_completes() {
    let state = test_state();
    let (status, json) = start(&state, PATIENT_A, "Is jane smith available on 01-06-2025?").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");
    assert_eq!(
        json["message"],
        "Available slots for jane smith on 01-06-2025: 09:00, 10:00, 11:00"
    );

    let (_, pending) = get(&state, &format!("/pending/{PATIENT_A}")).await;
    assert_eq!(pending["status"], "no pending request");
}

#[tokio::test]
async fn test_availability_by_specialization_groups_doctors() {
    let state = test_state();
    let (status, json) = start(&state, PATIENT_A, "Which orthodontist is available on 01-06-2025?").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");
    let message = json["message"].as_str().unwrap();
    assert!(message.contains("jane smith: 09:00, 10:00, 11:00"));
    assert!(message.contains("john doe: 09:30"));
    assert!(!message.contains("lisa brown"));
}

#[tokio::test]
async fn test_unreadable_availability_question_degrades() {
    let state = test_state();
    let (status, json) = start(&state, PATIENT_A, "any availability soon?").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");
    assert_eq!(json["message"], "No availability found.");
}

// ── Booking path & confirmation gate ──

#[tokio::test]
async fn test_booking_without_datetime_asks_for_format() {
    let state = test_state();
    let (status, json) = start(&state, PATIENT_A, "book jane smith tomorrow morning").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");
    assert_eq!(
        json["message"],
        "Please provide the appointment date and time in DD-MM-YYYY HH:MM format."
    );
    assert_eq!(occupant(&state, "jane smith", "01-06-2025 9.00"), None);
}

#[tokio::test]
async fn test_book_then_accept() {
    let state = test_state();

    let (status, json) = start(&state, PATIENT_A, "book jane smith 01-06-2025 09:00").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "awaiting_confirmation");
    assert_eq!(
        json["proposed_response"],
        "Appointment successfully booked with jane smith on 01-06-2025 09:00."
    );

    // The session id wins over whatever the model put in the call.
    assert_eq!(occupant(&state, "jane smith", "01-06-2025 9.00"), patient(PATIENT_A));

    let (status, pending) = get(&state, &format!("/pending/{PATIENT_A}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["patient_id"], PATIENT_A);
    assert_eq!(pending["proposed_response"], json["proposed_response"]);

    let (status, json) = confirm(&state, PATIENT_A, true).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "confirmed");
    assert_eq!(json["message"], "Appointment confirmed successfully.");

    assert_eq!(occupant(&state, "jane smith", "01-06-2025 9.00"), patient(PATIENT_A));
    let (_, pending) = get(&state, &format!("/pending/{PATIENT_A}")).await;
    assert_eq!(pending["status"], "no pending request");
}

#[tokio::test]
async fn test_book_then_reject_reverts() {
    let state = test_state();

    let (_, json) = start(&state, PATIENT_A, "book jane smith 01-06-2025 10:00").await;
    assert_eq!(json["status"], "awaiting_confirmation");
    assert_eq!(occupant(&state, "jane smith", "01-06-2025 10.00"), patient(PATIENT_A));

    let (status, json) = confirm(&state, PATIENT_A, false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "cancelled");
    assert_eq!(
        json["message"],
        "Booking cancelled by user. Reverted 1 change(s)."
    );
    assert_eq!(occupant(&state, "jane smith", "01-06-2025 10.00"), None);
}

#[tokio::test]
async fn test_reject_reverts_changes_from_replaced_proposal() {
    let state = test_state();

    let (_, json) = start(&state, PATIENT_A, "book jane smith 01-06-2025 09:00").await;
    assert_eq!(json["status"], "awaiting_confirmation");
    let (_, json) = start(&state, PATIENT_A, "book jane smith 01-06-2025 10:00").await;
    assert_eq!(json["status"], "awaiting_confirmation");

    let (status, json) = confirm(&state, PATIENT_A, false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "cancelled");
    assert_eq!(
        json["message"],
        "Booking cancelled by user. Reverted 2 change(s)."
    );
    assert_eq!(occupant(&state, "jane smith", "01-06-2025 9.00"), None);
    assert_eq!(occupant(&state, "jane smith", "01-06-2025 10.00"), None);
}

#[tokio::test]
async fn test_confirm_without_start() {
    let state = test_state();
    let (status, json) = confirm(&state, PATIENT_A, true).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "No pending request found.");
}

#[tokio::test]
async fn test_confirm_is_consumed_once() {
    let state = test_state();
    start(&state, PATIENT_A, "book jane smith 01-06-2025 11:00").await;

    let (status, _) = confirm(&state, PATIENT_A, true).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = confirm(&state, PATIENT_A, true).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_confirm_rejects_invalid_patient_id() {
    let state = test_state();
    let (status, json) = confirm(&state, 123456789, true).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "ID must be 7 or 8 digits");
}

#[tokio::test]
async fn test_two_patients_one_slot() {
    let state = test_state();

    let (_, json) = start(&state, PATIENT_A, "book jane smith 01-06-2025 09:00").await;
    assert_eq!(json["status"], "awaiting_confirmation");
    confirm(&state, PATIENT_A, true).await;

    // Nothing changed for B, so there is nothing to confirm.
    let (status, json) = start(&state, PATIENT_B, "book jane smith 01-06-2025 09:00").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");
    assert_eq!(json["message"], "No available appointment for that time.");
    assert_eq!(occupant(&state, "jane smith", "01-06-2025 9.00"), patient(PATIENT_A));

    let (_, json) = start(
        &state,
        PATIENT_A,
        "please reschedule jane smith 01-06-2025 09:00 to 01-06-2025 10:00",
    )
    .await;
    assert_eq!(json["status"], "awaiting_confirmation");
    assert_eq!(
        json["proposed_response"],
        "Appointment with jane smith rescheduled from 01-06-2025 09:00 to 01-06-2025 10:00."
    );
    confirm(&state, PATIENT_A, true).await;

    assert_eq!(occupant(&state, "jane smith", "01-06-2025 9.00"), None);
    assert_eq!(occupant(&state, "jane smith", "01-06-2025 10.00"), patient(PATIENT_A));

    let (_, json) = start(&state, PATIENT_B, "book jane smith 01-06-2025 09:00").await;
    assert_eq!(json["status"], "awaiting_confirmation");
    confirm(&state, PATIENT_B, true).await;
    assert_eq!(occupant(&state, "jane smith", "01-06-2025 9.00"), patient(PATIENT_B));
}

#[tokio::test]
async fn test_cancel_someone_elses_appointment_is_not_found() {
    let state = test_state();
    start(&state, PATIENT_A, "book jane smith 01-06-2025 09:00").await;
    confirm(&state, PATIENT_A, true).await;

    let (_, json) = start(&state, PATIENT_B, "cancel jane smith 01-06-2025 09:00").await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["message"], "No matching appointment found.");
    assert_eq!(occupant(&state, "jane smith", "01-06-2025 9.00"), patient(PATIENT_A));
}

#[tokio::test]
async fn test_rule_based_responder_cancel_flow() {
    let state = state_with_responder(Box::new(RuleBasedResponder));

    let (_, json) = start(&state, PATIENT_A, "Book John Doe on 01-06-2025 09:30 please").await;
    assert_eq!(json["status"], "awaiting_confirmation");
    confirm(&state, PATIENT_A, true).await;
    assert_eq!(occupant(&state, "john doe", "01-06-2025 9.30"), patient(PATIENT_A));

    let (_, json) = start(&state, PATIENT_A, "cancel my john doe visit on 01-06-2025 09:30").await;
    assert_eq!(json["status"], "awaiting_confirmation");
    assert_eq!(
        json["proposed_response"],
        "Appointment with john doe on 01-06-2025 09:30 cancelled successfully."
    );
    confirm(&state, PATIENT_A, true).await;
    assert_eq!(occupant(&state, "john doe", "01-06-2025 9.30"), None);
}

// ── Supervisor loop ──

fn counting_state() -> (Arc<AppState>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let extractor_calls = Arc::new(AtomicUsize::new(0));
    let responder_calls = Arc::new(AtomicUsize::new(0));
    let state = build_state(
        AppConfig::default(),
        Box::new(CountingExtractor {
            calls: Arc::clone(&extractor_calls),
        }),
        Box::new(CountingResponder {
            calls: Arc::clone(&responder_calls),
        }),
    );
    (state, extractor_calls, responder_calls)
}

#[tokio::test]
async fn test_supervisor_calls_one_handler_per_message() {
    let (state, extractor_calls, responder_calls) = counting_state();
    let mut run = RunState::new(patient(PATIENT_A).unwrap(), "book jane smith 01-06-2025 09:00");

    supervisor::run(&state, &mut run).await.unwrap();

    assert_eq!(run.steps, 1);
    assert_eq!(run.messages.len(), 2);
    assert_eq!(run.last_reply(), Some("Noted."));
    assert_eq!(responder_calls.load(Ordering::SeqCst), 1);
    assert_eq!(extractor_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_supervisor_stops_on_assistant_message() {
    let (state, extractor_calls, responder_calls) = counting_state();
    let mut run = RunState::new(patient(PATIENT_A).unwrap(), "Is jane smith available on 01-06-2025?");
    run.messages
        .push(ChatMessage::assistant("No availability found.", "information_node"));

    supervisor::run(&state, &mut run).await.unwrap();

    assert_eq!(run.steps, 0);
    assert_eq!(run.messages.len(), 2);
    assert_eq!(extractor_calls.load(Ordering::SeqCst), 0);
    assert_eq!(responder_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_step_limit_is_internal_error() {
    let config = AppConfig {
        max_supervisor_steps: 0,
        ..AppConfig::default()
    };
    let state = build_state(
        config,
        mock_extractor(),
        Box::new(LlmToolResponder::new(Arc::new(MockLlm))),
    );

    let (status, json) = start(&state, PATIENT_A, "book jane smith 01-06-2025 09:00").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "internal error");
    assert_eq!(occupant(&state, "jane smith", "01-06-2025 9.00"), None);

    let (_, pending) = get(&state, &format!("/pending/{PATIENT_A}")).await;
    assert_eq!(pending["status"], "no pending request");
}

// ── Collaborator failures ──

#[tokio::test]
async fn test_responder_error_changes_nothing() {
    let state = state_with_responder(Box::new(LlmToolResponder::new(Arc::new(FailingLlm))));

    let (status, json) = start(&state, PATIENT_A, "book jane smith 01-06-2025 09:00").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");
    assert_eq!(json["message"], RESPONDER_FAILURE);
    assert_eq!(occupant(&state, "jane smith", "01-06-2025 9.00"), None);
}

#[tokio::test]
async fn test_responder_timeout_changes_nothing() {
    let state = build_state(
        short_timeout(),
        mock_extractor(),
        Box::new(LlmToolResponder::new(Arc::new(SlowLlm))),
    );

    let (status, json) = start(&state, PATIENT_A, "book jane smith 01-06-2025 09:00").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");
    assert_eq!(json["message"], RESPONDER_FAILURE);
    assert_eq!(occupant(&state, "jane smith", "01-06-2025 9.00"), None);
}

#[tokio::test]
async fn test_extractor_timeout_degrades() {
    let state = build_state(
        short_timeout(),
        Box::new(LlmIntentExtractor::new(Arc::new(SlowLlm))),
        Box::new(RuleBasedResponder),
    );

    let (status, json) = start(&state, PATIENT_A, "Is jane smith available on 01-06-2025?").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");
    assert_eq!(json["message"], "No availability found.");
}

// ── Store failures ──

fn break_store(state: &AppState) {
    let conn = state.db.lock().unwrap();
    conn.execute_batch("DROP TABLE slots;").unwrap();
}

#[tokio::test]
async fn test_store_failure_on_booking_is_internal_error() {
    let state = test_state();
    break_store(&state);

    let (status, json) = start(&state, PATIENT_A, "book jane smith 01-06-2025 09:00").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "internal error");
}

#[tokio::test]
async fn test_store_failure_on_availability_is_internal_error() {
    let state = test_state();
    break_store(&state);

    let (status, json) = start(&state, PATIENT_A, "Is jane smith available on 01-06-2025?").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "internal error");
}

// ── Slot listing ──

#[tokio::test]
async fn test_list_slots_for_doctor() {
    let state = test_state();
    let (status, json) = get(&state, "/slots?date=01-06-2025&doctor=Jane%20Smith").await;

    assert_eq!(status, StatusCode::OK);
    let slots = json.as_array().unwrap();
    assert_eq!(slots.len(), 3);
    assert_eq!(slots[0]["time"], "09:00");
    assert_eq!(slots[0]["date"], "01-06-2025");
    assert_eq!(slots[0]["is_available"], true);
}

#[tokio::test]
async fn test_list_slots_rejects_bad_date() {
    let state = test_state();
    let (status, json) = get(&state, "/slots?date=2025-06-01").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}
