use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::body::Bytes;
use axum::http::Method;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use chrono::DateTime;
use chrono::Local;
use chrono::TimeZone;
use http_body_util::BodyExt;
use serde_json::Map;
use serde_json::Value;
use tower::Service;

use crate::controller::Controller;
use crate::create_router;
use crate::scheduler::Scheduler;
use crate::storage::Memory;
use crate::storage::Storage;

use super::fakes::ManualClock;
use super::fakes::RecordingDelivery;
use super::fakes::RecordingNotifier;

/// Test helper version of Item struct
#[derive(Debug, PartialEq, Eq)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub dose: Option<String>,
    pub unit: Option<String>,
    pub instructions: Option<String>,
    pub active: bool,
}

/// Test helper version of Reminder struct
#[derive(Debug, PartialEq, Eq)]
pub struct Reminder {
    pub id: i64,
    pub item_id: i64,
    pub minutes: u64,
    pub time: String,
    pub days: u64,
    pub active: bool,
    pub next_trigger: Option<String>,
    pub precision: Option<String>,
}

/// Test helper version of the reconciliation report
#[derive(Debug, PartialEq, Eq)]
pub struct ReconcileReport {
    pub armed: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Error response
#[derive(Debug, PartialEq, Eq)]
pub struct Error {
    pub error: String,
    pub description: Option<String>,
}

/// Everything around a scheduler, with fakes for the outside world
pub struct Fixture<S: Storage> {
    pub storage: S,
    pub scheduler: Scheduler<S>,
    pub controller: Controller<S>,
    pub delivery: Arc<RecordingDelivery>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
}

/// Tuesday 4 June 2024, 07:00 local time
pub fn tuesday_morning() -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 6, 4, 7, 0, 0).unwrap()
}

pub fn setup<S: Storage>(storage: S) -> Fixture<S> {
    setup_with_delivery(storage, RecordingDelivery::new())
}

pub fn setup_with_delivery<S: Storage>(storage: S, delivery: RecordingDelivery) -> Fixture<S> {
    let delivery = Arc::new(delivery);
    let notifier = Arc::new(RecordingNotifier::new());
    let clock = Arc::new(ManualClock::new(tuesday_morning()));

    let scheduler = Scheduler::new(
        storage.clone(),
        delivery.clone(),
        notifier.clone(),
        clock.clone(),
    );
    let controller = Controller::new(storage.clone(), scheduler.clone());

    Fixture {
        storage,
        scheduler,
        controller,
        delivery,
        notifier,
        clock,
    }
}

/// Setup the Pillbox app on top of an in-memory store
pub async fn setup_test_app() -> (Router, Fixture<Memory>) {
    let fixture = setup(Memory::new());

    (create_router(fixture.controller.clone()), fixture)
}

async fn send(
    app: &mut Router,
    method: Method,
    uri: &str,
    payload: Option<&Value>,
) -> (StatusCode, Bytes) {
    let builder = Request::builder().method(method).uri(uri);

    let request = match payload {
        Some(payload) => builder
            .header(CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
            .body(Body::from(serde_json::to_vec(payload).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.call(request).await.unwrap();
    let status_code = response.status();

    let body = response.into_body().collect().await.unwrap().to_bytes();

    (status_code, body)
}

/// Request any path, the error message when it failed
pub async fn get(app: &mut Router, uri: &str) -> (StatusCode, Option<String>) {
    let (status_code, body) = send(app, Method::GET, uri, None).await;

    (
        status_code,
        if status_code.is_client_error() {
            Some(get_error_message(&body))
        } else {
            None
        },
    )
}

pub async fn maybe_create_item(
    app: &mut Router,
    name: &str,
    dose: Option<&str>,
    unit: Option<&str>,
    instructions: Option<&str>,
) -> (StatusCode, Option<Item>, Option<String>) {
    let mut payload = Map::new();
    payload.insert("name".to_string(), Value::String(name.to_string()));

    for (key, value) in [("dose", dose), ("unit", unit), ("instructions", instructions)] {
        if let Some(value) = value {
            payload.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    let (status_code, body) =
        send(app, Method::POST, "/api/items", Some(&Value::Object(payload))).await;

    (
        status_code,
        if status_code == StatusCode::CREATED {
            Some(get_item(&body))
        } else {
            None
        },
        if status_code == StatusCode::BAD_REQUEST {
            Some(get_error_message(&body))
        } else {
            None
        },
    )
}

/// Create an item that has to succeed
pub async fn create_item(app: &mut Router, name: &str) -> Item {
    let (status_code, item, _) =
        maybe_create_item(app, name, Some("500"), Some("mg"), Some("Take with food")).await;
    assert_eq!(StatusCode::CREATED, status_code);

    item.unwrap()
}

pub async fn maybe_create_item_with_raw_body(
    app: &mut Router,
    body: &'static str,
    include_content_type: bool,
) -> (StatusCode, Option<Item>, Option<Error>) {
    let mut builder = Request::builder().method(Method::POST).uri("/api/items");

    if include_content_type {
        builder = builder.header(CONTENT_TYPE, mime::APPLICATION_JSON.as_ref());
    }

    let request = builder.body(Body::from(body.as_bytes())).unwrap();

    let response = app.call(request).await.unwrap();
    let status_code = response.status();

    let body = response.into_body().collect().await.unwrap().to_bytes();

    (
        status_code,
        if status_code == StatusCode::CREATED {
            Some(get_item(&body))
        } else {
            None
        },
        if status_code == StatusCode::BAD_REQUEST {
            Some(get_error(&body))
        } else {
            None
        },
    )
}

pub async fn single_item(app: &mut Router, id: i64) -> (StatusCode, Option<Item>, Option<String>) {
    let (status_code, body) = send(app, Method::GET, &format!("/api/items/{id}"), None).await;

    (
        status_code,
        if status_code == StatusCode::OK {
            Some(get_item(&body))
        } else {
            None
        },
        if status_code == StatusCode::BAD_REQUEST || status_code == StatusCode::NOT_FOUND {
            Some(get_error_message(&body))
        } else {
            None
        },
    )
}

pub async fn list_items(app: &mut Router, query: Option<&str>) -> (StatusCode, Option<Vec<Item>>) {
    let uri = match query {
        Some(query) => format!("/api/items?q={query}"),
        None => "/api/items".to_string(),
    };

    let (status_code, body) = send(app, Method::GET, &uri, None).await;

    (
        status_code,
        if status_code == StatusCode::OK {
            Some(get_items(&body))
        } else {
            None
        },
    )
}

pub async fn maybe_update_item(
    app: &mut Router,
    id: i64,
    payload: Value,
) -> (StatusCode, Option<Item>, Option<String>) {
    let (status_code, body) =
        send(app, Method::PATCH, &format!("/api/items/{id}"), Some(&payload)).await;

    (
        status_code,
        if status_code == StatusCode::OK {
            Some(get_item(&body))
        } else {
            None
        },
        if status_code == StatusCode::BAD_REQUEST || status_code == StatusCode::NOT_FOUND {
            Some(get_error_message(&body))
        } else {
            None
        },
    )
}

pub async fn maybe_delete_item(app: &mut Router, id: i64) -> (StatusCode, Option<String>) {
    let (status_code, body) = send(app, Method::DELETE, &format!("/api/items/{id}"), None).await;

    (
        status_code,
        if status_code == StatusCode::NOT_FOUND {
            Some(get_error_message(&body))
        } else {
            None
        },
    )
}

pub async fn maybe_create_reminder(
    app: &mut Router,
    item_id: i64,
    payload: Value,
) -> (StatusCode, Option<Reminder>, Option<String>) {
    let (status_code, body) = send(
        app,
        Method::POST,
        &format!("/api/items/{item_id}/reminders"),
        Some(&payload),
    )
    .await;

    (
        status_code,
        if status_code == StatusCode::CREATED {
            Some(get_reminder(&body))
        } else {
            None
        },
        if status_code == StatusCode::BAD_REQUEST || status_code == StatusCode::NOT_FOUND {
            Some(get_error_message(&body))
        } else {
            None
        },
    )
}

pub async fn list_reminders(
    app: &mut Router,
    item_id: i64,
) -> (StatusCode, Option<Vec<Reminder>>) {
    let (status_code, body) = send(
        app,
        Method::GET,
        &format!("/api/items/{item_id}/reminders"),
        None,
    )
    .await;

    (
        status_code,
        if status_code == StatusCode::OK {
            Some(get_reminders(&body))
        } else {
            None
        },
    )
}

pub async fn single_reminder(
    app: &mut Router,
    item_id: i64,
    reminder_id: i64,
) -> (StatusCode, Option<Reminder>, Option<String>) {
    let (status_code, body) = send(
        app,
        Method::GET,
        &format!("/api/items/{item_id}/reminders/{reminder_id}"),
        None,
    )
    .await;

    (
        status_code,
        if status_code == StatusCode::OK {
            Some(get_reminder(&body))
        } else {
            None
        },
        if status_code == StatusCode::BAD_REQUEST || status_code == StatusCode::NOT_FOUND {
            Some(get_error_message(&body))
        } else {
            None
        },
    )
}

pub async fn maybe_update_reminder(
    app: &mut Router,
    item_id: i64,
    reminder_id: i64,
    payload: Value,
) -> (StatusCode, Option<Reminder>, Option<String>) {
    let (status_code, body) = send(
        app,
        Method::PATCH,
        &format!("/api/items/{item_id}/reminders/{reminder_id}"),
        Some(&payload),
    )
    .await;

    (
        status_code,
        if status_code == StatusCode::OK {
            Some(get_reminder(&body))
        } else {
            None
        },
        if status_code == StatusCode::BAD_REQUEST || status_code == StatusCode::NOT_FOUND {
            Some(get_error_message(&body))
        } else {
            None
        },
    )
}

pub async fn maybe_delete_reminder(
    app: &mut Router,
    item_id: i64,
    reminder_id: i64,
) -> (StatusCode, Option<String>) {
    let (status_code, body) = send(
        app,
        Method::DELETE,
        &format!("/api/items/{item_id}/reminders/{reminder_id}"),
        None,
    )
    .await;

    (
        status_code,
        if status_code == StatusCode::NOT_FOUND {
            Some(get_error_message(&body))
        } else {
            None
        },
    )
}

pub async fn maybe_dismiss(app: &mut Router, reminder_id: i64) -> (StatusCode, Option<String>) {
    let (status_code, body) = send(
        app,
        Method::POST,
        &format!("/api/reminders/{reminder_id}/dismiss"),
        None,
    )
    .await;

    (
        status_code,
        if status_code == StatusCode::NOT_FOUND {
            Some(get_error_message(&body))
        } else {
            None
        },
    )
}

pub async fn reconcile(app: &mut Router) -> (StatusCode, Option<ReconcileReport>) {
    let (status_code, body) = send(app, Method::POST, "/api/reconcile", None).await;

    (
        status_code,
        if status_code == StatusCode::OK {
            Some(get_report(&body))
        } else {
            None
        },
    )
}

fn optional_string(value: &Map<String, Value>, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn value_to_item(item: &Map<String, Value>) -> Item {
    Item {
        id: item["id"].as_i64().unwrap(),
        name: item["name"].as_str().map(ToString::to_string).unwrap(),
        dose: optional_string(item, "dose"),
        unit: optional_string(item, "unit"),
        instructions: optional_string(item, "instructions"),
        active: item["active"].as_bool().unwrap(),
    }
}

fn get_item(body: &Bytes) -> Item {
    serde_json::from_slice::<Value>(&body[..]).unwrap()["data"]
        .as_object()
        .map(value_to_item)
        .unwrap()
}

fn get_items(body: &Bytes) -> Vec<Item> {
    serde_json::from_slice::<Value>(&body[..]).unwrap()["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f.as_object().unwrap())
        .map(value_to_item)
        .collect()
}

fn value_to_reminder(reminder: &Map<String, Value>) -> Reminder {
    Reminder {
        id: reminder["id"].as_i64().unwrap(),
        item_id: reminder["itemId"].as_i64().unwrap(),
        minutes: reminder["minutes"].as_u64().unwrap(),
        time: reminder["time"].as_str().map(ToString::to_string).unwrap(),
        days: reminder["days"].as_u64().unwrap(),
        active: reminder["active"].as_bool().unwrap(),
        next_trigger: optional_string(reminder, "nextTrigger"),
        precision: optional_string(reminder, "precision"),
    }
}

fn get_reminder(body: &Bytes) -> Reminder {
    serde_json::from_slice::<Value>(&body[..]).unwrap()["data"]
        .as_object()
        .map(value_to_reminder)
        .unwrap()
}

fn get_reminders(body: &Bytes) -> Vec<Reminder> {
    serde_json::from_slice::<Value>(&body[..]).unwrap()["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f.as_object().unwrap())
        .map(value_to_reminder)
        .collect()
}

fn get_report(body: &Bytes) -> ReconcileReport {
    let data = &serde_json::from_slice::<Value>(&body[..]).unwrap()["data"];

    ReconcileReport {
        armed: data["armed"].as_u64().unwrap(),
        skipped: data["skipped"].as_u64().unwrap(),
        failed: data["failed"].as_u64().unwrap(),
    }
}

fn value_to_error(error: &Map<String, Value>) -> Error {
    Error {
        error: error["error"].as_str().map(ToString::to_string).unwrap(),
        description: optional_string(error, "description"),
    }
}

fn get_error(body: &Bytes) -> Error {
    serde_json::from_slice::<Value>(&body[..])
        .unwrap()
        .as_object()
        .map(value_to_error)
        .unwrap()
}

fn get_error_message(body: &Bytes) -> String {
    serde_json::from_slice::<Value>(&body[..]).unwrap()["error"]
        .as_str()
        .map(ToString::to_string)
        .unwrap()
}
