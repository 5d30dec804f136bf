//! HTTP surface: status codes, headers and JSON bodies.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const ADMIN: &str = "ADMIN";
const ORGANIZER: &str = "ORGANIZER";
const PARTICIPANT: &str = "PARTICIPANT";

struct Caller {
    id: Uuid,
    role: &'static str,
}

impl Caller {
    fn new(role: &'static str) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
        }
    }
}

async fn send_raw(
    app: &Router,
    method: Method,
    uri: &str,
    caller: Option<&Caller>,
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Bytes) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        builder = builder
            .header("X-User-Id", caller.id.to_string())
            .header("X-User-Role", caller.role);
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, bytes)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    caller: Option<&Caller>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, _, bytes) = send_raw(app, method, uri, caller, body).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_event(app: &Router, organizer: &Caller, max: Option<u32>) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/events",
        Some(organizer),
        Some(json!({ "title": "Rust Workshop", "max_participants": max })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

fn registration_body(n: usize) -> Value {
    json!({ "name": format!("Participant {n}"), "email": format!("p{n}@example.com") })
}

#[tokio::test]
async fn health_and_readiness() {
    let app = common::app().router();

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&app, Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Healthy");
    let metadata = body["metadata"].as_array().unwrap();
    assert!(metadata.contains(&json!(["in_flight_requests", "0"])));
}

#[tokio::test]
async fn event_lifecycle() {
    let app = common::app().router();
    let organizer = Caller::new(ORGANIZER);

    let event_id = create_event(&app, &organizer, Some(2)).await;

    let (status, body) = send(&app, Method::GET, &format!("/api/events/{event_id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["max_participants"], 2);
    assert_eq!(body["current_participants"], 0);
    assert_eq!(body["is_active"], true);

    let (status, body) = send(&app, Method::GET, "/api/events", Some(&organizer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        Method::DELETE,
        &format!("/api/events/{event_id}"),
        Some(&organizer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], false);

    let participant = Caller::new(PARTICIPANT);
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/events/{event_id}/registrations"),
        Some(&participant),
        Some(registration_body(1)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn register_until_full_then_waitlist() {
    let app = common::app().router();
    let organizer = Caller::new(ORGANIZER);
    let event_id = create_event(&app, &organizer, Some(1)).await;
    let path = format!("/api/events/{event_id}/registrations");

    let first = Caller::new(PARTICIPANT);
    let (status, body) = send(&app, Method::POST, &path, Some(&first), Some(registration_body(1))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "CONFIRMED");
    assert_eq!(body["participant_email"], "p1@example.com");

    let second = Caller::new(PARTICIPANT);
    let (status, body) = send(&app, Method::POST, &path, Some(&second), Some(registration_body(2))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "WAITING_LIST");

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/events/{event_id}/available-slots"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available_slots"], 0);

    let (status, body) = send(&app, Method::GET, &format!("/api/events/{event_id}/stats"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["confirmed"], 1);
    assert_eq!(body["waiting_list"], 1);
    assert_eq!(body["cancelled"], 0);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = common::app().router();
    let organizer = Caller::new(ORGANIZER);
    let event_id = create_event(&app, &organizer, Some(5)).await;
    let path = format!("/api/events/{event_id}/registrations");
    let participant = Caller::new(PARTICIPANT);

    let (status, _) = send(&app, Method::POST, &path, Some(&participant), Some(registration_body(1))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, Method::POST, &path, Some(&participant), Some(registration_body(1))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_REGISTRATION");
}

#[tokio::test]
async fn cancel_is_owner_only_and_idempotent() {
    let app = common::app().router();
    let organizer = Caller::new(ORGANIZER);
    let event_id = create_event(&app, &organizer, Some(3)).await;
    let owner = Caller::new(PARTICIPANT);

    let (_, registration) = send(
        &app,
        Method::POST,
        &format!("/api/events/{event_id}/registrations"),
        Some(&owner),
        Some(registration_body(1)),
    )
    .await;
    let cancel_path = format!("/api/registrations/{}/cancel", registration["id"].as_str().unwrap());

    let stranger = Caller::new(PARTICIPANT);
    let (status, body) = send(&app, Method::POST, &cancel_path, Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, body) = send(&app, Method::POST, &cancel_path, Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released"], true);
    assert_eq!(body["registration"]["status"], "CANCELLED");

    let (status, body) = send(&app, Method::POST, &cancel_path, Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released"], false);

    let (_, body) = send(
        &app,
        Method::GET,
        &format!("/api/events/{event_id}/available-slots"),
        None,
        None,
    )
    .await;
    assert_eq!(body["available_slots"], 3);

    let (status, body) = send(&app, Method::GET, "/api/registrations/me", Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn caller_headers_are_required() {
    let app = common::app().router();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/events",
        None,
        Some(json!({ "title": "Anonymous", "max_participants": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let participant = Caller::new(PARTICIPANT);
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/events",
        Some(&participant),
        Some(json!({ "title": "Not mine", "max_participants": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn unknown_resources_are_not_found() {
    let app = common::app().router();
    let participant = Caller::new(PARTICIPANT);
    let missing = Uuid::new_v4();

    let (status, _) = send(&app, Method::GET, &format!("/api/events/{missing}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/events/{missing}/registrations"),
        Some(&participant),
        Some(registration_body(1)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/registrations/{missing}/cancel"),
        Some(&participant),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn organizer_sees_event_registrations() {
    let app = common::app().router();
    let organizer = Caller::new(ORGANIZER);
    let event_id = create_event(&app, &organizer, None).await;
    let path = format!("/api/events/{event_id}/registrations");

    for n in 0..3 {
        let participant = Caller::new(PARTICIPANT);
        let (status, body) = send(&app, Method::POST, &path, Some(&participant), Some(registration_body(n))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "CONFIRMED");
    }

    let (status, body) = send(&app, Method::GET, &path, Some(&organizer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);

    let outsider = Caller::new(PARTICIPANT);
    let (status, _) = send(&app, Method::GET, &path, Some(&outsider), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = send(
        &app,
        Method::GET,
        &format!("/api/events/{event_id}/available-slots"),
        None,
        None,
    )
    .await;
    assert_eq!(body["available_slots"], "unlimited");
}

#[tokio::test]
async fn capacity_beyond_counter_range_is_unprocessable() {
    let app = common::app().router();
    let organizer = Caller::new(ORGANIZER);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/events",
        Some(&organizer),
        Some(json!({ "title": "Too big", "max_participants": u64::from(u32::MAX) })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn listing_another_organizers_events_needs_admin() {
    let app = common::app().router();
    let organizer = Caller::new(ORGANIZER);
    create_event(&app, &organizer, Some(5)).await;
    let path = format!("/api/events?organizer_id={}", organizer.id);

    let (status, body) = send(&app, Method::GET, &path, Some(&organizer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let rival = Caller::new(ORGANIZER);
    let (status, body) = send(&app, Method::GET, &path, Some(&rival), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let admin = Caller::new(ADMIN);
    let (status, body) = send(&app, Method::GET, &path, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn organizer_downloads_registrations_as_csv() {
    let app = common::app().router();
    let organizer = Caller::new(ORGANIZER);
    let event_id = create_event(&app, &organizer, Some(1)).await;
    let path = format!("/api/events/{event_id}/registrations");
    for n in 1..=2 {
        let participant = Caller::new(PARTICIPANT);
        let (status, _) = send(&app, Method::POST, &path, Some(&participant), Some(registration_body(n))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let export = format!("{path}/export");
    let (status, headers, bytes) = send_raw(&app, Method::GET, &export, Some(&organizer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/csv; charset=utf-8");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"inscriptions-evenement-{event_id}.csv\"").as_str()
    );

    let csv = String::from_utf8(bytes.to_vec()).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], r#""Name","Email","Phone","Registration date","Status""#);
    assert!(lines[1].starts_with(r#""Participant 1","p1@example.com","","#));
    assert!(lines[1].ends_with(r#","CONFIRMED""#));
    assert!(lines[2].ends_with(r#","WAITING_LIST""#));

    let outsider = Caller::new(PARTICIPANT);
    let (status, _) = send(&app, Method::GET, &export, Some(&outsider), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = Caller::new(ADMIN);
    let (status, _, _) = send_raw(&app, Method::GET, &export, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn organizer_stats_sum_their_events() {
    let app = common::app().router();
    let organizer = Caller::new(ORGANIZER);
    let half_full = create_event(&app, &organizer, Some(2)).await;
    create_event(&app, &organizer, Some(4)).await;
    let open = create_event(&app, &organizer, None).await;
    for event_id in [&half_full, &open, &open] {
        let participant = Caller::new(PARTICIPANT);
        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/events/{event_id}/registrations"),
            Some(&participant),
            Some(registration_body(1)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let path = format!("/api/organizers/{}/stats", organizer.id);

    let (status, body) = send(&app, Method::GET, &path, Some(&organizer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_events"], 3);
    assert_eq!(body["total_participants"], 3);
    // (50% + 0%) / 2; the unlimited event is left out of the average
    assert_eq!(body["average_attendance"], 25);

    let rival = Caller::new(ORGANIZER);
    let (status, _) = send(&app, Method::GET, &path, Some(&rival), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = Caller::new(ADMIN);
    let (status, body) = send(&app, Method::GET, &path, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_events"], 3);
}
