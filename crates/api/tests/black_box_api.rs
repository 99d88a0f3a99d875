use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use busline_api::app::services::AppServices;
use busline_api::config::AppConfig;
use busline_auth::{JwtClaims, Role};
use busline_core::{FixedClock, UserId};
use busline_infra::RetryPolicy;

const SECRET: &str = "test-secret";
const TRAVEL_DATE: &str = "2030-06-10";

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 6, 1, 8, 0, 0).unwrap()
}

struct TestServer {
    base_url: String,
    clock: Arc<FixedClock>,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = AppConfig {
            jwt_secret: SECRET.to_string(),
            retry: RetryPolicy::new(3, Duration::ZERO),
            ..AppConfig::default()
        };
        let clock = Arc::new(FixedClock::new(start_time()));
        let services = Arc::new(AppServices::in_memory(&config, clock.clone()));

        // Same router as prod, bound to an ephemeral port.
        let app = busline_api::app::build_app(config.jwt_secret.clone(), services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            clock,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let res = self.client.get(self.url(path)).bearer_auth(token).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(user: UserId, roles: Vec<Role>) -> String {
    let now = start_time();
    let claims = JwtClaims {
        sub: user,
        roles,
        issued_at: now - ChronoDuration::minutes(1),
        expires_at: now + ChronoDuration::days(30),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

struct Fleet {
    schedule_id: String,
    seat_ids: Vec<String>,
}

/// Register a 2x2 bus with 40 seats, a route and a 14:00 schedule.
async fn seed_fleet(srv: &TestServer, operator: &str) -> Fleet {
    let (status, bus) = srv
        .post(
            operator,
            "/buses",
            json!({ "bus_number": "KA-01-1234", "name": "Night Rider", "layout": "2x2", "total_seats": 40 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{bus}");
    let seats = bus["seats"].as_array().unwrap();
    assert_eq!(seats.len(), 40);
    assert_eq!(seats[5]["label"], "B2");

    let (status, route) = srv
        .post(operator, "/routes", json!({ "name": "Coastal", "origin": "Goa", "destination": "Pune" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{route}");

    let (status, schedule) = srv
        .post(
            operator,
            "/schedules",
            json!({
                "bus_id": bus["id"],
                "route_id": route["id"],
                "departure_time": "14:00:00",
                "arrival_time": "17:30:00",
                "base_price": 1500
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{schedule}");

    Fleet {
        schedule_id: schedule["id"].as_str().unwrap().to_string(),
        seat_ids: seats.iter().map(|s| s["id"].as_str().unwrap().to_string()).collect(),
    }
}

fn booking_body(fleet: &Fleet, seats: &[usize]) -> Value {
    json!({
        "schedule_id": fleet.schedule_id,
        "travel_date": TRAVEL_DATE,
        "passengers": seats.iter().map(|&i| json!({
            "seat_id": fleet.seat_ids[i],
            "name": "Asha Rao",
            "gender": "female"
        })).collect::<Vec<_>>()
    })
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv.client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv
        .client
        .get(srv.url("/whoami"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn principal_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let user = UserId::new();
    let token = mint_jwt(user, vec![Role::PASSENGER]);

    let (status, body) = srv.get(&token, "/whoami").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"].as_str().unwrap(), user.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "passenger"));
}

#[tokio::test]
async fn booking_lifecycle_book_cancel_refund() {
    let srv = TestServer::spawn().await;
    let operator = mint_jwt(UserId::new(), vec![Role::OPERATOR]);
    let passenger = mint_jwt(UserId::new(), vec![Role::PASSENGER]);
    let admin = mint_jwt(UserId::new(), vec![Role::ADMIN]);
    let fleet = seed_fleet(&srv, &operator).await;

    // Book two seats.
    let (status, created) = srv.post(&passenger, "/bookings", booking_body(&fleet, &[0, 1])).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let references: Vec<String> = created["references"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r.as_str().unwrap().to_string())
        .collect();
    assert_eq!(references.len(), 2);
    assert!(references.iter().all(|r| r.starts_with("BK300601")));
    assert_eq!(created["total_amount"], 3000);

    // Seat map reflects occupancy.
    let (status, map) = srv
        .get(&passenger, &format!("/schedules/{}/seats?travel_date={TRAVEL_DATE}", fleet.schedule_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    let seats = map["seats"].as_array().unwrap();
    assert_eq!(seats[0]["number"], 1);
    assert_eq!(seats[0]["occupied"], true);
    assert_eq!(seats[0]["gender"], "female");
    assert_eq!(seats[2]["occupied"], false);

    // Trip listing groups both rows.
    let (status, trips) = srv.get(&passenger, "/bookings").await;
    assert_eq!(status, StatusCode::OK);
    let upcoming = trips["upcoming"].as_array().unwrap();
    assert_eq!(upcoming.len(), 1);
    assert_eq!(upcoming[0]["passengers"].as_array().unwrap().len(), 2);
    assert_eq!(upcoming[0]["total_amount"], 3000);

    // Confirmation lookup by references.
    let (status, lookup) = srv
        .get(&passenger, &format!("/bookings/lookup?references={}", references.join(",")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lookup["trips"].as_array().unwrap().len(), 1);

    // Cancel one seat; the other stays confirmed.
    let (status, report) = srv
        .post(&passenger, "/bookings/cancel", json!({ "references": [references[0]] }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["cancelled_count"], 1);
    assert!(report["failures"].as_array().unwrap().is_empty());

    // Cancelled seat still blocks until refunded.
    let (status, _) = srv.post(&passenger, "/bookings", booking_body(&fleet, &[0])).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, pending) = srv.get(&admin, "/admin/refunds").await;
    assert_eq!(status, StatusCode::OK);
    let pending_rows = pending["bookings"].as_array().unwrap();
    assert_eq!(pending_rows.len(), 1);
    assert_eq!(pending["total_amount"], 1500);
    let booking_id = pending_rows[0]["booking_id"].as_str().unwrap().to_string();

    let (status, refunded) = srv
        .post(&admin, &format!("/admin/bookings/{booking_id}/refund"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{refunded}");
    assert_eq!(refunded["status"], "refunded");
    assert_eq!(refunded["payment_status"], "refunded");

    // Refund is not repeatable.
    let (status, again) = srv
        .post(&admin, &format!("/admin/bookings/{booking_id}/refund"), json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(again["error"], "NotFoundOrNotCancellable");

    // The freed seat can be booked again.
    let (status, _) = srv.post(&passenger, "/bookings", booking_body(&fleet, &[0])).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn seat_conflict_reports_offending_seats() {
    let srv = TestServer::spawn().await;
    let operator = mint_jwt(UserId::new(), vec![Role::OPERATOR]);
    let first = mint_jwt(UserId::new(), vec![Role::PASSENGER]);
    let second = mint_jwt(UserId::new(), vec![Role::PASSENGER]);
    let fleet = seed_fleet(&srv, &operator).await;

    let (status, _) = srv.post(&first, "/bookings", booking_body(&fleet, &[3])).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = srv.post(&second, "/bookings", booking_body(&fleet, &[2, 3])).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "ConflictError");
    assert_eq!(body["seat_ids"], json!([fleet.seat_ids[3]]));

    // Nothing of the losing group was written.
    let (_, trips) = srv.get(&second, "/bookings").await;
    assert!(trips["upcoming"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_requests_are_rejected_with_validation_errors() {
    let srv = TestServer::spawn().await;
    let operator = mint_jwt(UserId::new(), vec![Role::OPERATOR]);
    let passenger = mint_jwt(UserId::new(), vec![Role::PASSENGER]);
    let fleet = seed_fleet(&srv, &operator).await;

    let mut body = booking_body(&fleet, &[0]);
    body["passengers"][0]["name"] = json!("R2-D2");
    let (status, err) = srv.post(&passenger, "/bookings", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "ValidationError");

    let (status, _) = srv.post(&passenger, "/bookings", booking_body(&fleet, &[1, 1])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = srv
        .post(
            &operator,
            "/buses",
            json!({ "bus_number": "X-1", "name": "Tiny", "layout": "3x3", "total_seats": 40 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = srv
        .post(
            &operator,
            "/buses",
            json!({ "bus_number": "ka-01-1234", "name": "Copy", "layout": "2x3", "total_seats": 45 }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn malformed_request_bodies_get_structured_validation_errors() {
    let srv = TestServer::spawn().await;
    let operator = mint_jwt(UserId::new(), vec![Role::OPERATOR]);
    let passenger = mint_jwt(UserId::new(), vec![Role::PASSENGER]);
    let fleet = seed_fleet(&srv, &operator).await;

    let mut body = booking_body(&fleet, &[0]);
    body["passengers"][0]["gender"] = json!("other");
    let (status, err) = srv.post(&passenger, "/bookings", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "ValidationError");
    assert!(err["message"].as_str().unwrap().contains("other"), "{err}");

    let mut body = booking_body(&fleet, &[0]);
    body["travel_date"] = json!("10/06/2030");
    let (status, err) = srv.post(&passenger, "/bookings", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "ValidationError");

    let (status, err) = srv
        .get(&passenger, &format!("/schedules/{}/seats?travel_date=tomorrow", fleet.schedule_id))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "ValidationError");

    let (status, err) = srv
        .post(
            &operator,
            "/buses",
            json!({ "bus_number": "X-2", "name": "Huge", "layout": "4294967295x1", "total_seats": 40 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "ValidationError");

    // Nothing was booked by the rejected requests.
    let (_, trips) = srv.get(&passenger, "/bookings").await;
    assert!(trips["upcoming"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn cancellation_after_deadline_reports_deadline() {
    let srv = TestServer::spawn().await;
    let operator = mint_jwt(UserId::new(), vec![Role::OPERATOR]);
    let passenger = mint_jwt(UserId::new(), vec![Role::PASSENGER]);
    let fleet = seed_fleet(&srv, &operator).await;

    let (status, created) = srv.post(&passenger, "/bookings", booking_body(&fleet, &[4])).await;
    assert_eq!(status, StatusCode::CREATED);
    let reference = created["references"][0].as_str().unwrap().to_string();

    // Departure 14:00 UTC, window 120 min: 13:00 is past the 12:00 deadline.
    srv.clock.set(Utc.with_ymd_and_hms(2030, 6, 10, 13, 0, 0).unwrap());

    let (status, report) = srv
        .post(&passenger, "/bookings/cancel", json!({ "references": [reference, "NOPE123"] }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["cancelled_count"], 0);
    let failures = report["failures"].as_array().unwrap();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0]["kind"], "window_expired");
    assert_eq!(failures[0]["deadline"], "2030-06-10T12:00:00Z");
    assert_eq!(failures[1]["kind"], "not_found");
}

#[tokio::test]
async fn unauthorized_roles_are_blocked() {
    let srv = TestServer::spawn().await;
    let operator = mint_jwt(UserId::new(), vec![Role::OPERATOR]);
    let passenger = mint_jwt(UserId::new(), vec![Role::PASSENGER]);
    let viewer = mint_jwt(UserId::new(), vec![Role::new("viewer")]);
    let fleet = seed_fleet(&srv, &operator).await;

    let (status, _) = srv.get(&passenger, "/admin/refunds").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = srv
        .get(&passenger, &format!("/schedules/{}/trips", fleet.schedule_id))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = srv.post(&operator, "/bookings", booking_body(&fleet, &[0])).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = srv.post(&viewer, "/bookings", booking_body(&fleet, &[0])).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Operators see the schedule's trips.
    let (status, trips) = srv
        .get(&operator, &format!("/schedules/{}/trips", fleet.schedule_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(trips["upcoming"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn other_passengers_cannot_see_or_cancel_a_group() {
    let srv = TestServer::spawn().await;
    let operator = mint_jwt(UserId::new(), vec![Role::OPERATOR]);
    let owner = mint_jwt(UserId::new(), vec![Role::PASSENGER]);
    let stranger = mint_jwt(UserId::new(), vec![Role::PASSENGER]);
    let fleet = seed_fleet(&srv, &operator).await;

    let (_, created) = srv.post(&owner, "/bookings", booking_body(&fleet, &[7])).await;
    let reference = created["references"][0].as_str().unwrap().to_string();

    let (status, _) = srv
        .get(&stranger, &format!("/bookings/lookup?references={reference}"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, report) = srv
        .post(&stranger, "/bookings/cancel", json!({ "references": [reference] }))
        .await;
    assert_eq!(report["cancelled_count"], 0);
    assert_eq!(report["failures"][0]["kind"], "not_found");
}
