//! Integration tests for the API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server, against an in-memory [`WheelStore`]. This
//! validates handler logic, auth checks, and the persist-then-commit
//! sequencing without needing `PostgreSQL`.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use misfortune_api::build_router;
use misfortune_api::state::AppState;
use misfortune_core::TokenSigner;
use misfortune_db::{DbError, WheelStore};
use misfortune_types::{Drink, UserId, Wheel, WheelId};

const INTERNAL_TOKEN: &str = "internal-secret";

/// In-memory wheel store with a switchable failure mode for the
/// persist-then-commit tests.
struct MemoryWheelStore {
    wheels: std::sync::Mutex<BTreeMap<WheelId, Wheel>>,
    fail_drink_updates: AtomicBool,
}

impl MemoryWheelStore {
    fn new(wheels: Vec<Wheel>) -> Self {
        Self {
            wheels: std::sync::Mutex::new(
                wheels.into_iter().map(|wheel| (wheel.id, wheel)).collect(),
            ),
            fail_drink_updates: AtomicBool::new(false),
        }
    }

    fn stored_drinks(&self, wheel_id: WheelId) -> Vec<Drink> {
        self.wheels
            .lock()
            .unwrap()
            .get(&wheel_id)
            .map(|wheel| wheel.drinks.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl WheelStore for MemoryWheelStore {
    async fn fetch_wheels(&self) -> Result<Vec<Wheel>, DbError> {
        Ok(self.wheels.lock().unwrap().values().cloned().collect())
    }

    async fn create_wheel(&self, wheel: &Wheel) -> Result<(), DbError> {
        self.wheels.lock().unwrap().insert(wheel.id, wheel.clone());
        Ok(())
    }

    async fn update_wheel_name(&self, wheel_id: WheelId, name: &str) -> Result<(), DbError> {
        if let Some(wheel) = self.wheels.lock().unwrap().get_mut(&wheel_id) {
            wheel.name = name.to_owned();
        }
        Ok(())
    }

    async fn update_wheel_drinks(
        &self,
        wheel_id: WheelId,
        drinks: &[Drink],
    ) -> Result<(), DbError> {
        if self.fail_drink_updates.load(Ordering::SeqCst) {
            return Err(DbError::Config(String::from("injected store failure")));
        }
        if let Some(wheel) = self.wheels.lock().unwrap().get_mut(&wheel_id) {
            wheel.drinks = drinks.to_vec();
        }
        Ok(())
    }

    async fn delete_wheel(&self, wheel_id: WheelId) -> Result<(), DbError> {
        self.wheels.lock().unwrap().remove(&wheel_id);
        Ok(())
    }
}

struct TestHarness {
    state: Arc<AppState>,
    store: Arc<MemoryWheelStore>,
    tokens: TokenSigner,
}

impl TestHarness {
    async fn with_wheels(wheels: Vec<Wheel>) -> Self {
        let store = Arc::new(MemoryWheelStore::new(wheels));
        let tokens = TokenSigner::new(*b"test-token-secret");
        let state = Arc::new(AppState::new(
            Arc::clone(&store) as Arc<dyn WheelStore>,
            tokens.clone(),
            INTERNAL_TOKEN,
            "misfortune_bot",
        ));
        state.load_sessions().await.unwrap();
        Self {
            state,
            store,
            tokens,
        }
    }

    fn router(&self) -> axum::Router {
        build_router(Arc::clone(&self.state))
    }

    async fn send(&self, method: Method, uri: &str, bearer: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty()).unwrap();

        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn spin_code(&self, wheel_id: WheelId) -> String {
        self.state
            .registry
            .get(wheel_id)
            .await
            .unwrap()
            .snapshot()
            .code
            .clone()
    }
}

fn stocked_wheel(owner: i64) -> Wheel {
    let mut wheel = Wheel::create(UserId(owner), "Stammtisch");
    wheel.drinks.push(Drink::create("Beer"));
    wheel.drinks.push(Drink::create("Wine"));
    wheel
}

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn liveness_probe_responds() {
    let harness = TestHarness::with_wheels(Vec::new()).await;
    let (status, body) = harness.send(Method::GET, "/probe/live", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

// ---------------------------------------------------------------------------
// Internal auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bot_endpoints_reject_bad_internal_token() {
    let harness = TestHarness::with_wheels(Vec::new()).await;

    let (status, _) = harness.send(Method::GET, "/user/1/wheel", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = harness
        .send(Method::GET, "/user/1/wheel", Some("wrong"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ---------------------------------------------------------------------------
// Wheel listing and creation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_wheels_shows_only_accessible_ones() {
    let mine = stocked_wheel(1);
    let other = stocked_wheel(2);
    let mine_id = mine.id;
    let harness = TestHarness::with_wheels(vec![mine, other]).await;

    let (status, body) = harness
        .send(Method::GET, "/user/1/wheel", Some(INTERNAL_TOKEN))
        .await;
    assert_eq!(status, StatusCode::OK);

    let wheels = body["wheels"].as_array().unwrap();
    assert_eq!(wheels.len(), 1);
    assert_eq!(wheels[0]["id"], mine_id.to_string());
    assert_eq!(wheels[0]["is_owned"], true);
}

#[tokio::test]
async fn create_wheel_persists_and_registers_session() {
    let harness = TestHarness::with_wheels(Vec::new()).await;

    let (status, body) = harness
        .send(
            Method::POST,
            "/user/1/wheel?name=Neues%20Rad",
            Some(INTERNAL_TOKEN),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "Neues Rad");
    assert_eq!(body["is_owned"], true);

    let wheel_id = WheelId::from(body["id"].as_str().unwrap().parse::<uuid::Uuid>().unwrap());
    assert!(harness.state.registry.get(wheel_id).await.is_some());
    assert_eq!(harness.store.fetch_wheels().await.unwrap().len(), 1);
}

#[tokio::test]
async fn create_wheel_enforces_quota() {
    let harness = TestHarness::with_wheels(Vec::new()).await;

    for n in 0..harness.state.max_user_wheels {
        let (status, _) = harness
            .send(
                Method::POST,
                &format!("/user/1/wheel?name=Wheel{n}"),
                Some(INTERNAL_TOKEN),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, _) = harness
        .send(
            Method::POST,
            "/user/1/wheel?name=OneTooMany",
            Some(INTERNAL_TOKEN),
        )
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

    // Another user is unaffected by the first user's quota.
    let (status, _) = harness
        .send(
            Method::POST,
            "/user/2/wheel?name=Fine",
            Some(INTERNAL_TOKEN),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

// ---------------------------------------------------------------------------
// Spin / unlock cycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn spin_unlock_cycle_over_http() {
    let wheel = stocked_wheel(1);
    let wheel_id = wheel.id;
    let harness = TestHarness::with_wheels(vec![wheel]).await;
    let code = harness.spin_code(wheel_id).await;

    // Wrong capability code: forbidden, state unchanged.
    let (status, _) = harness
        .send(
            Method::POST,
            &format!("/wheel/{wheel_id}/is_locked?speed=1.0"),
            Some("wrong-code"),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Correct code: spin succeeds and locks the wheel.
    let (status, _) = harness
        .send(
            Method::POST,
            &format!("/wheel/{wheel_id}/is_locked?speed=1.0"),
            Some(&code),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let snapshot = harness.state.registry.get(wheel_id).await.unwrap().snapshot();
    assert!(snapshot.is_locked);
    assert!(snapshot.current_drink < 2);

    // Spinning again before unlock is a conflict, not an auth failure.
    let (status, _) = harness
        .send(
            Method::POST,
            &format!("/wheel/{wheel_id}/is_locked?speed=1.0"),
            Some(&code),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Unlock with the signed wheel token regenerates the code.
    let token = harness.tokens.sign_default(wheel_id).unwrap();
    let (status, _) = harness
        .send(Method::DELETE, "/wheel/is_locked", Some(&token))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let snapshot = harness.state.registry.get(wheel_id).await.unwrap().snapshot();
    assert!(!snapshot.is_locked);
    assert_ne!(snapshot.code, code);
}

#[tokio::test]
async fn spin_against_unknown_wheel_is_forbidden() {
    let harness = TestHarness::with_wheels(Vec::new()).await;
    let (status, _) = harness
        .send(
            Method::POST,
            &format!("/wheel/{}/is_locked?speed=1.0", WheelId::new()),
            Some("any"),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unlock_with_garbage_token_is_forbidden() {
    let harness = TestHarness::with_wheels(Vec::new()).await;
    let (status, _) = harness
        .send(Method::DELETE, "/wheel/is_locked", Some("not-a-token"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ---------------------------------------------------------------------------
// Drinks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_drink_persists_then_commits() {
    let wheel = Wheel::create(UserId(1), "Empty");
    let wheel_id = wheel.id;
    let harness = TestHarness::with_wheels(vec![wheel]).await;

    let (status, _) = harness
        .send(
            Method::POST,
            &format!("/user/1/wheel/{wheel_id}/drink?name=%20Korn%20"),
            Some(INTERNAL_TOKEN),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let snapshot = harness.state.registry.get(wheel_id).await.unwrap().snapshot();
    assert_eq!(snapshot.drinks.len(), 1);
    // The name is trimmed before it lands on the wheel.
    assert_eq!(snapshot.drinks[0].name, "Korn");
    assert!(snapshot.drinks_refreshed_at.is_some());
    assert_eq!(harness.store.stored_drinks(wheel_id).len(), 1);

    // Duplicate names are ignored.
    let (status, _) = harness
        .send(
            Method::POST,
            &format!("/user/1/wheel/{wheel_id}/drink?name=Korn"),
            Some(INTERNAL_TOKEN),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let snapshot = harness.state.registry.get(wheel_id).await.unwrap().snapshot();
    assert_eq!(snapshot.drinks.len(), 1);
}

#[tokio::test]
async fn store_failure_leaves_memory_state_unchanged() {
    let wheel = Wheel::create(UserId(1), "Empty");
    let wheel_id = wheel.id;
    let harness = TestHarness::with_wheels(vec![wheel]).await;
    harness
        .store
        .fail_drink_updates
        .store(true, Ordering::SeqCst);

    let (status, _) = harness
        .send(
            Method::POST,
            &format!("/user/1/wheel/{wheel_id}/drink?name=Korn"),
            Some(INTERNAL_TOKEN),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    // The in-memory state never saw the failed write.
    let snapshot = harness.state.registry.get(wheel_id).await.unwrap().snapshot();
    assert!(snapshot.drinks.is_empty());
}

#[tokio::test]
async fn delete_drink_keeps_current_drink_in_bounds() {
    let wheel = stocked_wheel(1);
    let wheel_id = wheel.id;
    let last_drink = wheel.drinks[1].id;
    let harness = TestHarness::with_wheels(vec![wheel]).await;

    // Land the wheel on the last drink, then unlock so state settles.
    let session = harness.state.registry.get(wheel_id).await.unwrap();
    loop {
        let code = harness.spin_code(wheel_id).await;
        session.spin(&code, 1.0).await.unwrap();
        if session.snapshot().current_drink == 1 {
            break;
        }
        session.unlock().await.unwrap();
    }

    let (status, _) = harness
        .send(
            Method::DELETE,
            &format!("/user/1/wheel/{wheel_id}/drink/{last_drink}"),
            Some(INTERNAL_TOKEN),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let snapshot = session.snapshot();
    assert_eq!(snapshot.drinks.len(), 1);
    assert!(snapshot.current_drink < snapshot.drinks.len());
}

// ---------------------------------------------------------------------------
// Rename / delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rename_requires_ownership() {
    let wheel = stocked_wheel(1);
    let wheel_id = wheel.id;
    let harness = TestHarness::with_wheels(vec![wheel]).await;

    let (status, _) = harness
        .send(
            Method::PATCH,
            &format!("/user/2/wheel/{wheel_id}/name?name=Taken"),
            Some(INTERNAL_TOKEN),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = harness
        .send(
            Method::PATCH,
            &format!("/user/1/wheel/{wheel_id}/name?name=Renamed"),
            Some(INTERNAL_TOKEN),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Renamed");

    let snapshot = harness.state.registry.get(wheel_id).await.unwrap().snapshot();
    assert_eq!(snapshot.wheel_name, "Renamed");
}

#[tokio::test]
async fn delete_wheel_removes_and_closes_the_session() {
    let wheel = stocked_wheel(1);
    let wheel_id = wheel.id;
    let harness = TestHarness::with_wheels(vec![wheel]).await;
    let session = harness.state.registry.get(wheel_id).await.unwrap();
    let mut closed = session.closed();

    let (status, _) = harness
        .send(
            Method::DELETE,
            &format!("/user/1/wheel/{wheel_id}"),
            Some(INTERNAL_TOKEN),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert!(harness.state.registry.get(wheel_id).await.is_none());
    assert!(harness.store.fetch_wheels().await.unwrap().is_empty());
    closed.changed().await.unwrap();
    assert!(*closed.borrow());

    // The wheel is gone for the bot, too.
    let (status, _) = harness
        .send(
            Method::GET,
            &format!("/user/1/wheel/{wheel_id}"),
            Some(INTERNAL_TOKEN),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ---------------------------------------------------------------------------
// Pairing confirmation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn confirm_unknown_registration_is_not_found() {
    let wheel = stocked_wheel(1);
    let wheel_id = wheel.id;
    let harness = TestHarness::with_wheels(vec![wheel]).await;

    let (status, _) = harness
        .send(
            Method::POST,
            &format!(
                "/user/1/wheel/{wheel_id}/registration?registration_id={}",
                uuid::Uuid::new_v4()
            ),
            Some(INTERNAL_TOKEN),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn confirm_registration_binds_the_waiting_client() {
    let wheel = stocked_wheel(1);
    let wheel_id = wheel.id;
    let harness = TestHarness::with_wheels(vec![wheel]).await;

    let registration = harness.state.pairing.begin();
    let registration_id = registration.id();

    let (status, _) = harness
        .send(
            Method::POST,
            &format!(
                "/user/1/wheel/{wheel_id}/registration?registration_id={registration_id}"
            ),
            Some(INTERNAL_TOKEN),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let bound = registration
        .wait(std::time::Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(bound, wheel_id);
}

#[tokio::test]
async fn confirm_registration_checks_wheel_access() {
    let wheel = stocked_wheel(1);
    let wheel_id = wheel.id;
    let harness = TestHarness::with_wheels(vec![wheel]).await;
    let registration = harness.state.pairing.begin();

    // User 2 may not bind clients to user 1's wheel.
    let (status, _) = harness
        .send(
            Method::POST,
            &format!(
                "/user/2/wheel/{wheel_id}/registration?registration_id={}",
                registration.id()
            ),
            Some(INTERNAL_TOKEN),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
