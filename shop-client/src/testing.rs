//! Mock of the remote shop API, for tests

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{Notify, broadcast};
use warp::Filter;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus, with_status};

use crate::config;
use crate::model::session::SessionEvent;
use crate::model::totals::Totals;

pub const EMAIL: &str = "ana@example.com";
pub const PASSWORD: &str = "correct horse battery staple";
pub const TOKEN: &str = "9944b09199c62bcf9418ad846dd0e4bbdfc6ee4b";
pub const USER_ID: i64 = 3;
pub const USERNAME: &str = "ana";
/// Username the mock reports as already registered
pub const TAKEN_USERNAME: &str = "taken";
pub const AVATARS: &str = "https://api.dicebear.com/9.x/shapes/svg";

/// Totals reported by the mock
pub const TOTALS: Totals = Totals {
    income: 1500.0,
    expense: 320.5,
    balance: 1179.5,
};

/// Mock behaviour switches and call counters
#[derive(Debug, Default)]
pub struct MockState {
    /// Rejects every bearer token
    pub expired: AtomicBool,
    /// Fails every request with 500
    pub broken: AtomicBool,
    pub login_calls: AtomicUsize,
    pub totals_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
    /// Bumped on every token rotation, tokens issued before are rejected
    pub generation: AtomicUsize,
    /// Holds the next totals request until released
    pub hold_totals: AtomicBool,
    pub totals_held: Notify,
    pub totals_released: Notify,
}

impl MockState {
    /// Token issued by the login endpoint at the moment
    pub fn current_token(&self) -> String {
        match self.generation.load(Ordering::SeqCst) {
            0 => TOKEN.to_owned(),
            generation => format!("{TOKEN}-{generation}"),
        }
    }
}

/// Mock API listening on an ephemeral local port
pub struct MockApi {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockApi {
    /// Starts the mock on the current tokio runtime
    pub fn start() -> Self {
        let state = Arc::new(MockState::default());
        let (addr, server) = warp::serve(routes(state.clone())).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// API configuration pointing to this mock
    pub fn config(&self) -> config::Api {
        config::Api::with_base_url(self.url())
    }

    pub fn expire_tokens(&self) {
        self.state.expired.store(true, Ordering::SeqCst);
    }

    pub fn break_server(&self) {
        self.state.broken.store(true, Ordering::SeqCst);
    }

    /// Issues a new token on the next login, invalidating all tokens issued so far
    pub fn rotate_tokens(&self) {
        self.state.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn current_token(&self) -> String {
        self.state.current_token()
    }

    /// Makes the next totals request wait for `release_totals`
    ///
    /// The response is decided when the request arrives, before it is held.
    pub fn hold_totals(&self) {
        self.state.hold_totals.store(true, Ordering::SeqCst);
    }

    /// Waits until the held totals request arrives
    pub async fn totals_held(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.state.totals_held.notified())
            .await
            .expect("No totals request in time");
    }

    pub fn release_totals(&self) {
        self.state.totals_released.notify_one();
    }

    pub fn login_calls(&self) -> usize {
        self.state.login_calls.load(Ordering::SeqCst)
    }

    pub fn totals_calls(&self) -> usize {
        self.state.totals_calls.load(Ordering::SeqCst)
    }

    pub fn register_calls(&self) -> usize {
        self.state.register_calls.load(Ordering::SeqCst)
    }
}

/// Waits for the next session event, failing the test if none comes in time
pub async fn next_event(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("No session event in time")
        .expect("Session events closed")
}

type Reply = WithStatus<Json>;

fn reply(status: StatusCode, body: Value) -> Reply {
    with_status(warp::reply::json(&body), status)
}

fn server_error() -> Reply {
    reply(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "detail": "Internal server error" }),
    )
}

fn profile_body() -> Value {
    json!({
        "id": USER_ID,
        "username": USERNAME,
        "email": EMAIL,
        "first_name": "Ana",
        "last_name": "",
        "is_active": true,
        "is_staff": false,
        "is_superuser": false,
        "date_joined": "2025-01-02T10:00:00Z",
        "groups": [],
        "user_permissions": [],
    })
}

fn authorized(state: &MockState, authorization: Option<String>) -> bool {
    let expected = format!("Bearer {}", state.current_token());
    !state.expired.load(Ordering::SeqCst) && authorization.as_deref() == Some(expected.as_str())
}

fn login(body: Value, state: Arc<MockState>) -> Reply {
    state.login_calls.fetch_add(1, Ordering::SeqCst);
    if state.broken.load(Ordering::SeqCst) {
        return server_error();
    }

    if body["email"] == EMAIL && body["password"] == PASSWORD {
        reply(
            StatusCode::OK,
            json!({ "user": profile_body(), "token": state.current_token() }),
        )
    } else {
        reply(
            StatusCode::BAD_REQUEST,
            json!({ "non_field_errors": ["Unable to log in with provided credentials."] }),
        )
    }
}

fn profile(authorization: Option<String>, state: Arc<MockState>) -> Reply {
    if state.broken.load(Ordering::SeqCst) {
        return server_error();
    }

    if !authorized(&state, authorization) {
        return reply(
            StatusCode::UNAUTHORIZED,
            json!({ "detail": "Invalid token." }),
        );
    }

    reply(StatusCode::OK, profile_body())
}

async fn totals(authorization: Option<String>, state: Arc<MockState>) -> Reply {
    state.totals_calls.fetch_add(1, Ordering::SeqCst);
    let response = totals_response(authorization, &state);

    if state.hold_totals.swap(false, Ordering::SeqCst) {
        state.totals_held.notify_one();
        state.totals_released.notified().await;
    }

    response
}

fn totals_response(authorization: Option<String>, state: &MockState) -> Reply {
    if state.broken.load(Ordering::SeqCst) {
        return server_error();
    }

    if !authorized(state, authorization) {
        return reply(
            StatusCode::UNAUTHORIZED,
            json!({ "detail": "Invalid token." }),
        );
    }

    // Decimal fields are serialized as strings
    reply(
        StatusCode::OK,
        json!({
            "total_ingresos": "1500.00",
            "total_gastos": 320.5,
            "saldo_total": "1179.50",
        }),
    )
}

fn register(body: Value, state: Arc<MockState>) -> Reply {
    state.register_calls.fetch_add(1, Ordering::SeqCst);
    if state.broken.load(Ordering::SeqCst) {
        return server_error();
    }

    if body["username"] == TAKEN_USERNAME {
        return reply(
            StatusCode::BAD_REQUEST,
            json!({ "errors": { "username": ["A user with that username already exists."] } }),
        );
    }

    if body["password1"] != body["password2"] {
        return reply(
            StatusCode::BAD_REQUEST,
            json!({ "errors": { "password2": ["The two password fields didn't match."] } }),
        );
    }

    reply(
        StatusCode::CREATED,
        json!({
            "user": { "id": 4, "username": body["username"], "email": body["email"] },
            "token": "0f1e2d3c4b5a",
        }),
    )
}

fn routes(
    state: Arc<MockState>,
) -> impl Filter<Extract = (Reply,), Error = warp::Rejection> + Clone + Send + Sync + 'static {
    let with_state = warp::any().map(move || state.clone());
    let authorization = warp::header::optional::<String>("authorization");

    let login = warp::post()
        .and(warp::path("login"))
        .and(warp::body::json())
        .and(with_state.clone())
        .map(login);

    let profile = warp::get()
        .and(warp::path("profile"))
        .and(authorization.clone())
        .and(with_state.clone())
        .map(profile);

    let totals = warp::get()
        .and(warp::path("totales_usuario"))
        .and(authorization)
        .and(with_state.clone())
        .then(totals);

    let register = warp::post()
        .and(warp::path("register"))
        .and(warp::body::json())
        .and(with_state)
        .map(register);

    login
        .or(profile)
        .unify()
        .or(totals)
        .unify()
        .or(register)
        .unify()
}
