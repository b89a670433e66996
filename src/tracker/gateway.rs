use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Path, Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::Router;
use chrono::Local;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};

use super::billing::Period;
use super::config::AppConfig;
use super::normalize::{normalize, sort_items, SortOrder};
use super::rates::RateCache;
use super::secrets::SecretStore;
use super::store::Store;
use super::subscription::SubscriptionInput;

#[derive(Clone)]
pub struct GatewayState {
    pub cfg: Arc<RwLock<AppConfig>>,
    pub store: Store,
    pub secrets: SecretStore,
    pub rates: RateCache,
}

pub fn build_router(state: GatewayState) -> Router {
    // Session check runs before any body or query extraction.
    let protected = Router::new()
        .route("/api/logout", post(logout))
        .route(
            "/api/subscription",
            get(list_subscriptions)
                .post(create_subscription)
                .delete(delete_subscription_by_body),
        )
        .route(
            "/api/subscription/:id",
            patch(update_subscription).delete(delete_subscription),
        )
        .route("/api/rates", get(get_rates))
        .route("/api/rates/refresh", post(refresh_rates))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/api/login", post(login))
        .merge(protected)
        .with_state(state)
}

pub async fn serve(state: GatewayState) -> anyhow::Result<()> {
    let cfg = state.cfg.read().clone();
    let addr: SocketAddr = format!("{}:{}", cfg.listen.host, cfg.listen.port).parse()?;

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("shutting down");
        })
        .await?;
    Ok(())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn bearer_token(auth: &str) -> Option<&str> {
    let s = auth.trim();
    let prefix = "Bearer ";
    if s.len() > prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        return Some(s[prefix.len()..].trim());
    }
    None
}

fn request_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
}

fn require_auth(st: &GatewayState, headers: &HeaderMap) -> Option<Response> {
    let Some(tok) = request_token(headers) else {
        return Some(error_response(
            StatusCode::UNAUTHORIZED,
            "missing or invalid Authorization",
        ));
    };
    if !st.secrets.is_session_valid(tok) {
        return Some(error_response(StatusCode::UNAUTHORIZED, "unauthorized"));
    }
    None
}

async fn require_session(State(st): State<GatewayState>, req: Request, next: Next) -> Response {
    if let Some(resp) = require_auth(&st, req.headers()) {
        return resp;
    }
    next.run(req).await
}

/// Unwraps an extracted JSON body, answering malformed input with the usual JSON error.
fn json_input<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    body.map(|Json(v)| v)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.body_text()))
}

fn store_failure(e: impl std::fmt::Display) -> Response {
    log::error!("store failure: {e}");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "database error")
}

async fn health() -> impl IntoResponse {
    Json(json!({"ok": true}))
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

async fn login(
    State(st): State<GatewayState>,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> Response {
    let body = match json_input(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let (username, ttl_hours) = {
        let cfg = st.cfg.read();
        (cfg.auth.username.clone(), cfg.auth.session_ttl_hours)
    };
    if body.username != username || !st.secrets.check_login_password(&body.password) {
        log::warn!("rejected login for {:?}", body.username);
        return error_response(StatusCode::UNAUTHORIZED, "invalid username or password");
    }
    match st
        .secrets
        .issue_session(ttl_hours.saturating_mul(60 * 60 * 1000))
    {
        Ok(token) => Json(json!({ "token": token })).into_response(),
        Err(e) => {
            log::error!("failed to persist session: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to create session")
        }
    }
}

async fn logout(State(st): State<GatewayState>, headers: HeaderMap) -> Response {
    let tok = request_token(&headers).unwrap_or_default();
    match st.secrets.revoke_session(tok) {
        Ok(success) => Json(json!({ "success": success })).into_response(),
        Err(e) => {
            log::error!("failed to revoke session: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to revoke session")
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    period: Option<String>,
    sort: Option<String>,
}

async fn list_subscriptions(
    State(st): State<GatewayState>,
    q: Result<Query<ListQuery>, QueryRejection>,
) -> Response {
    let q = match q {
        Ok(Query(q)) => q,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.body_text()),
    };
    let subs = match st.store.list_active() {
        Ok(v) => v,
        Err(e) => return store_failure(e),
    };
    let period = Period::from_query(q.period.as_deref());
    let sort = q.sort.as_deref().and_then(SortOrder::parse);
    let rates = st.rates.get().await;

    let mut summary = normalize(&subs, &rates.rates, period, Local::now().date_naive());
    if let Some(order) = sort {
        sort_items(&mut summary.items, order);
    }

    let rows: Vec<Value> = summary
        .items
        .iter()
        .map(|item| {
            let mut row = serde_json::to_value(item.subscription).unwrap_or(Value::Null);
            row["normalized"] = item.to_json();
            row
        })
        .collect();

    Json(json!({
        "period": period.as_str(),
        "sort": sort.map(|s| s.as_str()),
        "nextSort": sort.map(|s| s.next()).unwrap_or(SortOrder::AmountAsc).as_str(),
        "count": rows.len(),
        "totalSelf": summary.total_self,
        "totalAdvance": summary.total_advance,
        "rates": {
            "status": rates.status.as_str(),
            "fetchedAtUnixMs": rates.fetched_at_unix_ms,
        },
        "subscriptions": rows,
    }))
    .into_response()
}

async fn create_subscription(
    State(st): State<GatewayState>,
    body: Result<Json<SubscriptionInput>, JsonRejection>,
) -> Response {
    let input = match json_input(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let new = match input.into_new() {
        Ok(v) => v,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match st.store.insert(new) {
        Ok(sub) => {
            log::info!("subscription {} created", sub.id);
            Json(sub).into_response()
        }
        Err(e) => store_failure(e),
    }
}

async fn update_subscription(
    State(st): State<GatewayState>,
    Path(id): Path<String>,
    body: Result<Json<SubscriptionInput>, JsonRejection>,
) -> Response {
    let input = match json_input(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let patch = match input.into_patch() {
        Ok(v) => v,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    if patch.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "nothing to update");
    }
    match st.store.update(&id, &patch) {
        Ok(success) => Json(json!({ "success": success })).into_response(),
        Err(e) => store_failure(e),
    }
}

fn soft_delete_response(st: &GatewayState, id: &str) -> Response {
    match st.store.soft_delete(id) {
        Ok(success) => {
            if success {
                log::info!("subscription {id} deleted");
            }
            Json(json!({ "success": success })).into_response()
        }
        Err(e) => store_failure(e),
    }
}

async fn delete_subscription(State(st): State<GatewayState>, Path(id): Path<String>) -> Response {
    soft_delete_response(&st, &id)
}

#[derive(Debug, Deserialize)]
struct DeleteBody {
    id: String,
}

async fn delete_subscription_by_body(
    State(st): State<GatewayState>,
    body: Result<Json<DeleteBody>, JsonRejection>,
) -> Response {
    match json_input(body) {
        Ok(body) => soft_delete_response(&st, &body.id),
        Err(resp) => resp,
    }
}

async fn get_rates(State(st): State<GatewayState>) -> Response {
    Json(st.rates.get().await.to_json()).into_response()
}

async fn refresh_rates(State(st): State<GatewayState>) -> Response {
    Json(st.rates.refresh().await.to_json()).into_response()
}
