use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use caixa_core::{ErrorKind, LedgerError};

use crate::service::{AccountService, TransactionService, UserService};

pub struct AppState {
    pub users: UserService,
    pub accounts: AccountService,
    pub transactions: TransactionService,
    pub metrics: Option<PrometheusHandle>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(serve_metrics))
        .route("/v1/users", get(list_users).post(create_user))
        .route("/v1/users/search", get(search_users))
        .route("/v1/users/:id", put(update_user).delete(delete_user))
        .route(
            "/v1/users/:user_id/accounts",
            get(list_accounts).post(create_account),
        )
        .route(
            "/v1/users/:user_id/accounts/:account_id/transactions",
            get(list_transactions).post(create_transaction),
        )
        .with_state(state)
}

/// Domain error as an HTTP response: `{"errors":{"code":N,"message":"…"}}`.
pub struct ApiError(LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::Validation | ErrorKind::BusinessRule => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Storage => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status == StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(error = ?self.0, "Storage failure");
        }
        let body = json!({
            "errors": { "code": status.as_u16(), "message": self.0.to_string() }
        });
        (status, Json(body)).into_response()
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn serve_metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn list_users(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    Ok(Json(state.users.list()?).into_response())
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    term: String,
}

async fn search_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Response, ApiError> {
    Ok(Json(state.users.search(&query.term)?).into_response())
}

// Missing fields fall back to empty strings so the domain validators, not
// the JSON layer, produce the 422 and its message.
#[derive(Deserialize)]
struct CreateUserBody {
    #[serde(default)]
    name: String,
    #[serde(default)]
    cpf: String,
    #[serde(default)]
    birthdate: String,
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateUserBody>,
) -> Result<Response, ApiError> {
    let user = state.users.create(&body.name, &body.cpf, &body.birthdate)?;
    let payload = json!({ "message": "Usuário criado com sucesso!", "data": user });
    Ok((StatusCode::CREATED, Json(payload)).into_response())
}

#[derive(Deserialize)]
struct UpdateUserBody {
    name: Option<String>,
    cpf: Option<String>,
    birthdate: Option<String>,
}

async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateUserBody>,
) -> Result<Response, ApiError> {
    let user = state.users.update(
        id,
        body.name.as_deref(),
        body.cpf.as_deref(),
        body.birthdate.as_deref(),
    )?;
    let payload = json!({ "message": "Usuário atualizado com sucesso!", "data": user });
    Ok(Json(payload).into_response())
}

async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    state.users.delete(id)?;
    Ok(Json(json!({ "message": "Usuário deletado com sucesso!" })).into_response())
}

async fn list_accounts(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<Response, ApiError> {
    Ok(Json(state.accounts.list(user_id)?).into_response())
}

#[derive(Deserialize)]
struct CreateAccountBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    balance: Decimal,
}

async fn create_account(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Json(body): Json<CreateAccountBody>,
) -> Result<Response, ApiError> {
    let account = state.accounts.create(user_id, &body.kind, body.balance)?;
    let payload = json!({ "message": "Conta criada com sucesso!", "data": account });
    Ok((StatusCode::CREATED, Json(payload)).into_response())
}

async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Path((user_id, account_id)): Path<(i64, i64)>,
) -> Result<Response, ApiError> {
    Ok(Json(state.transactions.list(user_id, account_id)?).into_response())
}

#[derive(Deserialize)]
struct CreateTransactionBody {
    #[serde(default)]
    operation: String,
    #[serde(default)]
    amount: Decimal,
}

async fn create_transaction(
    State(state): State<Arc<AppState>>,
    Path((user_id, account_id)): Path<(i64, i64)>,
    Json(body): Json<CreateTransactionBody>,
) -> Result<Response, ApiError> {
    let transaction =
        state
            .transactions
            .create(user_id, account_id, &body.operation, body.amount)?;
    let payload = json!({ "message": "Transação realizada com sucesso!", "data": transaction });
    Ok((StatusCode::CREATED, Json(payload)).into_response())
}
