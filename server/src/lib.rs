use axum::{
    body::{to_bytes, Body},
    extract::{rejection::JsonRejection, DefaultBodyLimit, Query, Request, State},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cake_ledger::{ErrorKind, Ledger, Storage};
use cake_types::{
    api::{
        BalanceResponse, CreateUserRequest, DepositRequest, ErrorResponse, TransactionRequest,
        UserResponse,
    },
    Transaction,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error};

mod config;
pub use config::{Config, ConfigError, ValidatedConfig};

/// Failure rendered as `{"error": "..."}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<cake_ledger::Error> for ApiError {
    fn from(err: cake_ledger::Error) -> Self {
        let status = match err.kind() {
            ErrorKind::Validation => {
                debug!(error = %err, "request rejected");
                StatusCode::BAD_REQUEST
            }
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Transaction => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => {
                error!(error = %err, "Error when processing request");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.public_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse::new(self.message))).into_response()
    }
}

pub struct Api<S: Storage> {
    ledger: Arc<Ledger<S>>,
    max_body_bytes: usize,
}

impl<S: Storage + 'static> Api<S> {
    pub fn new(ledger: Arc<Ledger<S>>, max_body_bytes: usize) -> Self {
        Self {
            ledger,
            max_body_bytes,
        }
    }

    pub fn router(&self) -> Router {
        // Configure CORS
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);

        // Every ledger route requires a token
        let ledger = Router::new()
            .route("/user", post(create_user::<S>).get(get_user::<S>))
            .route("/user/deposit", post(create_deposit::<S>))
            .route("/transaction", post(create_transaction::<S>))
            .route_layer(middleware::from_fn_with_state(
                self.max_body_bytes,
                require_token,
            ))
            .with_state(self.ledger.clone());

        Router::new()
            .route("/ping", get(ping).post(ping).put(ping))
            .merge(ledger)
            .fallback(not_found)
            .layer(DefaultBodyLimit::max(self.max_body_bytes))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    #[serde(default)]
    token: String,
}

/// Reject requests that do not carry a non-empty `token`: in the query string
/// for GET, in the JSON body for POST and PUT. Other methods are not served.
async fn require_token(State(limit): State<usize>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    if method == Method::GET {
        let valid = Query::<TokenQuery>::try_from_uri(request.uri())
            .map(|Query(query)| !query.token.is_empty())
            .unwrap_or(false);
        if !valid {
            return ApiError::bad_request("Invalid token").into_response();
        }
        return next.run(request).await;
    }
    if method != Method::POST && method != Method::PUT {
        return ApiError::new(StatusCode::NOT_FOUND, "Not found").into_response();
    }

    // The body is buffered so the handler can read it again.
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "failed to read request body");
            return ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
                .into_response();
        }
    };
    let valid = serde_json::from_slice::<serde_json::Value>(&bytes)
        .ok()
        .and_then(|value| {
            value
                .get("token")
                .and_then(serde_json::Value::as_str)
                .map(|token| !token.is_empty())
        })
        .unwrap_or(false);
    if !valid {
        return ApiError::bad_request("Invalid token").into_response();
    }
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Run a ledger operation on the blocking pool; the ledger holds per-user
/// locks across durable writes.
async fn blocking<S, T, F>(ledger: Arc<Ledger<S>>, operation: F) -> Result<T, ApiError>
where
    S: Storage + 'static,
    T: Send + 'static,
    F: FnOnce(&Ledger<S>) -> cake_ledger::Result<T> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || operation(&ledger))
        .await
        .map_err(|e| {
            error!(error = %e, "ledger task failed");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        })?;
    result.map_err(ApiError::from)
}

fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(rejection) => {
            debug!(error = %rejection, "Bad request");
            Err(ApiError::bad_request("Invalid request"))
        }
    }
}

async fn create_user<S: Storage + 'static>(
    State(ledger): State<Arc<Ledger<S>>>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<Json<ErrorResponse>, ApiError> {
    let request = parse_body(payload)?;
    blocking(ledger, move |ledger| ledger.create_user(request.into())).await?;
    Ok(Json(ErrorResponse::default()))
}

#[derive(Deserialize)]
struct UserQuery {
    #[serde(default)]
    id: String,
}

async fn get_user<S: Storage + 'static>(
    State(ledger): State<Arc<Ledger<S>>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<UserResponse>, ApiError> {
    let Some(id) = query.id.parse::<u64>().ok().filter(|id| *id != 0) else {
        return Err(ApiError::bad_request("Invalid user id"));
    };
    let account = blocking(ledger, move |ledger| ledger.get_user(id)).await?;
    Ok(Json(account.into()))
}

async fn create_deposit<S: Storage + 'static>(
    State(ledger): State<Arc<Ledger<S>>>,
    payload: Result<Json<DepositRequest>, JsonRejection>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let request = parse_body(payload)?;
    let balance = blocking(ledger, move |ledger| ledger.create_deposit(request.into())).await?;
    Ok(Json(BalanceResponse::new(balance)))
}

async fn create_transaction<S: Storage + 'static>(
    State(ledger): State<Arc<Ledger<S>>>,
    payload: Result<Json<TransactionRequest>, JsonRejection>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let request = parse_body(payload)?;
    let transaction =
        Transaction::try_from(request).map_err(|e| ApiError::from(cake_ledger::Error::from(e)))?;
    let balance = blocking(ledger, move |ledger| ledger.create_transaction(transaction)).await?;
    Ok(Json(BalanceResponse::new(balance)))
}

async fn ping() -> StatusCode {
    StatusCode::OK
}

async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Not found")
}
