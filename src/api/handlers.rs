use crate::{
    api::models::*,
    auth::jwt::Claims,
    core::{
        errors::RoomtabError,
        lifecycle::RoundBalances,
        models::{
            expense::{Expense, ExpenseChanges},
            room::{Member, Room},
            round::Round,
            settlement::Settlement,
            user::User,
        },
        services::{NewExpense, RoomtabService},
    },
    infrastructure::storage::in_memory::InMemoryStorage,
};
use axum::{
    Extension, Json, Router,
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::IntoResponse,
    routing::{get, post, put},
};
use http::header;

use std::sync::Arc;

pub type AppState = Arc<RoomtabService<InMemoryStorage>>;

// Validates the bearer token and stores its claims for the handlers.
async fn auth_middleware(
    State(service): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| RoomtabError::InvalidToken("Missing Authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| RoomtabError::InvalidToken("Invalid Authorization header".to_string()))?;

    let claims = service.validate_token(token)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub fn api_routes(service: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/users/{user_id}", get(get_user))
        .route("/rooms", post(create_room))
        .route("/rooms/join", post(join_room))
        .route("/rooms/{room_id}", get(get_room))
        .route("/rooms/{room_id}/members", get(list_members))
        .route("/rooms/{room_id}/round", get(current_round))
        .route("/rooms/{room_id}/rounds", get(list_rounds))
        .route("/rooms/{room_id}/expenses", post(add_expense).get(list_expenses))
        .route("/expenses/{expense_id}", put(update_expense).delete(delete_expense))
        .route("/rooms/{room_id}/balances", get(get_balances))
        .route("/rounds/{round_id}/balances", get(get_round_balances))
        .route(
            "/rooms/{room_id}/settlements",
            post(generate_settlements).get(list_settlements),
        )
        .route("/rounds/{round_id}/settlements", get(list_round_settlements))
        .route("/settlements/{settlement_id}/status", post(advance_settlement))
        .route_layer(middleware::from_fn_with_state(service.clone(), auth_middleware));

    Router::new()
        .route("/login", post(login))
        .route("/users", post(register_user))
        .merge(protected_routes)
        .with_state(service)
}

#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    )
)]
pub(crate) async fn login(
    State(service): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let token = service.authenticate(&req.email, &req.password).await?;
    Ok(Json(LoginResponse { token }))
}

#[utoipa::path(
    post,
    path = "/api/users",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "User registered", body = User),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    )
)]
pub(crate) async fn register_user(
    State(service): State<AppState>,
    Json(req): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = service.register_user(req.name, req.email, req.password).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    params(("user_id" = String, Path, description = "ID of the user")),
    responses(
        (status = 200, description = "User retrieved", body = User),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn get_user(
    State(service): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let user = service
        .get_user(&user_id)
        .await?
        .ok_or_else(|| RoomtabError::UserNotFound(user_id))?;
    Ok(Json(user))
}

#[utoipa::path(
    post,
    path = "/api/rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 201, description = "Room created with an open round", body = Room),
        (status = 400, description = "Bad request", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn create_room(
    State(service): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<Room>), ApiError> {
    let room = service.create_room(req.name, &claims.sub).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

#[utoipa::path(
    post,
    path = "/api/rooms/join",
    request_body = JoinRoomRequest,
    responses(
        (status = 200, description = "Joined room", body = Member),
        (status = 404, description = "Join code not found", body = ErrorResponse),
        (status = 409, description = "Already a member", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn join_room(
    State(service): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<JoinRoomRequest>,
) -> Result<Json<Member>, ApiError> {
    let member = service.join_room(&req.join_code, &claims.sub).await?;
    Ok(Json(member))
}

#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}",
    params(("room_id" = String, Path, description = "ID of the room")),
    responses(
        (status = 200, description = "Room retrieved", body = Room),
        (status = 403, description = "Not a member", body = ErrorResponse),
        (status = 404, description = "Room not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn get_room(
    State(service): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(room_id): Path<String>,
) -> Result<Json<Room>, ApiError> {
    Ok(Json(service.get_room(&room_id, &claims.sub).await?))
}

#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}/members",
    params(("room_id" = String, Path, description = "ID of the room")),
    responses(
        (status = 200, description = "Members in join order", body = Vec<Member>),
        (status = 403, description = "Not a member", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn list_members(
    State(service): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<Member>>, ApiError> {
    Ok(Json(service.list_members(&room_id, &claims.sub).await?))
}

#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}/round",
    params(("room_id" = String, Path, description = "ID of the room")),
    responses(
        (status = 200, description = "Current open round", body = Round),
        (status = 403, description = "Not a member", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn current_round(
    State(service): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(room_id): Path<String>,
) -> Result<Json<Round>, ApiError> {
    Ok(Json(service.current_round(&room_id, &claims.sub).await?))
}

#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}/rounds",
    params(("room_id" = String, Path, description = "ID of the room")),
    responses(
        (status = 200, description = "Rounds, newest first", body = Vec<Round>),
        (status = 403, description = "Not a member", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn list_rounds(
    State(service): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<Round>>, ApiError> {
    Ok(Json(service.list_rounds(&room_id, &claims.sub).await?))
}

#[utoipa::path(
    post,
    path = "/api/rooms/{room_id}/expenses",
    request_body = NewExpense,
    params(("room_id" = String, Path, description = "ID of the room")),
    responses(
        (status = 201, description = "Expense posted to the open round", body = Expense),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 403, description = "Not a member", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn add_expense(
    State(service): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(room_id): Path<String>,
    Json(req): Json<NewExpense>,
) -> Result<(StatusCode, Json<Expense>), ApiError> {
    let expense = service.add_expense(&room_id, &claims.sub, req).await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}/expenses",
    params(("room_id" = String, Path, description = "ID of the room")),
    responses(
        (status = 200, description = "Expenses of the open round", body = Vec<Expense>),
        (status = 403, description = "Not a member", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn list_expenses(
    State(service): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<Expense>>, ApiError> {
    Ok(Json(service.list_expenses(&room_id, &claims.sub).await?))
}

#[utoipa::path(
    put,
    path = "/api/expenses/{expense_id}",
    request_body = ExpenseChanges,
    params(("expense_id" = String, Path, description = "ID of the expense")),
    responses(
        (status = 200, description = "Expense updated", body = Expense),
        (status = 403, description = "Not the creator", body = ErrorResponse),
        (status = 409, description = "Round already cleared", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn update_expense(
    State(service): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(expense_id): Path<String>,
    Json(req): Json<ExpenseChanges>,
) -> Result<Json<Expense>, ApiError> {
    Ok(Json(service.update_expense(&expense_id, &claims.sub, req).await?))
}

#[utoipa::path(
    delete,
    path = "/api/expenses/{expense_id}",
    params(("expense_id" = String, Path, description = "ID of the expense")),
    responses(
        (status = 204, description = "Expense deleted"),
        (status = 403, description = "Not the creator", body = ErrorResponse),
        (status = 409, description = "Round already cleared", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn delete_expense(
    State(service): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(expense_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    service.delete_expense(&expense_id, &claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}/balances",
    params(("room_id" = String, Path, description = "ID of the room")),
    responses(
        (status = 200, description = "Balances of the open round", body = RoundBalances),
        (status = 403, description = "Not a member", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn get_balances(
    State(service): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(room_id): Path<String>,
) -> Result<Json<RoundBalances>, ApiError> {
    let balances = service.balances(&room_id, &claims.sub).await?;
    Ok(Json(present_balances(balances)))
}

#[utoipa::path(
    get,
    path = "/api/rounds/{round_id}/balances",
    params(("round_id" = String, Path, description = "ID of the round")),
    responses(
        (status = 200, description = "Balances of the round", body = RoundBalances),
        (status = 404, description = "Round not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn get_round_balances(
    State(service): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(round_id): Path<String>,
) -> Result<Json<RoundBalances>, ApiError> {
    let balances = service.round_balances(&round_id, &claims.sub).await?;
    Ok(Json(present_balances(balances)))
}

#[utoipa::path(
    post,
    path = "/api/rooms/{room_id}/settlements",
    params(("room_id" = String, Path, description = "ID of the room")),
    responses(
        (status = 200, description = "Settlement batch replaced", body = Vec<Settlement>),
        (status = 403, description = "Not a room admin", body = ErrorResponse),
        (status = 409, description = "No open round", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn generate_settlements(
    State(service): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<Settlement>>, ApiError> {
    let settlements = service.generate_settlements(&room_id, &claims.sub).await?;
    Ok(Json(settlements.into_iter().map(present_settlement).collect()))
}

#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}/settlements",
    params(("room_id" = String, Path, description = "ID of the room")),
    responses(
        (status = 200, description = "Settlements of the open round", body = Vec<Settlement>),
        (status = 403, description = "Not a member", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn list_settlements(
    State(service): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<Settlement>>, ApiError> {
    let settlements = service.list_settlements(&room_id, &claims.sub).await?;
    Ok(Json(settlements.into_iter().map(present_settlement).collect()))
}

#[utoipa::path(
    get,
    path = "/api/rounds/{round_id}/settlements",
    params(("round_id" = String, Path, description = "ID of the round")),
    responses(
        (status = 200, description = "Settlements of the round", body = Vec<Settlement>),
        (status = 404, description = "Round not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn list_round_settlements(
    State(service): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(round_id): Path<String>,
) -> Result<Json<Vec<Settlement>>, ApiError> {
    let settlements = service.list_round_settlements(&round_id, &claims.sub).await?;
    Ok(Json(settlements.into_iter().map(present_settlement).collect()))
}

#[utoipa::path(
    post,
    path = "/api/settlements/{settlement_id}/status",
    request_body = AdvanceSettlementRequest,
    params(("settlement_id" = String, Path, description = "ID of the settlement")),
    responses(
        (status = 200, description = "Status advanced", body = AdvanceSettlementResponse),
        (status = 403, description = "Caller is not the right counterparty", body = ErrorResponse),
        (status = 404, description = "Settlement not found", body = ErrorResponse),
        (status = 409, description = "Illegal transition or round cleared", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn advance_settlement(
    State(service): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(settlement_id): Path<String>,
    Json(req): Json<AdvanceSettlementRequest>,
) -> Result<Json<AdvanceSettlementResponse>, ApiError> {
    let advance = service
        .advance_settlement_status(&settlement_id, &claims.sub, req.status)
        .await?;
    Ok(Json(advance.into()))
}
