use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::discounts::{
        CreateDiscountRequest, DiscountList, DiscountQuote, UpdateDiscountRequest,
        ValidateDiscountRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::DiscountCode,
    response::ApiResponse,
    routes::params::Pagination,
    services::discount_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/validate", post(validate_code))
        .route("/", get(list_discounts).post(create_discount))
        .route("/{id}", put(update_discount).delete(delete_discount))
}

#[utoipa::path(
    post,
    path = "/api/discounts/validate",
    request_body = ValidateDiscountRequest,
    responses(
        (status = 200, description = "Discount the code would give", body = ApiResponse<DiscountQuote>),
        (status = 400, description = "Code not usable")
    ),
    security(("bearer_auth" = [])),
    tag = "Discounts"
)]
pub async fn validate_code(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ValidateDiscountRequest>,
) -> AppResult<Json<ApiResponse<DiscountQuote>>> {
    Ok(Json(
        discount_service::validate_code(&state, &user, payload).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/discounts",
    params(Pagination),
    responses(
        (status = 200, description = "List discount codes", body = ApiResponse<DiscountList>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Discounts"
)]
pub async fn list_discounts(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<DiscountList>>> {
    Ok(Json(
        discount_service::list_discounts(&state, &user, pagination).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/discounts",
    request_body = CreateDiscountRequest,
    responses(
        (status = 201, description = "Create discount code", body = ApiResponse<DiscountCode>),
        (status = 409, description = "Code already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Discounts"
)]
pub async fn create_discount(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateDiscountRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<DiscountCode>>)> {
    let resp = discount_service::create_discount(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/discounts/{id}",
    params(("id" = Uuid, Path, description = "Discount code ID")),
    request_body = UpdateDiscountRequest,
    responses(
        (status = 200, description = "Update discount code", body = ApiResponse<DiscountCode>),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Discounts"
)]
pub async fn update_discount(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateDiscountRequest>,
) -> AppResult<Json<ApiResponse<DiscountCode>>> {
    Ok(Json(
        discount_service::update_discount(&state, &user, id, payload).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/discounts/{id}",
    params(("id" = Uuid, Path, description = "Discount code ID")),
    responses(
        (status = 200, description = "Deleted, or deactivated when already used"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Discounts"
)]
pub async fn delete_discount(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    Ok(Json(
        discount_service::delete_discount(&state, &user, id).await?,
    ))
}
