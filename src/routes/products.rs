use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
};
use uuid::Uuid;

use crate::{
    dto::products::{
        CreateProductRequest, CreateVariantRequest, ProductDetail, ProductList,
        UpdateProductRequest, UpdateVariantRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::{Product, ProductVariant},
    response::ApiResponse,
    routes::params::ProductQuery,
    services::catalog_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route(
            "/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/{id}/variants", axum::routing::post(add_variant))
        .route(
            "/{id}/variants/{variant_id}",
            put(update_variant).delete(delete_variant),
        )
}

#[utoipa::path(
    get,
    path = "/api/products",
    params(ProductQuery),
    responses(
        (status = 200, description = "List products", body = ApiResponse<ProductList>)
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    viewer: Option<AuthUser>,
    Query(query): Query<ProductQuery>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = catalog_service::list_products(&state, viewer.as_ref(), query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(("id" = String, Path, description = "Product ID or slug")),
    responses(
        (status = 200, description = "Product with variants", body = ApiResponse<ProductDetail>),
        (status = 404, description = "Not Found")
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    viewer: Option<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<ProductDetail>>> {
    let resp = catalog_service::get_product(&state, viewer.as_ref(), &id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Create product", body = ApiResponse<Product>),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "SKU already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateProductRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Product>>)> {
    let resp = catalog_service::create_product(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/products/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Update product", body = ApiResponse<Product>),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let resp = catalog_service::update_product(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = catalog_service::delete_product(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/products/{id}/variants",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = CreateVariantRequest,
    responses(
        (status = 201, description = "Add variant", body = ApiResponse<ProductVariant>),
        (status = 400, description = "Price would drop to zero or below"),
        (status = 409, description = "SKU already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn add_variant(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateVariantRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<ProductVariant>>)> {
    let resp = catalog_service::add_variant(&state, &user, id, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/products/{id}/variants/{variant_id}",
    params(
        ("id" = Uuid, Path, description = "Product ID"),
        ("variant_id" = Uuid, Path, description = "Variant ID")
    ),
    request_body = UpdateVariantRequest,
    responses(
        (status = 200, description = "Update variant", body = ApiResponse<ProductVariant>),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn update_variant(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, variant_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateVariantRequest>,
) -> AppResult<Json<ApiResponse<ProductVariant>>> {
    let resp = catalog_service::update_variant(&state, &user, id, variant_id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/products/{id}/variants/{variant_id}",
    params(
        ("id" = Uuid, Path, description = "Product ID"),
        ("variant_id" = Uuid, Path, description = "Variant ID")
    ),
    responses(
        (status = 200, description = "Deleted"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn delete_variant(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, variant_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = catalog_service::delete_variant(&state, &user, id, variant_id).await?;
    Ok(Json(resp))
}
