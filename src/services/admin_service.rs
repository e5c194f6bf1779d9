use uuid::Uuid;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use sea_orm::sea_query::LockType;
use sea_orm::ActiveValue::Set;

use crate::{
    audit,
    domain::status::OrderStatus,
    dto::admin::{InventoryAdjustRequest, LowStockList, LowStockQuery, UpdateOrderStatusRequest},
    dto::orders::{OrderList, OrderWithItems},
    entity::{
        orders::Entity as Orders,
        product_variants::{ActiveModel as VariantActive, Entity as ProductVariants},
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Product, ProductVariant},
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    services::order_service,
    state::AppState,
};

const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    order_service::find_orders(state, Condition::all(), query).await
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Order"))?;

    let data = order_service::load_details(&state.orm, order).await?;
    Ok(ApiResponse::success(
        "Order found",
        data,
        Some(Meta::empty()),
    ))
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let next = payload.status.parse::<OrderStatus>()?;

    let txn = state.orm.begin().await?;
    let existing = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound("Order"))?;
    let from = existing.status.clone();

    let order = order_service::transition_order(
        &txn,
        existing,
        next,
        Some(user.user_id),
        payload.note.filter(|n| !n.trim().is_empty()),
    )
    .await?;
    let data = order_service::load_details(&txn, order).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "order_status_update",
        "orders",
        serde_json::json!({ "order_id": id, "from": from, "to": next.as_str() }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order updated",
        data,
        Some(Meta::empty()),
    ))
}

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<LowStockList>> {
    ensure_admin(user)?;
    let threshold = query.threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD);
    let (page, limit, offset) = query.pagination().normalize();

    let finder = Products::find()
        .filter(ProdCol::Stock.lte(threshold))
        .order_by_asc(ProdCol::Stock)
        .order_by_desc(ProdCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Low stock", LowStockList { items }, Some(meta)))
}

fn adjusted_stock(current: i32, delta: i32) -> AppResult<i32> {
    if delta == 0 {
        return Err(AppError::BadRequest("delta must not be 0".into()));
    }
    match current.checked_add(delta) {
        Some(next) if next >= 0 => Ok(next),
        _ => Err(AppError::BadRequest("stock cannot be negative".into())),
    }
}

pub async fn adjust_inventory(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound("Product"))?;

    let new_stock = adjusted_stock(product.stock, payload.delta)?;

    let mut active: ProductActive = product.into();
    active.stock = Set(new_stock);
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&txn).await?;

    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "inventory_adjust",
        "products",
        serde_json::json!({ "product_id": updated.id, "delta": payload.delta }),
    )
    .await;

    Ok(ApiResponse::success(
        "Inventory updated",
        updated.into(),
        Some(Meta::empty()),
    ))
}

pub async fn adjust_variant_inventory(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<ProductVariant>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let variant = ProductVariants::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound("Product variant"))?;

    let new_stock = adjusted_stock(variant.stock, payload.delta)?;

    let mut active: VariantActive = variant.into();
    active.stock = Set(new_stock);
    let updated = active.update(&txn).await?;

    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "inventory_adjust",
        "product_variants",
        serde_json::json!({ "variant_id": updated.id, "delta": payload.delta }),
    )
    .await;

    Ok(ApiResponse::success(
        "Inventory updated",
        updated.into(),
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::adjusted_stock;

    #[test]
    fn stock_adjustments_stay_non_negative() {
        assert_eq!(adjusted_stock(5, -5).unwrap(), 0);
        assert_eq!(adjusted_stock(5, 20).unwrap(), 25);
        assert!(adjusted_stock(5, -6).is_err());
        assert!(adjusted_stock(5, 0).is_err());
        assert!(adjusted_stock(i32::MAX, 1).is_err());
    }
}
