use std::collections::{HashMap, HashSet};

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    sea_query::{Expr, LockType},
};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;

use crate::{
    audit,
    domain::{
        checkout::{self, CandidateLine, ProductSnapshot, StockDemand, VariantSnapshot},
        loyalty::LoyaltyKind,
        status::{FulfillmentStatus, OrderStatus, PaymentMethod, PaymentStatus},
    },
    dto::orders::{CancelOrderRequest, CheckoutRequest, OrderList, OrderWithItems},
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        order_status_history::{
            ActiveModel as HistoryActive, Column as HistoryCol, Entity as OrderStatusHistory,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        product_variants::{Column as VariantCol, Entity as ProductVariants},
        products::{Column as ProdCol, Entity as Products},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{discount_service, loyalty_service},
    state::AppState,
};

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    find_orders(state, condition, query).await
}

/// Shared by the customer and admin listings; `base` scopes the rows.
pub async fn find_orders(
    state: &AppState,
    base: Condition,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = base;
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let status = status.parse::<OrderStatus>()?;
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Order"))?;

    let data = load_details(&state.orm, order).await?;
    Ok(ApiResponse::success("OK", data, Some(Meta::empty())))
}

pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    validate_shipping(&payload)?;
    let requested_points = payload.redeem_points.unwrap_or(0);
    if requested_points < 0 {
        return Err(AppError::BadRequest("redeem_points must not be negative".into()));
    }

    let now = Utc::now();
    let txn = state.orm.begin().await?;

    let customer = Users::find_by_id(user.user_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    let cart = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .order_by_asc(CartCol::CreatedAt)
        .lock(LockType::Update)
        .all(&txn)
        .await?;

    if cart.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let product_ids: HashSet<Uuid> = cart.iter().map(|c| c.product_id).collect();
    let variant_ids: HashSet<Uuid> = cart.iter().filter_map(|c| c.variant_id).collect();

    let products: HashMap<Uuid, ProductSnapshot> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .lock(LockType::Update)
        .all(&txn)
        .await?
        .into_iter()
        .map(|p| {
            (
                p.id,
                ProductSnapshot {
                    id: p.id,
                    name: p.name,
                    sku: p.sku,
                    base_price: p.price,
                    stock: p.stock,
                    is_active: p.is_active,
                },
            )
        })
        .collect();

    let variants: HashMap<Uuid, VariantSnapshot> = if variant_ids.is_empty() {
        HashMap::new()
    } else {
        ProductVariants::find()
            .filter(VariantCol::Id.is_in(variant_ids))
            .lock(LockType::Update)
            .all(&txn)
            .await?
            .into_iter()
            .map(|v| {
                (
                    v.id,
                    VariantSnapshot {
                        id: v.id,
                        product_id: v.product_id,
                        name: v.name,
                        sku: v.sku,
                        price_adjustment: v.price_adjustment,
                        stock: v.stock,
                        is_active: v.is_active,
                    },
                )
            })
            .collect()
    };

    let mut candidates = Vec::with_capacity(cart.len());
    for item in &cart {
        let product = products
            .get(&item.product_id)
            .cloned()
            .ok_or(AppError::NotFound("Product"))?;
        let variant = match item.variant_id {
            Some(id) => Some(
                variants
                    .get(&id)
                    .cloned()
                    .ok_or(AppError::NotFound("Product variant"))?,
            ),
            None => None,
        };
        candidates.push(CandidateLine {
            product,
            variant,
            quantity: item.quantity,
        });
    }

    let lines = checkout::price_lines(&candidates)?;
    let subtotal = checkout::subtotal(&lines);

    let discount = match payload
        .discount_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        Some(code) => Some(
            discount_service::resolve_for_checkout(&txn, user.user_id, code, subtotal, now)
                .await?,
        ),
        None => None,
    };
    let code_discount = discount.as_ref().map(|(_, amount)| *amount).unwrap_or(0);

    let totals = state.config.pricing.price_order(
        subtotal,
        code_discount,
        requested_points,
        customer.loyalty_points,
    );

    let order_id = Uuid::new_v4();
    let order = OrderActive {
        id: Set(order_id),
        order_number: Set(build_order_number(order_id, now)),
        user_id: Set(user.user_id),
        status: Set(OrderStatus::Pending.as_str().into()),
        payment_status: Set(PaymentStatus::Pending.as_str().into()),
        fulfillment_status: Set(FulfillmentStatus::Unfulfilled.as_str().into()),
        payment_method: Set(payload.payment_method.as_str().into()),
        subtotal: Set(totals.subtotal),
        tax_amount: Set(totals.tax_amount),
        shipping_fee: Set(totals.shipping_fee),
        discount_amount: Set(totals.discount_amount),
        points_discount: Set(totals.points_discount),
        total: Set(totals.total),
        points_redeemed: Set(totals.points_redeemed),
        points_earned: Set(totals.points_earned),
        discount_code_id: Set(discount.as_ref().map(|(code, _)| code.id)),
        recipient_name: Set(payload.recipient_name.trim().to_string()),
        phone: Set(payload.phone.trim().to_string()),
        address_line: Set(payload.address_line.trim().to_string()),
        city: Set(payload.city.trim().to_string()),
        note: Set(payload.note.filter(|n| !n.trim().is_empty())),
        payment_reference: Set(None),
        paid_at: Set(None),
        cancelled_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    for line in &lines {
        OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(Some(line.product_id)),
            variant_id: Set(line.variant_id),
            product_name: Set(line.product_name.clone()),
            variant_name: Set(line.variant_name.clone()),
            sku: Set(line.sku.clone()),
            unit_price: Set(line.unit_price),
            quantity: Set(line.quantity),
            line_total: Set(line.line_total),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
    }

    take_stock(&txn, &checkout::demand_of(&lines)).await?;

    if totals.points_redeemed > 0 {
        loyalty_service::post(
            &txn,
            user.user_id,
            Some(order.id),
            LoyaltyKind::Redeem,
            -totals.points_redeemed,
            Some(format!("Redeemed on {}", order.order_number)),
        )
        .await?;
    }
    if totals.points_earned > 0 {
        loyalty_service::post(
            &txn,
            user.user_id,
            Some(order.id),
            LoyaltyKind::Earn,
            totals.points_earned,
            Some(format!("Earned on {}", order.order_number)),
        )
        .await?;
    }

    record_history(
        &txn,
        order.id,
        None,
        OrderStatus::Pending,
        Some(user.user_id),
        Some("Order placed".into()),
    )
    .await?;

    if let Some((code, amount)) = &discount {
        discount_service::record_usage(&txn, code.id, user.user_id, order.id, *amount).await?;
    }

    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&txn)
        .await?;

    let data = load_details(&txn, order).await?;
    txn.commit().await?;

    tracing::info!(
        order_id = %data.order.id,
        order_number = %data.order.order_number,
        total = data.order.total,
        "order placed"
    );
    audit::record(
        state,
        Some(user.user_id),
        "checkout",
        "orders",
        serde_json::json!({ "order_id": data.order.id, "total": data.order.total }),
    )
    .await;

    Ok(ApiResponse::success(
        "Checkout success",
        data,
        Some(Meta::empty()),
    ))
}

pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: CancelOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound("Order"))?;

    let current = order.status.parse::<OrderStatus>()?;
    if !current.is_customer_cancellable() {
        return Err(AppError::InvalidTransition {
            from: current,
            to: OrderStatus::Cancelled,
        });
    }

    let note = payload
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "Cancelled by customer".into());
    let order = transition_order(&txn, order, OrderStatus::Cancelled, Some(user.user_id), Some(note))
        .await?;
    let data = load_details(&txn, order).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "order_cancel",
        "orders",
        serde_json::json!({ "order_id": data.order.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order cancelled",
        data,
        Some(Meta::empty()),
    ))
}

/// Moves a locked order to `next`, applying the side effects of the target
/// status and appending a history row.
pub async fn transition_order<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
    next: OrderStatus,
    actor: Option<Uuid>,
    note: Option<String>,
) -> AppResult<OrderModel> {
    let current = order.status.parse::<OrderStatus>()?;
    current.transition_to(next)?;

    let now = Utc::now();
    let payment_status = order.payment_status.parse::<PaymentStatus>()?;
    let mut active: OrderActive = order.clone().into();
    active.status = Set(next.as_str().into());
    active.updated_at = Set(now.into());

    match next {
        OrderStatus::Cancelled => {
            let items = OrderItems::find()
                .filter(OrderItemCol::OrderId.eq(order.id))
                .all(conn)
                .await?;
            let mut demand = StockDemand::default();
            for item in &items {
                demand.add(item.product_id, item.variant_id, item.quantity);
            }
            restore_stock(conn, &demand).await?;

            loyalty_service::post(
                conn,
                order.user_id,
                Some(order.id),
                LoyaltyKind::Refund,
                order.points_redeemed,
                Some(format!("Restored from {}", order.order_number)),
            )
            .await?;
            loyalty_service::post(
                conn,
                order.user_id,
                Some(order.id),
                LoyaltyKind::Revoke,
                -order.points_earned,
                Some(format!("Revoked from {}", order.order_number)),
            )
            .await?;

            discount_service::release_usage(conn, order.id).await?;

            active.cancelled_at = Set(Some(now.into()));
            if payment_status == PaymentStatus::Paid {
                active.payment_status = Set(PaymentStatus::Refunded.as_str().into());
            }
        }
        OrderStatus::Delivered => {
            active.fulfillment_status = Set(FulfillmentStatus::Fulfilled.as_str().into());
            let method = order.payment_method.parse::<PaymentMethod>()?;
            if method == PaymentMethod::Cod && payment_status != PaymentStatus::Paid {
                active.payment_status = Set(PaymentStatus::Paid.as_str().into());
                active.paid_at = Set(Some(now.into()));
            }
        }
        OrderStatus::Returned => {
            active.fulfillment_status = Set(FulfillmentStatus::Returned.as_str().into());
        }
        OrderStatus::Refunded => {
            active.payment_status = Set(PaymentStatus::Refunded.as_str().into());
        }
        _ => {}
    }

    let updated = active.update(conn).await?;
    record_history(conn, updated.id, Some(current), next, actor, note).await?;

    tracing::info!(
        order_id = %updated.id,
        from = %current,
        to = %next,
        "order status changed"
    );
    Ok(updated)
}

pub async fn record_history<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    from: Option<OrderStatus>,
    to: OrderStatus,
    changed_by: Option<Uuid>,
    note: Option<String>,
) -> AppResult<()> {
    HistoryActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        from_status: Set(from.map(|s| s.as_str().to_string())),
        to_status: Set(to.as_str().into()),
        note: Set(note),
        changed_by: Set(changed_by),
        created_at: NotSet,
    }
    .insert(conn)
    .await?;
    Ok(())
}

pub async fn load_details<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
) -> AppResult<OrderWithItems> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    let history = OrderStatusHistory::find()
        .filter(HistoryCol::OrderId.eq(order.id))
        .order_by_asc(HistoryCol::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(OrderWithItems {
        order: order.into(),
        items,
        history,
    })
}

/// Decrements stock, refusing to go below zero.
async fn take_stock<C: ConnectionTrait>(conn: &C, demand: &StockDemand) -> AppResult<()> {
    for (id, qty) in &demand.products {
        let result = Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(*qty))
            .col_expr(ProdCol::UpdatedAt, Expr::current_timestamp().into())
            .filter(ProdCol::Id.eq(*id))
            .filter(ProdCol::Stock.gte(*qty))
            .exec(conn)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::InsufficientStock(id.to_string()));
        }
    }
    for (id, qty) in &demand.variants {
        let result = ProductVariants::update_many()
            .col_expr(VariantCol::Stock, Expr::col(VariantCol::Stock).sub(*qty))
            .filter(VariantCol::Id.eq(*id))
            .filter(VariantCol::Stock.gte(*qty))
            .exec(conn)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::InsufficientStock(id.to_string()));
        }
    }
    Ok(())
}

/// Gives the quantities back. Products or variants deleted since the order
/// was placed are skipped.
async fn restore_stock<C: ConnectionTrait>(conn: &C, demand: &StockDemand) -> AppResult<()> {
    for (id, qty) in &demand.products {
        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(*qty))
            .col_expr(ProdCol::UpdatedAt, Expr::current_timestamp().into())
            .filter(ProdCol::Id.eq(*id))
            .exec(conn)
            .await?;
    }
    for (id, qty) in &demand.variants {
        ProductVariants::update_many()
            .col_expr(VariantCol::Stock, Expr::col(VariantCol::Stock).add(*qty))
            .filter(VariantCol::Id.eq(*id))
            .exec(conn)
            .await?;
    }
    Ok(())
}

fn validate_shipping(payload: &CheckoutRequest) -> AppResult<()> {
    let required = [
        ("recipient_name", &payload.recipient_name),
        ("phone", &payload.phone),
        ("address_line", &payload.address_line),
        ("city", &payload.city),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(AppError::BadRequest(format!("{field} is required")));
        }
    }
    let digits = payload.phone.chars().filter(char::is_ascii_digit).count();
    if !(9..=15).contains(&digits) {
        return Err(AppError::BadRequest("phone is invalid".into()));
    }
    Ok(())
}

/// `ORD-YYYYMMDD-XXXXXXXX`, the suffix taken from the order id.
pub fn build_order_number(order_id: Uuid, at: chrono::DateTime<Utc>) -> String {
    let suffix = order_id.simple().to_string().to_uppercase();
    format!("ORD-{}-{}", at.format("%Y%m%d"), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn request(phone: &str, city: &str) -> CheckoutRequest {
        CheckoutRequest {
            recipient_name: "Nguyen Van A".into(),
            phone: phone.into(),
            address_line: "12 Ly Thuong Kiet".into(),
            city: city.into(),
            note: None,
            payment_method: PaymentMethod::Cod,
            discount_code: None,
            redeem_points: None,
        }
    }

    #[test]
    fn order_number_has_date_and_short_id() {
        let id = Uuid::parse_str("1a2b3c4d-0000-4000-8000-000000000000").unwrap();
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        assert_eq!(build_order_number(id, at), "ORD-20261019-1A2B3C4D");
    }

    #[test]
    fn shipping_fields_are_required() {
        assert!(validate_shipping(&request("0901234567", "Ha Noi")).is_ok());
        assert!(validate_shipping(&request("0901234567", "  ")).is_err());
        assert!(validate_shipping(&request("12", "Ha Noi")).is_err());
    }
}
