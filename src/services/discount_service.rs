use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
    sea_query::{Expr, LockType},
};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;

use crate::{
    audit,
    domain::discount::{DiscountRule, DiscountType, normalize_code},
    dto::discounts::{
        CreateDiscountRequest, DiscountList, DiscountQuote, UpdateDiscountRequest,
        ValidateDiscountRequest,
    },
    entity::{
        discount_codes::{
            ActiveModel as CodeActive, Column as CodeCol, Entity as DiscountCodes,
            Model as CodeModel,
        },
        discount_usages::{ActiveModel as UsageActive, Column as UsageCol, Entity as DiscountUsages},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::DiscountCode,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

fn rule_of(model: &CodeModel) -> AppResult<DiscountRule> {
    Ok(DiscountRule {
        discount_type: model.discount_type.parse::<DiscountType>()?,
        value: model.value,
        max_discount: model.max_discount,
        min_order_amount: model.min_order_amount,
        usage_limit: model.usage_limit,
        used_count: model.used_count,
        per_user_limit: model.per_user_limit,
        starts_at: model.starts_at.map(|dt| dt.with_timezone(&Utc)),
        expires_at: model.expires_at.map(|dt| dt.with_timezone(&Utc)),
        is_active: model.is_active,
    })
}

async fn usages_by<C: ConnectionTrait>(conn: &C, code_id: Uuid, user_id: Uuid) -> AppResult<i64> {
    let count = DiscountUsages::find()
        .filter(UsageCol::DiscountCodeId.eq(code_id))
        .filter(UsageCol::UserId.eq(user_id))
        .count(conn)
        .await?;
    Ok(count as i64)
}

/// Locks the code row and evaluates it for this user and subtotal.
pub async fn resolve_for_checkout<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    code: &str,
    subtotal: i64,
    now: DateTime<Utc>,
) -> AppResult<(CodeModel, i64)> {
    let model = DiscountCodes::find()
        .filter(CodeCol::Code.eq(normalize_code(code)))
        .lock(LockType::Update)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::InvalidDiscount("Discount code not found".into()))?;

    let usages = usages_by(conn, model.id, user_id).await?;
    let amount = rule_of(&model)?.evaluate(now, subtotal, usages)?;
    Ok((model, amount))
}

pub async fn record_usage<C: ConnectionTrait>(
    conn: &C,
    code_id: Uuid,
    user_id: Uuid,
    order_id: Uuid,
    amount: i64,
) -> AppResult<()> {
    UsageActive {
        id: Set(Uuid::new_v4()),
        discount_code_id: Set(code_id),
        user_id: Set(user_id),
        order_id: Set(order_id),
        amount: Set(amount),
        created_at: NotSet,
    }
    .insert(conn)
    .await?;

    DiscountCodes::update_many()
        .col_expr(CodeCol::UsedCount, Expr::col(CodeCol::UsedCount).add(1))
        .filter(CodeCol::Id.eq(code_id))
        .exec(conn)
        .await?;
    Ok(())
}

/// Gives the usage of a cancelled order back to the code.
pub async fn release_usage<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> AppResult<()> {
    let Some(usage) = DiscountUsages::find()
        .filter(UsageCol::OrderId.eq(order_id))
        .one(conn)
        .await?
    else {
        return Ok(());
    };

    DiscountUsages::delete_by_id(usage.id).exec(conn).await?;
    DiscountCodes::update_many()
        .col_expr(CodeCol::UsedCount, Expr::col(CodeCol::UsedCount).sub(1))
        .filter(CodeCol::Id.eq(usage.discount_code_id))
        .filter(CodeCol::UsedCount.gt(0))
        .exec(conn)
        .await?;
    Ok(())
}

pub async fn validate_code(
    state: &AppState,
    user: &AuthUser,
    payload: ValidateDiscountRequest,
) -> AppResult<ApiResponse<DiscountQuote>> {
    if payload.order_amount < 0 {
        return Err(AppError::BadRequest("order_amount must not be negative".into()));
    }
    let code = normalize_code(&payload.code);
    let model = DiscountCodes::find()
        .filter(CodeCol::Code.eq(code.clone()))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::InvalidDiscount("Discount code not found".into()))?;

    let usages = usages_by(&state.orm, model.id, user.user_id).await?;
    let discount_amount = rule_of(&model)?.evaluate(Utc::now(), payload.order_amount, usages)?;

    Ok(ApiResponse::success(
        "Discount code is valid",
        DiscountQuote {
            code,
            discount_amount,
            final_amount: payload.order_amount - discount_amount,
        },
        None,
    ))
}

pub async fn list_discounts(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<DiscountList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();
    let finder = DiscountCodes::find().order_by_desc(CodeCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(DiscountCode::from)
        .collect();

    Ok(ApiResponse::success(
        "Discount codes",
        DiscountList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn create_discount(
    state: &AppState,
    user: &AuthUser,
    payload: CreateDiscountRequest,
) -> AppResult<ApiResponse<DiscountCode>> {
    ensure_admin(user)?;
    let code = normalize_code(&payload.code);
    if code.is_empty() {
        return Err(AppError::BadRequest("code is required".into()));
    }

    let rule = DiscountRule {
        discount_type: payload.discount_type,
        value: payload.value,
        max_discount: payload.max_discount,
        min_order_amount: payload.min_order_amount.unwrap_or(0),
        usage_limit: payload.usage_limit,
        used_count: 0,
        per_user_limit: payload.per_user_limit,
        starts_at: payload.starts_at,
        expires_at: payload.expires_at,
        is_active: payload.is_active.unwrap_or(true),
    };
    rule.validate_definition()?;

    let model = CodeActive {
        id: Set(Uuid::new_v4()),
        code: Set(code.clone()),
        description: Set(payload.description),
        discount_type: Set(rule.discount_type.as_str().to_string()),
        value: Set(rule.value),
        max_discount: Set(rule.max_discount),
        min_order_amount: Set(rule.min_order_amount),
        usage_limit: Set(rule.usage_limit),
        used_count: Set(0),
        per_user_limit: Set(rule.per_user_limit),
        starts_at: Set(rule.starts_at.map(Into::into)),
        expires_at: Set(rule.expires_at.map(Into::into)),
        is_active: Set(rule.is_active),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|e| AppError::on_unique_violation(e, format!("Discount code {code} already exists")))?;

    audit::record(
        state,
        Some(user.user_id),
        "discount_create",
        "discount_codes",
        serde_json::json!({ "discount_id": model.id, "code": model.code }),
    )
    .await;

    Ok(ApiResponse::success(
        "Discount code created",
        model.into(),
        Some(Meta::empty()),
    ))
}

pub async fn update_discount(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateDiscountRequest,
) -> AppResult<ApiResponse<DiscountCode>> {
    ensure_admin(user)?;
    let existing = DiscountCodes::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Discount code"))?;

    let mut rule = rule_of(&existing)?;
    if let Some(value) = payload.value {
        rule.value = value;
    }
    if payload.max_discount.is_some() {
        rule.max_discount = payload.max_discount;
    }
    if let Some(min) = payload.min_order_amount {
        rule.min_order_amount = min;
    }
    if payload.usage_limit.is_some() {
        rule.usage_limit = payload.usage_limit;
    }
    if payload.per_user_limit.is_some() {
        rule.per_user_limit = payload.per_user_limit;
    }
    if payload.starts_at.is_some() {
        rule.starts_at = payload.starts_at;
    }
    if payload.expires_at.is_some() {
        rule.expires_at = payload.expires_at;
    }
    if let Some(active) = payload.is_active {
        rule.is_active = active;
    }
    rule.validate_definition()?;

    let mut active: CodeActive = existing.into();
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    active.value = Set(rule.value);
    active.max_discount = Set(rule.max_discount);
    active.min_order_amount = Set(rule.min_order_amount);
    active.usage_limit = Set(rule.usage_limit);
    active.per_user_limit = Set(rule.per_user_limit);
    active.starts_at = Set(rule.starts_at.map(Into::into));
    active.expires_at = Set(rule.expires_at.map(Into::into));
    active.is_active = Set(rule.is_active);
    let model = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "discount_update",
        "discount_codes",
        serde_json::json!({ "discount_id": model.id }),
    )
    .await;

    Ok(ApiResponse::success("Updated", model.into(), Some(Meta::empty())))
}

/// Codes that were already used are deactivated instead of removed.
pub async fn delete_discount(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let existing = DiscountCodes::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Discount code"))?;

    let used = DiscountUsages::find()
        .filter(UsageCol::DiscountCodeId.eq(id))
        .count(&state.orm)
        .await?;

    let deactivated = if used > 0 {
        let mut active: CodeActive = existing.into();
        active.is_active = Set(false);
        active.update(&state.orm).await?;
        true
    } else {
        DiscountCodes::delete_by_id(id).exec(&state.orm).await?;
        false
    };

    audit::record(
        state,
        Some(user.user_id),
        "discount_delete",
        "discount_codes",
        serde_json::json!({ "discount_id": id, "deactivated": deactivated }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({ "id": id, "deactivated": deactivated }),
        Some(Meta::empty()),
    ))
}
