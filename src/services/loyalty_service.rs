use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
    sea_query::{Expr, LockType},
};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;

use crate::{
    domain::loyalty::{LoyaltyKind, apply_delta},
    entity::{
        loyalty_transactions::{ActiveModel as LedgerActive, Column as LedgerCol, Entity as Ledger},
        users::{Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
};

/// Applies `delta` points to the user's balance and writes the matching ledger
/// row. The balance is clamped at zero, so the applied delta can be smaller
/// than requested; it is returned. Must run inside the caller's transaction.
pub async fn post<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    order_id: Option<Uuid>,
    kind: LoyaltyKind,
    delta: i64,
    note: Option<String>,
) -> AppResult<i64> {
    if delta == 0 {
        return Ok(0);
    }

    let user = Users::find_by_id(user_id)
        .lock(LockType::Update)
        .one(conn)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    let (applied, balance_after) = apply_delta(user.loyalty_points, delta);
    if applied == 0 {
        return Ok(0);
    }

    Users::update_many()
        .col_expr(UserCol::LoyaltyPoints, Expr::value(balance_after))
        .filter(UserCol::Id.eq(user_id))
        .exec(conn)
        .await?;

    LedgerActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        order_id: Set(order_id),
        kind: Set(kind.as_str().to_string()),
        points: Set(applied),
        balance_after: Set(balance_after),
        note: Set(note),
        created_at: NotSet,
    }
    .insert(conn)
    .await?;

    tracing::debug!(%user_id, kind = %kind, points = applied, balance_after, "loyalty posted");
    Ok(applied)
}

pub async fn history<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    limit: u64,
    offset: u64,
) -> AppResult<Vec<crate::models::LoyaltyEntry>> {
    let rows = Ledger::find()
        .filter(LedgerCol::UserId.eq(user_id))
        .order_by_desc(LedgerCol::CreatedAt)
        .limit(limit)
        .offset(offset)
        .all(conn)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}
