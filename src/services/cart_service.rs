use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit,
    db::DbPool,
    dto::cart::{AddToCartRequest, CartLine, CartView, UpdateCartItemRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Product, ProductVariant},
    response::{ApiResponse, Meta},
    state::AppState,
};

#[derive(FromRow)]
struct CartRow {
    cart_id: Uuid,
    quantity: i32,
    product_id: Uuid,
    category_id: Option<Uuid>,
    name: String,
    slug: String,
    sku: String,
    description: Option<String>,
    price: i64,
    stock: i32,
    image_url: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    variant_id: Option<Uuid>,
    variant_name: Option<String>,
    variant_sku: Option<String>,
    price_adjustment: Option<i64>,
    variant_stock: Option<i32>,
    variant_active: Option<bool>,
}

impl CartRow {
    fn into_line(self) -> CartLine {
        let unit_price = self.price + self.price_adjustment.unwrap_or(0);
        let variant = match (self.variant_id, self.variant_name, self.variant_sku) {
            (Some(id), Some(name), Some(sku)) => Some(ProductVariant {
                id,
                product_id: self.product_id,
                name,
                sku,
                price_adjustment: self.price_adjustment.unwrap_or(0),
                stock: self.variant_stock.unwrap_or(0),
                is_active: self.variant_active.unwrap_or(false),
            }),
            _ => None,
        };
        CartLine {
            id: self.cart_id,
            product: Product {
                id: self.product_id,
                category_id: self.category_id,
                name: self.name,
                slug: self.slug,
                sku: self.sku,
                description: self.description,
                price: self.price,
                stock: self.stock,
                image_url: self.image_url,
                is_active: self.is_active,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            variant,
            quantity: self.quantity,
            unit_price,
            line_total: unit_price * i64::from(self.quantity),
        }
    }
}

#[derive(FromRow)]
struct StockRow {
    is_active: bool,
    stock: i32,
    variant_product_id: Option<Uuid>,
    variant_stock: Option<i32>,
    variant_active: Option<bool>,
}

async fn load_cart(pool: &DbPool, user_id: Uuid) -> AppResult<CartView> {
    let rows = sqlx::query_as::<_, CartRow>(
        r#"
        SELECT ci.id AS cart_id, ci.quantity,
               p.id AS product_id, p.category_id, p.name, p.slug, p.sku, p.description,
               p.price, p.stock, p.image_url, p.is_active, p.created_at, p.updated_at,
               v.id AS variant_id, v.name AS variant_name, v.sku AS variant_sku,
               v.price_adjustment, v.stock AS variant_stock, v.is_active AS variant_active
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        LEFT JOIN product_variants v ON v.id = ci.variant_id
        WHERE ci.user_id = $1
        ORDER BY ci.created_at ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let items: Vec<CartLine> = rows.into_iter().map(CartRow::into_line).collect();
    Ok(CartView {
        item_count: items.iter().map(|l| i64::from(l.quantity)).sum(),
        subtotal: items.iter().map(|l| l.line_total).sum(),
        items,
    })
}

/// Stock a cart line may hold: the product's, further capped by the variant's.
async fn available_stock(
    pool: &DbPool,
    product_id: Uuid,
    variant_id: Option<Uuid>,
) -> AppResult<i32> {
    let row = sqlx::query_as::<_, StockRow>(
        r#"
        SELECT p.is_active, p.stock,
               v.product_id AS variant_product_id, v.stock AS variant_stock,
               v.is_active AS variant_active
        FROM products p
        LEFT JOIN product_variants v ON v.id = $2
        WHERE p.id = $1
        "#,
    )
    .bind(product_id)
    .bind(variant_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Product"))?;

    if !row.is_active {
        return Err(AppError::BadRequest("Product is not available".into()));
    }

    match variant_id {
        None => Ok(row.stock),
        Some(_) => {
            if row.variant_product_id != Some(product_id) {
                return Err(AppError::BadRequest(
                    "Variant does not belong to this product".into(),
                ));
            }
            if row.variant_active != Some(true) {
                return Err(AppError::BadRequest("Variant is not available".into()));
            }
            Ok(row.stock.min(row.variant_stock.unwrap_or(0)))
        }
    }
}

/// Quantity of a line after adding `added` to what it already holds.
fn merged_quantity(current: Option<i32>, added: i32, available: i32) -> AppResult<i32> {
    match current.unwrap_or(0).checked_add(added) {
        Some(quantity) if quantity <= available => Ok(quantity),
        _ => Err(AppError::InsufficientStock(format!(
            "requested quantity ({available} available)"
        ))),
    }
}

pub async fn list_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    let cart = load_cart(&state.pool, user.user_id).await?;
    let total = cart.items.len() as i64;
    Ok(ApiResponse::success("OK", cart, Some(Meta::new(1, total, total))))
}

/// Adds to the matching line if one exists, so the stored quantity is the sum.
pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartView>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let available = available_stock(&state.pool, payload.product_id, payload.variant_id).await?;

    let existing: Option<(Uuid, i32)> = sqlx::query_as(
        r#"
        SELECT id, quantity FROM cart_items
        WHERE user_id = $1 AND product_id = $2 AND variant_id IS NOT DISTINCT FROM $3
        "#,
    )
    .bind(user.user_id)
    .bind(payload.product_id)
    .bind(payload.variant_id)
    .fetch_optional(&state.pool)
    .await?;

    let quantity = merged_quantity(existing.map(|(_, q)| q), payload.quantity, available)?;

    match existing {
        Some((id, _)) => {
            sqlx::query(
                "UPDATE cart_items SET quantity = $3, updated_at = NOW() WHERE id = $1 AND user_id = $2",
            )
            .bind(id)
            .bind(user.user_id)
            .bind(quantity)
            .execute(&state.pool)
            .await?;
        }
        None => {
            sqlx::query(
                "INSERT INTO cart_items (id, user_id, product_id, variant_id, quantity) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(user.user_id)
            .bind(payload.product_id)
            .bind(payload.variant_id)
            .bind(quantity)
            .execute(&state.pool)
            .await?;
        }
    }

    audit::record(
        state,
        Some(user.user_id),
        "cart_update",
        "cart_items",
        serde_json::json!({
            "product_id": payload.product_id,
            "variant_id": payload.variant_id,
            "quantity": quantity,
        }),
    )
    .await;

    let cart = load_cart(&state.pool, user.user_id).await?;
    Ok(ApiResponse::success("Added to cart", cart, None))
}

/// Sets a line's quantity; zero removes the line.
pub async fn update_quantity(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartView>> {
    if payload.quantity < 0 {
        return Err(AppError::BadRequest("quantity must not be negative".into()));
    }
    if payload.quantity == 0 {
        return remove_item(state, user, item_id).await;
    }

    let (product_id, variant_id): (Uuid, Option<Uuid>) = sqlx::query_as(
        "SELECT product_id, variant_id FROM cart_items WHERE id = $1 AND user_id = $2",
    )
    .bind(item_id)
    .bind(user.user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("Cart item"))?;

    let available = available_stock(&state.pool, product_id, variant_id).await?;
    if payload.quantity > available {
        return Err(AppError::InsufficientStock(format!(
            "requested quantity ({available} available)"
        )));
    }

    sqlx::query(
        "UPDATE cart_items SET quantity = $3, updated_at = NOW() WHERE id = $1 AND user_id = $2",
    )
    .bind(item_id)
    .bind(user.user_id)
    .bind(payload.quantity)
    .execute(&state.pool)
    .await?;

    let cart = load_cart(&state.pool, user.user_id).await?;
    Ok(ApiResponse::success("Cart updated", cart, None))
}

pub async fn remove_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
) -> AppResult<ApiResponse<CartView>> {
    let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND user_id = $2")
        .bind(item_id)
        .bind(user.user_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Cart item"));
    }

    audit::record(
        state,
        Some(user.user_id),
        "cart_remove",
        "cart_items",
        serde_json::json!({ "cart_item_id": item_id }),
    )
    .await;

    let cart = load_cart(&state.pool, user.user_id).await?;
    Ok(ApiResponse::success(
        "Removed from cart",
        cart,
        Some(Meta::empty()),
    ))
}

pub async fn clear_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
        .bind(user.user_id)
        .execute(&state.pool)
        .await?;

    Ok(ApiResponse::success(
        "Cart cleared",
        CartView {
            items: Vec::new(),
            item_count: 0,
            subtotal: 0,
        },
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merging_adds_to_the_existing_line() {
        assert_eq!(merged_quantity(None, 2, 5).unwrap(), 2);
        assert_eq!(merged_quantity(Some(3), 2, 5).unwrap(), 5);
        assert!(matches!(
            merged_quantity(Some(3), 3, 5),
            Err(AppError::InsufficientStock(_))
        ));
    }

    #[test]
    fn huge_quantities_do_not_overflow() {
        assert!(matches!(
            merged_quantity(Some(1), i32::MAX, 10),
            Err(AppError::InsufficientStock(_))
        ));
        assert!(matches!(
            merged_quantity(Some(i32::MAX), i32::MAX, i32::MAX),
            Err(AppError::InsufficientStock(_))
        ));
    }
}
