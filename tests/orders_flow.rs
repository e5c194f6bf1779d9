mod common;

use coffee_store_api::{
    domain::{discount::DiscountType, status::PaymentMethod},
    dto::{
        admin::{InventoryAdjustRequest, LowStockQuery, UpdateOrderStatusRequest},
        cart::AddToCartRequest,
        discounts::CreateDiscountRequest,
        orders::{CancelOrderRequest, CheckoutRequest},
        products::UpdateProductRequest,
    },
    error::AppError,
    middleware::auth::Role,
    services::{admin_service, cart_service, catalog_service, discount_service, order_service},
};
use common::{create_product, create_user, create_variant, points_of, stock_of};

// Integration flow: cart -> checkout with points -> cancel restores stock and
// points; second checkout with a code walks through fulfilment.
#[tokio::test]
async fn checkout_cancel_and_fulfilment_flow() -> anyhow::Result<()> {
    let Some(database_url) = common::database_url() else {
        return Ok(());
    };

    let state = common::db_state(&database_url).await?;
    let tag = common::run_tag();

    let customer = create_user(&state, Role::Customer, &tag, 50).await?;
    let admin = create_user(&state, Role::Admin, &tag, 0).await?;

    let product = create_product(&state, &admin, &tag, 100_000, 10).await?;
    let variant = create_variant(&state, &admin, &product, 20_000, 5).await?;

    let add = |quantity| AddToCartRequest {
        product_id: product.id,
        variant_id: Some(variant.id),
        quantity,
    };

    // More than the variant holds is refused up front.
    let err = cart_service::add_to_cart(&state, &customer, add(6))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock(_)));

    let cart = cart_service::add_to_cart(&state, &customer, add(2))
        .await?
        .data
        .expect("cart");
    assert_eq!(cart.item_count, 2);
    assert_eq!(cart.subtotal, 240_000);

    let placed = order_service::checkout(&state, &customer, checkout_request(None, Some(10)))
        .await?
        .data
        .expect("order");
    let order = &placed.order;
    assert_eq!(order.status, "PENDING");
    assert_eq!(order.subtotal, 240_000);
    assert_eq!(order.tax_amount, 19_200);
    assert_eq!(order.shipping_fee, 30_000);
    assert_eq!(order.points_redeemed, 10);
    assert_eq!(order.points_discount, 10_000);
    assert_eq!(
        order.total,
        order.subtotal + order.tax_amount + order.shipping_fee
            - order.discount_amount
            - order.points_discount
    );
    assert_eq!(placed.items.len(), 1);
    assert_eq!(placed.items[0].unit_price, 120_000);
    assert_eq!(placed.history.len(), 1);

    assert_eq!(stock_of(&state, "products", product.id).await?, 8);
    assert_eq!(stock_of(&state, "product_variants", variant.id).await?, 3);
    assert_eq!(
        points_of(&state, customer.user_id).await?,
        50 - 10 + order.points_earned
    );

    let cart = cart_service::list_cart(&state, &customer).await?.data.expect("cart");
    assert!(cart.items.is_empty());

    // Cancelling puts everything back.
    let cancelled = order_service::cancel_order(
        &state,
        &customer,
        order.id,
        CancelOrderRequest {
            reason: Some("changed my mind".into()),
        },
    )
    .await?
    .data
    .expect("cancelled");
    assert_eq!(cancelled.order.status, "CANCELLED");
    assert!(cancelled.order.cancelled_at.is_some());
    assert_eq!(stock_of(&state, "products", product.id).await?, 10);
    assert_eq!(stock_of(&state, "product_variants", variant.id).await?, 5);
    assert_eq!(points_of(&state, customer.user_id).await?, 50);

    let err = order_service::cancel_order(&state, &customer, order.id, Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));

    // Second order with a percentage code, fulfilled by the admin.
    let code = format!("FLOW{tag}");
    discount_service::create_discount(
        &state,
        &admin,
        CreateDiscountRequest {
            code: code.clone(),
            description: None,
            discount_type: DiscountType::Percentage,
            value: 10,
            max_discount: None,
            min_order_amount: None,
            usage_limit: Some(5),
            per_user_limit: Some(1),
            starts_at: None,
            expires_at: None,
            is_active: Some(true),
        },
    )
    .await?;

    cart_service::add_to_cart(&state, &customer, add(2)).await?;
    let placed = order_service::checkout(&state, &customer, checkout_request(Some(&code), None))
        .await?
        .data
        .expect("order");
    assert_eq!(placed.order.discount_amount, 24_000);

    // Per-user limit reached.
    cart_service::add_to_cart(&state, &customer, add(1)).await?;
    let err = order_service::checkout(&state, &customer, checkout_request(Some(&code), None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidDiscount(_)));
    assert_eq!(stock_of(&state, "product_variants", variant.id).await?, 3);
    cart_service::clear_cart(&state, &customer).await?;

    let mut current = placed.order;
    for status in ["CONFIRMED", "PROCESSING", "SHIPPED", "DELIVERED"] {
        current = admin_service::update_order_status(
            &state,
            &admin,
            current.id,
            UpdateOrderStatusRequest {
                status: status.into(),
                note: None,
            },
        )
        .await?
        .data
        .expect("order")
        .order;
        assert_eq!(current.status, status);
    }
    assert_eq!(current.payment_status, "PAID");
    assert_eq!(current.fulfillment_status, "FULFILLED");
    assert!(current.paid_at.is_some());

    let err = admin_service::update_order_status(
        &state,
        &admin,
        current.id,
        UpdateOrderStatusRequest {
            status: "PENDING".into(),
            note: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));

    let err = admin_service::list_low_stock(&state, &customer, LowStockQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let low = admin_service::list_low_stock(
        &state,
        &admin,
        LowStockQuery {
            threshold: Some(8),
            ..Default::default()
        },
    )
    .await?
    .data
    .expect("low stock");
    assert!(low.items.iter().all(|p| p.stock <= 8));

    Ok(())
}

fn checkout_request(code: Option<&str>, redeem_points: Option<i64>) -> CheckoutRequest {
    CheckoutRequest {
        recipient_name: "Nguyen Van A".into(),
        phone: "0901234567".into(),
        address_line: "12 Ly Tu Trong".into(),
        city: "Ho Chi Minh".into(),
        note: None,
        payment_method: PaymentMethod::Cod,
        discount_code: code.map(str::to_string),
        redeem_points,
    }
}

// Edge cases around prices and quantities: a base price may not undercut a
// variant, cart lines may not overflow, and a failed checkout changes nothing.
#[tokio::test]
async fn rejected_changes_leave_catalog_cart_and_points_intact() -> anyhow::Result<()> {
    let Some(database_url) = common::database_url() else {
        return Ok(());
    };

    let state = common::db_state(&database_url).await?;
    let tag = common::run_tag();
    let customer = create_user(&state, Role::Customer, &tag, 30).await?;
    let admin = create_user(&state, Role::Admin, &tag, 0).await?;

    let product = create_product(&state, &admin, &tag, 100_000, 1).await?;
    let variant = create_variant(&state, &admin, &product, -50_000, 1).await?;

    let reprice = |price| UpdateProductRequest {
        price: Some(price),
        ..Default::default()
    };
    let err = catalog_service::update_product(&state, &admin, product.id, reprice(40_000))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    let detail = catalog_service::get_product(&state, None, &product.id.to_string())
        .await?
        .data
        .expect("product");
    assert_eq!(detail.product.price, 100_000);

    let updated = catalog_service::update_product(&state, &admin, product.id, reprice(60_000))
        .await?
        .data
        .expect("product");
    assert_eq!(updated.price, 60_000);

    let line = |quantity| AddToCartRequest {
        product_id: product.id,
        variant_id: Some(variant.id),
        quantity,
    };
    cart_service::add_to_cart(&state, &customer, line(1)).await?;
    let err = cart_service::add_to_cart(&state, &customer, line(i32::MAX))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock(_)));

    // Stock sold elsewhere between carting and checkout.
    admin_service::adjust_inventory(&state, &admin, product.id, InventoryAdjustRequest { delta: -1 })
        .await?;
    let err = order_service::checkout(&state, &customer, checkout_request(None, Some(5)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock(_)));

    assert_eq!(points_of(&state, customer.user_id).await?, 30);
    assert_eq!(stock_of(&state, "product_variants", variant.id).await?, 1);
    let cart = cart_service::list_cart(&state, &customer).await?.data.expect("cart");
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 1);
    assert_eq!(cart.items[0].unit_price, 10_000);

    Ok(())
}
