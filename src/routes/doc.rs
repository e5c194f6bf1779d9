use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    domain::{
        discount::DiscountType,
        status::{FulfillmentStatus, OrderStatus, PaymentMethod, PaymentStatus},
    },
    dto::{
        admin::{InventoryAdjustRequest, LowStockList, UpdateOrderStatusRequest},
        auth::{
            ForgotPasswordRequest, LoginRequest, LoginResponse, LoyaltySummary, OAuthLoginRequest,
            RegisterRequest, ResetPasswordRequest, VerifyEmailRequest,
        },
        cart::{AddToCartRequest, CartLine, CartView, UpdateCartItemRequest},
        categories::{CategoryNode, CategoryTree, CreateCategoryRequest, UpdateCategoryRequest},
        discounts::{
            CreateDiscountRequest, DiscountList, DiscountQuote, UpdateDiscountRequest,
            ValidateDiscountRequest,
        },
        images::UploadedImage,
        orders::{CancelOrderRequest, CheckoutRequest, OrderList, OrderWithItems},
        payment::{CreatePaymentUrlRequest, PaymentReturnResult, PaymentUrlResponse},
        products::{
            CreateProductRequest, CreateVariantRequest, ProductDetail, ProductList,
            UpdateProductRequest, UpdateVariantRequest,
        },
    },
    models::{
        Category, DiscountCode, LoyaltyEntry, Order, OrderItem, OrderStatusChange, Product,
        ProductVariant, User,
    },
    response::{ApiResponse, Meta},
    routes::{
        admin, auth, cart, categories, discounts, health, images, orders, params, payment,
        products,
    },
    vnpay::IpnReply,
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::verify_email,
        auth::forgot_password,
        auth::reset_password,
        auth::oauth_login,
        auth::me,
        auth::loyalty_history,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        products::add_variant,
        products::update_variant,
        products::delete_variant,
        categories::list_categories,
        categories::get_category,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        cart::view_cart,
        cart::add_to_cart,
        cart::update_item,
        cart::remove_item,
        cart::clear_cart,
        orders::list_orders,
        orders::checkout,
        orders::get_order,
        orders::cancel_order,
        discounts::validate_code,
        discounts::list_discounts,
        discounts::create_discount,
        discounts::update_discount,
        discounts::delete_discount,
        payment::create_payment_url,
        payment::vnpay_return,
        payment::vnpay_ipn,
        images::upload_image,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::list_low_stock,
        admin::adjust_inventory,
        admin::adjust_variant_inventory
    ),
    components(
        schemas(
            User,
            Category,
            Product,
            ProductVariant,
            Order,
            OrderItem,
            OrderStatusChange,
            DiscountCode,
            LoyaltyEntry,
            OrderStatus,
            PaymentStatus,
            FulfillmentStatus,
            PaymentMethod,
            DiscountType,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            VerifyEmailRequest,
            ForgotPasswordRequest,
            ResetPasswordRequest,
            OAuthLoginRequest,
            LoyaltySummary,
            CreateProductRequest,
            UpdateProductRequest,
            CreateVariantRequest,
            UpdateVariantRequest,
            ProductList,
            ProductDetail,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CategoryNode,
            CategoryTree,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartLine,
            CartView,
            CheckoutRequest,
            CancelOrderRequest,
            OrderWithItems,
            OrderList,
            CreateDiscountRequest,
            UpdateDiscountRequest,
            ValidateDiscountRequest,
            DiscountQuote,
            DiscountList,
            CreatePaymentUrlRequest,
            PaymentUrlResponse,
            PaymentReturnResult,
            IpnReply,
            UploadedImage,
            UpdateOrderStatusRequest,
            InventoryAdjustRequest,
            LowStockList,
            params::Pagination,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<CartView>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration, login, OAuth and loyalty"),
        (name = "Products", description = "Catalog and variants"),
        (name = "Categories", description = "Category tree"),
        (name = "Cart", description = "Shopping cart"),
        (name = "Orders", description = "Checkout and order history"),
        (name = "Discounts", description = "Discount codes"),
        (name = "Payment", description = "VNPay payment flow"),
        (name = "Images", description = "Product image upload"),
        (name = "Admin", description = "Order management and inventory"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
