pub mod admin_service;
pub mod auth_service;
pub mod cart_service;
pub mod catalog_service;
pub mod category_service;
pub mod discount_service;
pub mod image_service;
pub mod loyalty_service;
pub mod oauth;
pub mod order_service;
pub mod payment_service;
