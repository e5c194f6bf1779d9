pub mod admin;
pub mod auth;
pub mod cart;
pub mod categories;
pub mod discounts;
pub mod images;
pub mod orders;
pub mod payment;
pub mod products;
