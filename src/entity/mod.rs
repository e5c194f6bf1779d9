pub mod audit_logs;
pub mod cart_items;
pub mod categories;
pub mod discount_codes;
pub mod discount_usages;
pub mod loyalty_transactions;
pub mod order_items;
pub mod order_status_history;
pub mod orders;
pub mod product_variants;
pub mod products;
pub mod users;

pub use audit_logs::Entity as AuditLogs;
pub use cart_items::Entity as CartItems;
pub use categories::Entity as Categories;
pub use discount_codes::Entity as DiscountCodes;
pub use discount_usages::Entity as DiscountUsages;
pub use loyalty_transactions::Entity as LoyaltyTransactions;
pub use order_items::Entity as OrderItems;
pub use order_status_history::Entity as OrderStatusHistory;
pub use orders::Entity as Orders;
pub use product_variants::Entity as ProductVariants;
pub use products::Entity as Products;
pub use users::Entity as Users;
