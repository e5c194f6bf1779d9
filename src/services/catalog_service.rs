use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::ActiveValue::NotSet;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    audit,
    domain::{
        checkout::{ensure_variant_prices, unit_price},
        slug,
    },
    dto::products::{
        CreateProductRequest, CreateVariantRequest, ProductDetail, ProductList,
        UpdateProductRequest, UpdateVariantRequest,
    },
    entity::{
        categories::{Column as CategoryCol, Entity as Categories},
        product_variants::{
            ActiveModel as VariantActive, Column as VariantCol, Entity as ProductVariants,
        },
        products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Product, ProductVariant},
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

/// `ILIKE` pattern matching `search` literally anywhere in the column.
fn contains_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub async fn list_products(
    state: &AppState,
    viewer: Option<&AuthUser>,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    let show_inactive = query.include_inactive.unwrap_or(false)
        && viewer.is_some_and(AuthUser::is_admin);
    if !show_inactive {
        condition = condition.add(Column::IsActive.eq(true));
    }

    if let Some(search) = query.q.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = contains_pattern(search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(category) = query.category.as_ref().filter(|s| !s.is_empty()) {
        let ids = category_scope(&state.orm, category).await?;
        condition = condition.add(Column::CategoryId.is_in(ids));
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

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
    let data = ProductList { items };
    Ok(ApiResponse::success("Products", data, Some(meta)))
}

/// The category (by id or slug) plus its direct children.
async fn category_scope<C: ConnectionTrait>(conn: &C, key: &str) -> AppResult<Vec<Uuid>> {
    let filter = match Uuid::parse_str(key) {
        Ok(id) => CategoryCol::Id.eq(id),
        Err(_) => CategoryCol::Slug.eq(key.to_ascii_lowercase()),
    };
    let category = Categories::find()
        .filter(filter)
        .one(conn)
        .await?
        .ok_or(AppError::NotFound("Category"))?;

    let mut ids = vec![category.id];
    ids.extend(
        Categories::find()
            .filter(CategoryCol::ParentId.eq(category.id))
            .all(conn)
            .await?
            .into_iter()
            .map(|c| c.id),
    );
    Ok(ids)
}

async fn find_product<C: ConnectionTrait>(conn: &C, id_or_slug: &str) -> AppResult<ProductModel> {
    let filter = match Uuid::parse_str(id_or_slug) {
        Ok(id) => Column::Id.eq(id),
        Err(_) => Column::Slug.eq(id_or_slug.to_ascii_lowercase()),
    };
    Products::find()
        .filter(filter)
        .one(conn)
        .await?
        .ok_or(AppError::NotFound("Product"))
}

pub async fn get_product(
    state: &AppState,
    viewer: Option<&AuthUser>,
    id_or_slug: &str,
) -> AppResult<ApiResponse<ProductDetail>> {
    let is_admin = viewer.is_some_and(AuthUser::is_admin);
    let product = find_product(&state.orm, id_or_slug).await?;
    if !product.is_active && !is_admin {
        return Err(AppError::NotFound("Product"));
    }

    let category = match product.category_id {
        Some(id) => Categories::find_by_id(id).one(&state.orm).await?.map(Into::into),
        None => None,
    };

    let mut variants = ProductVariants::find()
        .filter(VariantCol::ProductId.eq(product.id))
        .order_by_asc(VariantCol::PriceAdjustment);
    if !is_admin {
        variants = variants.filter(VariantCol::IsActive.eq(true));
    }
    let variants = variants
        .all(&state.orm)
        .await?
        .into_iter()
        .map(ProductVariant::from)
        .collect();

    Ok(ApiResponse::success(
        "Product",
        ProductDetail {
            product: product.into(),
            category,
            variants,
        },
        None,
    ))
}

async fn unique_slug<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    exclude: Option<Uuid>,
) -> AppResult<String> {
    slug::first_free(name, |candidate| async move {
        let mut finder = Products::find().filter(Column::Slug.eq(candidate));
        if let Some(id) = exclude {
            finder = finder.filter(Column::Id.ne(id));
        }
        Ok::<_, AppError>(finder.count(conn).await? > 0)
    })
    .await
}

async fn ensure_category<C: ConnectionTrait>(conn: &C, id: Option<Uuid>) -> AppResult<()> {
    if let Some(id) = id {
        Categories::find_by_id(id)
            .one(conn)
            .await?
            .ok_or(AppError::NotFound("Category"))?;
    }
    Ok(())
}

fn validate_product_fields(name: &str, sku: &str, price: i64, stock: i32) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".into()));
    }
    if sku.trim().is_empty() {
        return Err(AppError::BadRequest("sku is required".into()));
    }
    if price <= 0 {
        return Err(AppError::BadRequest("price must be greater than 0".into()));
    }
    if stock < 0 {
        return Err(AppError::BadRequest("stock must not be negative".into()));
    }
    Ok(())
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    validate_product_fields(&payload.name, &payload.sku, payload.price, payload.stock)?;
    ensure_category(&state.orm, payload.category_id).await?;

    let sku = payload.sku.trim().to_string();
    let active = ActiveModel {
        id: Set(Uuid::new_v4()),
        category_id: Set(payload.category_id),
        name: Set(payload.name.trim().to_string()),
        slug: Set(unique_slug(&state.orm, &payload.name, None).await?),
        sku: Set(sku.clone()),
        description: Set(payload.description),
        price: Set(payload.price),
        stock: Set(payload.stock),
        image_url: Set(payload.image_url),
        is_active: Set(payload.is_active.unwrap_or(true)),
        created_at: NotSet,
        updated_at: NotSet,
    };
    let product = active
        .insert(&state.orm)
        .await
        .map_err(|e| AppError::on_unique_violation(e, format!("SKU {sku} already exists")))?;

    audit::record(
        state,
        Some(user.user_id),
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product created",
        product.into(),
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let existing = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Product"))?;

    validate_product_fields(
        payload.name.as_deref().unwrap_or(&existing.name),
        payload.sku.as_deref().unwrap_or(&existing.sku),
        payload.price.unwrap_or(existing.price),
        payload.stock.unwrap_or(existing.stock),
    )?;
    if payload.category_id.is_some() {
        ensure_category(&state.orm, payload.category_id).await?;
    }
    if let Some(price) = payload.price.filter(|p| *p != existing.price) {
        let adjustments: Vec<i64> = ProductVariants::find()
            .select_only()
            .column(VariantCol::PriceAdjustment)
            .filter(VariantCol::ProductId.eq(id))
            .into_tuple()
            .all(&state.orm)
            .await?;
        ensure_variant_prices(price, &adjustments)?;
    }

    let mut active: ActiveModel = existing.clone().into();
    if let Some(name) = payload.name.filter(|n| n.trim() != existing.name) {
        active.slug = Set(unique_slug(&state.orm, &name, Some(id)).await?);
        active.name = Set(name.trim().to_string());
    }
    if let Some(sku) = &payload.sku {
        active.sku = Set(sku.trim().to_string());
    }
    if payload.category_id.is_some() {
        active.category_id = Set(payload.category_id);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(stock) = payload.stock {
        active.stock = Set(stock);
    }
    if let Some(image_url) = payload.image_url {
        active.image_url = Set(Some(image_url));
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    active.updated_at = Set(Utc::now().into());

    let product = active.update(&state.orm).await.map_err(|e| {
        AppError::on_unique_violation(e, format!("SKU {} already exists", payload.sku.unwrap_or_default()))
    })?;

    audit::record(
        state,
        Some(user.user_id),
        "product_update",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        product.into(),
        Some(Meta::empty()),
    ))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Products::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Product"));
    }

    audit::record(
        state,
        Some(user.user_id),
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({ "id": id }),
        Some(Meta::empty()),
    ))
}

pub async fn add_variant(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: CreateVariantRequest,
) -> AppResult<ApiResponse<ProductVariant>> {
    ensure_admin(user)?;
    let product = Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Product"))?;

    if payload.name.trim().is_empty() || payload.sku.trim().is_empty() {
        return Err(AppError::BadRequest("name and sku are required".into()));
    }
    if payload.stock < 0 {
        return Err(AppError::BadRequest("stock must not be negative".into()));
    }
    unit_price(product.price, payload.price_adjustment)?;

    let sku = payload.sku.trim().to_string();
    let variant = VariantActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product.id),
        name: Set(payload.name.trim().to_string()),
        sku: Set(sku.clone()),
        price_adjustment: Set(payload.price_adjustment),
        stock: Set(payload.stock),
        is_active: Set(payload.is_active.unwrap_or(true)),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|e| AppError::on_unique_violation(e, format!("SKU {sku} already exists")))?;

    audit::record(
        state,
        Some(user.user_id),
        "variant_create",
        "product_variants",
        serde_json::json!({ "product_id": product.id, "variant_id": variant.id }),
    )
    .await;

    Ok(ApiResponse::success("Variant created", variant.into(), Some(Meta::empty())))
}

pub async fn update_variant(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    variant_id: Uuid,
    payload: UpdateVariantRequest,
) -> AppResult<ApiResponse<ProductVariant>> {
    ensure_admin(user)?;
    let product = Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Product"))?;
    let variant = ProductVariants::find_by_id(variant_id)
        .filter(VariantCol::ProductId.eq(product_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Product variant"))?;

    if let Some(adjustment) = payload.price_adjustment {
        unit_price(product.price, adjustment)?;
    }
    if payload.stock.is_some_and(|s| s < 0) {
        return Err(AppError::BadRequest("stock must not be negative".into()));
    }

    let mut active: VariantActive = variant.into();
    if let Some(name) = payload.name.filter(|n| !n.trim().is_empty()) {
        active.name = Set(name.trim().to_string());
    }
    if let Some(sku) = payload.sku.as_ref().filter(|s| !s.trim().is_empty()) {
        active.sku = Set(sku.trim().to_string());
    }
    if let Some(adjustment) = payload.price_adjustment {
        active.price_adjustment = Set(adjustment);
    }
    if let Some(stock) = payload.stock {
        active.stock = Set(stock);
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    let variant = active.update(&state.orm).await.map_err(|e| {
        AppError::on_unique_violation(e, format!("SKU {} already exists", payload.sku.unwrap_or_default()))
    })?;

    Ok(ApiResponse::success("Updated", variant.into(), Some(Meta::empty())))
}

pub async fn delete_variant(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    variant_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = ProductVariants::delete_many()
        .filter(VariantCol::Id.eq(variant_id))
        .filter(VariantCol::ProductId.eq(product_id))
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Product variant"));
    }

    audit::record(
        state,
        Some(user.user_id),
        "variant_delete",
        "product_variants",
        serde_json::json!({ "product_id": product_id, "variant_id": variant_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({ "id": variant_id }),
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::{contains_pattern, validate_product_fields};

    #[test]
    fn search_wildcards_match_literally() {
        assert_eq!(contains_pattern("robusta"), "%robusta%");
        assert_eq!(contains_pattern("_"), "%\\_%");
        assert_eq!(contains_pattern("100%"), "%100\\%%");
        assert_eq!(contains_pattern(r"a\b"), r"%a\\b%");
    }

    #[test]
    fn product_fields_are_checked() {
        assert!(validate_product_fields("Arabica Cau Dat", "AR-CD", 180_000, 0).is_ok());
        assert!(validate_product_fields(" ", "AR-CD", 180_000, 0).is_err());
        assert!(validate_product_fields("Arabica", "", 180_000, 0).is_err());
        assert!(validate_product_fields("Arabica", "AR", 0, 0).is_err());
        assert!(validate_product_fields("Arabica", "AR", 1, -1).is_err());
    }
}
