use coffee_store_api::{
    config::AppConfig,
    db::{MIGRATIONS_DIR, create_pool, orm_from_pool, run_migrations},
    domain::slug::slugify,
    services::auth_service::hash_password,
};
use sqlx::PgPool;
use uuid::Uuid;

struct SeedProduct {
    category: &'static str,
    name: &'static str,
    sku: &'static str,
    description: &'static str,
    price: i64,
    stock: i32,
    variants: &'static [(&'static str, &'static str, i64, i32)],
}

const PRODUCTS: &[SeedProduct] = &[
    SeedProduct {
        category: "arabica",
        name: "Arabica Cầu Đất",
        sku: "CF-AR-CD",
        description: "Rang vừa, hương trái cây và chocolate",
        price: 180_000,
        stock: 120,
        variants: &[
            ("250g", "CF-AR-CD-250", 0, 60),
            ("500g", "CF-AR-CD-500", 150_000, 40),
            ("1kg", "CF-AR-CD-1000", 320_000, 20),
        ],
    },
    SeedProduct {
        category: "robusta",
        name: "Robusta Đắk Lắk",
        sku: "CF-RB-DL",
        description: "Rang đậm, hậu vị đắng mạnh",
        price: 150_000,
        stock: 200,
        variants: &[
            ("250g", "CF-RB-DL-250", 0, 100),
            ("500g", "CF-RB-DL-500", 120_000, 80),
        ],
    },
    SeedProduct {
        category: "robusta",
        name: "Cà phê phin giấy",
        sku: "CF-RB-DRIP",
        description: "Hộp 10 túi phin giấy tiện lợi",
        price: 95_000,
        stock: 4,
        variants: &[],
    },
    SeedProduct {
        category: "tra-xanh",
        name: "Trà Thái Nguyên",
        sku: "TE-GR-TN",
        description: "Trà xanh tôm nõn",
        price: 220_000,
        stock: 80,
        variants: &[("100g", "TE-GR-TN-100", 0, 50), ("200g", "TE-GR-TN-200", 200_000, 30)],
    },
    SeedProduct {
        category: "tra-o-long",
        name: "Ô long Lâm Đồng",
        sku: "TE-OL-LD",
        description: "Ô long viên, hương hoa nhẹ",
        price: 260_000,
        stock: 60,
        variants: &[("100g", "TE-OL-LD-100", 0, 60)],
    },
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&orm_from_pool(&pool), MIGRATIONS_DIR).await?;

    let admin_id = ensure_user(&pool, "admin@coffee.local", "admin12345", "Quản trị viên", "admin").await?;
    let user_id =
        ensure_user(&pool, "customer@coffee.local", "customer123", "Nguyễn Văn A", "customer").await?;
    seed_categories(&pool).await?;
    seed_products(&pool).await?;
    seed_discounts(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &PgPool,
    email: &str,
    password: &str,
    full_name: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password)?;

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, full_name, role, email_verified)
        VALUES ($1, $2, $3, $4, $5, TRUE)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(full_name)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn upsert_category(
    pool: &PgPool,
    name: &str,
    description: &str,
    parent_id: Option<Uuid>,
) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO categories (id, name, slug, description, parent_id)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (slug) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(slugify(name))
    .bind(description)
    .bind(parent_id)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

async fn seed_categories(pool: &PgPool) -> anyhow::Result<()> {
    let coffee = upsert_category(pool, "Cà phê", "Cà phê hạt và cà phê xay", None).await?;
    upsert_category(pool, "Arabica", "Arabica Việt Nam", Some(coffee)).await?;
    upsert_category(pool, "Robusta", "Robusta Tây Nguyên", Some(coffee)).await?;

    let tea = upsert_category(pool, "Trà", "Trà lá và trà túi lọc", None).await?;
    upsert_category(pool, "Trà xanh", "Trà xanh Thái Nguyên", Some(tea)).await?;
    upsert_category(pool, "Trà ô long", "Ô long Lâm Đồng", Some(tea)).await?;

    println!("Seeded categories");
    Ok(())
}

async fn seed_products(pool: &PgPool) -> anyhow::Result<()> {
    for product in PRODUCTS {
        let category_id: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM categories WHERE slug = $1")
                .bind(product.category)
                .fetch_optional(pool)
                .await?;

        let (product_id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO products (id, category_id, name, slug, sku, description, price, stock)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (sku) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(category_id.map(|(id,)| id))
        .bind(product.name)
        .bind(slugify(product.name))
        .bind(product.sku)
        .bind(product.description)
        .bind(product.price)
        .bind(product.stock)
        .fetch_one(pool)
        .await?;

        for (name, sku, adjustment, stock) in product.variants {
            sqlx::query(
                r#"
                INSERT INTO product_variants (id, product_id, name, sku, price_adjustment, stock)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (sku) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(product_id)
            .bind(name)
            .bind(sku)
            .bind(adjustment)
            .bind(stock)
            .execute(pool)
            .await?;
        }
    }

    println!("Seeded products");
    Ok(())
}

async fn seed_discounts(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO discount_codes
            (id, code, description, discount_type, value, max_discount, min_order_amount, per_user_limit)
        VALUES
            ($1, 'WELCOME10', 'Giảm 10% cho đơn đầu tiên', 'PERCENTAGE', 10, 50000, 200000, 1),
            ($2, 'FREESHIP30K', 'Giảm 30.000đ', 'FIXED', 30000, NULL, 300000, NULL)
        ON CONFLICT (code) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(Uuid::new_v4())
    .execute(pool)
    .await?;

    println!("Seeded discount codes");
    Ok(())
}
