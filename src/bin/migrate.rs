use coffee_store_api::{
    config::AppConfig,
    db::{MIGRATIONS_DIR, create_pool, orm_from_pool, run_migrations},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::from_env()?;
    let dir = std::env::args().nth(1).unwrap_or_else(|| MIGRATIONS_DIR.to_string());
    let pool = create_pool(&config.database_url).await?;
    let applied = run_migrations(&orm_from_pool(&pool), &dir).await?;

    if applied.is_empty() {
        println!("Database is up to date");
    } else {
        for name in &applied {
            println!("Applied {name}");
        }
    }
    Ok(())
}
