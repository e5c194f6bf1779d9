use std::{sync::Arc, time::Duration};

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn, orm_from_pool},
    vnpay::VnpayGateway,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    pub vnpay: Arc<VnpayGateway>,
    /// Outbound client for OAuth token checks.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(pool: DbPool, config: AppConfig) -> anyhow::Result<Self> {
        let vnpay = VnpayGateway::new(&config.vnpay, config.env);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            orm: orm_from_pool(&pool),
            pool,
            config: Arc::new(config),
            vnpay: Arc::new(vnpay),
            http,
        })
    }
}
