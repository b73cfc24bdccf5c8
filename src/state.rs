use crate::config::{AppConfig, StoreBackend};
use crate::store::{MemoryStore, ParkingStore, PgStore};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ParkingStore>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = match config.store {
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL not set")?;
                let db = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;
                Arc::new(PgStore::new(db)) as Arc<dyn ParkingStore>
            }
            StoreBackend::Memory => {
                tracing::warn!("using in-memory store; data is lost on restart");
                Arc::new(MemoryStore::new()) as Arc<dyn ParkingStore>
            }
        };

        Ok(Self { store, config })
    }

    /// Memory-backed state with fixed test settings.
    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::config::{AdminConfig, JwtConfig};

        let config = Arc::new(AppConfig {
            store: StoreBackend::Memory,
            database_url: None,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            admin: AdminConfig {
                email: "root@lots.test".into(),
                username: "root".into(),
                password: "root-password".into(),
            },
        });
        Self {
            store: Arc::new(MemoryStore::new()),
            config,
        }
    }
}
