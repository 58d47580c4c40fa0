use crate::auth::jwt::TokenProvider;
use crate::config::{AppConfig, JwtConfig};
use crate::users::{memory::MemoryUserStore, repo, repo::UserStore};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
    pub tokens: TokenProvider,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = match &config.database_url {
            Some(url) => {
                let pg = repo::connect(url).await?;
                info!("using postgres user store");
                Arc::new(pg) as Arc<dyn UserStore>
            }
            None => {
                warn!("DATABASE_URL not set; users are kept in memory");
                Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>
            }
        };

        let tokens = TokenProvider::from_config(&config.jwt);
        Ok(Self::from_parts(store, config, tokens))
    }

    pub fn from_parts(store: Arc<dyn UserStore>, config: Arc<AppConfig>, tokens: TokenProvider) -> Self {
        Self {
            store,
            config,
            tokens,
        }
    }

    /// In-memory state with a fixed signing key.
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            database_url: None,
            jwt: JwtConfig {
                secret: Some("test-secret".into()),
                expiration_ms: None,
            },
            public_user_creation: true,
            seed_demo_data: false,
        });
        let tokens = TokenProvider::from_config(&config.jwt);
        let store = Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>;
        Self::from_parts(store, config, tokens)
    }
}
