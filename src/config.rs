// src/config.rs

use std::{env, str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::{
    common::i18n::I18nStore,
    db::{MemoryStockStore, PgStockStore, StockStore},
    services::{
        auth::JwtService, medicines_cache_service::MedicinesCacheService,
        stock_adjustment_service::StockAdjustmentService, stock_taking_service::StockTakingService,
    },
};

/// Configuração lida do ambiente (e do `.env`, se existir).
#[derive(Debug, Clone)]
pub struct Settings {
    // Sem DATABASE_URL o serviço roda com o store em memória
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub token_ttl_minutes: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            jwt_secret: String::new(),
            bind_addr: "0.0.0.0:3000".to_string(),
            db_max_connections: 5,
            db_acquire_timeout_secs: 3,
            token_ttl_minutes: 60,
        }
    }
}

// Tokens de operador valem no máximo 30 dias
pub const MAX_TOKEN_TTL_MINUTES: i64 = 60 * 24 * 30;

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Settings::default();

        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET deve ser definido")?;
        if jwt_secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET não pode ser vazio");
        }

        let settings = Self {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
            jwt_secret,
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            db_acquire_timeout_secs: parse_var("DB_ACQUIRE_TIMEOUT_SECS", defaults.db_acquire_timeout_secs)?,
            token_ttl_minutes: parse_var("TOKEN_TTL_MINUTES", defaults.token_ttl_minutes)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Confere limites que o tipo sozinho não garante.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=MAX_TOKEN_TTL_MINUTES).contains(&self.token_ttl_minutes) {
            anyhow::bail!(
                "TOKEN_TTL_MINUTES deve estar entre 1 e {MAX_TOKEN_TTL_MINUTES}, veio {}",
                self.token_ttl_minutes
            );
        }
        if self.db_max_connections == 0 {
            anyhow::bail!("DB_MAX_CONNECTIONS deve ser maior que zero");
        }
        Ok(())
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} inválido: '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub stock_adjustment_service: StockAdjustmentService,
    pub stock_taking_service: StockTakingService,
    pub medicines_cache_service: MedicinesCacheService,
    pub auth_service: JwtService,
    pub i18n_store: Arc<I18nStore>,
}

impl AppState {
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        let store: Arc<dyn StockStore> = match &settings.database_url {
            Some(database_url) => {
                // Conecta ao banco de dados, usando '?' para propagar erros
                let db_pool = PgPoolOptions::new()
                    .max_connections(settings.db_max_connections)
                    .acquire_timeout(Duration::from_secs(settings.db_acquire_timeout_secs))
                    .connect(database_url)
                    .await
                    .context("Falha ao conectar ao banco de dados")?;
                tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

                sqlx::migrate!()
                    .run(&db_pool)
                    .await
                    .context("Falha ao rodar as migrações do banco de dados")?;
                tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

                Arc::new(PgStockStore::new(db_pool))
            }
            None => {
                tracing::warn!("⚠️ DATABASE_URL não definida: usando estoque em memória (dados se perdem ao reiniciar)");
                Arc::new(MemoryStockStore::new())
            }
        };

        Self::with_store(settings, store)
    }

    // --- Monta o gráfico de dependências ---
    pub fn with_store(settings: &Settings, store: Arc<dyn StockStore>) -> anyhow::Result<Self> {
        settings.validate()?;
        Ok(Self {
            stock_adjustment_service: StockAdjustmentService::new(store.clone()),
            stock_taking_service: StockTakingService::new(store.clone()),
            medicines_cache_service: MedicinesCacheService::new(store),
            auth_service: JwtService::new(settings.jwt_secret.clone(), settings.token_ttl_minutes),
            i18n_store: Arc::new(I18nStore::load()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(token_ttl_minutes: i64) -> Settings {
        Settings {
            jwt_secret: "segredo".to_string(),
            token_ttl_minutes,
            ..Settings::default()
        }
    }

    #[test]
    fn token_ttl_out_of_range_is_a_config_error() {
        assert!(settings(60).validate().is_ok());
        assert!(settings(MAX_TOKEN_TTL_MINUTES).validate().is_ok());
        assert!(settings(0).validate().is_err());
        assert!(settings(i64::MAX).validate().is_err());

        let store: Arc<dyn StockStore> = Arc::new(MemoryStockStore::new());
        assert!(AppState::with_store(&settings(i64::MAX), store).is_err());
    }
}
