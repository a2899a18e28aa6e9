use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub invoicing: InvoicingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoicingConfig {
    /// 工作表 / 发票输出目录
    pub output_dir: PathBuf,
    /// 预填汇率 (USD -> INR)
    pub default_usd_rate: Option<BigDecimal>,
    /// 预填汇率 (EUR -> INR)
    pub default_eur_rate: Option<BigDecimal>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/irec_invoicer".to_string(),
                max_connections: 5,
            },
            invoicing: InvoicingConfig {
                output_dir: PathBuf::from("output"),
                default_usd_rate: None,
                default_eur_rate: None,
            },
        }
    }
}

impl AppConfig {
    /// 从环境变量加载配置 (不读配置文件)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server: ServerConfig {
                host: std::env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: std::env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(defaults.server.port),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: defaults.database.max_connections,
            },
            invoicing: InvoicingConfig {
                output_dir: std::env::var("INVOICE_OUTPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.invoicing.output_dir),
                default_usd_rate: std::env::var("USD_RATE").ok().and_then(|r| r.parse().ok()),
                default_eur_rate: std::env::var("EUR_RATE").ok().and_then(|r| r.parse().ok()),
            },
        }
    }

    /// 分层加载: 环境变量默认值 < invoicer.toml < INVOICER__* 环境变量
    pub fn load() -> Result<Self, config::ConfigError> {
        let base = Self::from_env();
        config::Config::builder()
            .add_source(config::Config::try_from(&base)?)
            .add_source(config::File::with_name("invoicer").required(false))
            .add_source(config::Environment::with_prefix("INVOICER").separator("__"))
            .build()?
            .try_deserialize()
    }
}
