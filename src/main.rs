use irec_invoicer::api::{self, ApiState};
use irec_invoicer::{create_pool, AppConfig, CsvDocumentSink, InvoiceService, PgInvoiceStore};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置: invoicer.toml 解析失败时退回环境变量
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("Config file rejected ({}), falling back to environment", e);
            AppConfig::from_env()
        }
    };
    info!("Starting server with config: {:?}", config);

    // 创建数据库连接池
    let pool = create_pool(&config.database).await?;
    info!("Database pool created");

    std::fs::create_dir_all(&config.invoicing.output_dir)?;
    let store = Arc::new(PgInvoiceStore::new(pool));
    let sink = Arc::new(CsvDocumentSink::new(config.invoicing.output_dir.clone()));
    let service = Arc::new(InvoiceService::new(store, sink));

    let state = Arc::new(ApiState {
        service,
        invoicing: config.invoicing.clone(),
    });
    let app = api::router(state);

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  GET  /api/sellers/groups");
    info!("  GET  /api/sellers/:group");
    info!("  GET  /api/sellers/:group/:company/defaults");
    info!("  POST /api/cache/sellers/invalidate");
    info!("  GET  /api/companies/:company/devices");
    info!("  POST /api/invoices/preview");
    info!("  POST /api/invoices/confirm");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
