pub mod handlers;

pub use handlers::*;

use crate::db::InvoiceStore;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;

/// 构建路由
pub fn router<S: InvoiceStore + 'static>(state: Arc<ApiState<S>>) -> Router {
    let seller_routes = Router::new()
        .route("/api/sellers/groups", get(seller_groups::<S>))
        .route("/api/sellers/:group", get(sellers_in_group::<S>))
        .route("/api/sellers/:group/:company/defaults", get(seller_defaults::<S>))
        .route("/api/cache/sellers/invalidate", post(invalidate_sellers::<S>));

    let invoice_routes = Router::new()
        .route("/api/companies/:company/devices", get(company_devices::<S>))
        .route("/api/invoices/preview", post(preview_invoice::<S>))
        .route("/api/invoices/confirm", post(confirm_invoice::<S>));

    Router::new()
        .route("/health", get(health_check))
        .merge(seller_routes)
        .merge(invoice_routes)
        .with_state(state)
        .layer(ServiceBuilder::new())
}
