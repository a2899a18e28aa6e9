use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use bigdecimal::BigDecimal;
use irec_invoicer::api::{router, ApiState};
use irec_invoicer::config::InvoicingConfig;
use irec_invoicer::models::{IssuanceRow, Seller};
use irec_invoicer::{CsvDocumentSink, InvoiceService, MemoryInvoiceStore};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tower::ServiceExt;

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

fn row(device: &str, month: i32, issued: &str, partial: Option<&str>) -> IssuanceRow {
    IssuanceRow {
        device_id: device.to_string(),
        project: "Solar A".to_string(),
        capacity: dec("2"),
        month,
        issued: dec(issued),
        is_partial: partial.is_some(),
        candidates: partial.map(str::to_string),
    }
}

fn app(store: Arc<MemoryInvoiceStore>, out: &std::path::Path) -> Router {
    let invoicing = InvoicingConfig {
        output_dir: out.to_path_buf(),
        default_usd_rate: Some(dec("83")),
        default_eur_rate: None,
    };
    let service = Arc::new(InvoiceService::new(store, Arc::new(CsvDocumentSink::new(out))));
    router(Arc::new(ApiState { service, invoicing }))
}

fn seeded_store() -> Arc<MemoryInvoiceStore> {
    let store = MemoryInvoiceStore::new();
    store.add_seller(Seller {
        group_name: "Alpha Group".to_string(),
        seller: "Alpha Power Ltd.".to_string(),
        success_fee: dec("10"),
        indicative_price: dec("0.1"),
        pan: "AAAPA1234A".to_string(),
        gst: "27AAAPA1234A1Z5".to_string(),
        registration_number: None,
        address: "12 Harbour Road, Mumbai, 400001".to_string(),
    });
    store.add_company_device("Alpha Power Ltd.", "D1");
    store.add_issuance(2024, row("D1", 1, "100", None));
    store.add_issuance(2024, row("D1", 2, "50", Some("[40, 45]")));
    Arc::new(store)
}

fn invoice_body(selections: Value) -> Value {
    json!({
        "group_name": "Alpha Group",
        "company_name": "Alpha Power Ltd.",
        "year": 2024,
        "period_from": "January",
        "period_to": "February",
        "device_ids": ["D1"],
        "params": {
            "unit_price": "0.1",
            "success_fee_percent": "10",
            "usd_rate": "83",
            "eur_rate": "90"
        },
        "selections": selections
    })
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_check_answers() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(seeded_store(), dir.path());
    let (status, _) = send(app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn seller_endpoints_read_through_cache() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store();
    let app = app(store, dir.path());

    let (status, groups) = send(app.clone(), "GET", "/api/sellers/groups", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(groups, json!(["Alpha Group"]));

    let (status, defaults) = send(
        app.clone(),
        "GET",
        "/api/sellers/Alpha%20Group/Alpha%20Power%20Ltd./defaults",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(defaults["seller"]["pan"], "AAAPA1234A");

    let (status, _) = send(app, "GET", "/api/sellers/Beta/Nobody/defaults", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_partial_choice_is_reported_as_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(seeded_store(), dir.path());

    let (status, body) = send(app, "POST", "/api/invoices/preview", Some(invoice_body(json!([])))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["pending"][0]["device_id"], "D1");
    assert_eq!(body["pending"][0]["project"], "Solar A");
    assert_eq!(body["pending"][0]["month"], "February");
}

#[tokio::test]
async fn preview_and_confirm_with_partial_choice() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store();
    let app = app(store.clone(), dir.path());
    let selections = json!([
        { "device_id": "D1", "project": "Solar A", "month": "february", "selection": { "kind": "candidates", "indexes": [0, 1] } }
    ]);

    let (status, body) = send(
        app.clone(),
        "POST",
        "/api/invoices/preview",
        Some(invoice_body(selections.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["total_devices"], 1);
    assert!(store.invoices_snapshot().is_empty());

    let (status, body) = send(app, "POST", "/api/invoices/confirm", Some(invoice_body(selections))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(store.invoices_snapshot().len(), 1);
    assert_eq!(store.invoices_snapshot()[0].total_issued, dec("185"));
    assert_eq!(store.open_issuance_count(), 0);
}

#[tokio::test]
async fn validation_errors_map_to_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(seeded_store(), dir.path());

    let mut body = invoice_body(json!([]));
    body["device_ids"] = json!([]);
    let (status, response) = send(app, "POST", "/api/invoices/preview", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["success"], false);
}
