//! HTTP rate provider tests against a loopback exchange-rate service.

#![cfg(feature = "http")]

use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use ledger_kit::currency::{
    ConversionPhase, CurrencyCode, CurrencyConverter, HttpRateProvider, RateProvider,
};
use ledger_kit::{Error, LedgerConfig};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Serve `app` on an ephemeral loopback port and return its base URL.
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to read address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });
    format!("http://{}", addr)
}

async fn latest(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let from = params.get("from").cloned().unwrap_or_default();
    let to = params.get("to").cloned().unwrap_or_default();
    let rate = match (from.as_str(), to.as_str()) {
        ("EUR", "CZK") => 25.0,
        ("CZK", "EUR") => 0.04,
        _ => return Json(json!({ "amount": 1.0, "base": from, "rates": {} })),
    };
    Json(json!({ "amount": 1.0, "base": from, "date": "2024-05-01", "rates": { to: rate } }))
}

fn provider(base_url: &str) -> HttpRateProvider {
    HttpRateProvider::new(base_url, Duration::from_secs(2)).expect("Failed to build provider")
}

async fn fetch_eur_czk(provider: &HttpRateProvider) -> ledger_kit::Result<f64> {
    provider
        .fetch_rate(&CurrencyCode::eur(), &CurrencyCode::czk())
        .await
}

/// Test 1: Successful Lookup
///
/// Verifies the query string carries both codes and the rate is read.
#[tokio::test]
async fn test_rate_is_read_from_response() {
    init();
    let base = serve(Router::new().route("/latest", get(latest))).await;

    let rate = fetch_eur_czk(&provider(&base)).await.expect("Failed to fetch rate");
    assert_eq!(rate, 25.0);

    let reverse = provider(&base)
        .fetch_rate(&CurrencyCode::czk(), &CurrencyCode::eur())
        .await
        .expect("Failed to fetch rate");
    assert_eq!(reverse, 0.04);
}

/// Test 2: Server Error
///
/// Verifies a non-2xx status maps to the status-bearing message.
#[tokio::test]
async fn test_server_error_status() {
    init();
    let app = Router::new().route("/latest", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
    let base = serve(app).await;

    let err = fetch_eur_czk(&provider(&base)).await.unwrap_err();
    assert_eq!(
        err,
        Error::ConversionError("Currency conversion unavailable (500)".to_string())
    );
}

/// Test 3: Malformed Body
#[tokio::test]
async fn test_malformed_body() {
    init();
    let app = Router::new().route("/latest", get(|| async { "<html>maintenance</html>" }));
    let base = serve(app).await;

    let err = fetch_eur_czk(&provider(&base)).await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid response from currency service");
}

/// Test 4: Missing Rate
#[tokio::test]
async fn test_missing_rate() {
    init();
    let app = Router::new().route(
        "/latest",
        get(|| async { Json(json!({ "amount": 1.0, "base": "EUR", "rates": { "USD": 1.08 } })) }),
    );
    let base = serve(app).await;

    let err = fetch_eur_czk(&provider(&base)).await.unwrap_err();
    assert_eq!(err.to_string(), "Rate for CZK not available");
}

/// Test 5: Unreachable Service
#[tokio::test]
async fn test_unreachable_service() {
    init();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to read address");
    drop(listener);

    let err = fetch_eur_czk(&provider(&format!("http://{}", addr))).await.unwrap_err();
    assert_eq!(err.to_string(), "Could not convert currency");
}

/// Test 6: Converter Over HTTP
///
/// Verifies that an HTTP 500 leaves the converter in a failed state with a
/// message and no converted amount, and a healthy service converts.
#[tokio::test]
async fn test_converter_degrades_on_http_500() {
    init();
    let failing = serve(Router::new().route(
        "/latest",
        get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    ))
    .await;
    let config = LedgerConfig::default()
        .with_rate_endpoint(failing.clone())
        .with_debounce(Duration::from_millis(10));
    let converter = CurrencyConverter::new(
        HttpRateProvider::from_config(&config).expect("Failed to build provider"),
        &config,
    );

    converter.update(10.0, CurrencyCode::eur());
    let mut rx = converter.watch();
    let state = tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.phase == ConversionPhase::Failed),
    )
    .await
    .expect("Timed out")
    .expect("Converter dropped")
    .clone();
    assert_eq!(state.converted_amount, None);
    assert_eq!(state.error.as_deref(), Some("Currency conversion unavailable (500)"));

    let healthy = serve(Router::new().route("/latest", get(latest))).await;
    let config = config.with_rate_endpoint(healthy);
    let converter = CurrencyConverter::new(
        HttpRateProvider::from_config(&config).expect("Failed to build provider"),
        &config,
    );
    converter.update(10.0, CurrencyCode::eur());
    let mut rx = converter.watch();
    let state = tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.phase == ConversionPhase::Ready),
    )
    .await
    .expect("Timed out")
    .expect("Converter dropped")
    .clone();
    assert_eq!(state.converted_amount, Some(250.0));
    assert_eq!(state.rate_text.as_deref(), Some("1 EUR = 25.0000 CZK"));
}
