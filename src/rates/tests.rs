//! Tests for rate providers.

use super::*;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use rust_decimal_macros::dec;
use serde_json::json;
use std::time::Duration;

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/price", addr)
}

fn config(url: String) -> RatesConfig {
    RatesConfig {
        url,
        timeout: Duration::from_secs(2),
        fallback_rate: dec!(2800000),
    }
}

#[test]
fn test_parse_rate_number_and_string() {
    assert_eq!(
        parse_rate(&json!({"bitcoin": {"rub": 8123456.5}})).unwrap(),
        dec!(8123456.5)
    );
    assert_eq!(
        parse_rate(&json!({"bitcoin": {"rub": "7000000"}})).unwrap(),
        dec!(7000000)
    );
}

#[test]
fn test_parse_rate_rejects_bad_payloads() {
    assert!(parse_rate(&json!({"bitcoin": {}})).is_err());
    assert!(parse_rate(&json!({"bitcoin": {"rub": null}})).is_err());
    assert!(parse_rate(&json!({"bitcoin": {"rub": 0}})).is_err());
    assert!(parse_rate(&json!([])).is_err());
}

#[tokio::test]
async fn test_fixed_rate() {
    assert_eq!(FixedRate(dec!(3000000)).get_rate().await, dec!(3000000));
}

#[tokio::test]
async fn test_coingecko_returns_live_rate() {
    let url = serve(Router::new().route(
        "/price",
        get(|| async { axum::Json(json!({"bitcoin": {"rub": 9100000}})) }),
    ))
    .await;

    let rates = CoinGeckoRates::new(&config(url)).unwrap();
    assert_eq!(rates.get_rate().await, dec!(9100000));
}

#[tokio::test]
async fn test_coingecko_falls_back_on_error_status() {
    let url = serve(Router::new().route(
        "/price",
        get(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
    ))
    .await;

    let rates = CoinGeckoRates::new(&config(url)).unwrap();
    assert_eq!(rates.get_rate().await, dec!(2800000));
}

#[tokio::test]
async fn test_coingecko_falls_back_on_malformed_body() {
    let url = serve(Router::new().route("/price", get(|| async { "not json" }))).await;

    let rates = CoinGeckoRates::new(&config(url)).unwrap();
    assert_eq!(rates.get_rate().await, dec!(2800000));
}

#[tokio::test]
async fn test_coingecko_falls_back_when_unreachable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let rates = CoinGeckoRates::new(&config(format!("http://{}/price", addr))).unwrap();
    assert_eq!(rates.get_rate().await, dec!(2800000));
}
