//! Tests for config module.

use super::*;
use rust_decimal_macros::dec;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

// ==================== Duration parsing tests ====================

#[test]
fn test_parse_duration_seconds() {
    let d = duration::parse_duration("30s").unwrap();
    assert_eq!(d, Duration::from_secs(30));
}

#[test]
fn test_parse_duration_minutes() {
    let d = duration::parse_duration("30m").unwrap();
    assert_eq!(d, Duration::from_secs(1800));
}

#[test]
fn test_parse_duration_days() {
    let d = duration::parse_duration("1d").unwrap();
    assert_eq!(d, Duration::from_secs(86400));
}

#[test]
fn test_parse_duration_milliseconds() {
    let d = duration::parse_duration("250ms").unwrap();
    assert_eq!(d, Duration::from_millis(250));
}

#[test]
fn test_parse_duration_empty() {
    let d = duration::parse_duration("").unwrap();
    assert_eq!(d, Duration::ZERO);
}

#[test]
fn test_parse_duration_invalid_unit() {
    let result = duration::parse_duration("10x");
    assert!(result.is_err());
    assert!(result.unwrap_err().contains("unknown duration unit"));
}

// ==================== YAML field loading tests ====================

/// Parse config from YAML string (for testing).
fn from_yaml(yaml: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(yaml)?;
    Ok(config)
}

fn minimal_valid_yaml() -> String {
    r#"
app:
  name: exchanger
  env: development
"#
    .to_string()
}

#[test]
fn test_defaults_when_sections_missing() {
    let cfg = from_yaml(&minimal_valid_yaml()).unwrap();

    assert_eq!(cfg.exchange.processing_percentage, dec!(10));
    assert_eq!(cfg.exchange.admin_percentage, dec!(5));
    assert_eq!(cfg.exchange.min_amount, dec!(1000));
    assert_eq!(cfg.exchange.max_amount, dec!(500000));
    assert_eq!(cfg.exchange.mismatch_tolerance, dec!(1));
    assert_eq!(cfg.exchange.order_ttl, Duration::from_secs(1800));
    assert!(!cfg.exchange.expiry_sweep.enabled);
    assert!(cfg.exchange.captcha_enabled);
    assert_eq!(cfg.processor.mode, ProcessorMode::Mock);
    assert_eq!(cfg.processor.retries, 1);
    assert_eq!(cfg.rates.fallback_rate, dec!(2800000));
    assert_eq!(cfg.webhook.port, 8080);
    assert_eq!(cfg.storage.path, "exchange.db");
    assert!(cfg.notification.telegram.is_none());
}

#[test]
fn test_load_exchange_fields() {
    let yaml = r#"
app:
  name: exchanger
  env: development

exchange:
  processing_percentage: 8.5
  admin_percentage: "3"
  min_amount: 2000
  max_amount: 100000
  order_ttl: 15m
  expiry_sweep:
    enabled: true
    interval: 30s
  captcha_enabled: false
  welcome_message: "Привет!"
"#;
    let cfg = from_yaml(yaml).unwrap();

    assert_eq!(cfg.exchange.processing_percentage, dec!(8.5));
    assert_eq!(cfg.exchange.admin_percentage, dec!(3));
    assert_eq!(cfg.exchange.min_amount, dec!(2000));
    assert_eq!(cfg.exchange.max_amount, dec!(100000));
    assert_eq!(cfg.exchange.order_ttl, Duration::from_secs(900));
    assert!(cfg.exchange.expiry_sweep.enabled);
    assert_eq!(cfg.exchange.expiry_sweep.interval, Duration::from_secs(30));
    assert!(!cfg.exchange.captcha_enabled);
    assert_eq!(cfg.exchange.welcome_message.as_deref(), Some("Привет!"));
}

#[test]
fn test_load_processor_fields() {
    let yaml = r#"
app:
  name: exchanger
  env: development

processor:
  mode: live
  base_url: https://processor.test
  timeout: 3s
  retries: 2
"#;
    let cfg = from_yaml(yaml).unwrap();

    assert_eq!(cfg.processor.mode, ProcessorMode::Live);
    assert_eq!(cfg.processor.base_url, "https://processor.test");
    assert_eq!(cfg.processor.timeout, Duration::from_secs(3));
    assert_eq!(cfg.processor.retries, 2);
    assert!(cfg.processor.api_id.is_empty());
}

#[test]
fn test_load_staff_and_webhook_fields() {
    let yaml = r#"
app:
  name: exchanger
  env: development

staff:
  admin_user_id: 42
  operator_chat_id: -100500

webhook:
  host: 127.0.0.1
  port: 9000
  path: /hooks/pay
"#;
    let cfg = from_yaml(yaml).unwrap();

    assert_eq!(cfg.staff.admin_user_id, 42);
    assert_eq!(cfg.staff.operator_chat_id, -100500);
    assert_eq!(cfg.staff.admin_chat_id, 0);
    assert_eq!(cfg.webhook.path, "/hooks/pay");
    assert_eq!(
        cfg.webhook.socket_addr(),
        Some("127.0.0.1:9000".parse().unwrap())
    );
}

#[test]
fn test_load_credentials_from_env() {
    let yaml = r#"
app:
  name: exchanger
  env: production

notification:
  telegram:
    enabled: true
"#;
    let mut cfg = from_yaml(yaml).unwrap();

    // Set env vars (unsafe because modifying env is not thread-safe)
    unsafe {
        env::set_var("PROCESSOR_API_ID", "api_1");
        env::set_var("PROCESSOR_SECRET_KEY", "secret_2");
        env::set_var("PROCESSOR_PAYMENT_KEY", "payment_3");
        env::set_var("WEBHOOK_SECRET", "hook_4");
        env::set_var("TELEGRAM_BOT_TOKEN", "bot_5");
    }

    cfg.load_credentials_from_env();

    assert_eq!(cfg.processor.api_id, "api_1");
    assert_eq!(cfg.processor.secret_key, "secret_2");
    assert_eq!(cfg.processor.payment_key, "payment_3");
    assert_eq!(cfg.webhook.secret, "hook_4");
    let tg = cfg.notification.telegram.as_ref().unwrap();
    assert_eq!(tg.bot_token, "bot_5");
    assert!(tg.notify_operators);
    assert!(tg.notify_clients);

    unsafe {
        env::remove_var("PROCESSOR_API_ID");
        env::remove_var("PROCESSOR_SECRET_KEY");
        env::remove_var("PROCESSOR_PAYMENT_KEY");
        env::remove_var("WEBHOOK_SECRET");
        env::remove_var("TELEGRAM_BOT_TOKEN");
    }
}

// ==================== Validation tests ====================

#[test]
fn test_validate_minimal_development() {
    let cfg = from_yaml(&minimal_valid_yaml()).unwrap();
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_validate_empty_app_name() {
    let yaml = r#"
app:
  name: ""
  env: development
"#;
    let cfg = from_yaml(yaml).unwrap();

    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("app.name is required"));
}

#[test]
fn test_validate_inverted_limits() {
    let yaml = r#"
app:
  name: exchanger
  env: development

exchange:
  min_amount: 5000
  max_amount: 1000
"#;
    let cfg = from_yaml(yaml).unwrap();

    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("limits are invalid"));
}

#[test]
fn test_validate_negative_percentage() {
    let yaml = r#"
app:
  name: exchanger
  env: development

exchange:
  admin_percentage: -1
"#;
    let cfg = from_yaml(yaml).unwrap();

    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("must not be negative"));
}

#[test]
fn test_validate_live_processor_requires_credentials_in_production() {
    let yaml = r#"
app:
  name: exchanger
  env: production

processor:
  mode: live
"#;
    let mut cfg = from_yaml(yaml).unwrap();
    cfg.webhook.secret = "hook".to_string();

    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("PROCESSOR_API_ID"));
}

#[test]
fn test_validate_mock_processor_needs_no_credentials() {
    let yaml = r#"
app:
  name: exchanger
  env: production
"#;
    let mut cfg = from_yaml(yaml).unwrap();
    cfg.webhook.secret = "hook".to_string();

    assert!(cfg.validate().is_ok());
}

#[test]
fn test_validate_webhook_secret_required_in_production() {
    let yaml = r#"
app:
  name: exchanger
  env: staging
"#;
    let cfg = from_yaml(yaml).unwrap();

    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("WEBHOOK_SECRET"));
}

#[test]
fn test_validate_webhook_path_must_be_absolute() {
    let yaml = r#"
app:
  name: exchanger
  env: development

webhook:
  path: webhook
"#;
    let cfg = from_yaml(yaml).unwrap();

    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("webhook.path"));
}

#[test]
fn test_validate_zero_sweep_interval() {
    let yaml = r#"
app:
  name: exchanger
  env: development

exchange:
  expiry_sweep:
    enabled: true
    interval: 0s
"#;
    let cfg = from_yaml(yaml).unwrap();

    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("interval must be positive"));
}

// ==================== File loading tests ====================

#[test]
fn test_load_from_file_development() {
    let yaml = minimal_valid_yaml();

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let cfg = Config::load(file.path().to_str().unwrap()).unwrap();

    assert_eq!(cfg.app.name, "exchanger");
    assert!(!cfg.app.is_production());
}

#[test]
fn test_load_file_not_found() {
    let result = Config::load("nonexistent_config.yaml");
    assert!(matches!(result, Err(ConfigError::ReadFile(_))));
}

#[test]
fn test_load_file_invalid_yaml() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"app: [unclosed").unwrap();

    let result = Config::load(file.path().to_str().unwrap());
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_load_shipped_config() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/configs/config.yaml");

    let cfg = Config::load(path).unwrap();

    assert_eq!(cfg.app.name, "btc-exchange-desk");
    assert_eq!(cfg.processor.mode, ProcessorMode::Mock);
    assert_eq!(cfg.exchange.order_ttl, Duration::from_secs(1800));
    assert_eq!(cfg.exchange.mismatch_tolerance, dec!(1));
    assert_eq!(cfg.webhook.path, "/webhook/processor");
    assert!(!cfg.exchange.expiry_sweep.enabled);
}
