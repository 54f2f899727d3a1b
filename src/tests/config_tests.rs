use crate::config::Config;
use crate::core::matcher::MatchStrategy;

fn config(jwt_secret: &str) -> Config {
    Config {
        port: 3000,
        log_level: "info".to_string(),
        jwt_secret: jwt_secret.to_string(),
        jwt_ttl_secs: 3600,
        settlement_strategy: MatchStrategy::InsertionOrder,
        conflict_retry_limit: 5,
    }
}

#[test]
fn test_default_jwt_secret_is_detected() {
    assert!(config("secret").uses_default_jwt_secret());
    assert!(!config("a-real-deployment-secret").uses_default_jwt_secret());
}

#[test]
fn test_debug_redacts_secret() {
    let rendered = format!("{:?}", config("hunter2-signing-key"));
    assert!(!rendered.contains("hunter2-signing-key"));
    assert!(rendered.contains("<redacted>"));
}
