use super::*;

#[test]
fn code_mapping() {
    assert_eq!(VaultError::bad_path("x").code_str(), "bad_path");
    assert_eq!(VaultError::unsupported("x").code_str(), "unsupported_value");
    assert_eq!(VaultError::txn("x").code_str(), "storage_transaction");
    assert_eq!(VaultError::corrupt("x").code_str(), "corrupt");
    let io = VaultError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
    assert_eq!(io.code_str(), "io");
}

#[test]
fn only_transaction_errors_are_retryable() {
    assert!(VaultError::txn("quota exceeded").is_retryable());
    assert!(!VaultError::bad_path("/").is_retryable());
    assert!(!VaultError::corrupt("short header").is_retryable());
}

#[test]
fn json_errors_map_to_corrupt() {
    let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let e: VaultError = err.into();
    assert!(matches!(e, VaultError::Corrupt(_)));
    assert!(e.to_string().starts_with("corrupt record: json:"));
}

#[test]
fn display_includes_message() {
    let e = VaultError::bad_path("path has no root segment: '/'");
    assert_eq!(e.to_string(), "bad path: path has no root segment: '/'");
}
