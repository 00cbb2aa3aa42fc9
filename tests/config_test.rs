use std::env;
use std::fs;
use tempfile::TempDir;

/// Test loading configuration from YAML file
#[test]
fn test_load_yaml_config() {
    let yaml = r#"
profiles:
  production:
    endpoint: https://s3.example.com
    access_key: AKIATEST
    secret_key: secrettest
    region: us-west-2
    bucket: prod-bucket

default_profile: production
request_timeout: 120
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = s3wharf::config::load_from_yaml(&config_path).unwrap();

    assert_eq!(config.profiles.len(), 1);
    assert!(config.profiles.contains_key("production"));

    let profile = config.profiles.get("production").unwrap();
    assert_eq!(profile.endpoint, "https://s3.example.com");
    assert_eq!(profile.access_key, "AKIATEST");
    assert_eq!(profile.secret_key, "secrettest");
    assert_eq!(profile.region, "us-west-2");
    assert_eq!(profile.bucket, Some("prod-bucket".to_string()));

    assert_eq!(config.default_profile, Some("production".to_string()));
    assert_eq!(config.request_timeout, 120);
}

/// Test default values
#[test]
fn test_default_values() {
    let yaml = r#"
profiles:
  minimal:
    endpoint: https://s3.test.com
    access_key: key
    secret_key: secret
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = s3wharf::config::load_from_yaml(&config_path).unwrap();

    let profile = config.profiles.get("minimal").unwrap();
    assert_eq!(profile.region, "us-east-1");
    assert_eq!(profile.bucket, None);
    assert_eq!(config.default_profile, None);
    assert_eq!(config.request_timeout, 300);
}

/// Test profile selection fallback chain
#[test]
fn test_get_profile_fallback() {
    let yaml = r#"
profiles:
  alpha:
    endpoint: https://alpha.test.com
    access_key: ka
    secret_key: sa
  beta:
    endpoint: https://beta.test.com
    access_key: kb
    secret_key: sb

default_profile: beta
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = s3wharf::config::load_from_yaml(&config_path).unwrap();

    // Explicit name wins
    let profile = config.get_profile(Some("alpha")).unwrap();
    assert_eq!(profile.endpoint, "https://alpha.test.com");

    // No name falls back to default_profile
    let profile = config.get_profile(None).unwrap();
    assert_eq!(profile.endpoint, "https://beta.test.com");

    // Unknown name is a miss, not a fallback
    assert!(config.get_profile(Some("gamma")).is_none());
}

/// Test load_config with an explicit profile override
#[test]
fn test_load_config_profile_override() {
    let yaml = r#"
profiles:
  alpha:
    endpoint: https://alpha.test.com
    access_key: ka
    secret_key: sa
  beta:
    endpoint: https://beta.test.com
    access_key: kb
    secret_key: sb

default_profile: alpha
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();
    let path = config_path.to_str().unwrap();

    let config = s3wharf::config::load_config(Some(path), Some("beta")).unwrap();
    assert_eq!(config.default_profile, Some("beta".to_string()));

    let err = s3wharf::config::load_config(Some(path), Some("gamma")).unwrap_err();
    assert!(err.to_string().contains("gamma"));
}

/// Test loading configuration from environment variables.
///
/// AWS-standard and legacy variable names share the process environment,
/// so both rounds live in one test to keep them ordered.
#[test]
fn test_load_env_config() {
    // Save original env vars
    let orig_key = env::var("AWS_ACCESS_KEY_ID").ok();
    let orig_secret = env::var("AWS_SECRET_ACCESS_KEY").ok();
    let orig_region = env::var("AWS_REGION").ok();
    let orig_endpoint = env::var("S3_ENDPOINT").ok();
    let orig_bucket = env::var("S3_BUCKET").ok();
    let orig_timeout = env::var("S3_REQUEST_TIMEOUT").ok();
    let orig_legacy_key = env::var("S3_KEY").ok();
    let orig_legacy_secret = env::var("S3_SECRET").ok();

    // AWS-standard format
    env::set_var("AWS_ACCESS_KEY_ID", "test_key");
    env::set_var("AWS_SECRET_ACCESS_KEY", "test_secret");
    env::set_var("AWS_REGION", "eu-west-1");
    env::set_var("S3_ENDPOINT", "https://s3.test.com");
    env::set_var("S3_BUCKET", "test-bucket");
    env::set_var("S3_REQUEST_TIMEOUT", "600");
    env::remove_var("S3_KEY");
    env::remove_var("S3_SECRET");

    let config = s3wharf::config::load_from_env().unwrap();

    assert_eq!(config.profiles.len(), 1);
    let profile = config.profiles.get("default").unwrap();
    assert_eq!(profile.endpoint, "https://s3.test.com");
    assert_eq!(profile.access_key, "test_key");
    assert_eq!(profile.secret_key, "test_secret");
    assert_eq!(profile.region, "eu-west-1");
    assert_eq!(profile.bucket, Some("test-bucket".to_string()));
    assert_eq!(config.default_profile, Some("default".to_string()));
    assert_eq!(config.request_timeout, 600);

    // Legacy format falls back to S3_KEY / S3_SECRET
    env::remove_var("AWS_ACCESS_KEY_ID");
    env::remove_var("AWS_SECRET_ACCESS_KEY");
    env::remove_var("AWS_REGION");
    env::remove_var("S3_BUCKET");
    env::remove_var("S3_REQUEST_TIMEOUT");
    env::set_var("S3_KEY", "legacy_key");
    env::set_var("S3_SECRET", "legacy_secret");

    let config = s3wharf::config::load_from_env().unwrap();

    let profile = config.profiles.get("default").unwrap();
    assert_eq!(profile.access_key, "legacy_key");
    assert_eq!(profile.secret_key, "legacy_secret");
    // Default region when not specified
    assert_eq!(profile.region, "us-east-1");
    assert_eq!(profile.bucket, None);
    assert_eq!(config.request_timeout, 300);

    // Missing endpoint is an error
    env::remove_var("S3_ENDPOINT");
    assert!(s3wharf::config::load_from_env().is_err());

    // Restore original env vars
    cleanup_env("AWS_ACCESS_KEY_ID", orig_key);
    cleanup_env("AWS_SECRET_ACCESS_KEY", orig_secret);
    cleanup_env("AWS_REGION", orig_region);
    cleanup_env("S3_ENDPOINT", orig_endpoint);
    cleanup_env("S3_BUCKET", orig_bucket);
    cleanup_env("S3_REQUEST_TIMEOUT", orig_timeout);
    cleanup_env("S3_KEY", orig_legacy_key);
    cleanup_env("S3_SECRET", orig_legacy_secret);
}

fn cleanup_env(key: &str, original: Option<String>) {
    match original {
        Some(val) => env::set_var(key, val),
        None => env::remove_var(key),
    }
}
