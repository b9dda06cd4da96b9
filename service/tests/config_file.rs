use std::io::Write;

use idv_proofing::ExecutionMode;
use idv_service::ServiceConfig;
use idv_types::Vendor;

#[test]
fn loads_partial_file_over_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
execution_mode = "background"
fingerprint_secret = "{secret}"

[vendors]
resolution = "lexis_nexis"

[outages]
sms = true

[params]
otp_length = 8
"#,
        secret = "ab".repeat(16)
    )
    .unwrap();

    let config = ServiceConfig::from_toml_file(file.path()).unwrap();
    assert_eq!(config.execution_mode, ExecutionMode::Background);
    assert_eq!(config.vendors.resolution, Vendor::LexisNexis);
    assert!(config.outages.sms);
    assert_eq!(config.params.otp_length, 8);
    assert_eq!(config.params.otp_validity_secs, 600);
    assert!(config.fingerprinter().is_ok());
    assert!(config.server_key().is_err());
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ServiceConfig::from_toml_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("absent.toml"));
}
