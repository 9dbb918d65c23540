use qail_pg_types::{BufferConfig, PgError};

#[tokio::test]
async fn test_load_from_file() {
    let path = std::env::temp_dir().join(format!("qail-pg-types-{}.toml", std::process::id()));
    tokio::fs::write(&path, "read_buffer_size = 16384\nwrite_buffer_size = 32\n")
        .await
        .unwrap();

    let config = BufferConfig::from_file(&path).await.unwrap();
    tokio::fs::remove_file(&path).await.unwrap();

    assert_eq!(config.read_buffer_size, 16384);
    assert_eq!(config.write_buffer_size, 32);
}

#[tokio::test]
async fn test_missing_file_is_io_error() {
    let path = std::env::temp_dir().join("qail-pg-types-does-not-exist.toml");
    let err = BufferConfig::from_file(&path).await.unwrap_err();
    assert!(matches!(err, PgError::Io(_)));
}

#[test]
fn test_empty_document_is_default() {
    let config = BufferConfig::from_toml_str("").unwrap();
    assert_eq!(config, BufferConfig::default());
}
