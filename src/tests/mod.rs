pub mod mock_chain;

use crate::config::AppConfig;
use crate::config::CONFIG_ENV;
use crate::database::Database;
use crate::Result;

/// Load test configuration with safety checks
/// This function MUST be used instead of `AppConfig::load()` in all tests
pub fn load_test_config() -> Result<AppConfig> {
    // 🛡️ CRITICAL: Force use of test configuration
    let config_path =
        std::env::var(CONFIG_ENV).unwrap_or_else(|_| "config.test.toml".to_string());

    let config = AppConfig::from_file(&config_path)?;

    // 🛡️ CRITICAL: Verify database URL points to localhost
    let db_url = config.database_url();
    if !is_local_database(db_url) {
        return Err(crate::StakeKeysError::Custom(format!(
            "❌ SAFETY CHECK FAILED: Test config must use LOCAL database!\n\
             Current database URL: {}\n\
             \n\
             Tests reset every synced table and MUST use a localhost database.\n\
             \n\
             To run tests safely:\n\
             1. Create local test database: createdb stakekeys_test\n\
             2. Set environment: export {CONFIG_ENV}=config.test.toml\n\
             3. Run: cargo test -- --ignored\n\
             ",
            crate::cli::mask_password(db_url)
        )));
    }

    tracing::debug!("✅ Test config loaded safely from: {}", config_path);
    Ok(config)
}

/// Connect to the local test database and create the schema
/// NOTE: Tests requiring database access should be marked with #[ignore]
pub async fn create_test_database() -> Result<Database> {
    let config = load_test_config()?;
    tracing::info!("✅ Database safety check passed: using local database");
    let database = Database::from_config(&config).await?;
    database.init_schema().await?;
    Ok(database)
}

/// Check if database URL points to localhost
fn is_local_database(url: &str) -> bool {
    url.contains("@localhost")
        || url.contains("@127.0.0.1")
        || url.contains("@[::1]")
        || url.starts_with("postgresql://localhost")
        || url.starts_with("postgres://localhost")
}

mod safety_tests {
    use super::is_local_database;

    #[test]
    fn test_local_database_detection() {
        assert!(is_local_database("postgresql://u:p@localhost:5432/stakekeys_test"));
        assert!(is_local_database("postgres://u:p@127.0.0.1/stakekeys_test"));
        assert!(is_local_database("postgresql://localhost/stakekeys_test"));
        assert!(!is_local_database("postgresql://u:p@db.example.com:5432/stakekeys"));
    }
}
