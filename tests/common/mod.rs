//! Shared helpers for integration tests

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use vault_deployer::VaultClient;
use vault_deployer::auth::TokenProvider;
use vault_deployer::config::VaultConfig;
use vault_deployer::util::SecretString;
use wiremock::MockServer;

pub const TEST_TOKEN: &str = "s.test-token";

/// Vault client pointing to the mock server, without retries
pub fn vault_client(mock_server: &MockServer) -> VaultClient {
    let config = VaultConfig {
        addr: mock_server.uri(),
        token: Some(SecretString::new(TEST_TOKEN)),
        timeout_secs: 5,
        max_retries: 0,
        verify_ssl: true,
    };
    let auth = TokenProvider::new(TEST_TOKEN).unwrap();
    VaultClient::new(&config, Box::new(auth)).unwrap()
}

/// Write a file below `root`, creating parent directories
pub fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}
