use serde::Deserialize;
use std::env;
use substruct_core::StorePreferences;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub payment: PaymentConfig,
    /// Defaults for the store preferences; rows in the `preferences` table win.
    pub store: StorePreferences,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    pub authorize_net_url: String,
    /// Authorize.Net transaction key. Keep it out of checked-in files.
    #[serde(default)]
    pub authorize_net_transaction_key: String,
    pub paypal_ipn_url: String,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_seconds: u64,
}

fn default_gateway_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct MaintenanceConfig {
    /// How often stale carts are swept.
    pub cart_sweep_interval_seconds: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            cart_sweep_interval_seconds: 3600,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. SUBSTRUCT__DATABASE__URL
            .add_source(config::Environment::with_prefix("SUBSTRUCT").prefix_separator("__").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};
    use substruct_core::CardProcessor;

    const SAMPLE: &str = r#"
        [server]
        port = 8080

        [database]
        url = "postgres://localhost/substruct"

        [auth]
        jwt_secret = "secret"
        jwt_expiration_seconds = 3600

        [payment]
        authorize_net_url = "https://test.authorize.net/gateway/transact.dll"
        paypal_ipn_url = "https://ipnpb.sandbox.paypal.com/cgi-bin/webscr"

        [store]
        store_name = "Test Store"
        cc_processor = "paypal_ipn"
        cc_login = "seller@example.com"
        mail_from = "store@example.com"
        mail_copy_to = ["staff@example.com"]
    "#;

    #[test]
    fn test_deserialize_with_defaults() {
        let config: Config = config::Config::builder()
            .add_source(File::from_str(SAMPLE, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.payment.timeout_seconds, 10);
        assert_eq!(config.maintenance.cart_sweep_interval_seconds, 3600);
        assert_eq!(config.store.cc_processor, CardProcessor::PaypalIpn);
        assert!(config.store.store_use_inventory_control);
        assert_eq!(config.store.mail_copy_to, vec!["staff@example.com".to_string()]);
    }
}
