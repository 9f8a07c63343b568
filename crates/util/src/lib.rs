pub mod config;

use std::{env, net::SocketAddr};

pub use config::{AppConfig, ConfigError, Environment, RelayConfig};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

/// Loads environment variables from `.env` when available.
///
/// Missing files are ignored so the function is safe in production builds
/// where dotenv files are not deployed.
pub fn load_env_file() {
    let _ = dotenvy::dotenv();
}

/// Returns the address the HTTP server should bind to.
///
/// `APP_BIND_ADDR` wins when set. Otherwise a `PORT` variable binds every
/// interface on that port, and [`DEFAULT_BIND_ADDR`] is the final fallback.
pub fn server_bind_address() -> Result<SocketAddr, std::net::AddrParseError> {
    let value = match (env::var("APP_BIND_ADDR"), env::var("PORT")) {
        (Ok(addr), _) => addr,
        (Err(_), Ok(port)) => format!("0.0.0.0:{}", port.trim()),
        _ => DEFAULT_BIND_ADDR.to_string(),
    };
    value.parse()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ENV_GUARD;

    #[test]
    fn returns_default_address_when_env_missing() {
        let _lock = ENV_GUARD.lock().expect("env guard poisoned");
        env::remove_var("APP_BIND_ADDR");
        env::remove_var("PORT");
        let addr = server_bind_address().expect("default address is valid");
        assert_eq!(addr.to_string(), DEFAULT_BIND_ADDR);
    }

    #[test]
    fn parses_custom_address_from_env() {
        let _lock = ENV_GUARD.lock().expect("env guard poisoned");
        env::set_var("APP_BIND_ADDR", "127.0.0.1:9000");
        env::set_var("PORT", "7000");
        let addr = server_bind_address().expect("custom address should parse");
        assert_eq!(addr.to_string(), "127.0.0.1:9000");
        env::remove_var("APP_BIND_ADDR");
        env::remove_var("PORT");
    }

    #[test]
    fn port_binds_all_interfaces() {
        let _lock = ENV_GUARD.lock().expect("env guard poisoned");
        env::remove_var("APP_BIND_ADDR");
        env::set_var("PORT", "8081");
        let addr = server_bind_address().expect("port should parse");
        assert_eq!(addr.to_string(), "0.0.0.0:8081");

        env::set_var("PORT", "not-a-port");
        assert!(server_bind_address().is_err());
        env::remove_var("PORT");
    }
}
