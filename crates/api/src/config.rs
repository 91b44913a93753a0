//! Application configuration loaded from environment variables.

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — PostgreSQL URL; absent selects the in-memory store
/// - `WEBHOOK_SECRET` — shared secret expected in the webhook signature header
/// - `RESERVATION_TTL_SECS` — how long checkout holds stock (default: 900)
/// - `SWEEP_INTERVAL_SECS` — reservation/stale-order sweep period (default: 60)
/// - `PENDING_GRACE_SECS` — how long an order may stay pending (default: 3600)
/// - `TAX_DEFAULT_BPS` — default tax rate in basis points (default: 600)
/// - `SHIPPING_STANDARD_CENTS` / `SHIPPING_EXPRESS_CENTS` — shipping rates
/// - `FREE_SHIPPING_THRESHOLD_CENTS` — free standard shipping threshold
/// - `LOW_STOCK_THRESHOLD` — availability at or below which alerts fire
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub webhook_secret: String,
    pub reservation_ttl_secs: i64,
    pub sweep_interval_secs: u64,
    pub pending_grace_secs: i64,
    pub tax_default_bps: u32,
    pub shipping_standard_cents: i64,
    pub shipping_express_cents: i64,
    pub free_shipping_threshold_cents: Option<i64>,
    pub low_stock_threshold: Option<i64>,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            webhook_secret: std::env::var("WEBHOOK_SECRET")
                .unwrap_or_else(|_| "dev-secret".to_string()),
            reservation_ttl_secs: env_parse("RESERVATION_TTL_SECS", 900),
            sweep_interval_secs: env_parse("SWEEP_INTERVAL_SECS", 60),
            pending_grace_secs: env_parse("PENDING_GRACE_SECS", 3600),
            tax_default_bps: env_parse("TAX_DEFAULT_BPS", 600),
            shipping_standard_cents: env_parse("SHIPPING_STANDARD_CENTS", 500),
            shipping_express_cents: env_parse("SHIPPING_EXPRESS_CENTS", 1500),
            free_shipping_threshold_cents: std::env::var("FREE_SHIPPING_THRESHOLD_CENTS")
                .ok()
                .and_then(|v| v.parse().ok()),
            low_stock_threshold: Some(env_parse("LOW_STOCK_THRESHOLD", 5)),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the checkout configuration from the loaded numbers.
    pub fn checkout_config(&self) -> checkout::CheckoutConfig {
        checkout::CheckoutConfig {
            reservation_ttl: chrono::Duration::seconds(self.reservation_ttl_secs),
            success_ref: "/checkout/success".to_string(),
            cancel_ref: "/checkout/cancel".to_string(),
            tax_table: checkout::TaxTable::with_default(self.tax_default_bps),
            shipping_rates: checkout::ShippingRates {
                standard: domain::Money::from_cents(self.shipping_standard_cents),
                express: domain::Money::from_cents(self.shipping_express_cents),
                free_shipping_threshold: self
                    .free_shipping_threshold_cents
                    .map(domain::Money::from_cents),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            webhook_secret: "dev-secret".to_string(),
            reservation_ttl_secs: 900,
            sweep_interval_secs: 60,
            pending_grace_secs: 3600,
            tax_default_bps: 600,
            shipping_standard_cents: 500,
            shipping_express_cents: 1500,
            free_shipping_threshold_cents: Some(5000),
            low_stock_threshold: Some(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.reservation_ttl_secs, 900);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_checkout_config_uses_numbers() {
        let config = Config::default();
        let checkout = config.checkout_config();
        assert_eq!(checkout.reservation_ttl.num_seconds(), 900);
        assert_eq!(checkout.shipping_rates.standard.cents(), 500);
    }
}
