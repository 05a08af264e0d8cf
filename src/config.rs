//! Runtime configuration, resolved once from the environment at startup.
//!
//! Constructors receive a [`Config`]; nothing else reads `std::env`.
//! `Debug` redacts secrets and error messages name the variable, never its value.

use std::net::IpAddr;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

use crate::domain::aggregates::Pricing;

#[derive(Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub port: u16,
    pub paystack_secret_key: String,
    pub paystack_base_url: String,
    pub paystack_callback_url: Option<String>,
    pub admin_api_token: String,
    pub nats_url: Option<String>,
    pub currency: String,
    pub shipping_flat_fee: i64,
    pub free_shipping_threshold: i64,
    pub payment_window_minutes: i64,
    pub sweep_interval_secs: u64,
    pub sweep_batch_size: i64,
    pub return_window_days: i64,
    pub rate_limit_per_minute: u32,
    /// Peers whose `X-Forwarded-For` header is believed.
    pub trusted_proxies: Vec<IpAddr>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url.as_ref().map(|_| "<REDACTED>"))
            .field("port", &self.port)
            .field("paystack_secret_key", &"<REDACTED>")
            .field("paystack_base_url", &self.paystack_base_url)
            .field("paystack_callback_url", &self.paystack_callback_url)
            .field("admin_api_token", &"<REDACTED>")
            .field("nats_url", &self.nats_url)
            .field("currency", &self.currency)
            .field("shipping_flat_fee", &self.shipping_flat_fee)
            .field("free_shipping_threshold", &self.free_shipping_threshold)
            .field("payment_window_minutes", &self.payment_window_minutes)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .field("sweep_batch_size", &self.sweep_batch_size)
            .field("return_window_days", &self.return_window_days)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("trusted_proxies", &self.trusted_proxies)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| get(key).ok_or_else(|| anyhow!("{} must be set", key));
        fn parsed<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            match value {
                Some(v) => v.parse().with_context(|| format!("{} is not a valid value", key)),
                None => Ok(default),
            }
        }

        Ok(Self {
            database_url: get("DATABASE_URL"),
            port: parsed(get("PORT"), "PORT", 8083)?,
            paystack_secret_key: required("PAYSTACK_SECRET_KEY")?,
            paystack_base_url: get("PAYSTACK_BASE_URL").unwrap_or_else(|| crate::gateway::paystack::DEFAULT_BASE_URL.to_string()),
            paystack_callback_url: get("PAYSTACK_CALLBACK_URL"),
            admin_api_token: required("ADMIN_API_TOKEN")?,
            nats_url: get("NATS_URL"),
            currency: get("STORE_CURRENCY").unwrap_or_else(|| "NGN".to_string()).to_uppercase(),
            shipping_flat_fee: parsed(get("SHIPPING_FLAT_FEE"), "SHIPPING_FLAT_FEE", 150_000)?,
            free_shipping_threshold: parsed(get("FREE_SHIPPING_THRESHOLD"), "FREE_SHIPPING_THRESHOLD", 5_000_000)?,
            payment_window_minutes: parsed(get("PAYMENT_WINDOW_MINUTES"), "PAYMENT_WINDOW_MINUTES", 60)?,
            sweep_interval_secs: parsed(get("SWEEP_INTERVAL_SECS"), "SWEEP_INTERVAL_SECS", 300)?,
            sweep_batch_size: parsed(get("SWEEP_BATCH_SIZE"), "SWEEP_BATCH_SIZE", 100_i64)?.max(1),
            return_window_days: parsed(get("RETURN_WINDOW_DAYS"), "RETURN_WINDOW_DAYS", 14)?,
            rate_limit_per_minute: parsed(get("RATE_LIMIT_PER_MINUTE"), "RATE_LIMIT_PER_MINUTE", 30)?,
            trusted_proxies: get("TRUSTED_PROXIES").map(|v| proxy_list(&v)).transpose()?.unwrap_or_default(),
        })
    }

    pub fn pricing(&self) -> Pricing {
        Pricing {
            currency: self.currency.clone(),
            shipping_flat_fee: self.shipping_flat_fee,
            free_shipping_threshold: self.free_shipping_threshold,
        }
    }

    /// Defaults suitable for tests and local runs without a database.
    pub fn for_tests() -> Self {
        Self {
            database_url: None,
            port: 0,
            paystack_secret_key: "sk_test_secret".into(),
            paystack_base_url: crate::gateway::paystack::DEFAULT_BASE_URL.into(),
            paystack_callback_url: None,
            admin_api_token: "admin-token".into(),
            nats_url: None,
            currency: "NGN".into(),
            shipping_flat_fee: 150_000,
            free_shipping_threshold: 5_000_000,
            payment_window_minutes: 60,
            sweep_interval_secs: 300,
            sweep_batch_size: 100,
            return_window_days: 14,
            rate_limit_per_minute: 1_000,
            trusted_proxies: Vec::new(),
        }
    }
}

/// Comma-separated IP addresses, e.g. `10.0.0.2, 10.0.0.3`.
fn proxy_list(raw: &str) -> Result<Vec<IpAddr>> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.parse::<IpAddr>().with_context(|| format!("TRUSTED_PROXIES entry {:?} is not an IP address", v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults_apply() {
        let cfg = Config::from_lookup(lookup(&[("PAYSTACK_SECRET_KEY", "sk"), ("ADMIN_API_TOKEN", "t")])).unwrap();
        assert_eq!(cfg.port, 8083);
        assert_eq!(cfg.currency, "NGN");
        assert_eq!(cfg.shipping_flat_fee, 150_000);
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn test_missing_secret_names_the_variable() {
        let err = Config::from_lookup(lookup(&[("ADMIN_API_TOKEN", "t")])).unwrap_err();
        assert!(err.to_string().contains("PAYSTACK_SECRET_KEY"));
    }

    #[test]
    fn test_bad_number_is_rejected() {
        let err = Config::from_lookup(lookup(&[("PAYSTACK_SECRET_KEY", "sk"), ("ADMIN_API_TOKEN", "t"), ("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_trusted_proxies_parse() {
        let cfg = Config::from_lookup(lookup(&[
            ("PAYSTACK_SECRET_KEY", "sk"), ("ADMIN_API_TOKEN", "t"), ("TRUSTED_PROXIES", "10.0.0.2, ::1,"),
        ])).unwrap();
        assert_eq!(cfg.trusted_proxies, vec!["10.0.0.2".parse::<IpAddr>().unwrap(), "::1".parse().unwrap()]);

        let none = Config::from_lookup(lookup(&[("PAYSTACK_SECRET_KEY", "sk"), ("ADMIN_API_TOKEN", "t")])).unwrap();
        assert!(none.trusted_proxies.is_empty());

        let err = Config::from_lookup(lookup(&[("PAYSTACK_SECRET_KEY", "sk"), ("ADMIN_API_TOKEN", "t"), ("TRUSTED_PROXIES", "lb.internal")])).unwrap_err();
        assert!(err.to_string().contains("TRUSTED_PROXIES"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let cfg = Config::from_lookup(lookup(&[("PAYSTACK_SECRET_KEY", "sk_live_zzz"), ("ADMIN_API_TOKEN", "tok_yyy")])).unwrap();
        let shown = format!("{:?}", cfg);
        assert!(!shown.contains("sk_live_zzz"));
        assert!(!shown.contains("tok_yyy"));
    }
}
