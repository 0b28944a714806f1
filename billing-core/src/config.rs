use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

/// Top-level configuration for the invoicing engine.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub database: Option<DatabaseSettings>,
}

/// Engine behavior knobs.
#[derive(Debug, Deserialize, Clone)]
pub struct EngineSettings {
    /// Template for invoice numbers; `{YYYY}`, `{MM}` and `{SEQ}` are
    /// substituted at allocation time.
    #[serde(default = "default_invoice_number_format")]
    pub invoice_number_format: String,
    /// Template for receipt numbers, same placeholders.
    #[serde(default = "default_receipt_number_format")]
    pub receipt_number_format: String,
    /// Whether `discount` on an invoice is a flat amount or a 0-1
    /// fraction of the subtotal.
    #[serde(default)]
    pub discount_mode: DiscountMode,
}

/// Discount interpretation, applied before tax either way.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiscountMode {
    #[default]
    Flat,
    Percent,
}

/// Connection settings for the Postgres store.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_invoice_number_format() -> String {
    "INV-{YYYY}-{MM}-{SEQ}".to_string()
}

fn default_receipt_number_format() -> String {
    "RCT-{YYYY}-{MM}-{SEQ}".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            invoice_number_format: default_invoice_number_format(),
            receipt_number_format: default_receipt_number_format(),
            discount_mode: DiscountMode::Flat,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
