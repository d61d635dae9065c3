use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;
use rust_decimal::Decimal;

use crate::application::ServiceConfig;

/// Runtime settings, read from flags or `TELLER_*` environment variables.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Database file path
    #[arg(long, env = "TELLER_DATABASE", default_value = "teller.db")]
    pub database: String,

    /// How long to wait for a locked database, in milliseconds
    #[arg(long, env = "TELLER_BUSY_TIMEOUT_MS", default_value_t = 5_000)]
    pub busy_timeout_ms: u64,

    /// Currency exchange fee as a fraction of the amount (0.01 = 1%)
    #[arg(long, env = "TELLER_EXCHANGE_FEE", default_value = "0.01")]
    pub exchange_fee: Decimal,

    /// Emit log records as JSON
    #[arg(long, env = "TELLER_LOG_JSON")]
    pub log_json: bool,
}

impl Settings {
    pub fn service_config(&self) -> Result<ServiceConfig> {
        if self.exchange_fee < Decimal::ZERO || self.exchange_fee >= Decimal::ONE {
            bail!(
                "Exchange fee must be between 0 and 1, got {}",
                self.exchange_fee
            );
        }

        Ok(ServiceConfig {
            exchange_fee_rate: self.exchange_fee,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        settings: Settings,
    }

    #[test]
    fn test_defaults() {
        let harness = Harness::try_parse_from(["teller"]).unwrap();
        let config = harness.settings.service_config().unwrap();
        assert_eq!(config.exchange_fee_rate, Decimal::new(1, 2));
        assert_eq!(config.busy_timeout, Duration::from_millis(5_000));
    }

    #[test]
    fn test_flags_override_defaults() {
        let harness = Harness::try_parse_from([
            "teller",
            "--database",
            "/tmp/other.db",
            "--exchange-fee",
            "0.025",
            "--busy-timeout-ms",
            "250",
        ])
        .unwrap();

        assert_eq!(harness.settings.database, "/tmp/other.db");
        let config = harness.settings.service_config().unwrap();
        assert_eq!(config.exchange_fee_rate, Decimal::new(25, 3));
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_rejects_out_of_range_fee() {
        let harness = Harness::try_parse_from(["teller", "--exchange-fee", "1.5"]).unwrap();
        assert!(harness.settings.service_config().is_err());
    }
}
