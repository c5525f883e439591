//! Gateway configuration (TOML).
//!
//! ```toml
//! controller = "admin"
//! fee_scalar = 2
//! default_gas_budget = 1000000
//! fee_vault = "vault"
//! ```
//!
//! Every field is optional; omitted fields take [`GatewayConfig::default`].

use crate::fee::{FeeSchedule, DEFAULT_GAS_BUDGET};
use crate::types::AccountId;
use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Static parameters a gateway starts from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Account allowed to change fee parameters.
    pub controller: AccountId,
    /// Initial fee scalar (0 disables scaling).
    pub fee_scalar: u64,
    /// Gas budget metered when a submission omits one.
    pub default_gas_budget: u64,
    /// Account receiving fees; `None` keeps fees in escrow.
    pub fee_vault: Option<AccountId>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            controller: AccountId::new("controller"),
            fee_scalar: 0,
            default_gas_budget: DEFAULT_GAS_BUDGET,
            fee_vault: None,
        }
    }
}

impl GatewayConfig {
    /// Parse and validate TOML text.
    pub fn from_toml_str(src: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(src).context("parse gateway config toml")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and validate a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let src = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_toml_str(&src).with_context(|| format!("load config {}", path.display()))
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serialize gateway config toml")
    }

    /// Reject configurations no gateway can run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.controller.as_str().is_empty(),
            "controller must not be empty"
        );
        ensure!(
            self.default_gas_budget > 0,
            "default_gas_budget must be positive"
        );
        Ok(())
    }

    /// Fee parameters derived from this config.
    #[must_use]
    pub const fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule {
            scalar: self.fee_scalar,
            default_gas_budget: self.default_gas_budget,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omitted_fields_take_defaults() {
        let cfg = GatewayConfig::from_toml_str("controller = \"ops\"\n").unwrap();
        assert_eq!(cfg.controller, AccountId::new("ops"));
        assert_eq!(cfg.default_gas_budget, DEFAULT_GAS_BUDGET);
        assert_eq!(cfg.fee_scalar, 0);
        assert!(cfg.fee_vault.is_none());
    }

    #[test]
    fn full_config_parses() {
        let cfg = GatewayConfig::from_toml_str(
            r#"
            controller = "admin"
            fee_scalar = 2
            default_gas_budget = 500
            fee_vault = "vault"
            "#,
        )
        .unwrap();
        assert_eq!(
            cfg.fee_schedule(),
            FeeSchedule {
                scalar: 2,
                default_gas_budget: 500
            }
        );
        assert_eq!(cfg.fee_vault, Some(AccountId::new("vault")));

        let again = GatewayConfig::from_toml_str(&cfg.to_toml_string().unwrap()).unwrap();
        assert_eq!(again, cfg);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(GatewayConfig::from_toml_str("default_gas_budget = 0").is_err());
        assert!(GatewayConfig::from_toml_str("controller = \"\"").is_err());
        assert!(GatewayConfig::from_toml_str("unknown = 1").is_err());
    }
}
