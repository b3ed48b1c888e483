// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Router configuration: the YAML topology document.

use ipnet::Ipv4Net;
use net::{StackId, Vni};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::Path;

/// Default location of the router configuration.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/router/routing.yaml";

/// The static stack topology consumed at reconciliation time.
#[derive(Clone, Debug, Deserialize)]
pub struct RouterConfig {
    pub version: u32,
    pub stack_id: StackId,
    pub vni: Vni,
    pub vxlan_subnet: Ipv4Net,
    pub local_vxlan_ip: Ipv4Addr,
    pub container_subnet: Ipv4Net,
    #[serde(default)]
    pub stack_mappings: HashMap<StackId, StackMapping>,
}

/// Per-stack overlay addressing.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct StackMapping {
    pub vxlan_ip: Ipv4Addr,
    pub container_subnet: Ipv4Net,
}

impl RouterConfig {
    /// Load the configuration from `path`, applying the `STACK_ID`
    /// environment override.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is unreadable, fails to parse,
    /// or the override is not a legal stack id.  All are fatal at startup.
    pub fn load(path: &Path) -> Result<RouterConfig, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, |name| std::env::var(name).ok())
    }

    /// Parse a YAML document, taking the `STACK_ID` override from `lookup`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`RouterConfig::load`], minus the file read.
    pub fn parse(
        text: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<RouterConfig, ConfigError> {
        let mut cfg: RouterConfig = serde_yml::from_str(text)?;
        if let Some(raw) = lookup("STACK_ID").filter(|v| !v.is_empty()) {
            cfg.stack_id = StackId::try_from(raw)?;
        }
        Ok(cfg)
    }

    /// The overlay addressing of `stack_id`, if the topology knows it.
    #[must_use]
    pub fn mapping(&self, stack_id: &StackId) -> Option<&StackMapping> {
        self.stack_mappings.get(stack_id)
    }
}

/// Configuration load failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_yml::Error),
    #[error("invalid STACK_ID override: {0}")]
    Override(#[from] net::InvalidStackId),
}
