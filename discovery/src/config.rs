// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Environment configuration of the discovery daemon.

use net::{StackId, Vni};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

/// Default data directory holding the discovery file.
pub const DEFAULT_DATA_DIR: &str = "/var/lib/docker-router";
/// Default multicast group for peer discovery.
pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(239, 1, 1, 1);
/// Default UDP port of the discovery channel.
pub const DEFAULT_PORT: u16 = 4790;
/// Default interval between announcements.
pub const DEFAULT_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(30);
/// Default age past which a quiet peer is expired.
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(90);

/// Validated discovery daemon configuration.
#[derive(Clone, Debug)]
pub struct DiscoveryConfig {
    pub stack_id: StackId,
    pub vni: Vni,
    pub data_dir: PathBuf,
    pub multicast_group: Ipv4Addr,
    pub port: u16,
    pub announce_interval: Duration,
    pub peer_timeout: Duration,
}

impl DiscoveryConfig {
    /// Read the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or any
    /// value fails validation.
    pub fn from_env() -> Result<DiscoveryConfig, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup` (tests inject a map here).
    ///
    /// # Errors
    ///
    /// Same conditions as [`DiscoveryConfig::from_env`].
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<DiscoveryConfig, ConfigError> {
        let stack_id = required(&lookup, "STACK_ID")?;
        let stack_id = StackId::try_from(stack_id).map_err(|err| invalid("STACK_ID", err))?;

        let vni: u32 = parse(&lookup, "VNI")?.ok_or(ConfigError::Missing("VNI"))?;
        let vni = Vni::new_checked(vni).map_err(|err| invalid("VNI", err))?;

        let data_dir = lookup("DATA_DIR")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());

        let multicast_group = parse(&lookup, "MULTICAST_GROUP")?.unwrap_or(DEFAULT_GROUP);
        if !multicast_group.is_multicast() {
            return Err(invalid(
                "MULTICAST_GROUP",
                format!("{multicast_group} is not a multicast address"),
            ));
        }

        let port = parse(&lookup, "DISCOVERY_PORT")?.unwrap_or(DEFAULT_PORT);

        let announce_interval = seconds(&lookup, "ANNOUNCE_INTERVAL", DEFAULT_ANNOUNCE_INTERVAL)?;
        let peer_timeout = seconds(&lookup, "PEER_TIMEOUT", DEFAULT_PEER_TIMEOUT)?;

        Ok(DiscoveryConfig {
            stack_id,
            vni,
            data_dir: PathBuf::from(data_dir),
            multicast_group,
            port,
            announce_interval,
            peer_timeout,
        })
    }
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    lookup(name)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(name).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|err| invalid(name, err)),
    }
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match parse::<u64>(lookup, name)? {
        None => Ok(default),
        Some(0) => Err(invalid(name, "must be greater than zero")),
        Some(secs) => Ok(Duration::from_secs(secs)),
    }
}

fn invalid(name: &'static str, message: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        name,
        message: message.to_string(),
    }
}

/// Configuration errors; all fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid {name}: {message}")]
    Invalid {
        name: &'static str,
        message: String,
    },
}
