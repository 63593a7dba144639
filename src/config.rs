use log::{debug, info};
use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::bluetooth::driver::Capability;
use crate::bluetooth::session::{
    SessionOptions, DEFAULT_IDENTIFIER, DEFAULT_LOCAL_NAME, DEFAULT_MANUFACTURER_ID,
};
use crate::codec::identifier::decode_hex;

const DEFAULT_BROADCAST_INTERVAL_SECS: u64 = 30;
const DEFAULT_TICK_SECS: u64 = 5;
const DEFAULT_IIO_PATH: &str = "/sys/bus/iio/devices";
const DEFAULT_CAPABILITIES: &str = "advertise,sensors";

#[derive(Debug, Clone)]
pub struct BeaconConfig {
    /// 32-hex-character beacon identifier
    pub identifier: String,
    pub manufacturer_id: u16,
    pub local_name: Option<String>,
    /// Raw temperature/humidity to broadcast once instead of live readings
    pub fixed_values: Option<(i16, i16)>,
    pub broadcast_interval: Duration,
    pub tick_interval: Duration,
    pub iio_path: PathBuf,
    pub granted: HashSet<Capability>,
}

impl BeaconConfig {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        // Load environment variables
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Box<dyn std::error::Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let identifier = get("BEACON_IDENTIFIER").unwrap_or_else(|| DEFAULT_IDENTIFIER.to_string());
        decode_hex(&identifier).map_err(|e| format!("BEACON_IDENTIFIER: {}", e))?;

        let manufacturer_id = match get("BEACON_MANUFACTURER_ID") {
            Some(value) => parse_u16(&value)
                .ok_or_else(|| format!("BEACON_MANUFACTURER_ID: invalid company id '{}'", value))?,
            None => DEFAULT_MANUFACTURER_ID,
        };

        // An explicitly empty name drops the name from the advertisement
        let local_name = match lookup("BEACON_LOCAL_NAME") {
            Some(name) if name.trim().is_empty() => None,
            Some(name) => Some(name.trim().to_string()),
            None => Some(DEFAULT_LOCAL_NAME.to_string()),
        };

        let temperature = parse_optional::<i16>(get("BEACON_TEMPERATURE"), "BEACON_TEMPERATURE")?;
        let humidity = parse_optional::<i16>(get("BEACON_HUMIDITY"), "BEACON_HUMIDITY")?;
        let fixed_values = match (temperature, humidity) {
            (Some(t), Some(h)) => Some((t, h)),
            (None, None) => None,
            _ => {
                return Err(
                    "BEACON_TEMPERATURE and BEACON_HUMIDITY must be set together".into(),
                )
            }
        };

        let broadcast_secs = parse_optional::<u64>(
            get("BEACON_BROADCAST_INTERVAL_SECS"),
            "BEACON_BROADCAST_INTERVAL_SECS",
        )?
        .unwrap_or(DEFAULT_BROADCAST_INTERVAL_SECS);
        let tick_secs = parse_optional::<u64>(get("SENSOR_TICK_SECS"), "SENSOR_TICK_SECS")?
            .unwrap_or(DEFAULT_TICK_SECS);
        if broadcast_secs == 0 || tick_secs == 0 {
            return Err("Intervals must be at least one second".into());
        }

        let iio_path = PathBuf::from(get("SENSOR_IIO_PATH").unwrap_or_else(|| DEFAULT_IIO_PATH.to_string()));

        let mut granted = HashSet::new();
        let capabilities = lookup("BEACON_GRANTED_CAPABILITIES")
            .unwrap_or_else(|| DEFAULT_CAPABILITIES.to_string());
        for name in capabilities.split(',') {
            if name.trim().is_empty() {
                continue;
            }
            let capability = name
                .parse::<Capability>()
                .map_err(|e| format!("BEACON_GRANTED_CAPABILITIES: {}", e))?;
            debug!("Granted capability: {}", capability);
            granted.insert(capability);
        }

        info!(
            "Beacon {} (company id {}), {}",
            identifier,
            manufacturer_id,
            match fixed_values {
                Some((t, h)) => format!("fixed values {} / {}", t, h),
                None => format!("live readings every {} s", broadcast_secs),
            }
        );

        Ok(BeaconConfig {
            identifier,
            manufacturer_id,
            local_name,
            fixed_values,
            broadcast_interval: Duration::from_secs(broadcast_secs),
            tick_interval: Duration::from_secs(tick_secs),
            iio_path,
            granted,
        })
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            identifier: self.identifier.clone(),
            manufacturer_id: self.manufacturer_id,
            local_name: self.local_name.clone(),
        }
    }
}

fn parse_optional<T: FromStr>(
    value: Option<String>,
    key: &str,
) -> Result<Option<T>, Box<dyn std::error::Error>> {
    match value {
        Some(value) => match value.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(format!("{}: invalid value '{}'", key, value).into()),
        },
        None => Ok(None),
    }
}

/// Decimal or 0x-prefixed hex
fn parse_u16(value: &str) -> Option<u16> {
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}
