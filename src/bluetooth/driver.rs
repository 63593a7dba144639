/// Boundary to the platform radio and permission authority
///
/// Both collaborators are owned by the host: the core only asks whether a
/// capability is granted and hands finished advertisements to the driver.
/// Driver outcomes arrive later through callbacks, on the driver's own task.
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Numeric failure codes reported by a radio driver
pub mod error_codes {
    pub const DATA_TOO_LARGE: i32 = 1;
    pub const TOO_MANY_ADVERTISERS: i32 = 2;
    pub const ALREADY_STARTED: i32 = 3;
    pub const INTERNAL_ERROR: i32 = 4;
    pub const FEATURE_UNSUPPORTED: i32 = 5;
}

/// Capability the host may or may not have granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Broadcasting advertisements
    Advertise,
    /// Reading environmental sensors
    Sensors,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Advertise => write!(f, "advertise"),
            Capability::Sensors => write!(f, "sensors"),
        }
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "advertise" => Ok(Capability::Advertise),
            "sensors" => Ok(Capability::Sensors),
            other => Err(format!("unknown capability '{}'", other)),
        }
    }
}

pub trait PermissionAuthority: Send + Sync {
    fn is_granted(&self, capability: Capability) -> bool;
}

/// Permission authority with a fixed set of granted capabilities
#[derive(Debug, Clone, Default)]
pub struct StaticPermissions {
    granted: HashSet<Capability>,
}

impl StaticPermissions {
    pub fn new(granted: impl IntoIterator<Item = Capability>) -> Self {
        StaticPermissions {
            granted: granted.into_iter().collect(),
        }
    }
}

impl PermissionAuthority for StaticPermissions {
    fn is_granted(&self, capability: Capability) -> bool {
        self.granted.contains(&capability)
    }
}

/// Advertising interval trade-off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseMode {
    LowPower,
    Balanced,
    LowLatency,
}

impl AdvertiseMode {
    /// Nominal interval between advertising events
    pub fn interval(&self) -> Duration {
        match self {
            AdvertiseMode::LowPower => Duration::from_millis(1000),
            AdvertiseMode::Balanced => Duration::from_millis(250),
            AdvertiseMode::LowLatency => Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPower {
    UltraLow,
    Low,
    Medium,
    High,
}

impl TxPower {
    /// Transmit power level in dBm
    pub fn dbm(&self) -> i16 {
        match self {
            TxPower::UltraLow => -21,
            TxPower::Low => -15,
            TxPower::Medium => -7,
            TxPower::High => 1,
        }
    }
}

/// Settings requested for one advertisement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertiseSettings {
    pub mode: AdvertiseMode,
    pub connectable: bool,
    /// 0 advertises until stopped
    pub timeout_ms: u32,
    pub tx_power: TxPower,
}

/// Content of one advertisement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertiseData {
    pub manufacturer_id: u16,
    pub manufacturer_data: Vec<u8>,
    pub local_name: Option<String>,
    pub include_tx_power: bool,
}

/// Advertising features reported by the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HardwareCapabilities {
    /// Advertising data beyond the 31-byte legacy limit
    pub extended_advertising: bool,
    /// LE 2M physical layer
    pub le_2m_phy: bool,
    pub max_advertising_data_len: usize,
}

/// Outcome of a start request: effective settings or a numeric error code
pub type StartCallback = Box<dyn FnOnce(Result<AdvertiseSettings, i32>) + Send + 'static>;

/// Outcome of a stop request
pub type StopCallback = Box<dyn FnOnce(Result<(), i32>) + Send + 'static>;

/// Radio that can broadcast advertisements
///
/// `start_advertising` and `stop_advertising` return immediately; requests
/// are applied in call order and their outcome is delivered to the callback.
#[async_trait]
pub trait RadioDriver: Send + Sync {
    async fn capabilities(&self) -> HardwareCapabilities;

    fn start_advertising(
        &self,
        settings: AdvertiseSettings,
        data: AdvertiseData,
        callback: StartCallback,
    );

    fn stop_advertising(&self, callback: StopCallback);
}
