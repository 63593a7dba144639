/// BlueZ radio driver built on bluer LE advertising
use async_trait::async_trait;
use bluer::adv::{Advertisement, AdvertisementHandle, Feature, SecondaryChannel, Type};
use log::{debug, error, warn};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::mpsc;

use crate::bluetooth::driver::{
    error_codes, AdvertiseData, AdvertiseSettings, HardwareCapabilities, RadioDriver,
    StartCallback, StopCallback,
};

/// Legacy advertising data limit
const LEGACY_ADV_LEN: usize = 31;

enum Command {
    Start(AdvertiseSettings, AdvertiseData, StartCallback),
    Stop(StopCallback),
}

/// Radio driver for the default BlueZ adapter
///
/// Requests are queued to a single worker task so stop/start pairs are
/// applied in the order they were issued. The worker owns the registered
/// advertisement; dropping its handle unregisters it from BlueZ.
pub struct BluezRadio {
    adapter: bluer::Adapter,
    commands: mpsc::UnboundedSender<Command>,
    _session: bluer::Session,
}

impl BluezRadio {
    /// Connect to BlueZ and power on the default adapter
    pub async fn new() -> Result<Self, Box<dyn std::error::Error>> {
        // Initialize Bluetooth session
        let session = match bluer::Session::new().await {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to create Bluetooth session: {}", e);
                return Err(e.into());
            }
        };

        // Get the default Bluetooth adapter
        let adapter = match session.default_adapter().await {
            Ok(adapter) => adapter,
            Err(e) => {
                error!("Failed to get default Bluetooth adapter: {}", e);
                return Err(e.into());
            }
        };

        // Ensure Bluetooth adapter is powered on
        if let Err(e) = adapter.set_powered(true).await {
            error!("Failed to power on adapter: {}", e);
            return Err(e.into());
        }
        debug!("Using Bluetooth adapter {}", adapter.name());

        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(adapter.clone(), rx));

        Ok(BluezRadio {
            adapter,
            commands,
            _session: session,
        })
    }
}

#[async_trait]
impl RadioDriver for BluezRadio {
    async fn capabilities(&self) -> HardwareCapabilities {
        let max_advertising_data_len = match self.adapter.supported_advertising_capabilities().await
        {
            Ok(Some(capabilities)) => capabilities.max_advertisement_length as usize,
            Ok(None) => LEGACY_ADV_LEN,
            Err(e) => {
                warn!("Failed to query advertising capabilities: {}", e);
                LEGACY_ADV_LEN
            }
        };

        let le_2m_phy = match self.adapter.supported_advertising_secondary_channels().await {
            Ok(channels) => channels.map_or(false, |c| c.contains(&SecondaryChannel::TwoM)),
            Err(e) => {
                warn!("Failed to query secondary channels: {}", e);
                false
            }
        };

        HardwareCapabilities {
            extended_advertising: max_advertising_data_len > LEGACY_ADV_LEN,
            le_2m_phy,
            max_advertising_data_len,
        }
    }

    fn start_advertising(
        &self,
        settings: AdvertiseSettings,
        data: AdvertiseData,
        callback: StartCallback,
    ) {
        if let Err(mpsc::error::SendError(Command::Start(_, _, callback))) =
            self.commands.send(Command::Start(settings, data, callback))
        {
            callback(Err(error_codes::INTERNAL_ERROR));
        }
    }

    fn stop_advertising(&self, callback: StopCallback) {
        if let Err(mpsc::error::SendError(Command::Stop(callback))) =
            self.commands.send(Command::Stop(callback))
        {
            callback(Err(error_codes::INTERNAL_ERROR));
        }
    }
}

async fn run_worker(adapter: bluer::Adapter, mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut active: Option<AdvertisementHandle> = None;

    while let Some(command) = rx.recv().await {
        match command {
            Command::Start(settings, data, callback) => {
                // One registered advertisement at a time
                drop(active.take());
                match adapter.advertise(to_advertisement(&settings, data)).await {
                    Ok(handle) => {
                        active = Some(handle);
                        callback(Ok(settings));
                    }
                    Err(e) => {
                        debug!("BlueZ advertise error: {}", e);
                        callback(Err(error_code(&e)));
                    }
                }
            }
            Command::Stop(callback) => {
                drop(active.take());
                callback(Ok(()));
            }
        }
    }
    debug!("Radio worker exiting");
}

fn to_advertisement(settings: &AdvertiseSettings, data: AdvertiseData) -> Advertisement {
    let mut manufacturer_data = BTreeMap::new();
    manufacturer_data.insert(data.manufacturer_id, data.manufacturer_data);
    let interval = settings.mode.interval();
    let mut system_includes = BTreeSet::new();
    if data.include_tx_power {
        system_includes.insert(Feature::TxPower);
    }

    Advertisement {
        advertisement_type: if settings.connectable {
            Type::Peripheral
        } else {
            Type::Broadcast
        },
        manufacturer_data,
        local_name: data.local_name,
        system_includes,
        discoverable: Some(false),
        tx_power: Some(settings.tx_power.dbm()),
        min_interval: Some(interval),
        max_interval: Some(interval),
        secondary_channel: Some(SecondaryChannel::TwoM),
        timeout: match settings.timeout_ms {
            0 => None,
            ms => Some(std::time::Duration::from_millis(ms as u64)),
        },
        ..Default::default()
    }
}

/// Map a BlueZ error onto the numeric driver codes
fn error_code(e: &bluer::Error) -> i32 {
    match e.kind {
        bluer::ErrorKind::InvalidLength => error_codes::DATA_TOO_LARGE,
        bluer::ErrorKind::NotPermitted => error_codes::TOO_MANY_ADVERTISERS,
        bluer::ErrorKind::AlreadyExists => error_codes::ALREADY_STARTED,
        bluer::ErrorKind::NotSupported => error_codes::FEATURE_UNSUPPORTED,
        _ => error_codes::INTERNAL_ERROR,
    }
}
