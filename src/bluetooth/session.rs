/// Lifecycle of the outbound beacon advertisement
use log::{debug, error, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::bluetooth::driver::{
    error_codes, AdvertiseData, AdvertiseMode, AdvertiseSettings, Capability, PermissionAuthority,
    RadioDriver, TxPower,
};
use crate::codec::identifier::{decode_hex, BeaconId};
use crate::codec::payload::encode_advertisement;
use crate::error::BeaconError;

/// Service identifier carried in the advertisement
pub const DEFAULT_IDENTIFIER: &str = "6ef0e30d73084458b62ef706c692ca77";
/// Company identifier keying the manufacturer data (0x004C)
pub const DEFAULT_MANUFACTURER_ID: u16 = 76;
pub const DEFAULT_LOCAL_NAME: &str = "NA";

/// Fixed parameters for every advertisement: non-connectable, no timeout
const BEACON_SETTINGS: AdvertiseSettings = AdvertiseSettings {
    mode: AdvertiseMode::LowPower,
    connectable: false,
    timeout_ms: 0,
    tx_power: TxPower::Medium,
};

/// Where the current advertisement stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvertiseStatus {
    Idle,
    /// Handed to the driver, outcome pending
    Starting,
    Advertising(AdvertiseSettings),
    Failed(BeaconError),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// 32-hex-character identifier
    pub identifier: String,
    pub manufacturer_id: u16,
    pub local_name: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            identifier: DEFAULT_IDENTIFIER.to_string(),
            manufacturer_id: DEFAULT_MANUFACTURER_ID,
            local_name: Some(DEFAULT_LOCAL_NAME.to_string()),
        }
    }
}

/// Owner of at most one running advertisement
///
/// A new `start` supersedes the previous advertisement: the driver is asked
/// to stop first, and outcomes of superseded requests are ignored.
pub struct BroadcastSession {
    driver: Arc<dyn RadioDriver>,
    permissions: Arc<dyn PermissionAuthority>,
    options: SessionOptions,
    status: Arc<watch::Sender<AdvertiseStatus>>,
    attempt: Arc<AtomicU64>,
}

impl BroadcastSession {
    pub fn new(
        driver: Arc<dyn RadioDriver>,
        permissions: Arc<dyn PermissionAuthority>,
        options: SessionOptions,
    ) -> Self {
        let (status, _) = watch::channel(AdvertiseStatus::Idle);
        BroadcastSession {
            driver,
            permissions,
            options,
            status: Arc::new(status),
            attempt: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn status(&self) -> AdvertiseStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AdvertiseStatus> {
        self.status.subscribe()
    }

    /// Broadcast temperature and humidity in raw units
    ///
    /// Returns once the request is handed to the driver. Permission,
    /// hardware and identifier problems fail here without touching the
    /// radio; the driver's own outcome arrives later through `status()`.
    pub async fn start(&self, temperature: i16, humidity: i16) -> Result<(), BeaconError> {
        if !self.permissions.is_granted(Capability::Advertise) {
            error!("Advertise permission not granted");
            return Err(BeaconError::PermissionDenied(Capability::Advertise));
        }

        let capabilities = self.driver.capabilities().await;
        debug!(
            "Max advertising data length: {}",
            capabilities.max_advertising_data_len
        );
        if !capabilities.le_2m_phy {
            error!("2M PHY not supported");
            return Err(BeaconError::UnsupportedHardware(
                "LE 2M PHY not supported".to_string(),
            ));
        }
        if !capabilities.extended_advertising {
            error!("LE extended advertising not supported");
            return Err(BeaconError::UnsupportedHardware(
                "LE extended advertising not supported".to_string(),
            ));
        }

        let identifier = BeaconId(decode_hex(&self.options.identifier)?);
        let payload = encode_advertisement(&identifier, temperature, humidity);
        let data = AdvertiseData {
            manufacturer_id: self.options.manufacturer_id,
            manufacturer_data: payload.to_vec(),
            local_name: self.options.local_name.clone(),
            include_tx_power: false,
        };

        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        self.status.send_replace(AdvertiseStatus::Starting);

        self.driver.stop_advertising(Box::new(|result: Result<(), i32>| match result {
            Ok(()) => debug!("Previous advertisement stopped"),
            Err(code) => debug!("Stopping previous advertisement failed: {}", code),
        }));

        let status = self.status.clone();
        let current = self.attempt.clone();
        self.driver.start_advertising(
            BEACON_SETTINGS,
            data,
            Box::new(move |result: Result<AdvertiseSettings, i32>| {
                if current.load(Ordering::SeqCst) != attempt {
                    debug!("Ignoring outcome of superseded advertisement {}", attempt);
                    return;
                }
                match result {
                    Ok(settings) => {
                        info!("Advertising started ({:?}, {:?})", settings.mode, settings.tx_power);
                        status.send_replace(AdvertiseStatus::Advertising(settings));
                    }
                    Err(code) => {
                        error!("Failed to start advertising: {}", code);
                        status.send_replace(AdvertiseStatus::Failed(BeaconError::DriverFailure(
                            code,
                        )));
                    }
                }
            }),
        );

        info!(
            "Advertisement requested: identifier={}, temperature={}, humidity={}",
            identifier, temperature, humidity
        );
        Ok(())
    }

    /// Wait for the driver's verdict on the latest `start`
    ///
    /// Resolves immediately if the outcome is already known. An idle session
    /// reports `DriverFailure` with the internal-error code.
    pub async fn wait_outcome(&self) -> Result<AdvertiseSettings, BeaconError> {
        let mut rx = self.status.subscribe();
        let status = match rx
            .wait_for(|status| !matches!(status, AdvertiseStatus::Starting))
            .await
        {
            Ok(status) => status.clone(),
            Err(_) => AdvertiseStatus::Idle,
        };
        match status {
            AdvertiseStatus::Advertising(settings) => Ok(settings),
            AdvertiseStatus::Failed(e) => Err(e),
            AdvertiseStatus::Idle | AdvertiseStatus::Starting => {
                Err(BeaconError::DriverFailure(error_codes::INTERNAL_ERROR))
            }
        }
    }

    /// Stop the current advertisement, best effort
    pub fn stop(&self) {
        self.attempt.fetch_add(1, Ordering::SeqCst);
        self.status.send_replace(AdvertiseStatus::Idle);
        self.driver.stop_advertising(Box::new(|result: Result<(), i32>| match result {
            Ok(()) => debug!("Advertisement stopped"),
            Err(code) => debug!("Failed to stop advertisement: {}", code),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::driver::{
        HardwareCapabilities, StartCallback, StaticPermissions, StopCallback,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Stop,
        Start(AdvertiseSettings, AdvertiseData),
    }

    /// Radio that records calls and holds start callbacks until released
    struct FakeRadio {
        capabilities: HardwareCapabilities,
        calls: Mutex<Vec<Call>>,
        pending: Mutex<Vec<(AdvertiseSettings, StartCallback)>>,
    }

    impl FakeRadio {
        fn new(capabilities: HardwareCapabilities) -> Arc<Self> {
            Arc::new(FakeRadio {
                capabilities,
                calls: Mutex::new(Vec::new()),
                pending: Mutex::new(Vec::new()),
            })
        }

        fn capable() -> Arc<Self> {
            Self::new(HardwareCapabilities {
                extended_advertising: true,
                le_2m_phy: true,
                max_advertising_data_len: 251,
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn starts(&self) -> usize {
            self.calls()
                .iter()
                .filter(|call| matches!(call, Call::Start(..)))
                .count()
        }

        /// Complete the oldest pending start
        fn complete(&self, result: Result<(), i32>) {
            let (settings, callback) = self.pending.lock().unwrap().remove(0);
            callback(result.map(|_| settings));
        }
    }

    #[async_trait]
    impl RadioDriver for FakeRadio {
        async fn capabilities(&self) -> HardwareCapabilities {
            self.capabilities
        }

        fn start_advertising(
            &self,
            settings: AdvertiseSettings,
            data: AdvertiseData,
            callback: StartCallback,
        ) {
            self.calls.lock().unwrap().push(Call::Start(settings, data));
            self.pending.lock().unwrap().push((settings, callback));
        }

        fn stop_advertising(&self, callback: StopCallback) {
            self.calls.lock().unwrap().push(Call::Stop);
            callback(Ok(()));
        }
    }

    fn session_with(radio: Arc<FakeRadio>, granted: &[Capability]) -> BroadcastSession {
        BroadcastSession::new(
            radio,
            Arc::new(StaticPermissions::new(granted.iter().copied())),
            SessionOptions::default(),
        )
    }

    #[tokio::test]
    async fn permission_denied_never_touches_radio() {
        let radio = FakeRadio::capable();
        let session = session_with(radio.clone(), &[Capability::Sensors]);

        let result = session.start(250, 600).await;
        assert_eq!(
            result,
            Err(BeaconError::PermissionDenied(Capability::Advertise))
        );
        assert!(radio.calls().is_empty());
        assert_eq!(session.status(), AdvertiseStatus::Idle);
    }

    #[tokio::test]
    async fn missing_2m_phy_is_unsupported() {
        let radio = FakeRadio::new(HardwareCapabilities {
            extended_advertising: true,
            le_2m_phy: false,
            max_advertising_data_len: 251,
        });
        let session = session_with(radio.clone(), &[Capability::Advertise]);

        assert!(matches!(
            session.start(250, 600).await,
            Err(BeaconError::UnsupportedHardware(_))
        ));
        assert!(radio.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_extended_advertising_is_unsupported() {
        let radio = FakeRadio::new(HardwareCapabilities {
            extended_advertising: false,
            le_2m_phy: true,
            max_advertising_data_len: 31,
        });
        let session = session_with(radio.clone(), &[Capability::Advertise]);

        assert!(matches!(
            session.start(250, 600).await,
            Err(BeaconError::UnsupportedHardware(_))
        ));
        assert_eq!(radio.starts(), 0);
    }

    #[tokio::test]
    async fn invalid_identifier_fails_before_transmission() {
        let radio = FakeRadio::capable();
        let session = BroadcastSession::new(
            radio.clone(),
            Arc::new(StaticPermissions::new([Capability::Advertise])),
            SessionOptions {
                identifier: "not-hex".to_string(),
                ..Default::default()
            },
        );

        assert!(matches!(
            session.start(1, 2).await,
            Err(BeaconError::InvalidIdentifier(_))
        ));
        assert!(radio.calls().is_empty());
    }

    #[tokio::test]
    async fn start_stops_previous_then_advertises_payload() {
        let radio = FakeRadio::capable();
        let session = session_with(radio.clone(), &[Capability::Advertise]);

        session.start(250, 600).await.unwrap();
        assert_eq!(session.status(), AdvertiseStatus::Starting);

        let calls = radio.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], Call::Stop);
        let (settings, data) = match &calls[1] {
            Call::Start(settings, data) => (*settings, data.clone()),
            other => panic!("unexpected call {:?}", other),
        };
        assert_eq!(settings.mode, AdvertiseMode::LowPower);
        assert!(!settings.connectable);
        assert_eq!(settings.timeout_ms, 0);
        assert_eq!(settings.tx_power, TxPower::Medium);

        assert_eq!(data.manufacturer_id, 76);
        assert_eq!(data.local_name.as_deref(), Some("NA"));
        assert!(!data.include_tx_power);
        let expected_id = decode_hex(DEFAULT_IDENTIFIER).unwrap();
        let payload = &data.manufacturer_data;
        assert_eq!(payload.len(), 23);
        assert_eq!(&payload[..2], &[0x02, 0x15]);
        assert_eq!(&payload[2..18], &expected_id);
        assert_eq!(&payload[18..22], &[0x00, 0xFA, 0x02, 0x58]);
        assert_eq!(payload[22], 0x76);

        radio.complete(Ok(()));
        assert_eq!(session.status(), AdvertiseStatus::Advertising(settings));
        assert_eq!(session.wait_outcome().await, Ok(settings));
    }

    #[tokio::test]
    async fn driver_failure_surfaces_code() {
        let radio = FakeRadio::capable();
        let session = session_with(radio.clone(), &[Capability::Advertise]);

        session.start(10, 20).await.unwrap();
        radio.complete(Err(error_codes::TOO_MANY_ADVERTISERS));

        assert_eq!(
            session.wait_outcome().await,
            Err(BeaconError::DriverFailure(error_codes::TOO_MANY_ADVERTISERS))
        );
        // Not retried
        assert_eq!(radio.starts(), 1);
    }

    #[tokio::test]
    async fn wait_outcome_follows_async_callback() {
        let radio = FakeRadio::capable();
        let session = Arc::new(session_with(radio.clone(), &[Capability::Advertise]));
        session.start(10, 20).await.unwrap();

        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.wait_outcome().await })
        };
        tokio::task::yield_now().await;
        radio.complete(Ok(()));

        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn new_start_supersedes_previous() {
        let radio = FakeRadio::capable();
        let session = session_with(radio.clone(), &[Capability::Advertise]);

        session.start(1, 1).await.unwrap();
        session.start(2, 2).await.unwrap();
        let stops = radio.calls().iter().filter(|c| **c == Call::Stop).count();
        assert_eq!(stops, 2);
        assert_eq!(radio.starts(), 2);

        // The first request failing late must not clobber the second
        radio.complete(Err(error_codes::INTERNAL_ERROR));
        assert_eq!(session.status(), AdvertiseStatus::Starting);
        radio.complete(Ok(()));
        assert!(matches!(session.status(), AdvertiseStatus::Advertising(_)));
    }

    #[tokio::test]
    async fn stop_returns_to_idle() {
        let radio = FakeRadio::capable();
        let session = session_with(radio.clone(), &[Capability::Advertise]);
        session.start(1, 1).await.unwrap();
        session.stop();

        assert_eq!(session.status(), AdvertiseStatus::Idle);
        assert_eq!(radio.calls().last(), Some(&Call::Stop));
        // Late success after stop is ignored
        radio.complete(Ok(()));
        assert_eq!(session.status(), AdvertiseStatus::Idle);
        assert!(session.wait_outcome().await.is_err());
    }
}
