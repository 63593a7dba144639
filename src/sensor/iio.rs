/// Linux Industrial I/O (IIO) sensor channels read from sysfs
///
/// Each IIO device lives under `<root>/iio:deviceN` and exposes processed
/// values in milli-units:
/// - `in_temp_input`: ambient temperature in m°C
/// - `in_humidityrelative_input`: relative humidity in m%
///
/// The kernel does not push value changes for these attributes, so each
/// registration runs a poller task that emits an event whenever the value
/// changes.
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::sensor::channel::{
    ChannelType, SamplingRate, SensorChannels, SensorEvent, SensorListener,
};

const TEMPERATURE_ATTR: &str = "in_temp_input";
const HUMIDITY_ATTR: &str = "in_humidityrelative_input";
const MIN_POLL_MS: u64 = 100;

// Accuracy levels reported on read failure and recovery
const ACCURACY_UNRELIABLE: i32 = 0;
const ACCURACY_HIGH: i32 = 3;

/// Sensor platform backed by IIO sysfs attributes
pub struct IioSensors {
    temperature: Option<PathBuf>,
    humidity: Option<PathBuf>,
    pollers: Mutex<Vec<JoinHandle<()>>>,
}

impl IioSensors {
    /// Scan `root` for the first device exposing each attribute
    ///
    /// A missing or unreadable root simply yields no channels.
    pub fn probe(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let mut devices: Vec<PathBuf> = match fs::read_dir(root) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| {
                    path.file_name()
                        .and_then(|name| name.to_str())
                        .map(|name| name.starts_with("iio:device"))
                        .unwrap_or(false)
                })
                .collect(),
            Err(e) => {
                debug!("Cannot read IIO root {}: {}", root.display(), e);
                Vec::new()
            }
        };
        devices.sort();

        let find = |attr: &str| {
            devices
                .iter()
                .map(|device| device.join(attr))
                .find(|path| path.is_file())
        };

        let sensors = IioSensors {
            temperature: find(TEMPERATURE_ATTR),
            humidity: find(HUMIDITY_ATTR),
            pollers: Mutex::new(Vec::new()),
        };
        for (channel, path) in [
            (ChannelType::AmbientTemperature, &sensors.temperature),
            (ChannelType::RelativeHumidity, &sensors.humidity),
        ] {
            match path {
                Some(path) => info!("Found {} sensor at {}", channel, path.display()),
                None => debug!("No {} sensor under {}", channel, root.display()),
            }
        }
        sensors
    }

    fn attribute(&self, channel: ChannelType) -> Option<&PathBuf> {
        match channel {
            ChannelType::AmbientTemperature => self.temperature.as_ref(),
            ChannelType::RelativeHumidity => self.humidity.as_ref(),
            ChannelType::Other(_) => None,
        }
    }

    fn abort_pollers(&self) -> usize {
        let mut pollers = self.pollers.lock().unwrap_or_else(PoisonError::into_inner);
        let count = pollers.len();
        for handle in pollers.drain(..) {
            handle.abort();
        }
        count
    }
}

impl SensorChannels for IioSensors {
    fn is_available(&self, channel: ChannelType) -> bool {
        self.attribute(channel).is_some()
    }

    fn register(
        &self,
        channel: ChannelType,
        rate: SamplingRate,
        listener: Arc<dyn SensorListener>,
    ) -> bool {
        let path = match self.attribute(channel) {
            Some(path) => path.clone(),
            None => return false,
        };
        let period = rate.period().max(Duration::from_millis(MIN_POLL_MS));
        let handle = tokio::spawn(poll_attribute(channel, path, period, listener));
        self.pollers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
        true
    }

    fn unregister_all(&self) {
        let count = self.abort_pollers();
        if count > 0 {
            debug!("Stopped {} IIO poller(s)", count);
        }
    }
}

impl Drop for IioSensors {
    fn drop(&mut self) {
        self.abort_pollers();
    }
}

async fn poll_attribute(
    channel: ChannelType,
    path: PathBuf,
    period: Duration,
    listener: Arc<dyn SensorListener>,
) {
    let mut last: Option<f32> = None;
    let mut healthy = true;

    loop {
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => match parse_milli(&text) {
                Some(value) => {
                    if !healthy {
                        healthy = true;
                        listener.on_accuracy_changed(channel, ACCURACY_HIGH);
                    }
                    if last != Some(value) {
                        last = Some(value);
                        listener.on_value_changed(SensorEvent { channel, value });
                    }
                }
                None => {
                    warn!("Unparseable {} value in {}: {:?}", channel, path.display(), text.trim());
                }
            },
            Err(e) => {
                if healthy {
                    healthy = false;
                    warn!("Failed to read {}: {}", path.display(), e);
                    listener.on_accuracy_changed(channel, ACCURACY_UNRELIABLE);
                }
            }
        }
        sleep(period).await;
    }
}

/// Parse an IIO processed value in milli-units
fn parse_milli(text: &str) -> Option<f32> {
    text.trim().parse::<f32>().ok().map(|milli| milli / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<SensorEvent>>,
        accuracy: Mutex<Vec<i32>>,
    }

    impl Recorder {
        fn values(&self) -> Vec<f32> {
            self.events.lock().unwrap().iter().map(|e| e.value).collect()
        }
    }

    impl SensorListener for Recorder {
        fn on_value_changed(&self, event: SensorEvent) {
            self.events.lock().unwrap().push(event);
        }

        fn on_accuracy_changed(&self, _channel: ChannelType, accuracy: i32) {
            self.accuracy.lock().unwrap().push(accuracy);
        }
    }

    // Rename keeps the poller from seeing a half-written value
    fn write_attr(path: &Path, value: &str) {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value).unwrap();
        fs::rename(&tmp, path).unwrap();
    }

    async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..50 {
            if check() {
                return true;
            }
            sleep(Duration::from_millis(50)).await;
        }
        check()
    }

    #[test]
    fn parses_milli_units() {
        assert_eq!(parse_milli("21500\n"), Some(21.5));
        assert_eq!(parse_milli(" -1250 "), Some(-1.25));
        assert_eq!(parse_milli("n/a"), None);
    }

    #[test]
    fn probe_finds_attributes_per_device() {
        let root = tempfile::tempdir().unwrap();
        let dev0 = root.path().join("iio:device0");
        let dev1 = root.path().join("iio:device1");
        fs::create_dir_all(&dev0).unwrap();
        fs::create_dir_all(&dev1).unwrap();
        fs::create_dir_all(root.path().join("trigger0")).unwrap();
        fs::write(dev1.join(HUMIDITY_ATTR), "48000\n").unwrap();

        let sensors = IioSensors::probe(root.path());
        assert!(!sensors.is_available(ChannelType::AmbientTemperature));
        assert!(sensors.is_available(ChannelType::RelativeHumidity));
        assert!(!sensors.is_available(ChannelType::Other(1)));
    }

    #[test]
    fn missing_root_has_no_channels() {
        let sensors = IioSensors::probe("/nonexistent/iio/root");
        assert!(!sensors.is_available(ChannelType::AmbientTemperature));
        assert!(!sensors.is_available(ChannelType::RelativeHumidity));
    }

    #[tokio::test]
    async fn register_fails_for_missing_channel() {
        let root = tempfile::tempdir().unwrap();
        let sensors = IioSensors::probe(root.path());
        let recorder = Arc::new(Recorder::default());
        assert!(!sensors.register(
            ChannelType::AmbientTemperature,
            SamplingRate::Normal,
            recorder
        ));
    }

    #[tokio::test]
    async fn poller_emits_changes_until_unregistered() {
        let root = tempfile::tempdir().unwrap();
        let dev = root.path().join("iio:device0");
        fs::create_dir_all(&dev).unwrap();
        let attr = dev.join(TEMPERATURE_ATTR);
        fs::write(&attr, "21500\n").unwrap();

        let sensors = IioSensors::probe(root.path());
        let recorder = Arc::new(Recorder::default());
        assert!(sensors.register(
            ChannelType::AmbientTemperature,
            SamplingRate::Fastest,
            recorder.clone()
        ));

        assert!(wait_for(|| recorder.values() == vec![21.5]).await);

        write_attr(&attr, "22000\n");
        assert!(wait_for(|| recorder.values() == vec![21.5, 22.0]).await);

        sensors.unregister_all();
        sleep(Duration::from_millis(50)).await;
        write_attr(&attr, "30000\n");
        sleep(Duration::from_millis(400)).await;
        assert_eq!(recorder.values(), vec![21.5, 22.0]);
    }

    #[tokio::test]
    async fn read_failure_reports_unreliable_accuracy() {
        let root = tempfile::tempdir().unwrap();
        let dev = root.path().join("iio:device0");
        fs::create_dir_all(&dev).unwrap();
        let attr = dev.join(HUMIDITY_ATTR);
        fs::write(&attr, "50000").unwrap();

        let sensors = IioSensors::probe(root.path());
        let recorder = Arc::new(Recorder::default());
        sensors.register(
            ChannelType::RelativeHumidity,
            SamplingRate::Fastest,
            recorder.clone(),
        );
        assert!(wait_for(|| recorder.values() == vec![50.0]).await);

        fs::remove_file(&attr).unwrap();
        assert!(wait_for(|| *recorder.accuracy.lock().unwrap() == vec![ACCURACY_UNRELIABLE]).await);

        write_attr(&attr, "50000");
        assert!(
            wait_for(|| *recorder.accuracy.lock().unwrap() == vec![ACCURACY_UNRELIABLE, ACCURACY_HIGH])
                .await
        );
        // Same value as before the outage, no new event
        assert_eq!(recorder.values(), vec![50.0]);
        sensors.unregister_all();
    }
}
