/// Temperature/humidity source with live hardware and simulated fallback
///
/// `start()` probes the hardware channels once. If at least one channel
/// registers, readings follow hardware events; otherwise a random-walk
/// simulator publishes a reading on every tick. Consumers see only the most
/// recent reading through a watch channel.
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::models::SensorReading;
use crate::sensor::channel::{
    ChannelType, SamplingRate, SensorChannels, SensorEvent, SensorListener,
};
use crate::utils::format_millis;

// Simulator bounds and step sizes
const TEMPERATURE_RANGE: (f32, f32) = (15.0, 45.0);
const HUMIDITY_RANGE: (f32, f32) = (20.0, 90.0);
const TEMPERATURE_STEP: f32 = 1.0;
const HUMIDITY_STEP: f32 = 2.5;

const DEFAULT_TICK_SECS: u64 = 5;
const DEFAULT_TEMPERATURE: f32 = 25.0;
const DEFAULT_HUMIDITY: f32 = 50.0;

const CHANNELS: [ChannelType; 2] = [ChannelType::AmbientTemperature, ChannelType::RelativeHumidity];

/// Sampling state of a [`SensorSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Idle,
    Probing,
    LiveSensors,
    SimulatedMock,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceState::Idle => write!(f, "Idle"),
            SourceState::Probing => write!(f, "Probing"),
            SourceState::LiveSensors => write!(f, "LiveSensors"),
            SourceState::SimulatedMock => write!(f, "SimulatedMock"),
        }
    }
}

/// Tuning for a [`SensorSource`]
#[derive(Debug, Clone)]
pub struct SourceOptions {
    /// Delay between simulator ticks
    pub tick_interval: Duration,
    /// Hint passed to hardware channel registration
    pub sampling_rate: SamplingRate,
    /// Held temperature until a channel or the simulator replaces it
    pub default_temperature: f32,
    /// Held humidity until a channel or the simulator replaces it
    pub default_humidity: f32,
    /// Fixed simulator seed; entropy when unset
    pub seed: Option<u64>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(DEFAULT_TICK_SECS),
            sampling_rate: SamplingRate::Normal,
            default_temperature: DEFAULT_TEMPERATURE,
            default_humidity: DEFAULT_HUMIDITY,
            seed: None,
        }
    }
}

struct Inner {
    state: SourceState,
    temperature: f32,
    humidity: f32,
    // Bumped on every stop so a stale simulator task never publishes
    generation: u64,
    simulator: Option<JoinHandle<()>>,
    rng: StdRng,
    closed: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    current: watch::Sender<SensorReading>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, reading: SensorReading) {
        self.current.send_replace(reading);
    }

    /// Run one simulator step. Returns false once the task should exit.
    fn simulate_tick(&self, generation: u64) -> bool {
        let mut inner = self.lock();
        if inner.state != SourceState::SimulatedMock || inner.generation != generation {
            return false;
        }

        let temperature_delta = inner.rng.gen_range(-TEMPERATURE_STEP..=TEMPERATURE_STEP);
        let humidity_delta = inner.rng.gen_range(-HUMIDITY_STEP..=HUMIDITY_STEP);
        inner.temperature =
            (inner.temperature + temperature_delta).clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1);
        inner.humidity =
            (inner.humidity + humidity_delta).clamp(HUMIDITY_RANGE.0, HUMIDITY_RANGE.1);

        let reading = SensorReading::new(inner.temperature, inner.humidity);
        // Publish under the lock so stop() cannot interleave with a tick
        self.publish(reading);
        debug!(
            "Mock data generated: {:.2}°C, {:.2}%",
            reading.temperature, reading.humidity
        );
        true
    }
}

impl SensorListener for Shared {
    fn on_value_changed(&self, event: SensorEvent) {
        let mut inner = self.lock();
        if !matches!(inner.state, SourceState::Probing | SourceState::LiveSensors) {
            debug!("Ignoring {} event while {}", event.channel, inner.state);
            return;
        }

        match event.channel {
            ChannelType::AmbientTemperature => {
                inner.temperature = event.value;
                debug!("Temperature sensor reading: {:.2}°C", event.value);
            }
            ChannelType::RelativeHumidity => {
                inner.humidity = event.value;
                debug!("Humidity sensor reading: {:.2}%", event.value);
            }
            ChannelType::Other(_) => {
                debug!("Ignoring event from {}", event.channel);
                return;
            }
        }

        self.publish(SensorReading::new(inner.temperature, inner.humidity));
    }

    fn on_accuracy_changed(&self, channel: ChannelType, accuracy: i32) {
        debug!("Sensor accuracy changed: {} - accuracy: {}", channel, accuracy);
    }
}

/// Live stream of temperature/humidity readings
///
/// Must be started from within a tokio runtime; the simulator runs as a
/// task scoped to this instance and is aborted by `stop()`, `cleanup()` and
/// drop.
pub struct SensorSource {
    channels: Arc<dyn SensorChannels>,
    options: SourceOptions,
    shared: Arc<Shared>,
}

impl SensorSource {
    pub fn new(channels: Arc<dyn SensorChannels>, options: SourceOptions) -> Self {
        debug!("Checking sensor availability...");
        for channel in CHANNELS {
            if channels.is_available(channel) {
                debug!("{} sensor available", channel);
            } else {
                warn!("{} sensor not available - using mock data", channel);
            }
        }

        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (current, _) = watch::channel(SensorReading::mock());

        let inner = Inner {
            state: SourceState::Idle,
            temperature: options.default_temperature,
            humidity: options.default_humidity,
            generation: 0,
            simulator: None,
            rng,
            closed: false,
        };

        SensorSource {
            channels,
            options,
            shared: Arc::new(Shared {
                inner: Mutex::new(inner),
                current,
            }),
        }
    }

    pub fn state(&self) -> SourceState {
        self.shared.lock().state
    }

    /// Most recently published reading
    pub fn current_reading(&self) -> SensorReading {
        *self.shared.current.borrow()
    }

    /// Latest-value subscription; intermediate readings may be skipped
    pub fn subscribe(&self) -> watch::Receiver<SensorReading> {
        self.shared.current.subscribe()
    }

    /// Begin sampling. No-op unless the source is idle.
    pub fn start(&self) {
        {
            let mut inner = self.shared.lock();
            if inner.closed {
                warn!("Sensor source already cleaned up, not starting");
                return;
            }
            if inner.state != SourceState::Idle {
                debug!("Sensor source already running ({})", inner.state);
                return;
            }
            inner.state = SourceState::Probing;
        }
        info!("Starting sensor reading...");

        // Registration may deliver events synchronously, so the lock is not held here
        let listener: Arc<dyn SensorListener> = self.shared.clone();
        let mut registered = false;
        for channel in CHANNELS {
            if self
                .channels
                .register(channel, self.options.sampling_rate, listener.clone())
            {
                registered = true;
                info!("{} sensor registered successfully", channel);
            }
        }

        let mut inner = self.shared.lock();
        if inner.state != SourceState::Probing {
            // Stopped while probing
            drop(inner);
            self.channels.unregister_all();
            return;
        }

        if registered {
            inner.state = SourceState::LiveSensors;
            info!("Sensor source reading live sensors");
        } else {
            inner.state = SourceState::SimulatedMock;
            inner.generation += 1;
            inner.simulator = Some(spawn_simulator(
                self.shared.clone(),
                inner.generation,
                self.options.tick_interval,
            ));
            info!("No real sensors available, starting mock data generation");
        }
    }

    /// Stop sampling and return to idle. Idempotent.
    pub fn stop(&self) {
        let previous = {
            let mut inner = self.shared.lock();
            if inner.state == SourceState::Idle {
                return;
            }
            let previous = inner.state;
            inner.state = SourceState::Idle;
            inner.generation += 1;
            if let Some(handle) = inner.simulator.take() {
                handle.abort();
            }
            previous
        };

        info!("Stopping sensor reading...");
        self.channels.unregister_all();
        debug!("Sensor source {} -> Idle", previous);
    }

    /// Stop and release the simulator for good. Later `start()` calls are ignored.
    pub fn cleanup(&self) {
        self.stop();
        let mut inner = self.shared.lock();
        inner.closed = true;
        if let Some(handle) = inner.simulator.take() {
            handle.abort();
        }
        debug!(
            "Sensor source cleaned up, last reading at {}",
            format_millis(self.shared.current.borrow().captured_at)
        );
    }
}

impl Drop for SensorSource {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        inner.generation += 1;
        if let Some(handle) = inner.simulator.take() {
            handle.abort();
        }
    }
}

fn spawn_simulator(shared: Arc<Shared>, generation: u64, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(period).await;
            if !shared.simulate_tick(generation) {
                break;
            }
        }
    })
}
