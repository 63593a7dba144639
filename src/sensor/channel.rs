/// Boundary to the hardware sensor platform
///
/// The platform owns delivery: it calls the registered listener from its own
/// thread or task whenever a channel reports a new value.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Kind of a hardware sensor channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    AmbientTemperature,
    RelativeHumidity,
    /// Any channel type the source does not consume
    Other(i32),
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelType::AmbientTemperature => write!(f, "ambient temperature"),
            ChannelType::RelativeHumidity => write!(f, "relative humidity"),
            ChannelType::Other(code) => write!(f, "channel type {}", code),
        }
    }
}

/// Sampling-rate hint passed on registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingRate {
    Fastest,
    Game,
    Ui,
    #[default]
    Normal,
}

impl SamplingRate {
    /// Nominal delay between samples for this hint
    pub fn period(&self) -> Duration {
        match self {
            SamplingRate::Fastest => Duration::from_millis(0),
            SamplingRate::Game => Duration::from_millis(20),
            SamplingRate::Ui => Duration::from_millis(66),
            SamplingRate::Normal => Duration::from_millis(200),
        }
    }
}

/// A value-changed event from one hardware channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorEvent {
    pub channel: ChannelType,
    pub value: f32,
}

/// Receiver of hardware sensor events
pub trait SensorListener: Send + Sync {
    fn on_value_changed(&self, event: SensorEvent);

    /// Accuracy change for a channel, informational only
    fn on_accuracy_changed(&self, channel: ChannelType, accuracy: i32);
}

/// Hardware sensor platform
pub trait SensorChannels: Send + Sync {
    /// Whether the platform exposes a channel of this type at all
    fn is_available(&self, channel: ChannelType) -> bool;

    /// Register a listener for one channel. Returns false if the channel is
    /// missing or registration was refused.
    fn register(
        &self,
        channel: ChannelType,
        rate: SamplingRate,
        listener: Arc<dyn SensorListener>,
    ) -> bool;

    /// Remove every registration held by this platform. Safe to call when
    /// nothing is registered.
    fn unregister_all(&self);
}

/// Platform with no sensor hardware; every registration fails
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSensors;

impl SensorChannels for NoSensors {
    fn is_available(&self, _channel: ChannelType) -> bool {
        false
    }

    fn register(
        &self,
        _channel: ChannelType,
        _rate: SamplingRate,
        _listener: Arc<dyn SensorListener>,
    ) -> bool {
        false
    }

    fn unregister_all(&self) {}
}
