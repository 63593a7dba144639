pub mod channel;
pub mod iio;
pub mod source;

pub use channel::{ChannelType, NoSensors, SamplingRate, SensorChannels, SensorEvent, SensorListener};
pub use iio::IioSensors;
pub use source::{SensorSource, SourceOptions, SourceState};
