use rand::Rng;

use crate::utils::{now_millis, to_raw_unit};

/// Immutable snapshot of one temperature/humidity sample.
///
/// A new reading always replaces the previous one; nothing mutates a reading
/// after construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub temperature: f32,
    pub humidity: f32,
    /// Capture time in milliseconds since the Unix epoch
    pub captured_at: i64,
}

impl SensorReading {
    /// Create a reading stamped with the current wall-clock time
    pub fn new(temperature: f32, humidity: f32) -> Self {
        Self::with_timestamp(temperature, humidity, now_millis())
    }

    pub fn with_timestamp(temperature: f32, humidity: f32, captured_at: i64) -> Self {
        SensorReading {
            temperature,
            humidity,
            captured_at,
        }
    }

    /// Random reading used to seed the current-value slot before sampling starts
    ///
    /// Temperature is drawn from [10, 50) °C and humidity from [20, 100) %.
    pub fn mock() -> Self {
        let mut rng = rand::thread_rng();
        let temperature = rng.gen_range(10.0f32..50.0);
        let humidity = rng.gen_range(20.0f32..100.0);
        Self::new(temperature, humidity)
    }

    /// Temperature and humidity rounded to the raw integer units the
    /// advertisement format carries
    pub fn to_raw_units(&self) -> (i16, i16) {
        (to_raw_unit(self.temperature), to_raw_unit(self.humidity))
    }
}
