//! Environmental sensor beacon: samples temperature and humidity and
//! broadcasts them in a fixed-layout BLE advertisement.

pub mod bluetooth;
pub mod codec;
pub mod config;
pub mod error;
pub mod models;
pub mod sensor;
pub mod utils;

pub use error::BeaconError;
pub use models::SensorReading;
