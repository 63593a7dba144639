/// Binary payload layouts: the broadcast advertisement and the sensor snapshot
///
/// The two formats are independent and never decoded from one another.
use crate::codec::identifier::BeaconId;
use crate::error::BeaconError;
use crate::models::SensorReading;

// Advertisement frame constants
const FRAME_TYPE: u8 = 0x02;
const FRAME_LENGTH: u8 = 0x15;
const CALIBRATED_POWER: u8 = 0x76;

/// Size of the broadcast advertisement payload
pub const ADVERTISEMENT_LEN: usize = 23;
/// Size of the sensor snapshot payload
pub const SNAPSHOT_LEN: usize = 12;

/// Fixed-point scale applied to snapshot temperature and humidity
const SNAPSHOT_SCALE: f32 = 100.0;

/// Encode the 23-byte broadcast advertisement
///
/// Layout:
/// - Byte 0: Frame type marker (0x02)
/// - Byte 1: Frame length marker (0x15)
/// - Bytes 2-17: Identifier
/// - Bytes 18-19: Temperature (signed 16-bit, big-endian, raw units)
/// - Bytes 20-21: Humidity (signed 16-bit, big-endian, raw units)
/// - Byte 22: Calibrated power marker (0x76)
///
/// No scaling happens here; callers convert to raw units first.
pub fn encode_advertisement(
    identifier: &BeaconId,
    temperature: i16,
    humidity: i16,
) -> [u8; ADVERTISEMENT_LEN] {
    let mut payload = [0u8; ADVERTISEMENT_LEN];
    payload[0] = FRAME_TYPE;
    payload[1] = FRAME_LENGTH;
    payload[2..18].copy_from_slice(identifier.as_bytes());
    payload[18..20].copy_from_slice(&temperature.to_be_bytes());
    payload[20..22].copy_from_slice(&humidity.to_be_bytes());
    payload[22] = CALIBRATED_POWER;
    payload
}

/// Encode a reading into the 12-byte snapshot format
///
/// Layout:
/// - Bytes 0-1: Temperature ×100 (signed 16-bit, big-endian)
/// - Bytes 2-3: Humidity ×100 (signed 16-bit, big-endian)
/// - Bytes 4-11: Capture time in ms (signed 64-bit, big-endian)
///
/// Scaled values are truncated toward zero and then wrapped into 16 bits, so
/// magnitudes above 327.67 do not survive: 327.68 encodes as 0x8000 and
/// decodes as -327.68.
pub fn encode_snapshot(reading: &SensorReading) -> [u8; SNAPSHOT_LEN] {
    let mut payload = [0u8; SNAPSHOT_LEN];
    payload[0..2].copy_from_slice(&scale_to_wire(reading.temperature).to_be_bytes());
    payload[2..4].copy_from_slice(&scale_to_wire(reading.humidity).to_be_bytes());
    payload[4..12].copy_from_slice(&reading.captured_at.to_be_bytes());
    payload
}

/// Decode a snapshot produced by [`encode_snapshot`]
///
/// Bytes beyond the first 12 are ignored.
pub fn decode_snapshot(data: &[u8]) -> Result<SensorReading, BeaconError> {
    if data.len() < SNAPSHOT_LEN {
        return Err(BeaconError::TruncatedPayload {
            expected: SNAPSHOT_LEN,
            actual: data.len(),
        });
    }

    let temperature = i16::from_be_bytes([data[0], data[1]]) as f32 / SNAPSHOT_SCALE;
    let humidity = i16::from_be_bytes([data[2], data[3]]) as f32 / SNAPSHOT_SCALE;
    let mut millis = [0u8; 8];
    millis.copy_from_slice(&data[4..12]);
    let captured_at = i64::from_be_bytes(millis);

    Ok(SensorReading::with_timestamp(temperature, humidity, captured_at))
}

fn scale_to_wire(value: f32) -> i16 {
    // Float to i32 truncates toward zero (saturating), i32 to i16 keeps the low 16 bits
    (value * SNAPSHOT_SCALE) as i32 as i16
}
