/// Conversion of the textual beacon identifier into its 16-byte wire form
use std::fmt;
use std::str::FromStr;

use crate::error::BeaconError;

/// Number of hex characters in a textual identifier
pub const IDENTIFIER_HEX_LEN: usize = 32;

/// 16-byte binary identifier embedded in every advertisement
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BeaconId(pub [u8; 16]);

impl BeaconId {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl FromStr for BeaconId {
    type Err = BeaconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_hex(s).map(BeaconId)
    }
}

impl fmt::Display for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BeaconId({})", self)
    }
}

/// Decode a 32-character hex identifier into 16 bytes
///
/// Byte `i` is the base-16 value of characters `[2i, 2i + 2)`. Input is
/// case-insensitive. Any other length, or any non-hex character, fails with
/// `InvalidIdentifier` before a single byte is produced.
pub fn decode_hex(identifier: &str) -> Result<[u8; 16], BeaconError> {
    if identifier.len() != IDENTIFIER_HEX_LEN {
        return Err(BeaconError::InvalidIdentifier(format!(
            "expected {} hex characters, got {}",
            IDENTIFIER_HEX_LEN,
            identifier.len()
        )));
    }

    let mut bytes = [0u8; 16];
    hex::decode_to_slice(identifier, &mut bytes)
        .map_err(|e| BeaconError::InvalidIdentifier(format!("{:?}: {}", identifier, e)))?;
    Ok(bytes)
}
