pub mod identifier;
pub mod payload;

pub use identifier::{decode_hex, BeaconId};
pub use payload::{decode_snapshot, encode_advertisement, encode_snapshot};
