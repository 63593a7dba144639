pub mod bluez;
pub mod driver;
pub mod session;

pub use bluez::BluezRadio;
pub use driver::{Capability, PermissionAuthority, RadioDriver, StaticPermissions};
pub use session::{AdvertiseStatus, BroadcastSession, SessionOptions};
