//! Audio output: device routing, players and delivery.
//!
//! Synthesized buffers are played either by a platform player command or an
//! in-process cpal stream, and routed to the virtual sink and/or the
//! operator's monitor device.

pub mod backend;
pub mod delivery;
pub mod device;
pub mod playback;
mod stream;
pub mod util;

pub use backend::platform_backend;
pub use delivery::{AudioDelivery, DeliveryMode};
pub use device::{DeviceRole, DeviceRouter};
pub use playback::{PlayerKind, build_player};
