
pub mod signal_modulation;

pub mod acquisition;
pub mod tracking;
pub mod bit_sync;
pub mod telemetry_decode;
pub mod pvt;
pub mod channel;
