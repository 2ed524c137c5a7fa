
pub mod filters;
pub mod io;
pub mod gnss;
pub mod http;
pub mod receiver;

pub mod utils;

// One millisecond of baseband samples is exactly one C/A code period: 1023
// chips at 2 samples per chip.
pub const SAMPLES_PER_MS: usize = 2046;
pub const SAMPLES_PER_SEC: f64 = 2.046e6;
pub const L1_CARRIER_HZ: f64 = 1.57542e9;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("sample source failure: {0}")]
	SampleSource(#[from] std::io::Error),
	#[error("sample source produced {got} samples where {want} were required")]
	SampleRateMismatch { want: usize, got: usize },
	#[error("PRN id {0} is outside 1..=32")]
	InvalidPrn(usize),
	#[error("subframe failed parity")]
	Parity,
	#[error("invalid telemetry data: {0}")]
	InvalidTelemetry(&'static str),
	#[error("navigation solution requires at least 4 observations, got {0}")]
	NotEnoughObservations(usize),
	#[error("navigation solution did not converge")]
	DidNotConverge,
	#[error("status endpoint failure: {0}")]
	StatusEndpoint(String),
}
