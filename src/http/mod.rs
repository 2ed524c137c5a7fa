
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::Error;

pub const LISTEN_ADDR:&str = "127.0.0.1:8080";

/// How often the receiver re-renders the status snapshot, in processed
/// milliseconds.  The payload can approach a megabyte, so once a second is
/// plenty for the dashboard.
pub const SNAPSHOT_INTERVAL_MS:usize = 1000;

#[derive(Debug, Serialize)]
pub struct GeodeticCoordinates {
	pub latitude: f64,
	pub longitude: f64,
	pub height: f64,
}

#[derive(Debug, Serialize)]
pub struct GeodeticSolution {
	pub clock_bias: f64,
	pub position: GeodeticCoordinates,
}

#[derive(Debug, Serialize)]
pub struct TrackedSatellite {
	pub satellite_id: usize,
	pub acquired_at: DateTime<Utc>,
	pub bit_boundary_found: bool,
	pub bit_phase: Option<i8>,
	pub required_subframes_received: bool,
	pub subframe_count: usize,
	pub carrier_frequency_shifts: Vec<f64>,
	pub prn_code_phase_shifts: Vec<f64>,
	/// Prompt correlator outputs as [re, im] pairs, for the constellation
	/// diagram.
	pub correlations: Vec<(f64, f64)>,
}

#[derive(Debug, Serialize)]
pub struct UntrackedSatellite {
	pub satellite_id: usize,
	pub next_acquisition_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HttpData {
	pub solutions: Vec<GeodeticSolution>,
	pub tracked_satellites: Vec<TrackedSatellite>,
	pub untracked_satellites: Vec<UntrackedSatellite>,
}

/// Serves the latest receiver snapshot as JSON on localhost.  The server
/// thread only ever reads a prerendered string, so the receiver core stays
/// single-threaded; it just swaps the snapshot once a second.
pub struct StatusServer {
	snapshot: Arc<Mutex<String>>,
}

impl StatusServer {

	pub fn start() -> Result<Self, Error> {
		let server = tiny_http::Server::http(LISTEN_ADDR)
			.map_err(|e| Error::StatusEndpoint(e.to_string()))?;
		let snapshot:Arc<Mutex<String>> = Arc::new(Mutex::new(String::from("{\"solutions\":[],\"tracked_satellites\":[],\"untracked_satellites\":[]}")));

		let served = snapshot.clone();
		thread::spawn(move || {
			for request in server.incoming_requests() {
				let body = served.lock().map(|s| s.clone()).unwrap_or_default();
				let response = tiny_http::Response::from_string(body).with_header(
					tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap());
				let _ = request.respond(response);
			}
		});

		Ok(Self{ snapshot })
	}

	pub fn publish(&self, data:&HttpData) -> Result<(), Error> {
		let body = serde_json::to_string(data).map_err(|e| Error::StatusEndpoint(e.to_string()))?;
		let mut snapshot = self.snapshot.lock().map_err(|e| Error::StatusEndpoint(e.to_string()))?;
		*snapshot = body;
		Ok(())
	}

}
