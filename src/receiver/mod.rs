
use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use nalgebra::Vector4;
use rustfft::num_complex::Complex;

use crate::Error;
use crate::gnss::acquisition::Acquisition;
use crate::gnss::channel::{Channel, ChannelState};
use crate::gnss::pvt::{self, Observation, Solution};
use crate::gnss::telemetry_decode::subframe::Subframe;
use crate::http::{self, HttpData, GeodeticCoordinates, GeodeticSolution, StatusServer, TrackedSatellite, UntrackedSatellite};
use crate::io::SampleSource;

/// Acquisition is far more expensive than a tracking iteration, so attempts
/// are spread one PRN per tick and each PRN retries on an interval.
pub const ACQUISITION_RETRY_INTERVAL_S:f64 = 10.0;

pub const SOLUTION_HISTORY_SIZE:usize = 10;

// Seeds the receiver time of week from the first decoded subframe; a signal
// from a GPS orbit takes 60 to 90 ms to arrive, and the solved clock bias
// absorbs the residual.
const TRANSIT_TIME_GUESS_S:f64 = 0.07;

/// Everything one millisecond of processing produced, for callers that want
/// to report progress.
pub struct TickReport {
	pub new_subframes: Vec<(usize, Subframe)>,
	pub new_acquisition: Option<usize>,
	pub lost_locks: Vec<usize>,
	pub new_solution: Option<Solution>,
}

/// The receiver core: a registry of per-PRN channels driven by a cooperative
/// millisecond tick loop.  Each tick ingests one millisecond of samples,
/// steps every active channel, runs at most one acquisition attempt, and
/// invokes the solver at most once.
pub struct Receiver<S: SampleSource> {
	source: S,
	channels: Vec<Channel>,
	acquirers: Vec<Acquisition>,
	window: VecDeque<Vec<Complex<f64>>>,
	ms_idx: usize,
	acq_cursor: usize,
	rx_tow_s: Option<f64>,
	solutions: VecDeque<Solution>,
	solver_state: Vector4<f64>,
	status: Option<StatusServer>,
}

impl<S: SampleSource> Receiver<S> {

	/// A receiver watching the full constellation, PRNs 1 through 32.
	pub fn new(source:S) -> Result<Self, Error> {
		Self::with_satellites(source, &(1..=32).collect::<Vec<usize>>())
	}

	/// A receiver restricted to the given PRNs.
	pub fn with_satellites(source:S, prns:&[usize]) -> Result<Self, Error> {
		let mut channels:Vec<Channel> = vec![];
		let mut acquirers:Vec<Acquisition> = vec![];
		for prn in prns {
			channels.push(Channel::new(*prn)?);
			acquirers.push(Acquisition::new(*prn)?);
		}
		Ok(Self{
			source,
			channels,
			acquirers,
			window: VecDeque::new(),
			ms_idx: 0,
			acq_cursor: 0,
			rx_tow_s: None,
			solutions: VecDeque::new(),
			solver_state: Vector4::new(0.0, 0.0, 0.0, 0.0),
			status: None,
		})
	}

	/// Starts the localhost status endpoint.  Only sensible in file-replay
	/// mode; serving while pacing a live tuner risks dropped samples.
	pub fn enable_status_endpoint(&mut self) -> Result<(), Error> {
		self.status = Some(StatusServer::start()?);
		Ok(())
	}

	pub fn solutions(&self) -> &VecDeque<Solution> { &self.solutions }
	pub fn channels(&self) -> &[Channel] { &self.channels }
	pub fn sample_time_s(&self) -> f64 { (self.ms_idx as f64) * 1.0e-3 }

	/// Processes one millisecond.  Returns `Ok(None)` once the sample source
	/// is exhausted.
	pub fn step_1ms(&mut self) -> Result<Option<TickReport>, Error> {
		let block = match self.source.next_ms()? {
			Some(block) => block,
			None => return Ok(None),
		};

		let now_s = self.sample_time_s();
		let mut report = TickReport{
			new_subframes: vec![],
			new_acquisition: None,
			lost_locks: vec![],
			new_solution: None,
		};

		self.window.push_back(block.clone());
		while self.window.len() > Acquisition::window_ms() { self.window.pop_front(); }

		if let Some(tow) = self.rx_tow_s.as_mut() { *tow += 1.0e-3; }

		// Track, bit-sync, and decode every active channel
		for chn in self.channels.iter_mut() {
			if !chn.is_active() { continue; }
			let chan_report = chn.apply_ms(&block, self.ms_idx)?;

			if chan_report.lost_lock {
				chn.release(now_s);
				report.lost_locks.push(chn.prn);
				continue;
			}
			for sf in chan_report.subframes {
				// The first decoded subframe anywhere seeds the receiver
				// clock; later fixes trim it via the solved bias
				if self.rx_tow_s.is_none() {
					self.rx_tow_s = Some(sf.common.time_of_week_sec + TRANSIT_TIME_GUESS_S);
				}
				report.new_subframes.push((chn.prn, sf));
			}
		}

		// At most one acquisition attempt per tick, round-robin over the
		// untracked PRNs whose retry interval has elapsed
		if self.window.len() == Acquisition::window_ms() {
			let window = self.window.make_contiguous();
			let n = self.channels.len();
			for i in 0..n {
				let idx = (self.acq_cursor + i) % n;
				if self.channels[idx].state() != ChannelState::Untracked { continue; }
				if now_s < self.channels[idx].next_acquisition_at_s() { continue; }

				match self.acquirers[idx].search(window)? {
					Some(acq) => {
						self.channels[idx].acquire(acq, now_s);
						report.new_acquisition = Some(self.channels[idx].prn);
					},
					None => {
						self.channels[idx].schedule_retry(now_s + ACQUISITION_RETRY_INTERVAL_S);
					},
				}
				self.acq_cursor = idx + 1;
				break;
			}
		}

		// One solve per tick, given four fresh measurements on this epoch
		if let Some(rx_tow) = self.rx_tow_s {
			let observations:Vec<Observation> = self.channels.iter()
				.filter_map(|chn| chn.observation(rx_tow))
				.collect();

			if observations.len() >= 4 {
				match pvt::solve_position_and_time(&observations, self.solver_state) {
					Ok((solution, x)) => {
						self.solver_state = x;
						// Steer the receiver clock so the bias stays small
						self.rx_tow_s = Some(rx_tow - solution.clock_bias_s);
						self.solutions.push_back(solution);
						while self.solutions.len() > SOLUTION_HISTORY_SIZE { self.solutions.pop_front(); }
						report.new_solution = Some(solution);
					},
					Err(Error::DidNotConverge) => {
						// Bad geometry this epoch; no solution is emitted and
						// the pipeline carries on
					},
					Err(e) => return Err(e),
				}
			}
		}

		self.ms_idx += 1;

		if self.ms_idx % http::SNAPSHOT_INTERVAL_MS == 0 {
			if let Some(status) = &self.status {
				status.publish(&self.snapshot())?;
			}
		}

		Ok(Some(report))
	}

	/// Runs the tick loop until the sample source is exhausted.
	pub fn run(&mut self) -> Result<(), Error> {
		while self.step_1ms()?.is_some() {}
		Ok(())
	}

	fn wall_clock_at(&self, sample_time_s:f64) -> DateTime<Utc> {
		self.source.start_timestamp() + Duration::microseconds((sample_time_s * 1.0e6) as i64)
	}

	/// Renders the full status payload served by the HTTP endpoint.
	pub fn snapshot(&self) -> HttpData {
		let solutions:Vec<GeodeticSolution> = self.solutions.iter().map(|s| GeodeticSolution{
			clock_bias: s.clock_bias_s,
			position: GeodeticCoordinates{
				latitude: s.position_geodetic.latitude_deg,
				longitude: s.position_geodetic.longitude_deg,
				height: s.position_geodetic.height_m,
			},
		}).collect();

		let mut tracked:Vec<TrackedSatellite> = vec![];
		let mut untracked:Vec<UntrackedSatellite> = vec![];
		for chn in self.channels.iter() {
			if chn.is_active() {
				let trk = chn.tracker();
				tracked.push(TrackedSatellite{
					satellite_id: chn.prn,
					acquired_at: self.wall_clock_at(chn.acquired_at_s().unwrap_or(0.0)),
					bit_boundary_found: chn.bit_boundary_offset().is_some(),
					bit_phase: chn.bit_phase(),
					required_subframes_received: chn.required_subframes_received(),
					subframe_count: chn.subframe_count(),
					carrier_frequency_shifts: trk.carrier_doppler_history().iter().cloned().collect(),
					prn_code_phase_shifts: trk.code_phase_history().iter().cloned().collect(),
					correlations: trk.correlation_history().iter().map(|(_, p, _)| (p.re, p.im)).collect(),
				});
			} else {
				untracked.push(UntrackedSatellite{
					satellite_id: chn.prn,
					next_acquisition_at: self.wall_clock_at(chn.next_acquisition_at_s()),
				});
			}
		}

		HttpData{ solutions, tracked_satellites: tracked, untracked_satellites: untracked }
	}

}
