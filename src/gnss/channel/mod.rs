
use std::collections::VecDeque;

use rustfft::num_complex::Complex;

use crate::{Error, SAMPLES_PER_MS};
use crate::gnss::acquisition::AcquisitionResult;
use crate::gnss::bit_sync::BitSync;
use crate::gnss::pvt::Observation;
use crate::gnss::pvt::ephemeris::Ephemeris;
use crate::gnss::telemetry_decode::{TelemetryDecoder, TelemetryDecoderResult};
use crate::gnss::telemetry_decode::subframe::{Subframe, SubframeBody, Subframe1, Subframe2, Subframe3};
use crate::gnss::tracking::{Tracking, TrackingStep};

const SUBFRAME_LOG_SIZE:usize = 5;

// A satellite whose health word has its summary bit raised is excluded from
// navigation solutions
const SV_HEALTH_SUMMARY_BIT:u8 = 0b10_0000;

/// A satellite's progress through the pipeline.  The ladder only moves up;
/// any loss of lock demotes through `Lost` back to `Untracked`, resetting
/// everything the higher rungs had produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChannelState {
	Untracked,
	Acquired,
	Tracking,
	BitSynced,
	FrameSynced,
	EphemerisReady,
	Lost,
}

/// What one millisecond of processing produced.
pub struct ChannelReport {
	pub subframes: Vec<Subframe>,
	pub lost_lock: bool,
}

/// The per-PRN pipeline: tracking loops feeding the bit synchronizer feeding
/// the frame decoder, plus the assembled ephemeris and the transmit-time
/// bookkeeping needed to form pseudoranges.
pub struct Channel {
	pub prn: usize,
	state: ChannelState,
	trk: Tracking,
	bit_sync: BitSync,
	tlm: TelemetryDecoder,

	acquired_at_s: Option<f64>,
	next_acquisition_at_s: f64,
	last_acq: Option<AcquisitionResult>,

	last_sf1: Option<Subframe1>,
	last_sf2: Option<Subframe2>,
	last_sf3: Option<Subframe3>,
	ephemeris: Option<Ephemeris>,

	subframe_log: VecDeque<(u8, f64)>,
	subframe_count: usize,

	// GPS time at the code trailing edge that closed the last subframe, and
	// the number of code periods observed since
	tow_anchor_s: Option<f64>,
	prn_edges_since_anchor: i64,
}

impl Channel {

	pub fn new(prn:usize) -> Result<Self, Error> {
		Ok(Self{
			prn,
			state: ChannelState::Untracked,
			trk: Tracking::new(prn)?,
			bit_sync: BitSync::new(),
			tlm: TelemetryDecoder::new(),
			acquired_at_s: None,
			next_acquisition_at_s: 0.0,
			last_acq: None,
			last_sf1: None,
			last_sf2: None,
			last_sf3: None,
			ephemeris: None,
			subframe_log: VecDeque::new(),
			subframe_count: 0,
			tow_anchor_s: None,
			prn_edges_since_anchor: 0,
		})
	}

	pub fn state(&self) -> ChannelState { self.state }
	pub fn is_active(&self) -> bool {
		self.state != ChannelState::Untracked && self.state != ChannelState::Lost
	}

	pub fn acquired_at_s(&self) -> Option<f64> { self.acquired_at_s }
	pub fn next_acquisition_at_s(&self) -> f64 { self.next_acquisition_at_s }
	pub fn last_acquisition(&self) -> Option<AcquisitionResult> { self.last_acq }
	pub fn bit_boundary_offset(&self) -> Option<usize> { self.bit_sync.bit_boundary_offset() }
	pub fn bit_phase(&self) -> Option<i8> { self.tlm.bit_phase() }
	pub fn subframe_count(&self) -> usize { self.subframe_count }
	pub fn subframe_log(&self) -> &VecDeque<(u8, f64)> { &self.subframe_log }
	pub fn ephemeris(&self) -> Option<Ephemeris> { self.ephemeris }
	pub fn sv_health(&self) -> Option<u8> { self.last_sf1.map(|sf| sf.sv_health) }
	pub fn tracker(&self) -> &Tracking { &self.trk }

	/// Hands the channel an acquisition hit and restarts every downstream
	/// stage from scratch.
	pub fn acquire(&mut self, acq:AcquisitionResult, at_s:f64) {
		self.trk.initialize(acq.doppler_hz, acq.code_phase_samples as f64);
		self.bit_sync = BitSync::new();
		self.tlm.initialize();
		self.last_sf1 = None;
		self.last_sf2 = None;
		self.last_sf3 = None;
		self.ephemeris = None;
		self.subframe_log.clear();
		self.subframe_count = 0;
		self.tow_anchor_s = None;
		self.prn_edges_since_anchor = 0;
		self.acquired_at_s = Some(at_s);
		self.last_acq = Some(acq);
		self.state = ChannelState::Acquired;
	}

	/// Returns a lost channel to the acquisition pool, eligible immediately.
	pub fn release(&mut self, at_s:f64) {
		self.state = ChannelState::Untracked;
		self.acquired_at_s = None;
		self.next_acquisition_at_s = at_s;
	}

	pub fn schedule_retry(&mut self, at_s:f64) {
		self.next_acquisition_at_s = at_s;
	}

	/// Runs one millisecond of samples through the tracking, bit sync, and
	/// frame decode stages, in that order.
	pub fn apply_ms(&mut self, samples:&[Complex<f64>], ms_idx:usize) -> Result<ChannelReport, Error> {
		let mut report = ChannelReport{ subframes: vec![], lost_lock: false };
		if !self.is_active() { return Ok(report); }

		let (chip, prn_edges) = match self.trk.apply_ms(samples)? {
			TrackingStep::Chip{ chip, prn_edges } => (chip, prn_edges),
			TrackingStep::LossOfLock => {
				self.state = ChannelState::Lost;
				report.lost_lock = true;
				return Ok(report);
			},
		};

		if self.state == ChannelState::Acquired {
			self.state = ChannelState::Tracking;
		}
		if self.tow_anchor_s.is_some() {
			self.prn_edges_since_anchor += prn_edges as i64;
		}

		let bits = self.bit_sync.apply(chip);
		if self.bit_sync.bit_boundary_offset().is_some() && self.state < ChannelState::BitSynced {
			self.state = ChannelState::BitSynced;
		}

		// Bits are stamped with the sample index at which their final chip
		// ended, which ties the decoded GPS time back to the receiver clock
		let end_sample_idx = (ms_idx + 1) * SAMPLES_PER_MS;
		for bit in bits {
			match self.tlm.apply((bit > 0, end_sample_idx)) {
				TelemetryDecoderResult::Frame(sf) => {
					self.handle_subframe(&sf);
					report.subframes.push(sf);
				},
				TelemetryDecoderResult::NotReady => {},
				TelemetryDecoderResult::Err(_) => {
					// Parity failures discard the subframe; the decoder has
					// already gone back to hunting for a preamble
				},
			}
		}

		Ok(report)
	}

	fn handle_subframe(&mut self, sf:&Subframe) {
		self.subframe_count += 1;
		self.subframe_log.push_back((sf.common.subframe_id, sf.common.time_of_week_sec));
		while self.subframe_log.len() > SUBFRAME_LOG_SIZE { self.subframe_log.pop_front(); }

		// The handover word carries the time of week of the next subframe's
		// leading edge, which is the instant this subframe's last bit (and
		// the code period that carried it) ended
		self.tow_anchor_s = Some(sf.common.time_of_week_sec);
		self.prn_edges_since_anchor = 0;

		match sf.body {
			SubframeBody::Subframe1(sf1) => self.last_sf1 = Some(sf1),
			SubframeBody::Subframe2(sf2) => self.last_sf2 = Some(sf2),
			SubframeBody::Subframe3(sf3) => self.last_sf3 = Some(sf3),
			SubframeBody::Subframe4 | SubframeBody::Subframe5 => {},
		}

		if self.state < ChannelState::FrameSynced {
			self.state = ChannelState::FrameSynced;
		}

		// A consistent ephemeris needs subframes 1 through 3 from the same
		// issue of data
		if let (Some(sf1), Some(sf2), Some(sf3)) = (self.last_sf1, self.last_sf2, self.last_sf3) {
			if (sf1.iodc % 256) as u8 == sf2.iode && sf2.iode == sf3.iode {
				self.ephemeris = Some(Ephemeris{
					week_number: sf1.week_number, t_gd: sf1.t_gd, iodc: sf1.iodc,
					t_oc: sf1.t_oc, a_f0: sf1.a_f0, a_f1: sf1.a_f1, a_f2: sf1.a_f2,
					t_oe: sf2.t_oe, sqrt_a: sf2.sqrt_a, dn: sf2.dn, m0: sf2.m0,
					e: sf2.e, omega: sf3.omega, omega0: sf3.omega0, omega_dot: sf3.omega_dot,
					cus: sf2.cus, cuc: sf2.cuc, crs: sf2.crs, crc: sf3.crc,
					cis: sf3.cis, cic: sf3.cic, i0: sf3.i0, idot: sf3.idot,
					iode: sf2.iode,
				});
				self.state = ChannelState::EphemerisReady;
			}
		}
	}

	/// Whether subframes 1 through 3 with a matching issue of data have all
	/// been received.
	pub fn required_subframes_received(&self) -> bool { self.ephemeris.is_some() }

	/// Forms this tick's pseudorange measurement, if the channel has decoded
	/// enough to know the satellite's transmit time and position.
	pub fn observation(&self, rx_time_s:f64) -> Option<Observation> {
		if self.state != ChannelState::EphemerisReady { return None; }
		let eph = self.ephemeris?;
		let anchor = self.tow_anchor_s?;

		if let Some(health) = self.sv_health() {
			if health & SV_HEALTH_SUMMARY_BIT != 0 { return None; }
		}

		// Whole code periods since the anchor edge, plus the fraction of a
		// period between the latest trailing edge and the window end
		let n = SAMPLES_PER_MS as f64;
		let sub_ms = (n - self.trk.code_phase_samples()) / n;
		let t_sv = anchor + (self.prn_edges_since_anchor as f64) * 1.0e-3 + sub_ms * 1.0e-3;

		let (pos_ecef, sv_clock) = eph.pos_and_clock(t_sv);
		Some(Observation{
			sv_id: self.prn,
			t_transmitted_sv: t_sv,
			t_received: rx_time_s,
			pos_ecef,
			sv_clock,
			t_gd: eph.t_gd,
		})
	}

}
