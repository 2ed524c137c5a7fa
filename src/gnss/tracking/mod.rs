
use std::collections::VecDeque;
use std::f64::consts;

use rustfft::num_complex::Complex;

use crate::{Error, L1_CARRIER_HZ, SAMPLES_PER_MS};
use crate::filters::{FirstOrderFIR, ScalarFilter};
use crate::gnss::signal_modulation;

pub const HISTORY_SIZE:usize = 1000;

const T_INT_SEC:f64 = 0.001;

// First-order code loop, sized for roughly 1 Hz at the 1 ms update interval.
// The early-minus-late discriminator slope is one unit per sample of code
// phase error at the half-chip correlator spacing.
const DLL_BW_HZ:f64 = 1.0;

// The carrier is pulled in by the frequency loop alone; the Costas loop only
// engages once the frequency estimate has settled, otherwise its phase
// corrections hide the rotation the frequency discriminator needs to see.
const FLL_BW_PULL_IN_HZ:f64 = 10.0;
const FLL_BW_LOCKED_HZ:f64  = 2.0;
const PULL_IN_MS:usize = 1000;

// Costas loop gains; both are multiplied by the update interval when applied
const CARRIER_FREQ_GAIN:f64  = 20.0;
const CARRIER_PHASE_GAIN:f64 = 500.0;

const LOCK_WINDOW_MS:usize = 50;
const LOCK_FAIL_LIMIT:usize = 50;
const NOISE_FLOOR_FACTOR:f64 = 1.5;
const MAX_CODE_JUMP_SAMPLES:f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackingStep {
	/// The sign of the prompt in-phase correlator over this millisecond,
	/// together with the net number of code trailing edges observed (usually
	/// one; zero or two when the code phase wraps).
	Chip { chip: i8, prn_edges: i32 },
	LossOfLock,
}

pub struct Tracking {
	pub prn: usize,
	fs: f64,
	local_code: Vec<Complex<f64>>,

	carrier_doppler_hz: f64,
	carrier_phase_rad: f64,
	code_phase_samples: f64,
	code_phase_rate_samples_per_ms: f64,

	code_filter: FirstOrderFIR,
	prompt_prev: Option<Complex<f64>>,
	ms_tracked: usize,

	prompt_mags: VecDeque<f64>,
	early_mags:  VecDeque<f64>,
	late_mags:   VecDeque<f64>,
	lock_fail_count: usize,

	correlation_history: VecDeque<(Complex<f64>, Complex<f64>, Complex<f64>)>,
	carrier_doppler_history: VecDeque<f64>,
	code_phase_history: VecDeque<f64>,
}

impl Tracking {

	pub fn new(prn:usize) -> Result<Self, Error> {
		let local_code = signal_modulation::prn_complex_sampled(prn)?;
		Ok(Self{
			prn,
			fs: crate::SAMPLES_PER_SEC,
			local_code,
			carrier_doppler_hz: 0.0,
			carrier_phase_rad: 0.0,
			code_phase_samples: 0.0,
			code_phase_rate_samples_per_ms: SAMPLES_PER_MS as f64,
			code_filter: FirstOrderFIR::proportional(4.0 * DLL_BW_HZ * T_INT_SEC),
			prompt_prev: None,
			ms_tracked: 0,
			prompt_mags: VecDeque::new(),
			early_mags:  VecDeque::new(),
			late_mags:   VecDeque::new(),
			lock_fail_count: 0,
			correlation_history: VecDeque::new(),
			carrier_doppler_history: VecDeque::new(),
			code_phase_history: VecDeque::new(),
		})
	}

	pub fn carrier_doppler_hz(&self) -> f64 { self.carrier_doppler_hz }
	pub fn carrier_phase_rad(&self) -> f64 { self.carrier_phase_rad }
	pub fn code_phase_samples(&self) -> f64 { self.code_phase_samples }
	pub fn code_phase_rate_samples_per_ms(&self) -> f64 { self.code_phase_rate_samples_per_ms }

	pub fn correlation_history(&self) -> &VecDeque<(Complex<f64>, Complex<f64>, Complex<f64>)> { &self.correlation_history }
	pub fn carrier_doppler_history(&self) -> &VecDeque<f64> { &self.carrier_doppler_history }
	pub fn code_phase_history(&self) -> &VecDeque<f64> { &self.code_phase_history }

	/// Seeds the loops from an acquisition result.  All running state from any
	/// previous lock is discarded.
	pub fn initialize(&mut self, doppler_hz:f64, code_phase_samples:f64) {
		self.carrier_doppler_hz = doppler_hz;
		self.carrier_phase_rad = 0.0;
		self.code_phase_samples = code_phase_samples;
		self.code_phase_rate_samples_per_ms = (SAMPLES_PER_MS as f64) * (1.0 + doppler_hz / L1_CARRIER_HZ);
		self.code_filter.initialize();
		self.prompt_prev = None;
		self.ms_tracked = 0;
		self.prompt_mags.clear();
		self.early_mags.clear();
		self.late_mags.clear();
		self.lock_fail_count = 0;
		self.correlation_history.clear();
		self.carrier_doppler_history.clear();
		self.code_phase_history.clear();
	}

	/// Runs one tracking iteration over exactly one millisecond of samples,
	/// emitting the demodulated chip and updating every loop.
	pub fn apply_ms(&mut self, samples:&[Complex<f64>]) -> Result<TrackingStep, Error> {
		let n = SAMPLES_PER_MS;
		if samples.len() != n {
			return Err(Error::SampleRateMismatch{ want: n, got: samples.len() });
		}

		// Correlate against early, prompt, and late replicas spaced half a
		// chip (one sample) apart around the current code phase estimate
		let shift = {
			let s = self.code_phase_samples.round() as i64;
			s.rem_euclid(n as i64) as usize
		};
		let base = n - shift;

		let mut sum_early  = Complex{ re: 0.0, im: 0.0 };
		let mut sum_prompt = Complex{ re: 0.0, im: 0.0 };
		let mut sum_late   = Complex{ re: 0.0, im: 0.0 };

		// The carrier replica advances by a constant rotation per sample, so
		// it is cheaper to spin a phasor than to call sin/cos per sample
		let mut carrier = Complex{ re: self.carrier_phase_rad.cos(), im: -self.carrier_phase_rad.sin() };
		let step_rad = 2.0 * consts::PI * self.carrier_doppler_hz / self.fs;
		let carrier_step = Complex{ re: step_rad.cos(), im: -step_rad.sin() };

		for (i, x) in samples.iter().enumerate() {
			let y = x * carrier;
			carrier = carrier * carrier_step;

			sum_early  += self.local_code[(i + base + 1) % n] * y;
			sum_prompt += self.local_code[(i + base) % n] * y;
			sum_late   += self.local_code[(i + base + n - 1) % n] * y;
		}

		self.ms_tracked += 1;

		// Code loop: normalized non-coherent early-minus-late, plus the code
		// rate implied by the carrier Doppler
		let mag_early  = sum_early.norm();
		let mag_prompt = sum_prompt.norm();
		let mag_late   = sum_late.norm();

		let d_code = if mag_early + mag_late == 0.0 { 0.0 } else { (mag_early - mag_late) / (mag_early + mag_late) };
		let doppler_aid = (n as f64) * self.carrier_doppler_hz / L1_CARRIER_HZ;
		self.code_phase_rate_samples_per_ms = (n as f64) + doppler_aid + self.code_filter.apply(d_code);

		let code_step = self.code_phase_rate_samples_per_ms - (n as f64);
		if code_step.abs() > MAX_CODE_JUMP_SAMPLES {
			return Ok(TrackingStep::LossOfLock);
		}

		self.code_phase_samples -= code_step;
		let mut prn_edges:i32 = 1;
		if self.code_phase_samples < 0.0 {
			self.code_phase_samples += n as f64;
			prn_edges += 1;
		} else if self.code_phase_samples >= n as f64 {
			self.code_phase_samples -= n as f64;
			prn_edges -= 1;
		}

		// Carrier loop.  The cross-product discriminator reads the residual
		// rotation between consecutive prompts; the Costas discriminator
		// reads the residual phase, collapsing the 180 degree data flips
		let d_freq = match self.prompt_prev {
			Some(prev) => {
				let cross = sum_prompt * prev.conj();
				cross.im.atan2(cross.re) / (2.0 * consts::PI * T_INT_SEC)
			},
			None => 0.0,
		};
		let d_phase = if sum_prompt.re == 0.0 { 0.0 } else { (sum_prompt.im / sum_prompt.re).atan() };

		if self.ms_tracked <= PULL_IN_MS {
			self.carrier_doppler_hz += 4.0 * FLL_BW_PULL_IN_HZ * T_INT_SEC * d_freq;
			self.carrier_phase_rad = (self.carrier_phase_rad
				+ 2.0 * consts::PI * self.carrier_doppler_hz * T_INT_SEC).rem_euclid(2.0 * consts::PI);
		} else {
			self.carrier_doppler_hz += 4.0 * FLL_BW_LOCKED_HZ * T_INT_SEC * d_freq
				+ CARRIER_FREQ_GAIN * d_phase * T_INT_SEC;
			self.carrier_phase_rad = (self.carrier_phase_rad
				+ 2.0 * consts::PI * self.carrier_doppler_hz * T_INT_SEC
				+ CARRIER_PHASE_GAIN * d_phase * T_INT_SEC).rem_euclid(2.0 * consts::PI);
		}

		self.prompt_prev = Some(sum_prompt);

		// Histories for the dashboard
		self.correlation_history.push_back((sum_early, sum_prompt, sum_late));
		self.carrier_doppler_history.push_back(self.carrier_doppler_hz);
		self.code_phase_history.push_back(self.code_phase_samples);
		while self.correlation_history.len() > HISTORY_SIZE { self.correlation_history.pop_front(); }
		while self.carrier_doppler_history.len() > HISTORY_SIZE { self.carrier_doppler_history.pop_front(); }
		while self.code_phase_history.len() > HISTORY_SIZE { self.code_phase_history.pop_front(); }

		// Lock detector: the prompt magnitude must stay above a noise floor
		// estimated from the spread of the early and late correlators
		self.prompt_mags.push_back(mag_prompt);
		self.early_mags.push_back(mag_early);
		self.late_mags.push_back(mag_late);
		while self.prompt_mags.len() > LOCK_WINDOW_MS { self.prompt_mags.pop_front(); }
		while self.early_mags.len() > LOCK_WINDOW_MS { self.early_mags.pop_front(); }
		while self.late_mags.len() > LOCK_WINDOW_MS { self.late_mags.pop_front(); }

		if self.prompt_mags.len() == LOCK_WINDOW_MS {
			let noise_floor = NOISE_FLOOR_FACTOR * (variance(&self.early_mags) + variance(&self.late_mags)).sqrt();
			if mean(&self.prompt_mags) < noise_floor {
				self.lock_fail_count += 1;
			} else {
				self.lock_fail_count = 0;
			}
			if self.lock_fail_count > LOCK_FAIL_LIMIT {
				return Ok(TrackingStep::LossOfLock);
			}
		}

		let chip:i8 = if sum_prompt.re < 0.0 { -1 } else { 1 };
		Ok(TrackingStep::Chip{ chip, prn_edges })
	}

}

fn mean(xs:&VecDeque<f64>) -> f64 {
	xs.iter().sum::<f64>() / (xs.len() as f64)
}

fn variance(xs:&VecDeque<f64>) -> f64 {
	let m = mean(xs);
	xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() as f64)
}

#[cfg(test)]
mod tests {

	use rand::SeedableRng;
	use rand_distr::{Distribution, Normal};

	use super::*;

	// One millisecond of a clean PRN signal at a constant Doppler.  The code
	// phase drifts with the Doppler the way a real signal stretches, and the
	// carrier phase continues across calls.
	fn signal_ms(prn:usize, doppler_hz:f64, code_phase:f64, ms:usize, chip:f64) -> Vec<Complex<f64>> {
		let code = signal_modulation::prn_int_sampled(prn).unwrap();
		let n = SAMPLES_PER_MS;
		let true_phase = code_phase - (n as f64) * doppler_hz / L1_CARRIER_HZ * (ms as f64);
		let shift = (true_phase.round() as i64).rem_euclid(n as i64) as usize;
		(0..n).map(|i| {
			let t = ((ms*n + i) as f64) / crate::SAMPLES_PER_SEC;
			let phase = 2.0 * consts::PI * doppler_hz * t;
			Complex{ re: phase.cos(), im: phase.sin() } * (code[(i + n - shift) % n] as f64) * chip
		}).collect()
	}

	#[test]
	fn converges_to_true_doppler_within_a_second() {
		let doppler = 1000.0;
		let mut trk = Tracking::new(4).unwrap();
		// Start 150 Hz off, as a coarse acquisition would
		trk.initialize(doppler + 150.0, 300.0);

		let mut errors:Vec<f64> = vec![];
		for ms in 0..1000 {
			match trk.apply_ms(&signal_ms(4, doppler, 300.0, ms, 1.0)).unwrap() {
				TrackingStep::Chip{ .. } => {},
				TrackingStep::LossOfLock => panic!("lost lock on a clean signal at ms {}", ms),
			}
			if ms >= 800 { errors.push(trk.carrier_doppler_hz() - doppler); }
		}

		let mean_err = errors.iter().sum::<f64>() / (errors.len() as f64);
		let std_err = (errors.iter().map(|e| (e - mean_err).powi(2)).sum::<f64>() / (errors.len() as f64)).sqrt();
		assert!(mean_err.abs() < 5.0, "mean doppler error {}", mean_err);
		assert!(std_err < 5.0, "doppler error std {}", std_err);

		// The code phase must have followed the signal's own drift
		let expected = 300.0 - (SAMPLES_PER_MS as f64) * doppler / L1_CARRIER_HZ * 1000.0;
		assert!((trk.code_phase_samples() - expected).abs() < 1.0, "code phase {}", trk.code_phase_samples());
	}

	#[test]
	fn demodulates_chip_signs_up_to_polarity() {
		let mut trk = Tracking::new(9).unwrap();
		trk.initialize(30.0, 100.0);

		// Navigation bits flip every 20 ms; the Costas loop may settle either
		// side of the axis, so compare against the bit stream up to one
		// global inversion once the phase loop has engaged
		let mut observed:Vec<(i8, i8)> = vec![];
		for ms in 0..1400 {
			let bit:i8 = if (ms / 20) % 2 == 0 { 1 } else { -1 };
			match trk.apply_ms(&signal_ms(9, 0.0, 100.0, ms, bit as f64)).unwrap() {
				TrackingStep::Chip{ chip, .. } => {
					if ms >= 1100 { observed.push((chip, bit)); }
				},
				TrackingStep::LossOfLock => panic!("lost lock at ms {}", ms),
			}
		}

		let polarity:i8 = if observed[0].0 == observed[0].1 { 1 } else { -1 };
		for (i, (chip, bit)) in observed.iter().enumerate() {
			assert_eq!(*chip, polarity * bit, "chip {} disagrees after polarity resolution", i);
		}
	}

	#[test]
	fn noise_only_input_drops_lock() {
		let mut trk = Tracking::new(4).unwrap();
		trk.initialize(0.0, 0.0);

		// Settle on a clean signal first
		for ms in 0..1200 {
			trk.apply_ms(&signal_ms(4, 0.0, 0.0, ms, 1.0)).unwrap();
		}

		let mut rng = rand::rngs::StdRng::seed_from_u64(0x10c4);
		let noise = Normal::new(0.0, 1.0).unwrap();
		let mut lost = false;
		for _ in 0..1500 {
			let block:Vec<Complex<f64>> = (0..SAMPLES_PER_MS)
				.map(|_| Complex{ re: noise.sample(&mut rng), im: noise.sample(&mut rng) })
				.collect();
			if trk.apply_ms(&block).unwrap() == TrackingStep::LossOfLock {
				lost = true;
				break;
			}
		}
		assert!(lost, "tracker held lock through 1.5 s of pure noise");
	}

	#[test]
	fn wrong_block_length_is_fatal() {
		let mut trk = Tracking::new(4).unwrap();
		assert!(trk.apply_ms(&vec![Complex{re: 0.0, im: 0.0}; 100]).is_err());
	}

}
