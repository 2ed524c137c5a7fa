
use std::f64::consts;
use std::sync::Arc;

use rustfft::{FFT, FFTplanner};
use rustfft::num_complex::Complex;
use rustfft::num_traits::Zero;

use crate::{Error, SAMPLES_PER_MS, SAMPLES_PER_SEC};
use crate::gnss::signal_modulation;

pub const DOPPLER_MAX_HZ:f64  = 10_000.0;
pub const DOPPLER_STEP_HZ:f64 = 500.0;

/// Coherent integration sums complex correlations; non-coherent integration
/// sums the magnitudes of coherent blocks, which tolerates navigation bit
/// transitions at the cost of some sensitivity.
pub const COHERENT_MS:usize = 1;
pub const NONCOHERENT_BLOCKS:usize = 10;

pub const PSR_THRESHOLD:f64 = 2.5;

// Cells within one chip of the peak belong to the correlation triangle and
// are excluded from the sidelobe mean.
const PEAK_EXCLUSION_SAMPLES:usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct AcquisitionResult {
	pub doppler_hz: f64,
	pub code_phase_samples: usize,
	pub peak_to_side_ratio: f64,
}

/// Parallel code phase search for one PRN: for each candidate Doppler bin the
/// carrier is wiped off and the cyclic cross-correlation against the local
/// code is computed in the frequency domain, so a single FFT pair tests every
/// code phase at once.
pub struct Acquisition {
	pub prn: usize,
	fs: f64,
	doppler_freqs: Vec<f64>,
	len_fft: usize,
	fft:  Arc<dyn FFT<f64>>,
	ifft: Arc<dyn FFT<f64>>,
	local_code_freq_domain: Vec<Complex<f64>>,
	fft_out:  Vec<Complex<f64>>,
	ifft_out: Vec<Complex<f64>>,
	psr_threshold: f64,
}

impl Acquisition {

	pub fn new(prn:usize) -> Result<Self, Error> {
		Self::with_threshold(prn, PSR_THRESHOLD)
	}

	pub fn with_threshold(prn:usize, psr_threshold:f64) -> Result<Self, Error> {
		let len_fft:usize = SAMPLES_PER_MS;

		let mut local_code_time_domain:Vec<Complex<f64>> = signal_modulation::prn_complex_sampled(prn)?;
		let mut fft_out:Vec<Complex<f64>> = vec![Complex::zero(); len_fft];

		let mut planner = FFTplanner::new(false);
		let fft = planner.plan_fft(len_fft);
		fft.process(&mut local_code_time_domain, &mut fft_out);

		let local_code_freq_domain:Vec<Complex<f64>> = (&fft_out).into_iter().map(|p| p.conj()).collect();

		let mut inv_planner = FFTplanner::new(true);
		let ifft = inv_planner.plan_fft(len_fft);
		let ifft_out:Vec<Complex<f64>> = vec![Complex::zero(); len_fft];

		let n_bins = (2.0 * DOPPLER_MAX_HZ / DOPPLER_STEP_HZ) as usize + 1;
		let doppler_freqs:Vec<f64> = (0..n_bins).map(|i| -DOPPLER_MAX_HZ + (i as f64)*DOPPLER_STEP_HZ).collect();

		Ok(Self{ prn, fs: SAMPLES_PER_SEC, doppler_freqs, len_fft, fft, ifft,
			local_code_freq_domain, fft_out, ifft_out, psr_threshold })
	}

	/// The number of milliseconds of contiguous samples a search consumes.
	pub fn window_ms() -> usize { COHERENT_MS * NONCOHERENT_BLOCKS }

	/// Searches a window of consecutive one-millisecond sample blocks for this
	/// PRN.  Returns the Doppler bin and code phase of the strongest cell if
	/// its peak-to-sidelobe ratio clears the threshold; ties between bins
	/// break toward the higher ratio, then the lower absolute Doppler.
	pub fn search(&mut self, window:&[Vec<Complex<f64>>]) -> Result<Option<AcquisitionResult>, Error> {
		if window.len() < Self::window_ms() { return Ok(None); }
		for block in window.iter() {
			if block.len() != self.len_fft {
				return Err(Error::SampleRateMismatch{ want: self.len_fft, got: block.len() });
			}
		}

		let mut best:Option<AcquisitionResult> = None;

		for freq in self.doppler_freqs.iter() {
			let mut magnitudes:Vec<f64> = vec![0.0; self.len_fft];
			let mut coherent:Vec<Complex<f64>> = vec![Complex::zero(); self.len_fft];
			let mut coherent_count:usize = 0;

			for (ms, block) in window.iter().take(Self::window_ms()).enumerate() {
				// Wipe the carrier off this millisecond, keeping the sample
				// clock continuous across the window
				let phase_step_rad:f64 = -2.0 * consts::PI * freq / self.fs;
				let t0:usize = ms * self.len_fft;
				let mut wiped:Vec<Complex<f64>> = block.iter().enumerate()
					.map(|(idx, x)| {
						let phase = phase_step_rad * ((t0 + idx) as f64);
						x * Complex{ re: phase.cos(), im: phase.sin() }
					}).collect();

				self.fft.process(&mut wiped, &mut self.fft_out);

				let mut product:Vec<Complex<f64>> = (&self.fft_out).into_iter()
					.zip((&self.local_code_freq_domain).into_iter())
					.map(|(a, b)| a*b)
					.collect();

				self.ifft.process(&mut product, &mut self.ifft_out);

				for (acc, corr) in coherent.iter_mut().zip(self.ifft_out.iter()) {
					*acc += corr / (self.len_fft as f64);
				}
				coherent_count += 1;

				if coherent_count == COHERENT_MS {
					for (mag, acc) in magnitudes.iter_mut().zip(coherent.iter()) {
						*mag += acc.norm();
					}
					coherent = vec![Complex::zero(); self.len_fft];
					coherent_count = 0;
				}
			}

			// Peak and sidelobe mean for this Doppler bin
			let (peak_idx, peak) = magnitudes.iter().enumerate()
				.fold((0, 0.0), |(bi, bv), (i, v)| if *v > bv { (i, *v) } else { (bi, bv) });

			let mut side_sum:f64 = 0.0;
			let mut side_count:usize = 0;
			for (idx, mag) in magnitudes.iter().enumerate() {
				let dist = {
					let d = if idx > peak_idx { idx - peak_idx } else { peak_idx - idx };
					d.min(self.len_fft - d)
				};
				if dist > PEAK_EXCLUSION_SAMPLES {
					side_sum += mag;
					side_count += 1;
				}
			}
			if side_count == 0 || side_sum == 0.0 { continue; }
			let psr = peak / (side_sum / (side_count as f64));

			let better = match &best {
				None => true,
				Some(b) => psr > b.peak_to_side_ratio
					|| (psr == b.peak_to_side_ratio && freq.abs() < b.doppler_hz.abs()),
			};
			if better {
				best = Some(AcquisitionResult{ doppler_hz: *freq, code_phase_samples: peak_idx, peak_to_side_ratio: psr });
			}
		}

		match best {
			Some(b) if b.peak_to_side_ratio >= self.psr_threshold => Ok(Some(b)),
			_ => Ok(None),
		}
	}

}
