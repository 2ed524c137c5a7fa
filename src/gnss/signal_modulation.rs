
use rustfft::num_complex::Complex;

use crate::{Error, SAMPLES_PER_MS};

pub const CA_CODE_LENGTH:usize = 1023;

// G2 output stage pairs for PRNs 1 through 32, from Table 3-Ia of IS-GPS-200.
// XORing these two stages is equivalent to the delayed-G2 formulation.
const G2_OUTPUT_STAGES:[(usize, usize); 32] = [
	(2,6),  (3,7),  (4,8),  (5,9),  (1,9),  (2,10), (1,8),  (2,9),
	(3,10), (2,3),  (3,4),  (5,6),  (6,7),  (7,8),  (8,9),  (9,10),
	(1,4),  (2,5),  (3,6),  (4,7),  (5,8),  (6,9),  (1,3),  (4,6),
	(5,7),  (6,8),  (7,9),  (8,10), (1,6),  (2,7),  (3,8),  (4,9)];

// A 10-stage linear-feedback shift register seeded with all ones.  Stage
// indices are one-based to match the interface control document.
struct Lfsr {
	bits: [u8; 10],
	output_stages: Vec<usize>,
	feedback_stages: Vec<usize>,
}

impl Lfsr {

	fn new(output_stages:Vec<usize>, feedback_stages:Vec<usize>) -> Self {
		Self{ bits: [1; 10], output_stages, feedback_stages }
	}

	fn step(&mut self) -> u8 {
		let output:u8 = self.output_stages.iter().map(|i| self.bits[i-1]).fold(0, |a, b| a ^ b);
		let feedback:u8 = self.feedback_stages.iter().map(|i| self.bits[i-1]).fold(0, |a, b| a ^ b);
		for i in (1..10).rev() { self.bits[i] = self.bits[i-1]; }
		self.bits[0] = feedback;
		output
	}

}

/// The 1023-chip C/A Gold code for the given PRN, as ±1 values.  A binary one
/// maps to -1 so that the BPSK phase inversion becomes multiplication.
pub fn ca_code(prn:usize) -> Result<[i8; CA_CODE_LENGTH], Error> {
	if prn < 1 || prn > 32 { return Err(Error::InvalidPrn(prn)); }
	let (s1, s2) = G2_OUTPUT_STAGES[prn-1];

	let mut g1 = Lfsr::new(vec![10],     vec![3, 10]);
	let mut g2 = Lfsr::new(vec![s1, s2], vec![2, 3, 6, 8, 9, 10]);

	let mut chips:[i8; CA_CODE_LENGTH] = [0; CA_CODE_LENGTH];
	for chip in chips.iter_mut() {
		*chip = if g1.step() ^ g2.step() == 1 { -1 } else { 1 };
	}
	Ok(chips)
}

/// The C/A code upsampled to 2 samples per chip, giving a template the same
/// length as one millisecond of received samples.
pub fn prn_int_sampled(prn:usize) -> Result<Vec<i8>, Error> {
	let chips = ca_code(prn)?;
	let mut ans:Vec<i8> = Vec::with_capacity(SAMPLES_PER_MS);
	for chip in chips.iter() {
		ans.push(*chip);
		ans.push(*chip);
	}
	Ok(ans)
}

/// The upsampled template as unit complex values for correlation.
pub fn prn_complex_sampled(prn:usize) -> Result<Vec<Complex<f64>>, Error> {
	Ok(prn_int_sampled(prn)?.into_iter().map(|b| Complex{ re: b as f64, im: 0.0 }).collect())
}

#[cfg(test)]
mod tests {

	use super::*;

	#[test]
	fn first_chips_of_prn_one() {
		// The first ten chips of PRN 1 are octal 1440 (IS-GPS-200 Table 3-Ia)
		let chips = ca_code(1).unwrap();
		let first_ten:Vec<u8> = chips.iter().take(10).map(|c| if *c == -1 { 1 } else { 0 }).collect();
		assert_eq!(first_ten, vec![1, 1, 0, 0, 1, 0, 0, 0, 0, 0]);
	}

	#[test]
	fn gold_code_autocorrelation() {
		// A C/A code autocorrelates to 1023 at zero shift and takes only the
		// three-valued Gold levels {-65, -1, 63} everywhere else
		for prn in 1..=32 {
			let chips = ca_code(prn).unwrap();
			for shift in 0..CA_CODE_LENGTH {
				let r:i32 = (0..CA_CODE_LENGTH)
					.map(|i| (chips[i] as i32) * (chips[(i+shift) % CA_CODE_LENGTH] as i32))
					.sum();
				if shift == 0 {
					assert_eq!(r, 1023);
				} else {
					assert!(r == -65 || r == -1 || r == 63, "PRN {} shift {} gave {}", prn, shift, r);
				}
			}
		}
	}

	#[test]
	fn upsampled_template() {
		let chips = ca_code(17).unwrap();
		let upsampled = prn_int_sampled(17).unwrap();
		assert_eq!(upsampled.len(), SAMPLES_PER_MS);
		for (i, chip) in chips.iter().enumerate() {
			assert_eq!(upsampled[2*i], *chip);
			assert_eq!(upsampled[2*i+1], *chip);
		}
	}

	#[test]
	fn rejects_out_of_range_prn() {
		assert!(ca_code(0).is_err());
		assert!(ca_code(33).is_err());
	}

}
