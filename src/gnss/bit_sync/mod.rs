
use std::collections::VecDeque;

// Navigation bits last 20 ms, so the chip stream repeats each bit value 20
// times and sign transitions can only occur on bit boundaries.
pub const CHIPS_PER_BIT:usize = 20;

const MIN_CHIPS_FOR_DECISION:usize = 200;
const DECISION_DOMINANCE:u32 = 3;

// The chip buffer only needs to cover the synchronization period plus the
// current partial bit, but keeping a deeper backlog costs little and lets a
// late decision still emit every bit seen so far.
const CHIP_BACKLOG:usize = 12_000;

/// Finds the 20 ms bit boundary in a tracked satellite's prompt chip stream
/// by histogramming sign transitions per modulo-20 phase, then folds chips
/// into bits by majority vote.
pub struct BitSync {
	transition_counts: [u32; CHIPS_PER_BIT],
	chips: VecDeque<i8>,
	last_chip: Option<i8>,
	ms_count: usize,
	boundary: Option<usize>,
}

impl BitSync {

	pub fn new() -> Self {
		Self{
			transition_counts: [0; CHIPS_PER_BIT],
			chips: VecDeque::new(),
			last_chip: None,
			ms_count: 0,
			boundary: None,
		}
	}

	/// The millisecond offset of the bit boundary within a 20 ms group, once
	/// it has been found.
	pub fn bit_boundary_offset(&self) -> Option<usize> { self.boundary }

	/// Consumes one chip and returns any completed bits, each the majority
	/// sign of its 20 chips.  Until the boundary is found this accumulates;
	/// the backlog is replayed once the decision is made.
	pub fn apply(&mut self, chip:i8) -> Vec<i8> {
		if let Some(prev) = self.last_chip {
			if chip != prev && self.boundary.is_none() {
				self.transition_counts[self.ms_count % CHIPS_PER_BIT] += 1;
			}
		}
		self.last_chip = Some(chip);
		self.ms_count += 1;

		self.chips.push_back(chip);
		while self.chips.len() > CHIP_BACKLOG { self.chips.pop_front(); }

		if self.boundary.is_none() && self.ms_count >= MIN_CHIPS_FOR_DECISION {
			self.try_decide();
		}

		let mut bits:Vec<i8> = vec![];
		if self.boundary.is_some() {
			while self.chips.len() >= CHIPS_PER_BIT {
				let sum:i32 = self.chips.drain(..CHIPS_PER_BIT).map(|c| c as i32).sum();
				bits.push(if sum < 0 { -1 } else { 1 });
			}
		}
		bits
	}

	fn try_decide(&mut self) {
		let mut max:u32 = 0;
		let mut max_idx:usize = 0;
		let mut second:u32 = 0;
		for (idx, count) in self.transition_counts.iter().enumerate() {
			if *count > max {
				second = max;
				max = *count;
				max_idx = idx;
			} else if *count > second {
				second = *count;
			}
		}

		// A clear winner needs both dominance over the runner-up and enough
		// transitions to rule out a fluke on an otherwise constant stream
		if max >= DECISION_DOMINANCE && max >= DECISION_DOMINANCE * second {
			self.boundary = Some(max_idx);

			// Drop the partial bit in front of the first boundary.  The chip
			// at stream index b started a bit, so in a backlog of ms_count
			// chips the first aligned chip sits at b modulo 20 from the front
			// once the stream prefix is accounted for.
			let backlog_start = self.ms_count - self.chips.len();
			let first_aligned = (max_idx + CHIPS_PER_BIT - (backlog_start % CHIPS_PER_BIT)) % CHIPS_PER_BIT;
			for _ in 0..first_aligned { self.chips.pop_front(); }
		}
	}

}
