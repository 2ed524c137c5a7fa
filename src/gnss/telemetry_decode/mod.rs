
use std::collections::VecDeque;

use crate::Error;

pub mod subframe;

pub const BITS_PER_SUBFRAME:usize = 300;
pub const DATA_BITS_PER_SUBFRAME:usize = 240;
const BITS_PER_WORD:usize = 30;

// The fixed telemetry word preamble, 10001011
const PREAMBLE:[bool; 8] = [true, false, false, false, true, false, true, true];

/// Checks one 30-bit word against the six parity equations of IS-GPS-200
/// Table 20-XIV.  `last_d29` and `last_d30` are the final two transmitted
/// bits of the preceding word.
pub fn parity_check(word:&[bool], last_d29:bool, last_d30:bool) -> bool {
	assert!(word.len() == BITS_PER_WORD);

	let d:Vec<bool> = word.iter().take(24).map(|b| b ^ last_d30).collect();

	let mut parity:Vec<bool> = vec![];
	parity.push(last_d29 ^ d[0] ^ d[1] ^ d[2] ^ d[4] ^ d[5] ^ d[9]  ^ d[10] ^ d[11] ^ d[12] ^ d[13] ^ d[16] ^ d[17] ^ d[19] ^ d[22]);
	parity.push(last_d30 ^ d[1] ^ d[2] ^ d[3] ^ d[5] ^ d[6] ^ d[10] ^ d[11] ^ d[12] ^ d[13] ^ d[14] ^ d[17] ^ d[18] ^ d[20] ^ d[23]);
	parity.push(last_d29 ^ d[0] ^ d[2] ^ d[3] ^ d[4] ^ d[6] ^ d[7]  ^ d[11] ^ d[12] ^ d[13] ^ d[14] ^ d[15] ^ d[18] ^ d[19] ^ d[21]);
	parity.push(last_d30 ^ d[1] ^ d[3] ^ d[4] ^ d[5] ^ d[7] ^ d[8]  ^ d[12] ^ d[13] ^ d[14] ^ d[15] ^ d[16] ^ d[19] ^ d[20] ^ d[22]);
	parity.push(last_d30 ^ d[0] ^ d[2] ^ d[4] ^ d[5] ^ d[6] ^ d[8]  ^ d[9]  ^ d[13] ^ d[14] ^ d[15] ^ d[16] ^ d[17] ^ d[20] ^ d[21] ^ d[23]);
	parity.push(last_d29 ^ d[2] ^ d[4] ^ d[5] ^ d[7] ^ d[8] ^ d[9]  ^ d[10] ^ d[12] ^ d[14] ^ d[18] ^ d[21] ^ d[22] ^ d[23]);

	word.iter().skip(24).zip(parity.iter()).all(|(a, b)| a == b)
}

/// Strips parity from a 300-bit subframe, checking every word and undoing the
/// XOR of each word's data bits with the preceding word's last transmitted
/// bit.  Words one and ten of the adjacent subframes end with the two zero
/// parity-solve bits, so the first word's predecessors are zeros.
fn data_recover(subframe:&[bool; BITS_PER_SUBFRAME]) -> Result<[bool; DATA_BITS_PER_SUBFRAME], Error> {
	let mut ans:[bool; DATA_BITS_PER_SUBFRAME] = [false; DATA_BITS_PER_SUBFRAME];

	for word_idx in 0..10 {
		let word = &subframe[word_idx*BITS_PER_WORD..(word_idx+1)*BITS_PER_WORD];
		let (last_d29, last_d30) = if word_idx == 0 {
			(false, false)
		} else {
			(subframe[word_idx*BITS_PER_WORD - 2], subframe[word_idx*BITS_PER_WORD - 1])
		};

		if !parity_check(word, last_d29, last_d30) { return Err(Error::Parity); }

		for bit_idx in 0..24 {
			ans[word_idx*24 + bit_idx] = word[bit_idx] ^ last_d30;
		}
	}

	Ok(ans)
}

pub enum TelemetryDecoderResult {
	NotReady,
	Frame(subframe::Subframe),
	Err(Error),
}

enum DecoderState {
	LookingForPreamble,
	DecodingSubframes,
}

/// Assembles the demodulated bit stream into validated 300-bit subframes.
///
/// The Costas loop leaves a 180 degree phase ambiguity, so the preamble hunt
/// accepts both the TLM pattern and its complement; whichever matches fixes
/// the stream polarity for all subsequent bits.
pub struct TelemetryDecoder {
	buffer: VecDeque<(bool, usize)>,
	state: DecoderState,
	bit_phase: Option<i8>,
}

impl TelemetryDecoder {

	pub fn new() -> Self {
		Self{ buffer: VecDeque::new(), state: DecoderState::LookingForPreamble, bit_phase: None }
	}

	/// The resolved stream polarity: +1 if a raw +1 chip sign is a binary
	/// one, -1 for the complemented stream, None until the preamble is found.
	pub fn bit_phase(&self) -> Option<i8> { self.bit_phase }

	pub fn initialize(&mut self) {
		self.buffer.clear();
		self.state = DecoderState::LookingForPreamble;
		self.bit_phase = None;
	}

	/// Takes one demodulated bit (`true` for a +1 chip-stream sign) and the
	/// sample index at which its final chip ended.
	pub fn apply(&mut self, bit:(bool, usize)) -> TelemetryDecoderResult {
		self.buffer.push_back(bit);

		match self.state {
			DecoderState::LookingForPreamble => {
				if self.buffer.len() < BITS_PER_WORD { return TelemetryDecoderResult::NotReady; }

				// Examine the most recent full word.  A subframe start shows
				// the preamble in either polarity and passes parity against
				// the zero tail bits of the previous subframe's last word.
				let start = self.buffer.len() - BITS_PER_WORD;
				let window:Vec<bool> = self.buffer.iter().skip(start).map(|(b, _)| *b).collect();

				let direct:Vec<bool>   = window.clone();
				let inverted:Vec<bool> = window.iter().map(|b| !b).collect();

				let polarity = if direct[..8] == PREAMBLE && parity_check(&direct, false, false) {
					Some(1)
				} else if inverted[..8] == PREAMBLE && parity_check(&inverted, false, false) {
					Some(-1)
				} else {
					None
				};

				if let Some(p) = polarity {
					self.bit_phase = Some(p);
					for _ in 0..start { self.buffer.pop_front(); }
					self.state = DecoderState::DecodingSubframes;
				}
				TelemetryDecoderResult::NotReady
			},
			DecoderState::DecodingSubframes => {
				if self.buffer.len() < BITS_PER_SUBFRAME { return TelemetryDecoderResult::NotReady; }

				let invert = self.bit_phase == Some(-1);
				let mut transmitted = [false; BITS_PER_SUBFRAME];
				let mut end_sample_idx:usize = 0;
				for i in 0..BITS_PER_SUBFRAME {
					let (b, idx) = self.buffer.pop_front().unwrap();
					transmitted[i] = b ^ invert;
					end_sample_idx = idx;
				}

				match Self::validate_and_decode(&transmitted, end_sample_idx) {
					Ok(sf) => TelemetryDecoderResult::Frame(sf),
					Err(e) => {
						// A corrupt subframe poisons the alignment too, so go
						// back to hunting for the next preamble
						self.state = DecoderState::LookingForPreamble;
						TelemetryDecoderResult::Err(e)
					},
				}
			},
		}
	}

	fn validate_and_decode(transmitted:&[bool; BITS_PER_SUBFRAME], end_sample_idx:usize) -> Result<subframe::Subframe, Error> {
		if transmitted[..8] != PREAMBLE {
			return Err(Error::InvalidTelemetry("TLM preamble mismatch"));
		}
		// The handover word solves its parity to end in two zero bits
		if transmitted[58] || transmitted[59] {
			return Err(Error::InvalidTelemetry("HOW reserved bits are not zero"));
		}

		let data = data_recover(transmitted)?;
		subframe::decode(&data, end_sample_idx)
	}

}
