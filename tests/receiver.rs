
// End-to-end exercise of the receiver pipeline against a synthesized PRN 7
// signal carrying real subframes: acquisition, tracking, bit sync, frame
// decode, and ephemeris assembly, with no navigation solution possible from
// a single satellite.

use chrono::{TimeZone, Utc};
use rustfft::num_complex::Complex;

use gps_receiver::{Error, SAMPLES_PER_MS, SAMPLES_PER_SEC, L1_CARRIER_HZ};
use gps_receiver::gnss::channel::ChannelState;
use gps_receiver::gnss::signal_modulation;
use gps_receiver::io::SampleSource;
use gps_receiver::receiver::Receiver;

const BITS_PER_SUBFRAME:usize = 300;

// ---- Navigation message assembly ----------------------------------------

fn parity_bits(t:&[bool], last_d29:bool, last_d30:bool) -> [bool; 6] {
	let d:Vec<bool> = t.iter().map(|b| b ^ last_d30).collect();
	[
		last_d29 ^ d[0] ^ d[1] ^ d[2] ^ d[4] ^ d[5] ^ d[9]  ^ d[10] ^ d[11] ^ d[12] ^ d[13] ^ d[16] ^ d[17] ^ d[19] ^ d[22],
		last_d30 ^ d[1] ^ d[2] ^ d[3] ^ d[5] ^ d[6] ^ d[10] ^ d[11] ^ d[12] ^ d[13] ^ d[14] ^ d[17] ^ d[18] ^ d[20] ^ d[23],
		last_d29 ^ d[0] ^ d[2] ^ d[3] ^ d[4] ^ d[6] ^ d[7]  ^ d[11] ^ d[12] ^ d[13] ^ d[14] ^ d[15] ^ d[18] ^ d[19] ^ d[21],
		last_d30 ^ d[1] ^ d[3] ^ d[4] ^ d[5] ^ d[7] ^ d[8]  ^ d[12] ^ d[13] ^ d[14] ^ d[15] ^ d[16] ^ d[19] ^ d[20] ^ d[22],
		last_d30 ^ d[0] ^ d[2] ^ d[4] ^ d[5] ^ d[6] ^ d[8]  ^ d[9]  ^ d[13] ^ d[14] ^ d[15] ^ d[16] ^ d[17] ^ d[20] ^ d[21] ^ d[23],
		last_d29 ^ d[2] ^ d[4] ^ d[5] ^ d[7] ^ d[8] ^ d[9]  ^ d[10] ^ d[12] ^ d[14] ^ d[18] ^ d[21] ^ d[22] ^ d[23],
	]
}

fn encode_subframe(data:&[bool; 240]) -> [bool; BITS_PER_SUBFRAME] {
	let mut out = [false; BITS_PER_SUBFRAME];
	let mut last_d29 = false;
	let mut last_d30 = false;

	for word_idx in 0..10 {
		let d = &data[word_idx*24..(word_idx+1)*24];
		let mut t:Vec<bool> = d.iter().map(|b| b ^ last_d30).collect();

		if word_idx == 1 || word_idx == 9 {
			// Words two and ten end in two zero parity bits; their last two
			// data bits are non-information bits solved to make it so
			'solve: for b23 in &[false, true] {
				for b24 in &[false, true] {
					t[22] = *b23;
					t[23] = *b24;
					let p = parity_bits(&t, last_d29, last_d30);
					if !p[4] && !p[5] { break 'solve; }
				}
			}
		}

		let p = parity_bits(&t, last_d29, last_d30);
		for i in 0..24 { out[word_idx*30 + i] = t[i]; }
		for i in 0..6  { out[word_idx*30 + 24 + i] = p[i]; }
		last_d29 = out[word_idx*30 + 28];
		last_d30 = out[word_idx*30 + 29];
	}

	out
}

fn set_bits(data:&mut [bool], start:usize, len:usize, value:u64) {
	for i in 0..len {
		data[start + i] = (value >> (len - 1 - i)) & 1 == 1;
	}
}

fn common_header(data:&mut [bool; 240], tow_count:u64, subframe_id:u64) {
	for (i, b) in [true, false, false, false, true, false, true, true].iter().enumerate() {
		data[i] = *b;
	}
	set_bits(data, 24, 17, tow_count);
	set_bits(data, 43, 3, subframe_id);
}

const IODE:u64 = 90;
const WEEK_NUMBER:u64 = 243;
const SQRT_A_FIELD:u64 = 0xA1B2_C3D4;
const E_FIELD:u64 = 0x00A0_0000;
const M0_FIELD:u64 = 0x2ABC_DEF1;
const T_OE_FIELD:u64 = 0x1C2;

fn subframe1(tow_count:u64) -> [bool; BITS_PER_SUBFRAME] {
	let mut data = [false; 240];
	common_header(&mut data, tow_count, 1);
	set_bits(&mut data, 48, 10, WEEK_NUMBER);
	set_bits(&mut data, 60, 4, 2);          // URA index
	set_bits(&mut data, 64, 6, 0);          // healthy
	set_bits(&mut data, 70, 2, 0);          // IODC MSBs
	set_bits(&mut data, 160, 8, 13);        // T_GD
	set_bits(&mut data, 168, 8, IODE);      // IODC LSBs
	set_bits(&mut data, 176, 16, 0x1C2);    // t_oc
	set_bits(&mut data, 200, 16, 11);       // a_f1
	set_bits(&mut data, 216, 22, 0x2F0);    // a_f0
	encode_subframe(&data)
}

fn subframe2(tow_count:u64) -> [bool; BITS_PER_SUBFRAME] {
	let mut data = [false; 240];
	common_header(&mut data, tow_count, 2);
	set_bits(&mut data, 48, 8, IODE);
	set_bits(&mut data, 56, 16, 0xFFC1);    // C_rs = -63 * 2^-5
	set_bits(&mut data, 72, 16, 1201);      // delta n
	set_bits(&mut data, 88, 32, M0_FIELD);
	set_bits(&mut data, 120, 16, 321);      // C_uc
	set_bits(&mut data, 136, 32, E_FIELD);
	set_bits(&mut data, 168, 16, 481);      // C_us
	set_bits(&mut data, 184, 32, SQRT_A_FIELD);
	set_bits(&mut data, 216, 16, T_OE_FIELD);
	encode_subframe(&data)
}

fn subframe3(tow_count:u64) -> [bool; BITS_PER_SUBFRAME] {
	let mut data = [false; 240];
	common_header(&mut data, tow_count, 3);
	set_bits(&mut data, 48, 16, 17);        // C_ic
	set_bits(&mut data, 64, 32, 0x1234_5678); // Omega0
	set_bits(&mut data, 96, 16, 23);        // C_is
	set_bits(&mut data, 112, 32, 0x2222_1111); // i0
	set_bits(&mut data, 144, 16, 251);      // C_rc
	set_bits(&mut data, 160, 32, 0x0F0F_0F0F); // omega
	set_bits(&mut data, 192, 24, 0xFFFF00);    // Omega dot
	set_bits(&mut data, 216, 8, IODE);
	set_bits(&mut data, 224, 14, 100);      // IDOT
	encode_subframe(&data)
}

// The broadcast bit stream: subframes 1, 2, 3 cycling with an incrementing
// time of week, entered mid-subframe so the decoder has to hunt
fn navigation_bits(total_bits:usize, skip:usize) -> Vec<i8> {
	let mut bits:Vec<i8> = vec![];
	let mut subframe_idx:u64 = 0;
	while bits.len() < total_bits + skip {
		let tow_count = 7000 + subframe_idx + 1;
		let sf = match subframe_idx % 3 {
			0 => subframe1(tow_count),
			1 => subframe2(tow_count),
			_ => subframe3(tow_count),
		};
		bits.extend(sf.iter().map(|b| if *b { 1i8 } else { -1i8 }));
		subframe_idx += 1;
	}
	bits.drain(..skip);
	bits.truncate(total_bits);
	bits
}

// ---- Baseband synthesis --------------------------------------------------

struct SyntheticSource {
	bits: Vec<i8>,
	code: Vec<i8>,
	doppler_hz: f64,
	code_phase: f64,
	ms: usize,
	total_ms: usize,
}

impl SyntheticSource {

	fn new(prn:usize, doppler_hz:f64, code_phase:f64, total_ms:usize) -> Self {
		Self{
			bits: navigation_bits(total_ms / 20 + 1, 290),
			code: signal_modulation::prn_int_sampled(prn).unwrap(),
			doppler_hz,
			code_phase,
			ms: 0,
			total_ms,
		}
	}

}

impl SampleSource for SyntheticSource {

	fn next_ms(&mut self) -> Result<Option<Vec<Complex<f64>>>, Error> {
		if self.ms >= self.total_ms { return Ok(None); }
		let n = SAMPLES_PER_MS;
		let bit = self.bits[self.ms / 20] as f64;

		// The code stretches with the carrier Doppler just as a real signal
		// does
		let true_phase = self.code_phase - (n as f64) * self.doppler_hz / L1_CARRIER_HZ * (self.ms as f64);
		let shift = (true_phase.round() as i64).rem_euclid(n as i64) as usize;
		let base = n - shift;

		let start_phase = 2.0 * std::f64::consts::PI * self.doppler_hz * ((self.ms * n) as f64) / SAMPLES_PER_SEC;
		let step = 2.0 * std::f64::consts::PI * self.doppler_hz / SAMPLES_PER_SEC;
		let mut carrier = Complex{ re: start_phase.cos(), im: start_phase.sin() };
		let rot = Complex{ re: step.cos(), im: step.sin() };

		let block:Vec<Complex<f64>> = (0..n).map(|i| {
			let sample = carrier * (self.code[(i + base) % n] as f64) * bit;
			carrier = carrier * rot;
			sample
		}).collect();

		self.ms += 1;
		Ok(Some(block))
	}

	fn start_timestamp(&self) -> chrono::DateTime<Utc> {
		Utc.timestamp_opt(1_699_037_280, 0).single().unwrap()
	}

}

// ---- The scenario --------------------------------------------------------

#[test]
fn single_satellite_reaches_ephemeris_ready_but_yields_no_solution() {
	let source = SyntheticSource::new(7, 800.0, 500.0, 32_000);
	let mut receiver = Receiver::with_satellites(source, &[7]).unwrap();

	let mut acquired_at_ms:Option<usize> = None;
	let mut decoded_tows:Vec<f64> = vec![];
	let mut tick = 0;

	loop {
		match receiver.step_1ms().unwrap() {
			Some(report) => {
				if report.new_acquisition == Some(7) && acquired_at_ms.is_none() {
					acquired_at_ms = Some(tick);
				}
				for (prn, sf) in report.new_subframes {
					assert_eq!(prn, 7);
					decoded_tows.push(sf.common.time_of_week_sec);
				}
				assert!(report.new_solution.is_none(), "a solution from one satellite");
			},
			None => break,
		}
		tick += 1;
	}

	// Acquisition happens as soon as the ten millisecond window fills
	let acquired_at_ms = acquired_at_ms.expect("PRN 7 was never acquired");
	assert!(acquired_at_ms < 100, "acquired at {} ms", acquired_at_ms);

	// The channel climbed the whole ladder
	let chn = &receiver.channels()[0];
	assert_eq!(chn.state(), ChannelState::EphemerisReady);
	assert!(chn.bit_boundary_offset().is_some());
	assert!(chn.bit_phase().is_some());
	assert!(chn.required_subframes_received());

	// Decoded times of week are consecutive six second counts
	assert!(decoded_tows.len() >= 3, "only {} subframes decoded", decoded_tows.len());
	for pair in decoded_tows.windows(2) {
		assert_eq!(pair[1] - pair[0], 6.0);
	}
	for tow in decoded_tows.iter() {
		assert_eq!(tow % 6.0, 0.0);
		assert!(*tow >= 7001.0 * 6.0 && *tow <= 7100.0 * 6.0, "implausible TOW {}", tow);
	}

	// The assembled ephemeris reproduces the broadcast parameters
	let eph = chn.ephemeris().expect("no ephemeris");
	assert_eq!(eph.iode, IODE as u8);
	assert_eq!(eph.week_number, WEEK_NUMBER as u16);
	assert_eq!(eph.sqrt_a, (SQRT_A_FIELD as f64) * (2.0_f64).powi(-19));
	assert_eq!(eph.e, (E_FIELD as f64) * (2.0_f64).powi(-33));
	assert_eq!(eph.m0, (M0_FIELD as f64) * (2.0_f64).powi(-31) * std::f64::consts::PI);
	assert_eq!(eph.t_oe, (T_OE_FIELD as f64) * (2.0_f64).powi(4));
	assert_eq!(eph.t_gd, 13.0 * (2.0_f64).powi(-31));

	// No solution is ever produced from a lone satellite
	assert!(receiver.solutions().is_empty());

	// The status payload reflects the same picture
	let snapshot = receiver.snapshot();
	assert!(snapshot.solutions.is_empty());
	assert_eq!(snapshot.tracked_satellites.len(), 1);
	assert_eq!(snapshot.tracked_satellites[0].satellite_id, 7);
	assert!(snapshot.tracked_satellites[0].required_subframes_received);
	assert!(snapshot.tracked_satellites[0].bit_boundary_found);
	assert!(snapshot.untracked_satellites.is_empty());
	assert!(!snapshot.tracked_satellites[0].carrier_frequency_shifts.is_empty());
}

#[test]
fn empty_source_ends_the_run_cleanly() {
	let source = SyntheticSource::new(7, 0.0, 0.0, 0);
	let mut receiver = Receiver::with_satellites(source, &[7]).unwrap();
	assert!(receiver.step_1ms().unwrap().is_none());
	receiver.run().unwrap();
	assert!(receiver.solutions().is_empty());
}
