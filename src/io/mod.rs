
use std::fs::File;
use std::io::{self, BufReader, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, Utc};
use rustfft::num_complex::Complex;

use crate::{Error, SAMPLES_PER_MS};

/// A pull source of baseband I/Q samples at 2.046 MSa/s.  The unit of work is
/// one millisecond: exactly 2046 complex samples.
pub trait SampleSource {

	/// Returns the next millisecond of samples, or `None` once the stream is
	/// exhausted.  A trailing partial millisecond is dropped.
	fn next_ms(&mut self) -> Result<Option<Vec<Complex<f64>>>, Error>;

	/// Wall-clock time just before the first sample of the stream was taken.
	fn start_timestamp(&self) -> DateTime<Utc>;

}

/// Reads interleaved little-endian float32 I/Q pairs from a recorded capture.
/// There is no header; the start timestamp is supplied by the caller.
pub struct FileSource {
	reader: BufReader<File>,
	start: DateTime<Utc>,
}

impl FileSource {

	pub fn new(path:&str, start:DateTime<Utc>) -> Result<Self, Error> {
		let f = File::open(path)?;
		Ok(Self{ reader: BufReader::new(f), start })
	}

}

impl SampleSource for FileSource {

	fn next_ms(&mut self) -> Result<Option<Vec<Complex<f64>>>, Error> {
		let mut block:Vec<Complex<f64>> = Vec::with_capacity(SAMPLES_PER_MS);
		for _ in 0..SAMPLES_PER_MS {
			let re = match self.reader.read_f32::<LittleEndian>() {
				Ok(x) => x,
				Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
				Err(e) => return Err(e.into()),
			};
			let im = match self.reader.read_f32::<LittleEndian>() {
				Ok(x) => x,
				Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
				Err(e) => return Err(e.into()),
			};
			block.push(Complex{ re: re as f64, im: im as f64 });
		}
		Ok(Some(block))
	}

	fn start_timestamp(&self) -> DateTime<Utc> { self.start }

}

/// Reads the rtl_sdr capture tool's native unsigned 8-bit interleaved I/Q
/// stream, e.g. `rtl_sdr -f 1575420000 -s 2046000 - | gps_receiver --rtl-sdr`.
/// Each byte is centered at 127.5 and scaled to roughly unit amplitude.
pub struct RtlSdrSource<R: Read> {
	reader: R,
	start: DateTime<Utc>,
}

impl RtlSdrSource<io::Stdin> {

	pub fn from_stdin() -> Self {
		Self{ reader: io::stdin(), start: Utc::now() }
	}

}

impl<R: Read> RtlSdrSource<R> {

	pub fn new(reader:R, start:DateTime<Utc>) -> Self { Self{ reader, start } }

}

impl<R: Read> SampleSource for RtlSdrSource<R> {

	fn next_ms(&mut self) -> Result<Option<Vec<Complex<f64>>>, Error> {
		let mut raw = [0u8; SAMPLES_PER_MS * 2];
		let mut filled:usize = 0;
		while filled < raw.len() {
			match self.reader.read(&mut raw[filled..]) {
				Ok(0) => return Ok(None),
				Ok(n) => filled += n,
				Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(e) => return Err(e.into()),
			}
		}
		let block:Vec<Complex<f64>> = raw.chunks_exact(2)
			.map(|iq| Complex{ re: (iq[0] as f64 - 127.5)/127.5, im: (iq[1] as f64 - 127.5)/127.5 })
			.collect();
		Ok(Some(block))
	}

	fn start_timestamp(&self) -> DateTime<Utc> { self.start }

}
