
use clap::{App, Arg};
use colored::*;
use chrono::{TimeZone, Utc};

use gps_receiver::io::{FileSource, RtlSdrSource, SampleSource};
use gps_receiver::receiver::Receiver;

fn main() {

	let matches = App::new("GPS L1 C/A Receiver")
		.version("0.1.0")
		.about("Takes I/Q samples centered on 1575.42 MHz at 2.046 MSa/s and produces position fixes for a stationary observer")
		.arg(Arg::with_name("file")
			.short("f").long("file")
			.help("Recorded capture of interleaved little-endian float32 I/Q pairs")
			.takes_value(true))
		.arg(Arg::with_name("timestamp")
			.short("t").long("timestamp")
			.help("Unix timestamp of the first sample of the capture")
			.takes_value(true))
		.arg(Arg::with_name("rtl-sdr")
			.long("rtl-sdr")
			.help("Live mode: read the rtl_sdr tool's unsigned 8-bit I/Q stream from stdin")
			.conflicts_with("file"))
		.get_matches();

	let file_mode = matches.is_present("file");
	let live_mode = matches.is_present("rtl-sdr");
	if file_mode == live_mode {
		eprintln!("{}", "Exactly one of -f FILE or --rtl-sdr is required".red());
		std::process::exit(1);
	}

	if file_mode {
		let fname = matches.value_of("file").unwrap();
		let start = match matches.value_of("timestamp") {
			Some(t) => {
				let secs:i64 = match t.parse() {
					Ok(secs) => secs,
					Err(_) => {
						eprintln!("{}", format!("Invalid timestamp {:?}", t).red());
						std::process::exit(1);
					}
				};
				match Utc.timestamp_opt(secs, 0).single() {
					Some(start) => start,
					None => {
						eprintln!("{}", format!("Timestamp {} is out of range", secs).red());
						std::process::exit(1);
					}
				}
			},
			None => Utc::now(),
		};

		eprintln!("Decoding {} starting at {}", fname, start);

		let source = match FileSource::new(fname, start) {
			Ok(source) => source,
			Err(e) => {
				eprintln!("{}", format!("Unable to open sample source: {}", e).red());
				std::process::exit(2);
			}
		};

		// The status endpoint only runs against file replay, where a stalled
		// reader cannot drop samples
		run(source, true);
	} else {
		run(RtlSdrSource::from_stdin(), false);
	}

}

fn run<S: SampleSource>(source:S, status_endpoint:bool) {
	let mut receiver = match Receiver::new(source) {
		Ok(receiver) => receiver,
		Err(e) => {
			eprintln!("{}", format!("{}", e).red());
			std::process::exit(2);
		}
	};

	if status_endpoint {
		if let Err(e) = receiver.enable_status_endpoint() {
			eprintln!("{}", format!("{}", e).red());
			std::process::exit(2);
		}
	}

	let mut last_fix_print_s:f64 = -1.0;

	loop {
		match receiver.step_1ms() {
			Ok(Some(report)) => {
				let now_s = receiver.sample_time_s();

				if let Some(prn) = report.new_acquisition {
					let chn = receiver.channels().iter().find(|c| c.prn == prn);
					if let Some(acq) = chn.and_then(|c| c.last_acquisition()) {
						eprintln!("{:.1} [sec]: PRN {}: acquired at {:.0} [Hz] doppler, code phase {}, peak-to-sidelobe {:.2}",
							now_s, prn, acq.doppler_hz, acq.code_phase_samples, acq.peak_to_side_ratio);
					}
				}
				for prn in report.lost_locks {
					eprintln!("{}", format!("{:.1} [sec]: PRN {}: lost lock, returning to acquisition pool", now_s, prn).red());
				}
				for (prn, sf) in report.new_subframes {
					eprintln!("{}", format!("{:.1} [sec]: PRN {}: subframe {} at TOW {:.0} [sec]",
						now_s, prn, sf.common.subframe_id, sf.common.time_of_week_sec).cyan());
				}
				if let Some(solution) = report.new_solution {
					// Solutions arrive every millisecond once four satellites
					// are ready; one line per second is enough
					if now_s - last_fix_print_s >= 1.0 {
						last_fix_print_s = now_s;
						eprintln!("{}", format!("Position fix: {:.5} [deg] lat, {:.5} [deg] lon, {:.1} [m], clock bias {:.3} [us]",
							solution.position_geodetic.latitude_deg,
							solution.position_geodetic.longitude_deg,
							solution.position_geodetic.height_m,
							solution.clock_bias_s * 1.0e6).green().bold());
					}
				}
			},
			Ok(None) => break,
			Err(e) => {
				eprintln!("{}", format!("Sample source failure: {}", e).red());
				std::process::exit(2);
			}
		}
	}

	match serde_json::to_string_pretty(&receiver.solutions()) {
		Ok(json) => println!("{}", json),
		Err(e) => eprintln!("{}", format!("{}", e).red()),
	}
}
