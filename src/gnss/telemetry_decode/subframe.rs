
use std::f64::consts;

use serde::{Serialize, Deserialize};

use crate::Error;
use crate::utils;

use super::DATA_BITS_PER_SUBFRAME;

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct CommonFields {
	/// GPS time of week at the leading edge of the next subframe, i.e. the
	/// instant the last bit of this subframe left the satellite.
	pub time_of_week_sec: f64,
	pub subframe_id: u8,
	/// Receiver sample index at which the final bit of the subframe ended.
	pub end_sample_idx: usize,
}

/// Clock correction and health terms, broadcast in subframe 1.
#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Subframe1 {
	pub week_number: u16,
	pub ura_index: u8,
	pub sv_health: u8,
	pub iodc: u16,
	pub t_gd: f64,
	pub t_oc: f64,
	pub a_f2: f64,
	pub a_f1: f64,
	pub a_f0: f64,
}

/// The first half of the ephemeris, broadcast in subframe 2.  Angles are
/// converted from semicircles to radians at decode time.
#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Subframe2 {
	pub iode: u8,
	pub crs: f64,
	pub dn: f64,
	pub m0: f64,
	pub cuc: f64,
	pub e: f64,
	pub cus: f64,
	pub sqrt_a: f64,
	pub t_oe: f64,
	pub fit_interval: bool,
	pub aodo: u8,
}

/// The second half of the ephemeris, broadcast in subframe 3.
#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Subframe3 {
	pub cic: f64,
	pub omega0: f64,
	pub cis: f64,
	pub i0: f64,
	pub crc: f64,
	pub omega: f64,
	pub omega_dot: f64,
	pub iode: u8,
	pub idot: f64,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub enum SubframeBody {
	Subframe1(Subframe1),
	Subframe2(Subframe2),
	Subframe3(Subframe3),
	// Almanac and ionospheric pages; only their handover words matter here
	Subframe4,
	Subframe5,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Subframe {
	pub common: CommonFields,
	pub body: SubframeBody,
}

/// Decodes the 240 data bits of a parity-checked subframe.  Bit offsets and
/// scale factors follow IS-GPS-200 section 20.3.3.
pub fn decode(bits:&[bool; DATA_BITS_PER_SUBFRAME], end_sample_idx:usize) -> Result<Subframe, Error> {
	let time_of_week_sec:f64 = (utils::bool_slice_to_u32(&bits[24..41]) as f64) * 6.0;
	let subframe_id:u8 = utils::bool_slice_to_u8(&bits[43..46]);
	let common = CommonFields{ time_of_week_sec, subframe_id, end_sample_idx };

	let body = match subframe_id {
		1 => {
			let week_number:u16 = utils::bool_slice_to_u16(&bits[48..58]);
			let ura_index:u8 =  utils::bool_slice_to_u8(&bits[60..64]);
			let sv_health:u8 =  utils::bool_slice_to_u8(&bits[64..70]);
			let iodc:u16     =  utils::bool_slice_to_u16(&[&bits[70..72], &bits[168..176]].concat());
			let t_gd:f64     = (utils::bool_slice_to_i8(&bits[160..168]) as f64) * (2.0_f64).powi(-31);
			let t_oc:f64     = (utils::bool_slice_to_u32(&bits[176..192]) as f64) * (2.0_f64).powi(4);
			let a_f2:f64     = (utils::bool_slice_to_i8(&bits[192..200]) as f64) * (2.0_f64).powi(-55);
			let a_f1:f64     = (utils::bool_slice_to_i16(&bits[200..216]) as f64) * (2.0_f64).powi(-43);
			let a_f0:f64     = (utils::bool_slice_to_i32(&bits[216..238]) as f64) * (2.0_f64).powi(-31);
			SubframeBody::Subframe1(Subframe1{ week_number, ura_index, sv_health, iodc, t_gd, t_oc, a_f2, a_f1, a_f0 })
		},
		2 => {
			let iode:u8    =  utils::bool_slice_to_u8( &bits[ 48..56 ]);
			let crs:f64    = (utils::bool_slice_to_i16(&bits[ 56..72 ]) as f64) * (2.0_f64).powi(-5);
			let dn:f64     = (utils::bool_slice_to_i16(&bits[ 72..88 ]) as f64) * (2.0_f64).powi(-43) * consts::PI;
			let m0:f64     = (utils::bool_slice_to_i32(&bits[ 88..120]) as f64) * (2.0_f64).powi(-31) * consts::PI;
			let cuc:f64    = (utils::bool_slice_to_i16(&bits[120..136]) as f64) * (2.0_f64).powi(-29);
			let e:f64      = (utils::bool_slice_to_u32(&bits[136..168]) as f64) * (2.0_f64).powi(-33);
			let cus:f64    = (utils::bool_slice_to_i16(&bits[168..184]) as f64) * (2.0_f64).powi(-29);
			let sqrt_a:f64 = (utils::bool_slice_to_u32(&bits[184..216]) as f64) * (2.0_f64).powi(-19);
			let t_oe:f64   = (utils::bool_slice_to_u16(&bits[216..232]) as f64) * (2.0_f64).powi(4);
			let fit_interval:bool = bits[233];
			let aodo:u8    =  utils::bool_slice_to_u8( &bits[234..239]);
			SubframeBody::Subframe2(Subframe2{ iode, crs, dn, m0, cuc, e, cus, sqrt_a, t_oe, fit_interval, aodo })
		},
		3 => {
			let cic:f64       = (utils::bool_slice_to_i16(&bits[ 48..64 ]) as f64) * (2.0_f64).powi(-29);
			let omega0:f64    = (utils::bool_slice_to_i32(&bits[ 64..96 ]) as f64) * (2.0_f64).powi(-31) * consts::PI;
			let cis:f64       = (utils::bool_slice_to_i16(&bits[ 96..112]) as f64) * (2.0_f64).powi(-29);
			let i0:f64        = (utils::bool_slice_to_i32(&bits[112..144]) as f64) * (2.0_f64).powi(-31) * consts::PI;
			let crc:f64       = (utils::bool_slice_to_i16(&bits[144..160]) as f64) * (2.0_f64).powi(-5);
			let omega:f64     = (utils::bool_slice_to_i32(&bits[160..192]) as f64) * (2.0_f64).powi(-31) * consts::PI;
			let omega_dot:f64 = (utils::bool_slice_to_i32(&bits[192..216]) as f64) * (2.0_f64).powi(-43) * consts::PI;
			let iode:u8       =  utils::bool_slice_to_u8( &bits[216..224]);
			let idot:f64      = (utils::bool_slice_to_i16(&bits[224..238]) as f64) * (2.0_f64).powi(-43) * consts::PI;
			SubframeBody::Subframe3(Subframe3{ cic, omega0, cis, i0, crc, omega, omega_dot, iode, idot })
		},
		4 => SubframeBody::Subframe4,
		5 => SubframeBody::Subframe5,
		_ => return Err(Error::InvalidTelemetry("subframe id outside 1 through 5")),
	};

	Ok(Subframe{ common, body })
}
