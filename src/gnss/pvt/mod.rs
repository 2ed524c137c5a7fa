
use nalgebra::{DMatrix, DVector, Vector3, Vector4};
use serde::{Serialize, Deserialize};

use crate::Error;
use crate::utils::kinematics;

pub mod ephemeris;

pub const C:f64 = 2.99792458e8;					 // [m/s] speed of light

const MIN_OBSERVATIONS:usize = 4;
const MAX_ITER:usize = 20;
const CONVERGENCE_THRESHOLD_M:f64 = 1.0e-4;

/// One satellite's contribution to a navigation solution: its position and
/// clock state at the moment of transmission, and when the receiver heard it.
#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Observation {
	pub sv_id: usize,
	pub t_transmitted_sv: f64,
	pub t_received: f64,
	pub pos_ecef: (f64, f64, f64),
	pub sv_clock: f64,
	pub t_gd: f64,
}

impl Observation {

	/// The apparent range, corrected for the broadcast clock polynomial and
	/// group delay but not for the receiver clock bias.
	pub fn pseudorange_m(&self) -> f64 {
		(self.t_received - self.t_transmitted_sv + self.sv_clock - self.t_gd) * C
	}

}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct GeodeticCoordinates {
	pub latitude_deg: f64,
	pub longitude_deg: f64,
	pub height_m: f64,
}

/// A converged navigation solution.  Created once per solver invocation and
/// never mutated.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct Solution {
	pub clock_bias_s: f64,
	pub position_ecef: (f64, f64, f64),
	pub position_geodetic: GeodeticCoordinates,
	pub sv_count: usize,
	pub residual_norm_m: f64,
}

/// Solves for receiver position and clock bias by Gauss-Newton iteration over
/// at least four pseudoranges sharing a reception epoch.  The clock bias is
/// carried in meters inside the state vector for conditioning.
pub fn solve_position_and_time(observations:&[Observation], x0:Vector4<f64>) -> Result<(Solution, Vector4<f64>), Error> {
	if observations.len() < MIN_OBSERVATIONS {
		return Err(Error::NotEnoughObservations(observations.len()));
	}

	let n = observations.len();
	let mut x = x0.clone();
	let mut v = DVector::from_element(n, 0.0);

	for _ in 0..MAX_ITER {

		let mut h = DMatrix::from_element(n, 4, 0.0);

		for (i, ob) in observations.iter().enumerate() {
			let p_sv = Vector3::new(ob.pos_ecef.0, ob.pos_ecef.1, ob.pos_ecef.2);
			let p_ob = Vector3::new(x[0], x[1], x[2]);

			let p_rel = p_sv - p_ob;
			let range:f64 = p_rel.norm();
			let e = p_rel / range;

			v[i] = ob.pseudorange_m() - range - x[3];
			for j in 0..3 { h[(i, j)] = -e[j]; }
			h[(i, 3)] = 1.0;
		}

		let q = match (h.tr_mul(&h)).try_inverse() {
			Some(q) => q,
			None => return Err(Error::DidNotConverge),
		};
		let dx = q * h.tr_mul(&v);
		for j in 0..4 { x[j] += dx[j]; }

		if dx.norm() < CONVERGENCE_THRESHOLD_M {
			if !x.iter().chain(v.iter()).all(|a| a.is_finite()) {
				return Err(Error::DidNotConverge);
			}

			let geo = kinematics::ecef_to_wgs84(x[0], x[1], x[2]);
			let solution = Solution{
				clock_bias_s: x[3] / C,
				position_ecef: (x[0], x[1], x[2]),
				position_geodetic: GeodeticCoordinates{
					latitude_deg:  geo.latitude  * 180.0 / std::f64::consts::PI,
					longitude_deg: geo.longitude * 180.0 / std::f64::consts::PI,
					height_m: geo.height_above_ellipsoid,
				},
				sv_count: n,
				residual_norm_m: v.norm(),
			};
			return Ok((solution, x));
		}

	}

	Err(Error::DidNotConverge)
}
