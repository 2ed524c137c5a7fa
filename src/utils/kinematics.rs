
use std::f64::consts;

pub const WGS84_SEMI_MAJOR_AXIS_METERS:f64 = 6378137.0;
pub const WGS84_FLATTENING:f64 = 1.0 / 298.257223563;
pub const WGS84_SEMI_MINOR_AXIS_METERS:f64 = WGS84_SEMI_MAJOR_AXIS_METERS * (1.0 - WGS84_FLATTENING);

#[derive(Debug, Clone, Copy)]
pub struct PositionWGS84 {
	pub latitude:f64,
	pub longitude:f64,
	pub height_above_ellipsoid:f64,
}

/// Converts an ECEF position to geodetic coordinates on the WGS-84 ellipsoid
/// using Bowring's method, iterating the parametric-latitude update until the
/// geodetic latitude settles.  Angles are in radians.
pub fn ecef_to_wgs84(e1:f64, e2:f64, e3:f64) -> PositionWGS84 {
	let a:f64 = WGS84_SEMI_MAJOR_AXIS_METERS;
	let b:f64 = WGS84_SEMI_MINOR_AXIS_METERS;

	let e_sq:f64  = (a*a - b*b) / (a*a);
	let ep_sq:f64 = (a*a - b*b) / (b*b);

	let p:f64 = (e1*e1 + e2*e2).sqrt();
	let longitude:f64 = e2.atan2(e1);

	// Near the poles the horizontal distance vanishes and the latitude is known
	if p < 1.0e-6 {
		let latitude:f64 = if e3 >= 0.0 { 0.5*consts::PI } else { -0.5*consts::PI };
		return PositionWGS84{ latitude, longitude, height_above_ellipsoid: e3.abs() - b };
	}

	let mut beta:f64 = (e3 * a / (p * b)).atan();
	let mut latitude:f64 = 0.0;
	for _ in 0..10 {
		let new_latitude:f64 = {
			let num:f64   = e3 + (ep_sq * b * beta.sin().powi(3));
			let denom:f64 = p  - (e_sq  * a * beta.cos().powi(3));
			(num/denom).atan()
		};
		beta = ((1.0 - WGS84_FLATTENING) * new_latitude.tan()).atan();
		if (new_latitude - latitude).abs() < 1.0e-12 { latitude = new_latitude; break; }
		latitude = new_latitude;
	}

	let v = a / (1.0 - (e_sq*latitude.sin().powi(2))).sqrt();
	let height_above_ellipsoid = p*latitude.cos() + e3*latitude.sin() - (a*a / v);

	PositionWGS84{ latitude, longitude, height_above_ellipsoid }
}

/// The inverse of `ecef_to_wgs84`; latitude and longitude in radians.
pub fn wgs84_to_ecef(latitude:f64, longitude:f64, height:f64) -> (f64, f64, f64) {
	let a:f64 = WGS84_SEMI_MAJOR_AXIS_METERS;
	let b:f64 = WGS84_SEMI_MINOR_AXIS_METERS;
	let e_sq:f64 = (a*a - b*b) / (a*a);

	let v = a / (1.0 - (e_sq*latitude.sin().powi(2))).sqrt();

	let x = (v + height) * latitude.cos() * longitude.cos();
	let y = (v + height) * latitude.cos() * longitude.sin();
	let z = (v*(1.0 - e_sq) + height) * latitude.sin();
	(x, y, z)
}
