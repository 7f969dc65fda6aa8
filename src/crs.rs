//! Coordinate reference systems for site geometry.
//!
//! Supported CRS objects:
//! - `{"type": "proj4", "properties": {"projection": "+proj=utm +zone=10 +datum=WGS84"}}`
//!   (also `+south` and `+proj=longlat`)
//! - `{"type": "roversw", "properties": {"originEasting": .., "originNorthing": .., "zone": 10, "zoneLetter": "S"}}`,
//!   a UTM plane shifted to a false origin
//! - `{"type": "name", "properties": {"name": "EPSG:4326"}}` and UTM EPSG codes
//!
//! Projection is WGS84 transverse Mercator using the USGS series expansion.

use crate::error::{Result, XpjsonError};

use serde_json::Value;

const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;
const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Crs {
    LonLat,
    Utm {
        zone: u8,
        south: bool,
    },
    /// UTM coordinates relative to `(origin_easting, origin_northing)`.
    LocalTangent {
        zone: u8,
        south: bool,
        origin_easting: f64,
        origin_northing: f64,
    },
}

impl Crs {
    pub fn from_value(value: &Value) -> Result<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| crs_error("missing 'type'"))?;
        let props = value
            .get("properties")
            .ok_or_else(|| crs_error("missing 'properties'"))?;

        match kind {
            "proj4" => {
                let projection = props
                    .get("projection")
                    .and_then(Value::as_str)
                    .ok_or_else(|| crs_error("proj4 crs needs 'properties.projection'"))?;
                Self::from_proj4(projection)
            }
            "roversw" => {
                let number = |key: &str| {
                    props
                        .get(key)
                        .and_then(Value::as_f64)
                        .ok_or_else(|| crs_error(format!("roversw crs needs numeric '{}'", key)))
                };
                let zone = parse_zone(props.get("zone"))?;
                let south = match props.get("zoneLetter").and_then(Value::as_str) {
                    Some(letter) => letter.to_ascii_uppercase().as_str() < "N",
                    None => false,
                };
                Ok(Crs::LocalTangent {
                    zone,
                    south,
                    origin_easting: number("originEasting")?,
                    origin_northing: number("originNorthing")?,
                })
            }
            "name" => {
                let name = props
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| crs_error("named crs needs 'properties.name'"))?;
                Self::from_name(name)
            }
            other => Err(crs_error(format!("unsupported crs type '{}'", other))),
        }
    }

    pub fn from_proj4(projection: &str) -> Result<Self> {
        let mut proj = None;
        let mut zone = None;
        let mut south = false;
        for token in projection.split_whitespace() {
            let token = token.trim_start_matches('+');
            match token.split_once('=') {
                Some(("proj", p)) => proj = Some(p),
                Some(("zone", z)) => {
                    zone = Some(
                        z.parse::<u8>()
                            .map_err(|_| crs_error(format!("bad utm zone '{}'", z)))?,
                    )
                }
                Some(("datum" | "ellps", d)) if d != "WGS84" => {
                    return Err(crs_error(format!("unsupported datum '{}'", d)));
                }
                None if token == "south" => south = true,
                _ => {}
            }
        }

        match proj {
            Some("longlat" | "latlong") => Ok(Crs::LonLat),
            Some("utm") => {
                let zone = zone.ok_or_else(|| crs_error("utm projection needs +zone"))?;
                check_zone(zone)?;
                Ok(Crs::Utm { zone, south })
            }
            Some(other) => Err(crs_error(format!("unsupported projection '{}'", other))),
            None => Err(crs_error("proj4 string has no +proj")),
        }
    }

    fn from_name(name: &str) -> Result<Self> {
        let code = name.rsplit(':').next().unwrap_or(name);
        match code {
            "4326" | "CRS84" => Ok(Crs::LonLat),
            c if c.len() == 5 && (c.starts_with("326") || c.starts_with("327")) => {
                let zone = c[3..]
                    .parse::<u8>()
                    .map_err(|_| crs_error(format!("bad EPSG code '{}'", name)))?;
                check_zone(zone)?;
                Ok(Crs::Utm {
                    zone,
                    south: c.starts_with("327"),
                })
            }
            _ => Err(crs_error(format!("unsupported crs name '{}'", name))),
        }
    }

    /// Whether coordinates in this CRS are planar meters.
    pub fn is_projected(&self) -> bool {
        !matches!(self, Crs::LonLat)
    }

    pub fn to_local(&self, lon: f64, lat: f64) -> [f64; 2] {
        match *self {
            Crs::LonLat => [lon, lat],
            Crs::Utm { zone, south } => utm_forward(zone, south, lon, lat),
            Crs::LocalTangent {
                zone,
                south,
                origin_easting,
                origin_northing,
            } => {
                let [e, n] = utm_forward(zone, south, lon, lat);
                [e - origin_easting, n - origin_northing]
            }
        }
    }

    pub fn to_lon_lat(&self, x: f64, y: f64) -> [f64; 2] {
        match *self {
            Crs::LonLat => [x, y],
            Crs::Utm { zone, south } => utm_inverse(zone, south, x, y),
            Crs::LocalTangent {
                zone,
                south,
                origin_easting,
                origin_northing,
            } => utm_inverse(zone, south, x + origin_easting, y + origin_northing),
        }
    }
}

/// Great-circle distance in meters between two `[lon, lat]` points.
pub fn haversine_m(a: [f64; 2], b: [f64; 2]) -> f64 {
    let (lat1, lat2) = (a[1].to_radians(), b[1].to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b[0] - a[0]).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

pub fn planar_m(a: [f64; 2], b: [f64; 2]) -> f64 {
    (b[0] - a[0]).hypot(b[1] - a[1])
}

fn crs_error(msg: impl Into<String>) -> XpjsonError {
    XpjsonError::Crs(msg.into())
}

fn check_zone(zone: u8) -> Result<()> {
    if (1..=60).contains(&zone) {
        Ok(())
    } else {
        Err(crs_error(format!("utm zone {} out of range 1..=60", zone)))
    }
}

fn parse_zone(value: Option<&Value>) -> Result<u8> {
    let zone = match value {
        Some(Value::Number(n)) => n.as_u64().and_then(|z| u8::try_from(z).ok()),
        Some(Value::String(s)) => s.trim().parse::<u8>().ok(),
        _ => None,
    }
    .ok_or_else(|| crs_error("roversw crs needs an integer 'zone'"))?;
    check_zone(zone)?;
    Ok(zone)
}

fn central_meridian(zone: u8) -> f64 {
    (f64::from(zone) * 6.0 - 183.0).to_radians()
}

fn e2() -> f64 {
    F * (2.0 - F)
}

fn meridian_arc(phi: f64) -> f64 {
    let e2 = e2();
    let (e4, e6) = (e2 * e2, e2 * e2 * e2);
    A * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
        - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

fn utm_forward(zone: u8, south: bool, lon: f64, lat: f64) -> [f64; 2] {
    let e2 = e2();
    let ep2 = e2 / (1.0 - e2);
    let phi = lat.to_radians();
    let (sin_phi, cos_phi, tan_phi) = (phi.sin(), phi.cos(), phi.tan());

    let n = A / (1.0 - e2 * sin_phi * sin_phi).sqrt();
    let t = tan_phi * tan_phi;
    let c = ep2 * cos_phi * cos_phi;
    let a = cos_phi * (lon.to_radians() - central_meridian(zone));
    let m = meridian_arc(phi);

    let easting = K0
        * n
        * (a + (1.0 - t + c) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0)
        + FALSE_EASTING;
    let mut northing = K0
        * (m + n
            * tan_phi
            * (a * a / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));
    if south {
        northing += FALSE_NORTHING_SOUTH;
    }
    [easting, northing]
}

fn utm_inverse(zone: u8, south: bool, easting: f64, northing: f64) -> [f64; 2] {
    let e2 = e2();
    let ep2 = e2 / (1.0 - e2);
    let x = easting - FALSE_EASTING;
    let y = if south {
        northing - FALSE_NORTHING_SOUTH
    } else {
        northing
    };

    let (e4, e6) = (e2 * e2, e2 * e2 * e2);
    let mu = y / K0 / (A * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let (sin1, cos1, tan1) = (phi1.sin(), phi1.cos(), phi1.tan());
    let n1 = A / (1.0 - e2 * sin1 * sin1).sqrt();
    let t1 = tan1 * tan1;
    let c1 = ep2 * cos1 * cos1;
    let r1 = A * (1.0 - e2) / (1.0 - e2 * sin1 * sin1).powf(1.5);
    let d = x / (n1 * K0);

    let phi = phi1
        - (n1 * tan1 / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);
    let lambda = central_meridian(zone)
        + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / cos1;

    [lambda.to_degrees(), phi.to_degrees()]
}
