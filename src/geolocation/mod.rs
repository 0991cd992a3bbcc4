//! IP geolocation
//!
//! The detectors that reason about physical distance depend on a pluggable
//! `GeoProvider`. The shipped implementation reads a MaxMind GeoLite2-City
//! database (downloaded separately, free with registration); tests use the
//! in-memory `StaticProvider`.

use maxminddb::{geoip2, Reader};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Failure to open or query the geolocation database
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("cannot read geolocation database {path}: {source}")]
    Open {
        path: String,
        source: maxminddb::MaxMindDBError,
    },

    #[error("no usable location for {0}")]
    Unresolvable(IpAddr),
}

/// Geographic coordinates for an IP address
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Great-circle distance between two points (Haversine), in kilometers
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let lat1_rad = a.latitude.to_radians();
    let lat2_rad = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Pluggable IP-to-location collaborator
///
/// Lookups are best-effort: `None` means the address cannot be resolved and
/// distance-based detectors skip the event rather than guessing.
pub trait GeoProvider: Send + Sync {
    fn locate(&self, ip: &IpAddr) -> Option<GeoPoint>;
}

/// GeoProvider backed by a MaxMind GeoLite2-City database
///
/// The whole database is read into memory once; clones share the
/// reader.
#[derive(Clone)]
pub struct MaxMindProvider {
    reader: Arc<Reader<Vec<u8>>>,
}

impl MaxMindProvider {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, GeoError> {
        let path = db_path.as_ref();
        let reader = Reader::open_readfile(path).map_err(|source| GeoError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Ok(MaxMindProvider {
            reader: Arc::new(reader),
        })
    }

    /// Resolve an address to coordinates, surfacing why it failed
    ///
    /// Any record without both latitude and longitude counts as
    /// unresolvable; detectors must not reason about half a location.
    pub fn lookup(&self, ip: &IpAddr) -> Result<GeoPoint, GeoError> {
        let city: geoip2::City = self
            .reader
            .lookup(*ip)
            .map_err(|_| GeoError::Unresolvable(*ip))?;

        city.location
            .and_then(|loc| {
                Some(GeoPoint {
                    latitude: loc.latitude?,
                    longitude: loc.longitude?,
                })
            })
            .ok_or(GeoError::Unresolvable(*ip))
    }
}

impl GeoProvider for MaxMindProvider {
    fn locate(&self, ip: &IpAddr) -> Option<GeoPoint> {
        self.lookup(ip).ok()
    }
}

/// Fixed-table provider for tests and offline replay
#[derive(Default)]
pub struct StaticProvider {
    table: HashMap<IpAddr, GeoPoint>,
}

impl StaticProvider {
    pub fn new() -> Self {
        StaticProvider {
            table: HashMap::new(),
        }
    }

    pub fn with_entry(mut self, ip: &str, latitude: f64, longitude: f64) -> Self {
        if let Ok(addr) = ip.parse() {
            self.table.insert(
                addr,
                GeoPoint {
                    latitude,
                    longitude,
                },
            );
        }
        self
    }
}

impl GeoProvider for StaticProvider {
    fn locate(&self, ip: &IpAddr) -> Option<GeoPoint> {
        self.table.get(ip).copied()
    }
}
