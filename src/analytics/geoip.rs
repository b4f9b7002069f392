//! Country lookup using a MaxMind GeoLite2/GeoIP2 MMDB
//!
//! Fills the "Country" visitor attribute, which clients cannot supply
//! themselves. Lookups never fail: anything unresolvable is "Unknown".

use anyhow::{Context, Result};
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;

pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// Thread-safe country resolver; cloning shares the memory-mapped database
#[derive(Clone, Default)]
pub struct GeoIpService {
    reader: Option<Arc<Reader<Mmap>>>,
}

impl GeoIpService {
    /// Open the country (or city) database at `path`, or run without one
    pub fn new(path: Option<&str>) -> Result<Self> {
        let reader = match path {
            Some(path) => {
                let reader = unsafe { Reader::open_mmap(path) }
                    .with_context(|| format!("Failed to open GeoIP database at {}", path))?;
                Some(Arc::new(reader))
            }
            None => None,
        };

        Ok(Self { reader })
    }

    pub fn is_enabled(&self) -> bool {
        self.reader.is_some()
    }

    /// English country name for `ip`, or "Unknown"
    pub fn country(&self, ip: IpAddr) -> String {
        let Some(reader) = self.reader.as_ref() else {
            return UNKNOWN_COUNTRY.to_string();
        };

        // City databases are a superset of Country, so this works for both
        reader
            .lookup(ip)
            .ok()
            .and_then(|result| result.decode::<geoip2::Country>().ok().flatten())
            .and_then(|country| country.country.names.english.map(|s| s.to_string()))
            .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string())
    }
}
