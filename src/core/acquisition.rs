//! Acquisition time handling and the Earth-Sun distance model.
//!
//! The distance follows the day-of-year approximation used in the WorldView-2
//! radiometric technical note (Updike & Comp, 2010):
//!
//! ```text
//! d = 1 - 0.01674 * cos(0.9856 * (DOY - 4))      [degrees inside the cosine]
//! ```
//!
//! 0.01674 is the orbital eccentricity, 0.9856 the mean daily motion of the
//! Earth in degrees and DOY 4 the perihelion. The result spans
//! 0.98326 AU (perihelion) to 1.01674 AU (aphelion).

use crate::types::{ToarError, ToarResult};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

const ORBITAL_ECCENTRICITY: f64 = 0.01674;
const MEAN_DAILY_MOTION_DEG: f64 = 0.9856;
const PERIHELION_DOY: f64 = 4.0;

/// Julian Day of the Unix epoch (1970-01-01T00:00:00Z)
const UNIX_EPOCH_JD: f64 = 2_440_587.5;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Day of year, 1..=366
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DayOfYear(u16);

impl DayOfYear {
    /// Returns [`ToarError::Range`] outside 1..=366
    pub fn new(doy: i64) -> ToarResult<Self> {
        if !(1..=366).contains(&doy) {
            return Err(ToarError::Range(doy));
        }
        Ok(Self(doy as u16))
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for DayOfYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which input the authoritative day of year was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceSource {
    /// Derived from the UTC acquisition timestamp
    Timestamp,
    /// Supplied directly as a day of year
    DayOfYear,
    /// Explicit day of year that replaced the timestamp-derived one
    DayOfYearOverride,
}

impl std::fmt::Display for DistanceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceSource::Timestamp => write!(f, "UTC timestamp"),
            DistanceSource::DayOfYear => write!(f, "day of year"),
            DistanceSource::DayOfYearOverride => write!(f, "day of year (overrides UTC timestamp)"),
        }
    }
}

/// Moment of image acquisition.
///
/// Exactly one representation decides the day of year: the timestamp, a raw
/// day of year, or an explicit override of the timestamp's day of year.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AcquisitionMoment {
    Timestamp(NaiveDateTime),
    DayOfYear(DayOfYear),
    Overridden {
        timestamp: NaiveDateTime,
        day_of_year: DayOfYear,
    },
}

impl AcquisitionMoment {
    /// Parse a UTC timestamp.
    ///
    /// Accepts `YYYY-MM-DD HH:MM:SS`, ISO 8601 (`2010-06-23T10:55:46.5Z`) and the
    /// DigitalGlobe `.IMD` spelling (`2010_06_23T10:55:46.500000Z;`). A missing
    /// time of day means midnight.
    pub fn from_utc_str(input: &str) -> ToarResult<Self> {
        let timestamp = parse_utc_timestamp(input)?;
        log::debug!("Parsed acquisition time '{}' as {}", input.trim(), timestamp);
        Ok(AcquisitionMoment::Timestamp(timestamp))
    }

    pub fn from_timestamp(timestamp: NaiveDateTime) -> Self {
        AcquisitionMoment::Timestamp(timestamp)
    }

    /// Returns [`ToarError::Range`] outside 1..=366
    pub fn from_day_of_year(doy: i64) -> ToarResult<Self> {
        Ok(AcquisitionMoment::DayOfYear(DayOfYear::new(doy)?))
    }

    /// Replace the authoritative day of year while keeping any timestamp for reference
    pub fn with_day_of_year_override(self, doy: i64) -> ToarResult<Self> {
        let day_of_year = DayOfYear::new(doy)?;
        Ok(match self.timestamp() {
            Some(timestamp) => AcquisitionMoment::Overridden {
                timestamp,
                day_of_year,
            },
            None => AcquisitionMoment::DayOfYear(day_of_year),
        })
    }

    pub fn day_of_year(&self) -> DayOfYear {
        match self {
            AcquisitionMoment::Timestamp(ts) => DayOfYear(ts.ordinal() as u16),
            AcquisitionMoment::DayOfYear(doy) => *doy,
            AcquisitionMoment::Overridden { day_of_year, .. } => *day_of_year,
        }
    }

    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            AcquisitionMoment::Timestamp(ts) => Some(*ts),
            AcquisitionMoment::DayOfYear(_) => None,
            AcquisitionMoment::Overridden { timestamp, .. } => Some(*timestamp),
        }
    }

    pub fn source(&self) -> DistanceSource {
        match self {
            AcquisitionMoment::Timestamp(_) => DistanceSource::Timestamp,
            AcquisitionMoment::DayOfYear(_) => DistanceSource::DayOfYear,
            AcquisitionMoment::Overridden { .. } => DistanceSource::DayOfYearOverride,
        }
    }

    /// Julian Day of the timestamp (Krause 2005: 2001-10-18 18:51:26 UTC is 2452201.286)
    pub fn julian_day(&self) -> Option<f64> {
        self.timestamp().map(|ts| {
            let utc = Utc.from_utc_datetime(&ts);
            let seconds = utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_nanos()) * 1e-9;
            UNIX_EPOCH_JD + seconds / SECONDS_PER_DAY
        })
    }

    pub fn earth_sun_distance(&self) -> EarthSunDistance {
        EarthSunDistance::from_day_of_year(self.day_of_year())
    }
}

impl std::fmt::Display for AcquisitionMoment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquisitionMoment::Timestamp(ts) => write!(f, "{} UTC (DOY {})", ts, ts.ordinal()),
            AcquisitionMoment::DayOfYear(doy) => write!(f, "DOY {}", doy),
            AcquisitionMoment::Overridden {
                timestamp,
                day_of_year,
            } => write!(f, "{} UTC overridden to DOY {}", timestamp, day_of_year),
        }
    }
}

/// Earth-Sun distance in astronomical units
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct EarthSunDistance(f64);

impl EarthSunDistance {
    pub fn from_day_of_year(doy: DayOfYear) -> Self {
        let angle = (MEAN_DAILY_MOTION_DEG * (f64::from(doy.get()) - PERIHELION_DOY)).to_radians();
        EarthSunDistance(1.0 - ORBITAL_ECCENTRICITY * angle.cos())
    }

    /// Use a distance taken from product metadata or a test fixture
    pub fn from_au(au: f64) -> Self {
        EarthSunDistance(au)
    }

    pub fn au(self) -> f64 {
        self.0
    }

    pub fn squared(self) -> f64 {
        self.0 * self.0
    }
}

/// Earth-Sun distance (AU) for an acquisition moment
pub fn earth_sun_distance_au(moment: &AcquisitionMoment) -> f64 {
    moment.earth_sun_distance().au()
}

/// `YYYY-MM-DD[ HH:MM:SS[.f]]`, with `_` date separators and a trailing `Z;` as in `.IMD` files
static UTC_PATTERN: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4})[-_](\d{2})[-_](\d{2})(?:[T ](\d{2}):(\d{2}):(\d{2})(?:[.:](\d{1,9}))?)?Z?;?$",
    )
});

fn parse_utc_timestamp(input: &str) -> ToarResult<NaiveDateTime> {
    let parse_error = |reason: &str| ToarError::Parse {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let pattern = UTC_PATTERN
        .as_ref()
        .map_err(|e| parse_error(&format!("Regex error: {}", e)))?;

    let caps = pattern
        .captures(input.trim())
        .ok_or_else(|| parse_error("expected YYYY-MM-DD HH:MM:SS"))?;

    let field = |idx: usize| -> u32 {
        caps.get(idx)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(0)
    };

    let year = caps[1]
        .parse::<i32>()
        .map_err(|e| parse_error(&e.to_string()))?;
    let date = NaiveDate::from_ymd_opt(year, field(2), field(3))
        .ok_or_else(|| parse_error("no such calendar date"))?;

    // Fraction digits are right-padded to nanoseconds
    let nanos = caps
        .get(7)
        .map(|m| format!("{:0<9}", m.as_str()))
        .and_then(|digits| digits.parse::<u32>().ok())
        .unwrap_or(0);
    let time = NaiveTime::from_hms_nano_opt(field(4), field(5), field(6), nanos)
        .ok_or_else(|| parse_error("no such time of day"))?;

    Ok(NaiveDateTime::new(date, time))
}
