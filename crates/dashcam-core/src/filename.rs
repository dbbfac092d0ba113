//! On-disk naming schema.
//!
//! Layout: `<root>/dashcam/<session id>/<millis>_lat<lat>_lng<lng>.jpg`. Readers
//! recover ordering from the leading integer and coordinates from the `lat` /
//! `lng` markers, so these names are a durable contract.

use crate::error::FilenameError;
use crate::precision::{decode_coordinate, encode_coordinate};
use crate::types::Fix;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

/// Directory under the storage root that holds all sessions.
pub const DASHCAM_DIR: &str = "dashcam";
pub const SESSION_PREFIX: &str = "S_";
pub const PHOTO_EXTENSION: &str = ".jpg";
/// Suffix of in-progress copies; never matched by photo listings.
pub const PARTIAL_SUFFIX: &str = ".partial";

const SESSION_FORMAT: &str = "%Y_%-m_%-d_%H_%M";

/// Session id for a session started at `now`, e.g. `S_2024_9_16_14_45`.
pub fn session_id<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}{}", SESSION_PREFIX, now.format(SESSION_FORMAT))
}

/// Recover the start minute from a session id, if it follows the schema.
pub fn parse_session_id(id: &str) -> Option<NaiveDateTime> {
    let rest = id.strip_prefix(SESSION_PREFIX)?;
    let parts: Vec<u32> = rest
        .split('_')
        .map(|p| p.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    match parts.as_slice() {
        [year, month, day, hour, minute] => {
            let date = chrono::NaiveDate::from_ymd_opt(*year as i32, *month, *day)?;
            date.and_hms_opt(*hour, *minute, 0)
        }
        _ => None,
    }
}

/// Session start in local time, used for ordering folder listings.
pub fn session_started_at(id: &str) -> Option<DateTime<Local>> {
    parse_session_id(id).and_then(|naive| Local.from_local_datetime(&naive).earliest())
}

/// Decoded form of a photo file name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhotoName {
    pub captured_at_millis: i64,
    pub fix: Fix,
}

impl PhotoName {
    pub fn new(captured_at_millis: i64, fix: Fix) -> Self {
        Self {
            captured_at_millis,
            fix,
        }
    }

    /// Render the file name. Fails for coordinates outside the valid range.
    pub fn encode(&self) -> Result<String, FilenameError> {
        self.fix.validate()?;
        Ok(format!(
            "{}_lat{}_lng{}{}",
            self.captured_at_millis,
            encode_coordinate(self.fix.latitude)?,
            encode_coordinate(self.fix.longitude)?,
            PHOTO_EXTENSION
        ))
    }

    pub fn decode(name: &str) -> Result<Self, FilenameError> {
        let malformed = || FilenameError::MalformedName(name.to_string());

        let stem = name.strip_suffix(PHOTO_EXTENSION).ok_or_else(malformed)?;
        let (millis, coords) = stem.split_once("_lat").ok_or_else(malformed)?;
        let (lat, lng) = coords.split_once("_lng").ok_or_else(malformed)?;

        if millis.is_empty() || !millis.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let captured_at_millis = millis.parse::<i64>().map_err(|_| malformed())?;

        let fix = Fix::new(decode_coordinate(lat)?, decode_coordinate(lng)?);
        fix.validate()?;
        Ok(Self {
            captured_at_millis,
            fix,
        })
    }
}

/// Leading integer of a file name, the only part needed for ordering.
pub fn leading_millis(name: &str) -> Option<i64> {
    let end = name
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(name.len());
    if end == 0 {
        return None;
    }
    name[..end].parse().ok()
}

pub fn is_photo_file(name: &str) -> bool {
    name.ends_with(PHOTO_EXTENSION) && !name.starts_with('.')
}

/// Reject names that could address anything outside their parent directory.
pub fn validate_component(name: &str) -> Result<&str, FilenameError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        Err(FilenameError::InvalidComponent(name.to_string()))
    } else {
        Ok(name)
    }
}
