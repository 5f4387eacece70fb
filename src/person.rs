use std::fmt;

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::OffsetDateTime;

use crate::envelope::{ACCOUNT, RawEnvelope};
use crate::error::Error;
use crate::value;

/// Internal account identifier of a person.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct PersonId(pub String);

/// One person's last reported location.
///
/// Built fresh from every response; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Person {
    id: PersonId,
    picture_url: Option<String>,
    full_name: String,
    nickname: String,
    latitude: f64,
    longitude: f64,
    timestamp_ms: i64,
    accuracy: Option<f64>,
    address: String,
    country_code: String,
    charging: Option<bool>,
    battery_level: Option<u8>,
}

impl Person {
    /// Account identifier, or the full name when the service omits it.
    #[must_use]
    pub fn id(&self) -> &PersonId {
        &self.id
    }

    #[must_use]
    pub fn picture_url(&self) -> Option<&str> {
        self.picture_url.as_deref()
    }

    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    #[must_use]
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// `(latitude, longitude)`.
    #[must_use]
    pub fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// When the location was captured, in epoch milliseconds.
    #[must_use]
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    /// When the location was captured, as a UTC instant.
    ///
    /// `None` only if the timestamp is outside the range `time` can represent.
    #[must_use]
    pub fn datetime(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.timestamp_ms) * 1_000_000).ok()
    }

    /// Reported accuracy radius in meters.
    #[must_use]
    pub fn accuracy(&self) -> Option<f64> {
        self.accuracy
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    /// `None` when the device did not report it.
    #[must_use]
    pub fn charging(&self) -> Option<bool> {
        self.charging
    }

    /// Battery percentage; `None` when the device did not report it.
    #[must_use]
    pub fn battery_level(&self) -> Option<u8> {
        self.battery_level
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Full name        : {}", self.full_name)?;
        writeln!(f, "Nickname         : {}", self.nickname)?;
        writeln!(f, "Current location : {}", self.address)?;
        writeln!(f, "Latitude         : {}", self.latitude)?;
        writeln!(f, "Longitude        : {}", self.longitude)?;
        match self.datetime() {
            Some(dt) => writeln!(f, "Datetime         : {dt}")?,
            None => writeln!(f, "Datetime         : {}ms", self.timestamp_ms)?,
        }
        match self.accuracy {
            Some(accuracy) => write!(f, "Accuracy         : {accuracy}"),
            None => write!(f, "Accuracy         : unknown"),
        }
    }
}

// Entry layout:
//   [1]  location: [_, [_, lon, lat], timestamp, accuracy, address, _, country]
//   [6]  identity: [id, picture url, full name, nickname]
//   [13] device:   [charging, battery level]
const IDENTITY: usize = 6;
const LOCATION: usize = 1;
const DEVICE: usize = 13;

/// Decodes one shared-location entry.
///
/// # Errors
///
/// Returns [`Error::InvalidPersonData`] if the identity block, coordinates,
/// timestamp, address or country code are missing or of the wrong type.
/// Accuracy, charging and battery level are optional.
pub fn decode_person(entry: &Value) -> Result<Person, Error> {
    let full_name = value::str_at(entry, &[IDENTITY, 2]).map_err(Error::person)?;
    let nickname = value::str_at(entry, &[IDENTITY, 3]).map_err(Error::person)?;
    let id = value::str_at(entry, &[IDENTITY, 0]).unwrap_or(full_name);
    let picture_url = value::str_at(entry, &[IDENTITY, 1]).ok();

    let latitude = value::f64_at(entry, &[LOCATION, 1, 2]).map_err(Error::person)?;
    let longitude = value::f64_at(entry, &[LOCATION, 1, 1]).map_err(Error::person)?;
    let timestamp_ms = value::i64_at(entry, &[LOCATION, 2]).map_err(Error::person)?;
    let accuracy = value::f64_at(entry, &[LOCATION, 3]).ok();
    let address = value::str_at(entry, &[LOCATION, 4]).map_err(Error::person)?;
    let country_code = value::str_at(entry, &[LOCATION, 6]).map_err(Error::person)?;

    let charging = value::bool_at(entry, &[DEVICE, 0]).ok();
    let battery_level = value::i64_at(entry, &[DEVICE, 1])
        .ok()
        .and_then(|level| u8::try_from(level).ok())
        .filter(|level| *level <= 100);

    Ok(Person {
        id: PersonId(id.to_string()),
        picture_url: picture_url.map(str::to_string),
        full_name: full_name.to_string(),
        nickname: nickname.to_string(),
        latitude,
        longitude,
        timestamp_ms,
        accuracy,
        address: address.to_string(),
        country_code: country_code.to_string(),
        charging,
        battery_level,
    })
}

/// Decodes every shared-location entry, dropping the ones that fail.
///
/// Output order follows the response, which carries no meaning.
///
/// # Errors
///
/// Returns [`Error::InvalidEnvelope`] only if the entry list itself has the
/// wrong type. Individual bad entries are logged and skipped.
pub fn decode_all(envelope: &RawEnvelope) -> Result<Vec<Person>, Error> {
    let entries = envelope.shared_entries()?;
    let people: Vec<Person> = entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| match decode_person(entry) {
            Ok(person) => Some(person),
            Err(e) => {
                tracing::debug!(index, error = %e, "Skipping undecodable shared location entry");
                None
            }
        })
        .collect();
    tracing::debug!(
        entries = entries.len(),
        decoded = people.len(),
        "Decoded shared locations"
    );
    Ok(people)
}

/// Builds the signed-in account's own record.
///
/// The service reports only the location block for "self"; `account_email`
/// fills the identity slots. Returns `None` if the location block is missing
/// or incomplete.
#[must_use]
pub fn decode_authenticated_person(envelope: &RawEnvelope, account_email: &str) -> Option<Person> {
    let location = value::at(envelope.as_value(), &[ACCOUNT, 1]).ok()?;
    let entry = json!([
        account_email,
        location,
        null,
        null,
        null,
        null,
        [null, null, account_email, account_email],
    ]);
    match decode_person(&entry) {
        Ok(person) => Some(person),
        Err(e) => {
            tracing::debug!(error = %e, "Authenticated account has no usable location");
            None
        }
    }
}

/// First person whose nickname matches, ignoring case.
#[must_use]
pub fn find_by_nickname<'a>(people: &'a [Person], nickname: &str) -> Option<&'a Person> {
    let wanted = nickname.to_lowercase();
    people.iter().find(|p| p.nickname.to_lowercase() == wanted)
}

/// First person whose full name matches, ignoring case.
#[must_use]
pub fn find_by_full_name<'a>(people: &'a [Person], full_name: &str) -> Option<&'a Person> {
    let wanted = full_name.to_lowercase();
    people.iter().find(|p| p.full_name.to_lowercase() == wanted)
}
