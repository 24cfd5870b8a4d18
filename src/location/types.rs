use serde::{Deserialize, Serialize};
use std::fmt;

use crate::http::FetchError;

/// City and country reported for an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub country: String,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.city, self.country)
    }
}

/// Outcome of a lookup. Serializes to either `{"city": .., "country": ..}`
/// or `{"error": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LookupResult {
    Success(Location),
    Failure { error: String },
}

impl LookupResult {
    pub fn failure(error: impl Into<String>) -> Self {
        LookupResult::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, LookupResult::Success(_))
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            LookupResult::Success(location) => Some(location),
            LookupResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            LookupResult::Success(_) => None,
            LookupResult::Failure { error } => Some(error),
        }
    }
}

/// Body as returned by the service. Anything beyond the two fields we need
/// is ignored; `null` counts as absent.
#[derive(Debug, Deserialize)]
pub(crate) struct RawLocation {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl RawLocation {
    pub(crate) fn into_location(self) -> Result<Location, FetchError> {
        match (self.city, self.country) {
            (Some(city), Some(country)) => Ok(Location { city, country }),
            (city, country) => {
                let mut missing = Vec::new();
                if city.is_none() {
                    missing.push("city");
                }
                if country.is_none() {
                    missing.push("country");
                }
                Err(FetchError::IncompleteData { missing })
            }
        }
    }
}
