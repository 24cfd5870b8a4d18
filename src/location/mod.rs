//! City/country lookup against an IP geolocation service.

mod client;
mod types;

pub use client::{HttpLocationLookup, LocationLookup};
pub use types::{Location, LookupResult};
