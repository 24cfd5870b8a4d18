use anyhow::{Context, Result, bail};
use log::debug;
use std::io::Write;

use crate::location::{LocationLookup, LookupResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `City, Country`
    Text,
    /// `{"city": .., "country": ..}` or `{"error": ..}`
    Json,
}

/// Looks up a single address and writes the result to `out`.
///
/// A failed lookup is returned as an error after it has been written (JSON)
/// or not written at all (text), so the caller exits non-zero either way.
#[tracing::instrument(skip(lookup, out))]
pub async fn locate<L: LocationLookup, W: Write>(
    lookup: &L,
    ip: Option<&str>,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    let result = lookup.lookup(ip).await;
    debug!("Lookup result: {:?}", result);

    if format == OutputFormat::Json {
        let json = serde_json::to_string(&result).context("Failed to serialize lookup result")?;
        writeln!(out, "{}", json)?;
    }

    match result {
        LookupResult::Success(location) => {
            if format == OutputFormat::Text {
                writeln!(out, "{}", location)?;
            }
            Ok(())
        }
        LookupResult::Failure { error } => bail!(error),
    }
}
