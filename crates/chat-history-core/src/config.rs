use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// One canonical version per logical key.
    #[default]
    Deduplicate,
    /// Every stored version becomes its own row.
    PreserveDuplicates,
}

/// Offset used when rendering `timestamp_iso`.
///
/// Local time is resolved to a fixed offset by the caller before the pipeline
/// runs, so rendering never consults process state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimestampZone {
    #[default]
    Utc,
    Fixed(UtcOffset),
}

impl TimestampZone {
    #[must_use]
    pub fn offset(self) -> UtcOffset {
        match self {
            Self::Utc => UtcOffset::UTC,
            Self::Fixed(offset) => offset,
        }
    }

    /// Render epoch milliseconds as RFC 3339 at this zone's offset.
    #[must_use]
    pub fn render(self, timestamp_ms: i64) -> Option<String> {
        let nanos = i128::from(timestamp_ms) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .ok()?
            .to_offset(self.offset())
            .format(&Rfc3339)
            .ok()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct ExportConfig {
    pub mode: ResolutionMode,
    pub include_deleted: bool,
    pub timezone: TimestampZone,
}
