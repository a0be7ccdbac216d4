use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One programme interval from an EPG source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgrammeRecord {
    pub epg_url: String,
    pub channel_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl ProgrammeRecord {
    /// Half-open interval overlap
    pub fn overlaps(&self, other: &ProgrammeRecord) -> bool {
        self.start < other.end && other.start < self.end
    }
}
