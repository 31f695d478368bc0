use serde::{Deserialize, Serialize};

use crate::model::Oid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStatus {
    SourceOnly,
    TargetOnly,
    Different,
    Identical,
}

impl ComparisonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonStatus::SourceOnly => "source_only",
            ComparisonStatus::TargetOnly => "target_only",
            ComparisonStatus::Different => "different",
            ComparisonStatus::Identical => "identical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "source_only" => Some(ComparisonStatus::SourceOnly),
            "target_only" => Some(ComparisonStatus::TargetOnly),
            "different" => Some(ComparisonStatus::Different),
            "identical" => Some(ComparisonStatus::Identical),
            _ => None,
        }
    }
}

/// One compared object as listed in the diff result grid. Objects present
/// on one side only carry no source/target oid pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonItem {
    pub id: u64,
    #[serde(rename = "type")]
    pub node_type: String,
    pub label: String,
    pub title: String,
    pub oid: Oid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_oid: Option<Oid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_oid: Option<Oid>,
    pub status: ComparisonStatus,
}

/// DDL triple shown when a single comparison row is selected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DdlComparison {
    pub source_ddl: String,
    pub target_ddl: String,
    pub diff_ddl: String,
}

/// Progress of a running comparison, read by `poll`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffProgress {
    #[serde(rename = "compare_msg")]
    pub message: String,
    #[serde(rename = "diff_percentage")]
    pub percentage: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_url_text() {
        for status in [
            ComparisonStatus::SourceOnly,
            ComparisonStatus::TargetOnly,
            ComparisonStatus::Different,
            ComparisonStatus::Identical,
        ] {
            assert_eq!(ComparisonStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ComparisonStatus::parse("missing"), None);
    }
}
