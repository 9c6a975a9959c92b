use std::fmt;

use cohort_core::MetadataCollectionId;
use serde::Deserialize;
use serde::Serialize;

/// Why a member contributed nothing to a federated result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberOutcome {
    /// No answer within the call bound; the call was abandoned.
    TimedOut,
    /// The member answered with an error or could not be called.
    Errored,
    /// The caller cancelled before the member answered.
    Cancelled,
}

impl fmt::Display for MemberOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemberOutcome::TimedOut => "timed out",
            MemberOutcome::Errored => "errored",
            MemberOutcome::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub metadata_collection_id: MetadataCollectionId,
    pub outcome: MemberOutcome,
    pub detail: String,
}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.metadata_collection_id, self.outcome, self.detail)
    }
}

/// Merged answer to a federated call.
#[derive(Debug, Clone, PartialEq)]
pub struct FederatedResult<T> {
    /// One copy per GUID, at most the requested page size.
    pub instances: Vec<T>,
    /// Members that did not contribute, and why.
    pub manifest: Vec<ManifestEntry>,
    /// Members that answered, the local repository included.
    pub responded: Vec<MetadataCollectionId>,
    /// Instances dropped because their type has an open TypeDef conflict.
    pub excluded_count: usize,
    /// More matches existed than the page size allowed.
    pub truncated: bool,
}

impl<T> FederatedResult<T> {
    /// Whether every dispatched member answered.
    pub fn is_complete(&self) -> bool {
        self.manifest.is_empty()
    }

    pub fn outcome_of(&self, member: &MetadataCollectionId) -> Option<MemberOutcome> {
        self.manifest.iter().find(|e| &e.metadata_collection_id == member).map(|e| e.outcome)
    }

    pub fn first(&self) -> Option<&T> {
        self.instances.first()
    }
}
