//! Persisted and in-memory shapes for the adapter registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The singleton index: every live proposal summary and the map of active
/// adapters. Mutated only through [`crate::Registry`]'s operations and
/// always written as one serialized blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryIndex {
    /// Proposals currently awaiting approval or rejection, in submission
    /// order.
    pub proposals: Vec<ProposalSummary>,
    /// Adapter id to its active snapshot pointer.
    pub active: BTreeMap<String, ActiveEntry>,
}

/// The index's view of one pending proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalSummary {
    /// Opaque id, prefixed `pr_`.
    #[serde(rename = "proposalId")]
    pub proposal_id: String,
    /// The adapter id the proposal targets.
    #[serde(rename = "adapterId")]
    pub adapter_id: String,
    /// The revision the proposal would install.
    pub revision: u64,
    /// RFC 3339 submission timestamp.
    #[serde(rename = "submittedAt")]
    pub submitted_at: String,
    /// The runtime key id that submitted this proposal.
    #[serde(rename = "submittedBy")]
    pub submitted_by: String,
}

/// The full, persisted proposal record (same identity fields as
/// [`ProposalSummary`] plus the manifest it proposes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalRecord {
    /// See [`ProposalSummary::proposal_id`].
    #[serde(rename = "proposalId")]
    pub proposal_id: String,
    /// See [`ProposalSummary::adapter_id`].
    #[serde(rename = "adapterId")]
    pub adapter_id: String,
    /// See [`ProposalSummary::revision`].
    pub revision: u64,
    /// See [`ProposalSummary::submitted_at`].
    #[serde(rename = "submittedAt")]
    pub submitted_at: String,
    /// See [`ProposalSummary::submitted_by`].
    #[serde(rename = "submittedBy")]
    pub submitted_by: String,
    /// The full manifest document, exactly as submitted (post-validation).
    pub manifest: serde_json::Value,
}

impl ProposalRecord {
    /// The summary view of this record, as stored in the index.
    pub fn summary(&self) -> ProposalSummary {
        ProposalSummary {
            proposal_id: self.proposal_id.clone(),
            adapter_id: self.adapter_id.clone(),
            revision: self.revision,
            submitted_at: self.submitted_at.clone(),
            submitted_by: self.submitted_by.clone(),
        }
    }
}

/// The index's pointer to one adapter's active manifest snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveEntry {
    /// The active revision.
    pub revision: u64,
    /// Whether runtime calls against this adapter are currently permitted.
    pub enabled: bool,
    /// RFC 3339 timestamp of the last change to this entry.
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

/// One entry in the append-only (by convention; not enforced by the KV
/// layer itself) audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Opaque id, prefixed `ae_`.
    #[serde(rename = "eventId")]
    pub event_id: String,
    /// What happened.
    #[serde(rename = "eventType")]
    pub event_type: AuditEventType,
    /// RFC 3339 timestamp; the audit key embeds this so prefix listing
    /// yields time order.
    #[serde(rename = "occurredAt")]
    pub occurred_at: String,
    /// The proposal this event concerns.
    #[serde(rename = "proposalId")]
    pub proposal_id: String,
    /// The adapter id this event concerns.
    #[serde(rename = "adapterId")]
    pub adapter_id: String,
    /// The revision this event concerns.
    pub revision: u64,
    /// Who performed the action (runtime key id for submission, `"admin"`
    /// for approval/rejection).
    pub actor: String,
    /// Free-text rejection reason, present only on `proposal_rejected`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// The manifest snapshot at the time of this event.
    pub manifest: serde_json::Value,
}

/// What kind of thing happened to a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A proposal was submitted for review.
    ProposalSubmitted,
    /// A proposal (or a direct manifest apply) was approved and activated.
    ProposalApproved,
    /// A proposal was rejected without activation.
    ProposalRejected,
}

/// What kind of change `apply` made, returned on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// No prior active entry existed for this adapter id.
    NewInstall,
    /// A newer revision replaced an already-active one.
    InPlaceUpdate,
    /// The same revision was reapplied while the adapter was disabled.
    ReEnable,
}

impl ApplyOutcome {
    /// The stable wire string for this outcome.
    pub fn as_str(self) -> &'static str {
        match self {
            ApplyOutcome::NewInstall => "new_install",
            ApplyOutcome::InPlaceUpdate => "in_place_update",
            ApplyOutcome::ReEnable => "re_enable",
        }
    }
}
