//! The adapter registry: manifest validation, the proposal/approval/
//! activation state machine, immutable manifest snapshots, the audit log,
//! and the short read cache the egress proxy's hot path relies on.
//!
//! Every mutating operation follows the write order required when the
//! underlying KV store offers no multi-key atomicity: snapshot, then
//! index, then (if applicable) proposal deletion — so a crash between
//! steps never leaves `active` pointing at a missing snapshot.

#![warn(missing_docs)]
#![deny(unreachable_pub)]
#![deny(clippy::unwrap_used)]

mod cache;
mod error;
mod types;

pub use error::{RegistryError, Result};
pub use types::{
    ActiveEntry, ApplyOutcome, AuditEvent, AuditEventType, ProposalRecord, ProposalSummary,
    RegistryIndex,
};

use std::collections::BTreeMap;

use pincer_kv::{KvStore, KvStoreExt};
use pincer_manifest::{stable_stringify, Action, Manifest};
use pincer_vault::Vault;

use cache::ReadCache;

const INDEX_KEY: &str = "adapter_registry:index";
const PROPOSAL_PREFIX: &str = "adapter_registry:proposal:";
const AUDIT_PREFIX: &str = "audit:proposal:";

/// Default number of audit events returned when no `limit` is given.
pub const DEFAULT_AUDIT_LIMIT: usize = 50;
/// Largest `limit` the audit listing will honor.
pub const MAX_AUDIT_LIMIT: usize = 200;
/// Largest rejection reason accepted, in characters.
pub const MAX_REASON_LEN: usize = 500;

fn proposal_key(proposal_id: &str) -> String {
    format!("{PROPOSAL_PREFIX}{proposal_id}")
}

fn manifest_key(adapter_id: &str, revision: u64) -> String {
    format!("adapter_registry:manifest:{adapter_id}:{revision}")
}

/// A summary row for `GET /v1/adapters` and `GET /v1/admin/adapters`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AdapterSummary {
    /// The adapter id.
    #[serde(rename = "adapterId")]
    pub adapter_id: String,
    /// The active revision.
    pub revision: u64,
    /// Whether the adapter currently accepts runtime calls.
    pub enabled: bool,
    /// Every action name declared in the active manifest.
    #[serde(rename = "actionNames")]
    pub action_names: Vec<String>,
}

/// Outcome of a successful rejection.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RejectOutcome {
    /// The rejected proposal's id.
    #[serde(rename = "proposalId")]
    pub proposal_id: String,
    /// Always `"rejected"`.
    pub status: &'static str,
    /// RFC 3339 rejection timestamp.
    #[serde(rename = "rejectedAt")]
    pub rejected_at: String,
}

/// Either side of an `apply` request: exactly one must be supplied.
pub enum ApplyRequest {
    /// Apply the manifest stored in an existing proposal.
    Proposal(String),
    /// Apply a manifest supplied directly, bypassing the proposal flow.
    Manifest(serde_json::Value),
}

/// The adapter registry, over a KV store and a vault for required-secret
/// resolution.
pub struct Registry<'a> {
    store: &'a dyn KvStore,
    vault: &'a Vault<'a>,
    cache: ReadCache,
}

impl<'a> Registry<'a> {
    /// Construct a registry over `store`, using `vault` to resolve required
    /// secrets before activation.
    pub fn new(store: &'a dyn KvStore, vault: &'a Vault<'a>) -> Self {
        Registry { store, vault, cache: ReadCache::default() }
    }

    fn load_index(&self) -> Result<RegistryIndex> {
        Ok(self.store.get_json(INDEX_KEY)?.unwrap_or_default())
    }

    fn save_index(&self, index: &RegistryIndex) -> Result<()> {
        self.store.put_json(INDEX_KEY, index)?;
        self.cache.invalidate();
        Ok(())
    }

    fn write_audit_event(&self, event: &AuditEvent) {
        let key = format!("{AUDIT_PREFIX}{}:{}", event.occurred_at, event.event_id);
        if let Err(err) = self.store.put_json(&key, event) {
            // Audit writes are non-fatal: the user-visible outcome of the
            // primary operation is unaffected (see Error Handling Design).
            tracing::warn!(error = %err, event_id = %event.event_id, "failed to write audit event");
        }
    }

    /// Validate and submit a new proposal.
    pub fn submit_proposal(
        &self,
        manifest_raw: &serde_json::Value,
        submitted_by: &str,
    ) -> Result<ProposalSummary> {
        let manifest =
            pincer_manifest::validate(manifest_raw).map_err(RegistryError::InvalidManifest)?;

        let proposal_id = format!("pr_{}", pincer_crypto::random_hex(12));
        let now = now_rfc3339();
        let record = ProposalRecord {
            proposal_id: proposal_id.clone(),
            adapter_id: manifest.id.clone(),
            revision: manifest.revision,
            submitted_at: now.clone(),
            submitted_by: submitted_by.to_owned(),
            manifest: serde_json::to_value(&manifest).expect("validated manifest serializes"),
        };

        self.store.put_json(&proposal_key(&proposal_id), &record)?;

        let mut index = self.load_index()?;
        let summary = record.summary();
        index.proposals.push(summary.clone());
        self.save_index(&index)?;

        self.write_audit_event(&AuditEvent {
            event_id: format!("ae_{}", pincer_crypto::random_hex(12)),
            event_type: types::AuditEventType::ProposalSubmitted,
            occurred_at: now,
            proposal_id: proposal_id.clone(),
            adapter_id: record.adapter_id.clone(),
            revision: record.revision,
            actor: submitted_by.to_owned(),
            reason: None,
            manifest: record.manifest.clone(),
        });

        Ok(summary)
    }

    /// List every pending proposal, in submission order.
    pub fn list_proposals(&self) -> Result<Vec<ProposalSummary>> {
        Ok(self.load_index()?.proposals)
    }

    /// Fetch the full record for one proposal.
    pub fn get_proposal(&self, proposal_id: &str) -> Result<ProposalRecord> {
        self.store
            .get_json(&proposal_key(proposal_id))?
            .ok_or_else(|| RegistryError::ProposalNotFound(proposal_id.to_owned()))
    }

    /// Reject a pending proposal.
    pub fn reject_proposal(
        &self,
        proposal_id: &str,
        reason: Option<&str>,
    ) -> Result<RejectOutcome> {
        let record = self.get_proposal(proposal_id)?;
        let reason = reason.map(|r| {
            let trimmed = r.trim();
            trimmed.chars().take(MAX_REASON_LEN).collect::<String>()
        });

        let mut index = self.load_index()?;
        index.proposals.retain(|p| p.proposal_id != proposal_id);
        self.save_index(&index)?;
        self.store.delete(&proposal_key(proposal_id))?;

        let now = now_rfc3339();
        self.write_audit_event(&AuditEvent {
            event_id: format!("ae_{}", pincer_crypto::random_hex(12)),
            event_type: types::AuditEventType::ProposalRejected,
            occurred_at: now.clone(),
            proposal_id: proposal_id.to_owned(),
            adapter_id: record.adapter_id,
            revision: record.revision,
            actor: "admin".to_owned(),
            reason,
            manifest: record.manifest,
        });

        Ok(RejectOutcome { proposal_id: proposal_id.to_owned(), status: "rejected", rejected_at: now })
    }

    /// Apply a manifest, either from a pending proposal or supplied
    /// directly, running the full revision-comparison state machine.
    pub fn apply(&self, request: ApplyRequest) -> Result<(ApplyOutcome, ActiveEntry)> {
        let (manifest, from_proposal) = match request {
            ApplyRequest::Proposal(proposal_id) => {
                let record = self.get_proposal(&proposal_id)?;
                let manifest = pincer_manifest::validate(&record.manifest)
                    .map_err(RegistryError::InvalidManifest)?;
                (manifest, Some(proposal_id))
            }
            ApplyRequest::Manifest(raw) => {
                let manifest =
                    pincer_manifest::validate(&raw).map_err(RegistryError::InvalidManifest)?;
                (manifest, None)
            }
        };

        let mut index = self.load_index()?;
        let current = index.active.get(&manifest.id);

        let outcome = match current {
            Some(active) if manifest.revision < active.revision => {
                return Err(RegistryError::RevisionOutdated {
                    active: active.revision,
                    requested: manifest.revision,
                });
            }
            Some(active) if manifest.revision == active.revision => {
                let stored: Manifest = self
                    .store
                    .get_json(&manifest_key(&manifest.id, active.revision))?
                    .ok_or(RegistryError::AdapterNotFound(manifest.id.clone()))?;
                let stored_canon = stable_stringify(
                    &serde_json::to_value(&stored).expect("stored manifest serializes"),
                );
                let new_canon = stable_stringify(
                    &serde_json::to_value(&manifest).expect("validated manifest serializes"),
                );
                if stored_canon != new_canon {
                    return Err(RegistryError::RevisionConflict(active.revision));
                }
                if active.enabled {
                    ApplyOutcome::InPlaceUpdate
                } else {
                    ApplyOutcome::ReEnable
                }
            }
            Some(_) => ApplyOutcome::InPlaceUpdate,
            None => ApplyOutcome::NewInstall,
        };

        let mut missing = Vec::new();
        for binding in &manifest.required_secrets {
            if self.vault.resolve(binding)?.is_empty() {
                missing.push(binding.clone());
            }
        }
        if !missing.is_empty() {
            return Err(RegistryError::MissingRequiredSecrets(missing));
        }

        // Write order: snapshot, then index, then proposal deletion — see
        // the module-level doc comment.
        self.store.put_json(
            &manifest_key(&manifest.id, manifest.revision),
            &manifest,
        )?;

        let now = now_rfc3339();
        let entry = ActiveEntry { revision: manifest.revision, enabled: true, updated_at: now.clone() };
        index.active.insert(manifest.id.clone(), entry.clone());

        let proposal_id = from_proposal.clone().unwrap_or_default();
        if let Some(proposal_id) = &from_proposal {
            index.proposals.retain(|p| &p.proposal_id != proposal_id);
        }
        self.save_index(&index)?;

        if let Some(proposal_id) = &from_proposal {
            self.store.delete(&proposal_key(proposal_id))?;
        }

        let manifest_value = serde_json::to_value(&manifest).expect("validated manifest serializes");
        self.write_audit_event(&AuditEvent {
            event_id: format!("ae_{}", pincer_crypto::random_hex(12)),
            event_type: types::AuditEventType::ProposalApproved,
            occurred_at: now,
            proposal_id,
            adapter_id: manifest.id,
            revision: manifest.revision,
            actor: "admin".to_owned(),
            reason: None,
            manifest: manifest_value,
        });

        Ok((outcome, entry))
    }

    /// Flip an adapter's `enabled` flag to `true`.
    pub fn enable(&self, adapter_id: &str) -> Result<ActiveEntry> {
        self.set_enabled(adapter_id, true)
    }

    /// Flip an adapter's `enabled` flag to `false`.
    pub fn disable(&self, adapter_id: &str) -> Result<ActiveEntry> {
        self.set_enabled(adapter_id, false)
    }

    fn set_enabled(&self, adapter_id: &str, enabled: bool) -> Result<ActiveEntry> {
        let mut index = self.load_index()?;
        let entry = index
            .active
            .get_mut(adapter_id)
            .ok_or_else(|| RegistryError::AdapterNotFound(adapter_id.to_owned()))?;
        entry.enabled = enabled;
        entry.updated_at = now_rfc3339();
        let entry = entry.clone();
        self.save_index(&index)?;
        Ok(entry)
    }

    /// List audit events, most recent first, filtered to those strictly
    /// after `since` (an RFC 3339 timestamp used as a pagination cursor)
    /// and truncated to `limit` (defaults to [`DEFAULT_AUDIT_LIMIT`],
    /// capped at [`MAX_AUDIT_LIMIT`]).
    pub fn list_audit_events(
        &self,
        since: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<AuditEvent>> {
        let limit = limit.unwrap_or(DEFAULT_AUDIT_LIMIT).min(MAX_AUDIT_LIMIT);
        let mut events: Vec<AuditEvent> = self
            .store
            .list_prefix_json(AUDIT_PREFIX)?
            .into_iter()
            .map(|(_, event)| event)
            .filter(|event| match since {
                Some(since) => event.occurred_at.as_str() > since,
                None => true,
            })
            .collect();
        events.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        events.truncate(limit);
        Ok(events)
    }

    /// Look up the active, enabled manifest and action for a runtime call,
    /// serving from the short read cache when possible.
    pub fn get_adapter_action(
        &self,
        adapter_id: &str,
        action_name: &str,
    ) -> Result<Option<(Manifest, Action)>> {
        let (index, manifests) = self.snapshot()?;
        let Some(active) = index.active.get(adapter_id) else {
            return Ok(None);
        };
        if !active.enabled {
            return Ok(None);
        }
        let Some(manifest) = manifests.get(adapter_id) else {
            return Ok(None);
        };
        let Some(action) = manifest.actions.get(action_name) else {
            return Ok(None);
        };
        Ok(Some((manifest.clone(), action.clone())))
    }

    /// List adapter summaries; `enabled_only` restricts to currently
    /// enabled adapters (the shape `GET /v1/adapters` exposes to runtime
    /// callers).
    pub fn list_adapters(&self, enabled_only: bool) -> Result<Vec<AdapterSummary>> {
        let (index, manifests) = self.snapshot()?;
        let mut out = Vec::new();
        for (adapter_id, active) in &index.active {
            if enabled_only && !active.enabled {
                continue;
            }
            let action_names = manifests
                .get(adapter_id)
                .map(|m| m.actions.keys().cloned().collect())
                .unwrap_or_default();
            out.push(AdapterSummary {
                adapter_id: adapter_id.clone(),
                revision: active.revision,
                enabled: active.enabled,
                action_names,
            });
        }
        Ok(out)
    }

    /// Load (from cache when fresh) the index and every active manifest.
    fn snapshot(&self) -> Result<(RegistryIndex, BTreeMap<String, Manifest>)> {
        if let Some(cached) = self.cache.get() {
            return Ok(cached);
        }
        let index = self.load_index()?;
        let mut manifests = BTreeMap::new();
        for (adapter_id, active) in &index.active {
            if let Some(manifest) = self.store.get_json(&manifest_key(adapter_id, active.revision))? {
                manifests.insert(adapter_id.clone(), manifest);
            }
        }
        self.cache.store(index.clone(), manifests.clone());
        Ok((index, manifests))
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pincer_kv::FsKv;
    use serde_json::json;

    fn seed_manifest(revision: u64) -> serde_json::Value {
        json!({
            "id": "youtube",
            "revision": revision,
            "baseUrl": "https://youtube.googleapis.com",
            "allowedHosts": ["youtube.googleapis.com"],
            "requiredSecrets": ["YOUTUBE_API_KEY"],
            "actions": {
                "list_channel_videos": {
                    "method": "GET",
                    "path": "/youtube/v3/search",
                    "requestMode": "query",
                    "auth": {"placement": "query", "name": "key", "secretBinding": "YOUTUBE_API_KEY"},
                    "limits": {"maxBodyKb": 8, "timeoutMs": 10000, "ratePerMinute": 90},
                    "inputSchema": {
                        "properties": {"channelId": {"type": "string", "minLength": 1}},
                        "required": ["channelId"],
                        "additionalProperties": false
                    }
                }
            }
        })
    }

    struct Harness {
        _dir: tempfile::TempDir,
        kv: FsKv,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let kv = FsKv::open(dir.path()).unwrap();
            Harness { _dir: dir, kv }
        }
    }

    #[test]
    fn submit_then_apply_is_a_new_install() {
        let h = Harness::new();
        let vault = Vault::new(&h.kv, b"kek");
        vault.put("YOUTUBE_API_KEY", "sk-abc", "admin").unwrap();
        let registry = Registry::new(&h.kv, &vault);

        let summary = registry.submit_proposal(&seed_manifest(1), "key_123").unwrap();
        let (outcome, entry) = registry.apply(ApplyRequest::Proposal(summary.proposal_id)).unwrap();

        assert_eq!(outcome, ApplyOutcome::NewInstall);
        assert_eq!(entry.revision, 1);
        assert!(entry.enabled);
        assert!(registry.list_proposals().unwrap().is_empty());
    }

    #[test]
    fn apply_fails_without_required_secret() {
        let h = Harness::new();
        let vault = Vault::new(&h.kv, b"kek");
        let registry = Registry::new(&h.kv, &vault);

        let err = registry.apply(ApplyRequest::Manifest(seed_manifest(1))).unwrap_err();
        assert!(matches!(err, RegistryError::MissingRequiredSecrets(_)));
    }

    #[test]
    fn reapplying_identical_revision_is_in_place_update() {
        let h = Harness::new();
        let vault = Vault::new(&h.kv, b"kek");
        vault.put("YOUTUBE_API_KEY", "sk-abc", "admin").unwrap();
        let registry = Registry::new(&h.kv, &vault);

        registry.apply(ApplyRequest::Manifest(seed_manifest(1))).unwrap();
        let (outcome, _) = registry.apply(ApplyRequest::Manifest(seed_manifest(1))).unwrap();
        assert_eq!(outcome, ApplyOutcome::InPlaceUpdate);
    }

    #[test]
    fn conflicting_same_revision_content_is_rejected() {
        let h = Harness::new();
        let vault = Vault::new(&h.kv, b"kek");
        vault.put("YOUTUBE_API_KEY", "sk-abc", "admin").unwrap();
        let registry = Registry::new(&h.kv, &vault);

        registry.apply(ApplyRequest::Manifest(seed_manifest(1))).unwrap();
        let mut changed = seed_manifest(1);
        changed["allowedHosts"] = json!(["youtube.googleapis.com", "other.example.com"]);
        let err = registry.apply(ApplyRequest::Manifest(changed)).unwrap_err();
        assert!(matches!(err, RegistryError::RevisionConflict(1)));
    }

    #[test]
    fn older_revision_is_rejected_as_outdated() {
        let h = Harness::new();
        let vault = Vault::new(&h.kv, b"kek");
        vault.put("YOUTUBE_API_KEY", "sk-abc", "admin").unwrap();
        let registry = Registry::new(&h.kv, &vault);

        registry.apply(ApplyRequest::Manifest(seed_manifest(2))).unwrap();
        let err = registry.apply(ApplyRequest::Manifest(seed_manifest(1))).unwrap_err();
        assert!(matches!(err, RegistryError::RevisionOutdated { active: 2, requested: 1 }));
    }

    #[test]
    fn disable_then_reapply_same_revision_is_re_enable() {
        let h = Harness::new();
        let vault = Vault::new(&h.kv, b"kek");
        vault.put("YOUTUBE_API_KEY", "sk-abc", "admin").unwrap();
        let registry = Registry::new(&h.kv, &vault);

        registry.apply(ApplyRequest::Manifest(seed_manifest(1))).unwrap();
        registry.disable("youtube").unwrap();
        let (outcome, entry) = registry.apply(ApplyRequest::Manifest(seed_manifest(1))).unwrap();
        assert_eq!(outcome, ApplyOutcome::ReEnable);
        assert!(entry.enabled);
    }

    #[test]
    fn reject_removes_proposal_and_records_reason() {
        let h = Harness::new();
        let vault = Vault::new(&h.kv, b"kek");
        let registry = Registry::new(&h.kv, &vault);

        let summary = registry.submit_proposal(&seed_manifest(1), "key_123").unwrap();
        registry
            .reject_proposal(&summary.proposal_id, Some("malicious scope expansion"))
            .unwrap();

        assert!(registry.list_proposals().unwrap().is_empty());
        assert!(registry.get_proposal(&summary.proposal_id).is_err());

        let audit = registry.list_audit_events(None, None).unwrap();
        let rejected = audit
            .iter()
            .find(|e| e.event_type == AuditEventType::ProposalRejected)
            .unwrap();
        assert_eq!(rejected.reason.as_deref(), Some("malicious scope expansion"));
    }

    #[test]
    fn audit_listing_contains_submission_and_approval_with_matching_proposal_id() {
        let h = Harness::new();
        let vault = Vault::new(&h.kv, b"kek");
        vault.put("YOUTUBE_API_KEY", "sk-abc", "admin").unwrap();
        let registry = Registry::new(&h.kv, &vault);

        let summary = registry.submit_proposal(&seed_manifest(1), "key_123").unwrap();
        registry.apply(ApplyRequest::Proposal(summary.proposal_id.clone())).unwrap();

        let audit = registry.list_audit_events(None, None).unwrap();
        let submitted = audit.iter().find(|e| e.event_type == AuditEventType::ProposalSubmitted).unwrap();
        let approved = audit.iter().find(|e| e.event_type == AuditEventType::ProposalApproved).unwrap();
        assert_eq!(submitted.proposal_id, summary.proposal_id);
        assert_eq!(approved.proposal_id, summary.proposal_id);
    }

    #[test]
    fn get_adapter_action_returns_none_when_disabled() {
        let h = Harness::new();
        let vault = Vault::new(&h.kv, b"kek");
        vault.put("YOUTUBE_API_KEY", "sk-abc", "admin").unwrap();
        let registry = Registry::new(&h.kv, &vault);

        registry.apply(ApplyRequest::Manifest(seed_manifest(1))).unwrap();
        registry.disable("youtube").unwrap();

        assert!(registry
            .get_adapter_action("youtube", "list_channel_videos")
            .unwrap()
            .is_none());
    }

    #[test]
    fn list_adapters_enabled_only_hides_disabled() {
        let h = Harness::new();
        let vault = Vault::new(&h.kv, b"kek");
        vault.put("YOUTUBE_API_KEY", "sk-abc", "admin").unwrap();
        let registry = Registry::new(&h.kv, &vault);

        registry.apply(ApplyRequest::Manifest(seed_manifest(1))).unwrap();
        registry.disable("youtube").unwrap();

        assert!(registry.list_adapters(true).unwrap().is_empty());
        assert_eq!(registry.list_adapters(false).unwrap().len(), 1);
    }
}
