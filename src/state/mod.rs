use crate::storage::KeyValueStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

const STORE_NAME: &str = "audiencelink";
const KEY_USER_ID: &str = "uuid";
const KEY_VISITOR_PROFILE: &str = "profile";

const SHARED_DATA_PROVIDER_ID: &str = "dpid";
const SHARED_DATA_PROVIDER_USER_ID: &str = "dpuuid";
const SHARED_USER_ID: &str = "uuid";
const SHARED_VISITOR_PROFILE: &str = "aamprofile";

// ── Privacy ────────────────────────────────────────────────────────

/// Privacy consent state. Gates every identifier mutation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyStatus {
    #[default]
    Unknown,
    OptedIn,
    OptedOut,
}

/// The string-valued identifier slots owned by the state store.
///
/// `UserId` is server-assigned and persisted; the data-provider pair is
/// host-supplied and in-memory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identifier {
    DataProviderId,
    DataProviderUserId,
    UserId,
}

// ── State store ────────────────────────────────────────────────────

/// Privacy-gated identity/profile state, single-writer.
///
/// `user_id` and `visitor_profile` hydrate lazily from durable storage on
/// first read: the memo is `None` until the first access, after which it is
/// always `Some` — a failed load caches as confirmed-empty. Durable write
/// failures are logged and swallowed; the in-memory value is authoritative
/// for the process lifetime.
pub struct StateStore {
    storage: Arc<dyn KeyValueStore>,
    privacy: PrivacyStatus,
    data_provider_id: String,
    data_provider_user_id: String,
    user_id: Option<String>,
    visitor_profile: Option<HashMap<String, String>>,
}

impl StateStore {
    pub fn new(storage: Arc<dyn KeyValueStore>, privacy_default: PrivacyStatus) -> Self {
        let mut state = Self {
            storage,
            privacy: PrivacyStatus::Unknown,
            data_provider_id: String::new(),
            data_provider_user_id: String::new(),
            user_id: None,
            visitor_profile: None,
        };
        state.set_privacy_status(privacy_default);
        state
    }

    pub fn privacy_status(&self) -> PrivacyStatus {
        self.privacy
    }

    /// Updates the privacy status. Transitioning into opt-out atomically
    /// clears all identifier state, in-memory and durable.
    pub fn set_privacy_status(&mut self, status: PrivacyStatus) {
        self.privacy = status;
        if status == PrivacyStatus::OptedOut {
            self.clear_identifiers();
        }
    }

    /// Writes an identifier slot. Rejected (with a debug log) when privacy
    /// is opted out, unless the write is itself a clear.
    pub fn set_identifier(&mut self, kind: Identifier, value: &str) {
        if self.privacy == PrivacyStatus::OptedOut && !value.is_empty() {
            tracing::debug!(?kind, "identifier write rejected: privacy opted out");
            return;
        }

        match kind {
            Identifier::DataProviderId => self.data_provider_id = value.to_string(),
            Identifier::DataProviderUserId => self.data_provider_user_id = value.to_string(),
            Identifier::UserId => {
                self.user_id = Some(value.to_string());
                self.persist_user_id(value);
            }
        }
    }

    /// Reads an identifier slot, hydrating `UserId` from durable storage on
    /// first access.
    pub fn identifier(&mut self, kind: Identifier) -> String {
        match kind {
            Identifier::DataProviderId => self.data_provider_id.clone(),
            Identifier::DataProviderUserId => self.data_provider_user_id.clone(),
            Identifier::UserId => self.hydrated_user_id().to_string(),
        }
    }

    /// Replaces the visitor profile. Rejected under opt-out unless the new
    /// profile is empty.
    pub fn set_visitor_profile(&mut self, profile: HashMap<String, String>) {
        if self.privacy == PrivacyStatus::OptedOut && !profile.is_empty() {
            tracing::debug!("visitor profile write rejected: privacy opted out");
            return;
        }

        if profile.is_empty() {
            self.remove_durable(KEY_VISITOR_PROFILE);
        } else if let Err(e) = self
            .storage
            .set_map(STORE_NAME, KEY_VISITOR_PROFILE, &profile)
        {
            tracing::warn!("visitor profile persist failed: {e}");
        }
        self.visitor_profile = Some(profile);
    }

    pub fn visitor_profile(&mut self) -> HashMap<String, String> {
        self.hydrated_visitor_profile().clone()
    }

    /// Clears all four identifier fields without touching privacy status.
    /// Memos become confirmed-empty so no later read can resurrect cleared
    /// durable values.
    pub fn clear_identifiers(&mut self) {
        self.data_provider_id.clear();
        self.data_provider_user_id.clear();
        self.user_id = Some(String::new());
        self.visitor_profile = Some(HashMap::new());
        self.remove_durable(KEY_USER_ID);
        self.remove_durable(KEY_VISITOR_PROFILE);
    }

    /// The aggregate state published to external collaborators. Empty under
    /// opt-out regardless of field contents: an explicit guard against
    /// partially-applied clears, not a redundancy.
    pub fn snapshot_for_sharing(&mut self) -> HashMap<String, Value> {
        if self.privacy == PrivacyStatus::OptedOut {
            return HashMap::new();
        }

        let mut shared = HashMap::new();
        if !self.data_provider_id.is_empty() {
            shared.insert(
                SHARED_DATA_PROVIDER_ID.to_string(),
                Value::String(self.data_provider_id.clone()),
            );
        }
        if !self.data_provider_user_id.is_empty() {
            shared.insert(
                SHARED_DATA_PROVIDER_USER_ID.to_string(),
                Value::String(self.data_provider_user_id.clone()),
            );
        }
        let user_id = self.hydrated_user_id().to_string();
        if !user_id.is_empty() {
            shared.insert(SHARED_USER_ID.to_string(), Value::String(user_id));
        }
        let profile = self.hydrated_visitor_profile();
        if !profile.is_empty() {
            let entries = profile
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            shared.insert(SHARED_VISITOR_PROFILE.to_string(), Value::Object(entries));
        }
        shared
    }

    fn hydrated_user_id(&mut self) -> &str {
        if self.user_id.is_none() {
            let loaded = match self.storage.get_string(STORE_NAME, KEY_USER_ID) {
                Ok(value) => value.unwrap_or_default(),
                Err(e) => {
                    tracing::warn!("user id load failed, caching as empty: {e}");
                    String::new()
                }
            };
            self.user_id = Some(loaded);
        }
        self.user_id.as_deref().unwrap_or_default()
    }

    fn hydrated_visitor_profile(&mut self) -> &HashMap<String, String> {
        if self.visitor_profile.is_none() {
            let loaded = match self.storage.get_map(STORE_NAME, KEY_VISITOR_PROFILE) {
                Ok(value) => value.unwrap_or_default(),
                Err(e) => {
                    tracing::warn!("visitor profile load failed, caching as empty: {e}");
                    HashMap::new()
                }
            };
            self.visitor_profile = Some(loaded);
        }
        self.visitor_profile
            .as_ref()
            .expect("visitor profile memo just filled")
    }

    fn persist_user_id(&self, value: &str) {
        if value.is_empty() {
            self.remove_durable(KEY_USER_ID);
        } else if let Err(e) = self.storage.set_string(STORE_NAME, KEY_USER_ID, value) {
            tracing::warn!("user id persist failed: {e}");
        }
    }

    fn remove_durable(&self, key: &str) {
        if let Err(e) = self.storage.remove(STORE_NAME, key) {
            tracing::warn!("durable remove of {key} failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn store() -> StateStore {
        StateStore::new(Arc::new(MemoryStore::new()), PrivacyStatus::OptedIn)
    }

    #[test]
    fn identifier_round_trips_while_opted_in() {
        let mut state = store();
        state.set_identifier(Identifier::DataProviderId, "dp1");
        assert_eq!(state.identifier(Identifier::DataProviderId), "dp1");
    }

    #[test]
    fn opted_out_rejects_non_empty_writes() {
        let mut state = store();
        state.set_privacy_status(PrivacyStatus::OptedOut);
        state.set_identifier(Identifier::UserId, "12345");
        assert_eq!(state.identifier(Identifier::UserId), "");

        let mut profile = HashMap::new();
        profile.insert("a".to_string(), "b".to_string());
        state.set_visitor_profile(profile);
        assert!(state.visitor_profile().is_empty());
    }

    #[test]
    fn opt_out_clears_everything() {
        let mut state = store();
        state.set_identifier(Identifier::DataProviderId, "dp1");
        state.set_identifier(Identifier::UserId, "12345");
        state.set_privacy_status(PrivacyStatus::OptedOut);

        assert_eq!(state.identifier(Identifier::DataProviderId), "");
        assert_eq!(state.identifier(Identifier::UserId), "");
        assert!(state.snapshot_for_sharing().is_empty());
    }

    #[test]
    fn snapshot_is_empty_under_opt_out_even_with_stale_fields() {
        let mut state = store();
        state.set_identifier(Identifier::UserId, "12345");
        state.privacy = PrivacyStatus::OptedOut; // simulate a partially-applied clear
        assert!(state.snapshot_for_sharing().is_empty());
    }

    #[test]
    fn user_id_hydrates_lazily_from_storage() {
        let storage = Arc::new(MemoryStore::new());
        storage
            .set_string(STORE_NAME, KEY_USER_ID, "persisted-uuid")
            .unwrap();

        let mut state = StateStore::new(storage, PrivacyStatus::OptedIn);
        assert_eq!(state.identifier(Identifier::UserId), "persisted-uuid");
    }

    #[test]
    fn hydration_caches_confirmed_empty() {
        let storage = Arc::new(MemoryStore::new());
        let mut state = StateStore::new(Arc::clone(&storage) as Arc<dyn KeyValueStore>, PrivacyStatus::OptedIn);

        assert_eq!(state.identifier(Identifier::UserId), "");

        // A late durable write must not surface: the memo is already filled.
        storage.set_string(STORE_NAME, KEY_USER_ID, "late").unwrap();
        assert_eq!(state.identifier(Identifier::UserId), "");
    }

    #[test]
    fn clearing_removes_durable_entries() {
        let storage = Arc::new(MemoryStore::new());
        let mut state =
            StateStore::new(Arc::clone(&storage) as Arc<dyn KeyValueStore>, PrivacyStatus::OptedIn);

        state.set_identifier(Identifier::UserId, "12345");
        state.clear_identifiers();

        assert!(storage.get_string(STORE_NAME, KEY_USER_ID).unwrap().is_none());
        assert_eq!(state.privacy_status(), PrivacyStatus::OptedIn);
    }

    #[test]
    fn snapshot_contains_only_non_empty_fields() {
        let mut state = store();
        state.set_identifier(Identifier::UserId, "12345");

        let shared = state.snapshot_for_sharing();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared["uuid"], Value::String("12345".to_string()));
    }
}
