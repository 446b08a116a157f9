use super::authority::{AuthorityError, LicenseAuthority, ValidationRequest};
use super::machine::machine_id;
use crate::clienv::PLUGIN_ID;
use crate::error::{PluginError, Result};
use crate::gate::CONFIGURE_PATH;
use crate::plugin_config::{ConfigStore, PluginConfig};
use crate::state::SharedPluginState;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on a single call to the license manager.
pub const VALIDATION_TIMEOUT: Duration = Duration::from_secs(10);

/// How often a configured key is re-checked.
pub const REVALIDATION_INTERVAL: Duration = Duration::from_secs(60 * 60);

const NO_KEY_MESSAGE: &str = "No license key provided";
const INVALID_KEY_MESSAGE: &str = "Invalid license key";

/// Where the license currently stands. Serialized as a bare string; a
/// rejection carries the license manager's own message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseStatus {
    Unknown,
    Valid,
    Invalid,
    Required,
    ValidationError,
    Rejected(String),
}

impl LicenseStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unknown => "unknown",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Required => "required",
            Self::ValidationError => "validation_error",
            Self::Rejected(message) => message,
        }
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LicenseStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Mutable license state. `valid` implies `status == Valid` and a non-empty key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseState {
    pub key: Option<String>,
    pub valid: bool,
    pub status: LicenseStatus,
    pub last_check: Option<DateTime<Utc>>,
}

impl Default for LicenseState {
    fn default() -> Self {
        Self {
            key: None,
            valid: false,
            status: LicenseStatus::Unknown,
            last_check: None,
        }
    }
}

/// Read-only view served by `/api/license/status`. Never exposes the key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseSnapshot {
    pub valid: bool,
    pub status: LicenseStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub machine_id: String,
    pub has_key: bool,
}

/// Result of [`LicenseManager::validate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ValidationOutcome {
    fn rejected(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

pub struct LicenseManager {
    authority: Arc<dyn LicenseAuthority>,
    store: ConfigStore,
    plugin: SharedPluginState,
    machine_id: String,
    state: RwLock<LicenseState>,
    /// Held for a whole check, from resolving the key to committing the
    /// result, so a slow check can never overwrite a newer key.
    checking: Mutex<()>,
}

impl LicenseManager {
    pub fn new(
        authority: Arc<dyn LicenseAuthority>,
        store: ConfigStore,
        plugin: SharedPluginState,
    ) -> Self {
        Self {
            authority,
            store,
            plugin,
            machine_id: machine_id(),
            state: RwLock::new(LicenseState::default()),
            checking: Mutex::new(()),
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Load the persisted key and validate it. Returns whether the plugin is
    /// licensed. An unreachable license manager leaves the status at
    /// `validation_error`; anything else short of success means `required`.
    pub async fn initialize(&self) -> bool {
        let _checking = self.checking.lock().await;

        let config = match self.store.load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load plugin config, starting unlicensed: {:#}", e);
                PluginConfig::default()
            }
        };

        if let Some(key) = config.license_key.filter(|k| !k.trim().is_empty()) {
            self.state.write().await.key = Some(key);

            let outcome = self.check(None).await;
            if outcome.valid {
                self.plugin.write().await.healthy = true;
                info!("License validated, plugin is ready");
                return true;
            }
        }

        self.require_license().await;
        false
    }

    async fn require_license(&self) {
        {
            let mut state = self.state.write().await;
            if state.status != LicenseStatus::ValidationError {
                state.status = LicenseStatus::Required;
            }
        }
        self.plugin.write().await.healthy = false;
        warn!(
            "License required: configure a license key via POST {}",
            CONFIGURE_PATH
        );
    }

    /// Check `key`, or the stored key when `key` is `None`, against the
    /// license manager. Never fails; every outcome is folded into state.
    pub async fn validate(&self, key: Option<&str>) -> ValidationOutcome {
        let _checking = self.checking.lock().await;
        self.check(key).await
    }

    /// Body of [`validate`](Self::validate). Callers hold `checking`.
    async fn check(&self, key: Option<&str>) -> ValidationOutcome {
        let key = match key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => key.to_string(),
            None => match self.state.read().await.key.clone() {
                Some(key) => key,
                None => return ValidationOutcome::rejected(NO_KEY_MESSAGE),
            },
        };

        let request = ValidationRequest {
            license_key: key.clone(),
            plugin_id: PLUGIN_ID.to_string(),
            machine_id: self.machine_id.clone(),
        };

        debug!("Validating license key with license manager");
        let result = tokio::time::timeout(VALIDATION_TIMEOUT, self.authority.validate(&request))
            .await
            .unwrap_or(Err(AuthorityError::Timeout));
        let now = Utc::now();

        match result {
            Ok(verdict) if verdict.valid => {
                {
                    let mut state = self.state.write().await;
                    state.key = Some(key.clone());
                    state.valid = true;
                    state.status = LicenseStatus::Valid;
                    state.last_check = Some(now);
                }

                if let Err(e) = self.store.save(&PluginConfig {
                    license_key: Some(key),
                }) {
                    warn!("Failed to persist license key: {:#}", e);
                }

                info!("License key is valid");
                ValidationOutcome {
                    valid: true,
                    message: None,
                    data: Some(verdict.payload),
                }
            }
            Ok(verdict) => {
                let status = verdict
                    .message
                    .clone()
                    .map(LicenseStatus::Rejected)
                    .unwrap_or(LicenseStatus::Invalid);
                let message = verdict
                    .message
                    .unwrap_or_else(|| INVALID_KEY_MESSAGE.to_string());

                {
                    let mut state = self.state.write().await;
                    state.valid = false;
                    state.status = status;
                    state.last_check = Some(now);
                }

                warn!("License key rejected: {}", message);
                ValidationOutcome::rejected(message)
            }
            Err(e) => {
                {
                    let mut state = self.state.write().await;
                    state.valid = false;
                    state.status = LicenseStatus::ValidationError;
                    state.last_check = Some(now);
                }

                warn!("License validation failed: {}", e);
                ValidationOutcome::rejected(format!("License validation failed: {}", e))
            }
        }
    }

    /// Validate and adopt a key supplied by an operator. The plugin is usable
    /// as soon as this returns `Ok`.
    pub async fn configure(&self, key: &str) -> Result<ValidationOutcome> {
        let key = key.trim();
        if key.is_empty() {
            return Err(PluginError::MissingField("License key"));
        }

        let _checking = self.checking.lock().await;
        let outcome = self.check(Some(key)).await;
        self.plugin.write().await.healthy = outcome.valid;

        if !outcome.valid {
            let message = outcome
                .message
                .unwrap_or_else(|| INVALID_KEY_MESSAGE.to_string());
            return Err(PluginError::LicenseRejected(message));
        }

        info!("License configured, plugin is ready");
        Ok(outcome)
    }

    /// Re-check the stored key, if any. Used by the hourly revalidation task.
    pub async fn revalidate_if_configured(&self) {
        let _checking = self.checking.lock().await;
        if !self.has_key().await {
            debug!("No license key configured, skipping revalidation");
            return;
        }

        let outcome = self.check(None).await;
        self.plugin.write().await.healthy = outcome.valid;
    }

    pub async fn has_key(&self) -> bool {
        self.state.read().await.key.is_some()
    }

    pub async fn is_valid(&self) -> bool {
        self.state.read().await.valid
    }

    pub async fn state(&self) -> LicenseState {
        self.state.read().await.clone()
    }

    pub async fn status_snapshot(&self) -> LicenseSnapshot {
        let state = self.state.read().await;
        LicenseSnapshot {
            valid: state.valid,
            status: state.status.clone(),
            last_check: state.last_check,
            machine_id: self.machine_id.clone(),
            has_key: state.key.is_some(),
        }
    }
}

/// Re-validate the configured key every `interval` until `cancel` fires.
/// The first check happens one full interval after spawning.
pub fn spawn_revalidation(
    manager: Arc<LicenseManager>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("License revalidation started (interval: {:?})", interval);

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => manager.revalidate_if_configured().await,
                _ = cancel.cancelled() => {
                    debug!("License revalidation stopped");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license::authority::AuthorityVerdict;
    use crate::state::shared_plugin_state;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Clone)]
    enum Behavior {
        Valid,
        Invalid(Option<String>),
        Unreachable,
    }

    struct FakeAuthority {
        behavior: Mutex<Behavior>,
        calls: Mutex<Vec<ValidationRequest>>,
    }

    impl FakeAuthority {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior: Mutex::new(behavior),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn set(&self, behavior: Behavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        fn calls(&self) -> Vec<ValidationRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LicenseAuthority for FakeAuthority {
        async fn validate(
            &self,
            request: &ValidationRequest,
        ) -> std::result::Result<AuthorityVerdict, AuthorityError> {
            self.calls.lock().unwrap().push(request.clone());
            let behavior = self.behavior.lock().unwrap().clone();
            match behavior {
                Behavior::Valid => Ok(AuthorityVerdict::from_payload(
                    json!({"valid": true, "plan": "standard"}),
                )
                .unwrap()),
                Behavior::Invalid(message) => Ok(AuthorityVerdict {
                    valid: false,
                    message,
                    payload: json!({"valid": false}),
                }),
                Behavior::Unreachable => {
                    Err(AuthorityError::Transport("connection refused".into()))
                }
            }
        }
    }

    fn manager(authority: Arc<FakeAuthority>, dir: &tempfile::TempDir) -> LicenseManager {
        LicenseManager::new(
            authority,
            ConfigStore::new(dir.path().join("config.json")),
            shared_plugin_state(),
        )
    }

    fn assert_invariant(state: &LicenseState) {
        if state.valid {
            assert_eq!(state.status, LicenseStatus::Valid);
            assert!(state.key.as_deref().is_some_and(|k| !k.is_empty()));
        }
    }

    #[test]
    fn status_serializes_as_plain_string() {
        assert_eq!(
            serde_json::to_value(LicenseStatus::ValidationError).unwrap(),
            json!("validation_error")
        );
        assert_eq!(
            serde_json::to_value(LicenseStatus::Rejected("License expired".into())).unwrap(),
            json!("License expired")
        );
    }

    #[tokio::test]
    async fn starts_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(FakeAuthority::new(Behavior::Valid), &dir);
        assert_eq!(manager.state().await, LicenseState::default());
    }

    #[tokio::test]
    async fn validate_without_key_makes_no_remote_call() {
        let dir = tempfile::tempdir().unwrap();
        let authority = FakeAuthority::new(Behavior::Valid);
        let manager = manager(authority.clone(), &dir);

        let outcome = manager.validate(None).await;
        assert!(!outcome.valid);
        assert_eq!(outcome.message.as_deref(), Some("No license key provided"));
        assert!(authority.calls().is_empty());
        assert_eq!(manager.state().await.status, LicenseStatus::Unknown);
    }

    #[tokio::test]
    async fn valid_key_updates_state_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let authority = FakeAuthority::new(Behavior::Valid);
        let manager = manager(authority.clone(), &dir);

        let outcome = manager.validate(Some("KEY-1")).await;
        assert!(outcome.valid);
        assert_eq!(outcome.data.unwrap()["plan"], "standard");

        let state = manager.state().await;
        assert!(state.valid);
        assert_eq!(state.status, LicenseStatus::Valid);
        assert_eq!(state.key.as_deref(), Some("KEY-1"));
        assert!(state.last_check.is_some());
        assert_invariant(&state);

        let persisted = ConfigStore::new(dir.path().join("config.json")).load().unwrap();
        assert_eq!(persisted.license_key.as_deref(), Some("KEY-1"));

        let calls = authority.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].plugin_id, "corebridge-ping");
        assert_eq!(calls[0].machine_id, manager.machine_id());
    }

    #[tokio::test]
    async fn restart_with_persisted_key_is_licensed() {
        let dir = tempfile::tempdir().unwrap();
        let first = manager(FakeAuthority::new(Behavior::Valid), &dir);
        assert!(first.validate(Some("KEY-1")).await.valid);
        drop(first);

        let authority = FakeAuthority::new(Behavior::Valid);
        let restarted = manager(authority.clone(), &dir);
        assert!(restarted.initialize().await);
        assert!(restarted.is_valid().await);
        assert!(restarted.plugin.read().await.healthy);
        assert_eq!(authority.calls()[0].license_key, "KEY-1");
    }

    #[tokio::test]
    async fn rejection_uses_remote_message_as_status() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(
            FakeAuthority::new(Behavior::Invalid(Some("License expired".into()))),
            &dir,
        );

        let outcome = manager.validate(Some("KEY-OLD")).await;
        assert!(!outcome.valid);
        assert_eq!(outcome.message.as_deref(), Some("License expired"));

        let state = manager.state().await;
        assert!(!state.valid);
        assert_eq!(state.status.as_str(), "License expired");
        assert!(state.last_check.is_some());
        assert!(!dir.path().join("config.json").exists());
    }

    #[tokio::test]
    async fn rejection_without_message_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(FakeAuthority::new(Behavior::Invalid(None)), &dir);

        let outcome = manager.validate(Some("KEY-X")).await;
        assert_eq!(outcome.message.as_deref(), Some("Invalid license key"));
        assert_eq!(manager.state().await.status, LicenseStatus::Invalid);
    }

    #[tokio::test]
    async fn unreachable_authority_degrades_to_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(FakeAuthority::new(Behavior::Unreachable), &dir);

        let outcome = manager.validate(Some("KEY-1")).await;
        assert!(!outcome.valid);
        assert_eq!(
            outcome.message.as_deref(),
            Some("License validation failed: connection refused")
        );

        let state = manager.state().await;
        assert!(!state.valid);
        assert_eq!(state.status, LicenseStatus::ValidationError);
        assert!(state.last_check.is_some());
    }

    #[tokio::test]
    async fn initialize_without_config_requires_license() {
        let dir = tempfile::tempdir().unwrap();
        let authority = FakeAuthority::new(Behavior::Valid);
        let manager = manager(authority.clone(), &dir);

        assert!(!manager.initialize().await);
        assert_eq!(manager.state().await.status, LicenseStatus::Required);
        assert!(!manager.plugin.read().await.healthy);
        assert!(authority.calls().is_empty());
    }

    #[tokio::test]
    async fn initialize_with_unreachable_authority_keeps_key_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        ConfigStore::new(dir.path().join("config.json"))
            .save(&PluginConfig {
                license_key: Some("KEY-1".into()),
            })
            .unwrap();

        let authority = FakeAuthority::new(Behavior::Unreachable);
        let manager = manager(authority.clone(), &dir);

        assert!(!manager.initialize().await);
        let snapshot = manager.status_snapshot().await;
        assert_eq!(snapshot.status, LicenseStatus::ValidationError);
        assert!(snapshot.has_key);

        authority.set(Behavior::Valid);
        manager.revalidate_if_configured().await;
        assert!(manager.is_valid().await);
        assert!(manager.plugin.read().await.healthy);
    }

    #[tokio::test]
    async fn initialize_with_rejected_key_requires_license() {
        let dir = tempfile::tempdir().unwrap();
        ConfigStore::new(dir.path().join("config.json"))
            .save(&PluginConfig {
                license_key: Some("KEY-REVOKED".into()),
            })
            .unwrap();

        let manager = manager(
            FakeAuthority::new(Behavior::Invalid(Some("revoked".into()))),
            &dir,
        );
        assert!(!manager.initialize().await);
        assert_eq!(manager.state().await.status, LicenseStatus::Required);
    }

    #[tokio::test]
    async fn configure_rejects_empty_key() {
        let dir = tempfile::tempdir().unwrap();
        let authority = FakeAuthority::new(Behavior::Valid);
        let manager = manager(authority.clone(), &dir);

        let err = manager.configure("   ").await.unwrap_err();
        assert!(matches!(err, PluginError::MissingField(_)));
        assert!(authority.calls().is_empty());
    }

    #[tokio::test]
    async fn configure_valid_key_makes_plugin_usable() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(FakeAuthority::new(Behavior::Valid), &dir);
        assert!(!manager.initialize().await);

        let outcome = manager.configure(" KEY-NEW ").await.unwrap();
        assert!(outcome.valid);
        assert!(manager.is_valid().await);
        assert_eq!(manager.state().await.key.as_deref(), Some("KEY-NEW"));
        assert!(manager.plugin.read().await.healthy);
    }

    #[tokio::test]
    async fn configure_invalid_key_is_client_error_with_message() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(
            FakeAuthority::new(Behavior::Invalid(Some("Unknown key".into()))),
            &dir,
        );

        match manager.configure("KEY-BAD").await {
            Err(PluginError::LicenseRejected(message)) => assert_eq!(message, "Unknown key"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn revalidation_without_key_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let authority = FakeAuthority::new(Behavior::Valid);
        let manager = manager(authority.clone(), &dir);

        manager.revalidate_if_configured().await;
        assert!(authority.calls().is_empty());
    }

    #[tokio::test]
    async fn revalidation_detects_revoked_key() {
        let dir = tempfile::tempdir().unwrap();
        let authority = FakeAuthority::new(Behavior::Valid);
        let manager = manager(authority.clone(), &dir);
        manager.configure("KEY-1").await.unwrap();

        authority.set(Behavior::Invalid(Some("License revoked".into())));
        manager.revalidate_if_configured().await;

        let state = manager.state().await;
        assert!(!state.valid);
        assert_eq!(state.status.as_str(), "License revoked");
        assert_eq!(state.key.as_deref(), Some("KEY-1"));
        assert!(!manager.plugin.read().await.healthy);
        assert_eq!(authority.calls().len(), 2);
    }

    #[tokio::test]
    async fn snapshot_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(FakeAuthority::new(Behavior::Valid), &dir);
        manager.configure("KEY-1").await.unwrap();

        let first = serde_json::to_string(&manager.status_snapshot().await).unwrap();
        let second = serde_json::to_string(&manager.status_snapshot().await).unwrap();
        assert_eq!(first, second);
        assert!(!first.contains("KEY-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn revalidation_task_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let authority = FakeAuthority::new(Behavior::Valid);
        let manager = Arc::new(manager(authority.clone(), &dir));
        manager.configure("KEY-1").await.unwrap();

        let cancel = CancellationToken::new();
        let handle = spawn_revalidation(manager.clone(), Duration::from_secs(60), cancel.clone());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(authority.calls().len(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn rejected_key_marks_licensed_plugin_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let authority = FakeAuthority::new(Behavior::Valid);
        let manager = manager(authority.clone(), &dir);
        manager.configure("KEY-1").await.unwrap();
        assert!(manager.plugin.read().await.healthy);

        authority.set(Behavior::Invalid(Some("Unknown key".into())));
        assert!(manager.configure("KEY-BAD").await.is_err());

        assert!(!manager.is_valid().await);
        assert!(!manager.plugin.read().await.healthy);
    }

    /// Accepts every key but answers slowly for `slow_key`.
    struct SlowFor {
        slow_key: &'static str,
        delay: Duration,
    }

    #[async_trait]
    impl LicenseAuthority for SlowFor {
        async fn validate(
            &self,
            request: &ValidationRequest,
        ) -> std::result::Result<AuthorityVerdict, AuthorityError> {
            if request.license_key == self.slow_key {
                tokio::time::sleep(self.delay).await;
            }
            Ok(AuthorityVerdict::from_payload(json!({"valid": true})).unwrap())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_recheck_does_not_overwrite_newer_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        let manager = Arc::new(LicenseManager::new(
            Arc::new(SlowFor {
                slow_key: "OLD",
                delay: Duration::from_millis(300),
            }),
            store.clone(),
            shared_plugin_state(),
        ));
        assert!(manager.validate(Some("OLD")).await.valid);

        let recheck = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.revalidate_if_configured().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        manager.configure("NEW").await.unwrap();
        recheck.await.unwrap();

        assert_eq!(manager.state().await.key.as_deref(), Some("NEW"));
        assert_eq!(store.load().unwrap().license_key.as_deref(), Some("NEW"));
        assert!(manager.is_valid().await);
    }
}
