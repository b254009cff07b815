use crate::config::Config;
use crate::queue::{HitCompletion, HitQueue, HitStore, PendingHit, RetryPolicy};
use crate::state::{Identifier, PrivacyStatus, StateStore};
use crate::storage::KeyValueStore;
use crate::transport::{self, HttpTransport};
use crate::wire::{self, HitResponse};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use url::Url;

pub use crate::wire::{IdentitySnapshot, SyncedId};

// ── Inbound signals ────────────────────────────────────────────────

/// Typed events delivered by the host's signal bus.
#[derive(Debug)]
pub enum Signal {
    /// Explicit "send traits" request. The optional reply fires once the
    /// resulting hit resolves (delivered or dropped) with the then-current
    /// visitor profile.
    SendTraits {
        traits: BTreeMap<String, String>,
        reply: Option<oneshot::Sender<HashMap<String, String>>>,
    },
    /// Lifecycle metrics, submitted like an ordinary trait hit.
    Lifecycle {
        metrics: BTreeMap<String, String>,
    },
    /// Request for the current visitor profile.
    GetProfile {
        reply: oneshot::Sender<HashMap<String, String>>,
    },
    /// Explicit reset: clears identifiers without touching privacy.
    Reset,
    PrivacyChanged(PrivacyStatus),
    ConfigurationChanged(Config),
    /// Snapshot of the related identity system's state.
    IdentitySync(IdentitySnapshot),
    /// Host-supplied data-provider pair.
    SetDataProvider { dpid: String, dpuuid: String },
    /// Raw response body from the secondary analytics system, folded into
    /// profile state without enqueuing anything.
    AnalyticsResponse { body: Vec<u8> },
}

/// Receives the aggregate state snapshot whenever privacy, identifiers, or
/// the profile change.
pub trait SharedStateListener: Send + Sync {
    fn on_shared_state(&self, state: HashMap<String, serde_json::Value>);
}

// ── Orchestrator ───────────────────────────────────────────────────

/// Glue between the signal bus, the state store, and the hit queue.
///
/// Single-writer: the orchestrator exclusively owns the state store, and its
/// run loop serializes inbound signals with queue completions, so a hit's
/// completion callback never races a concurrent profile mutation.
pub struct Orchestrator {
    config: Config,
    state: StateStore,
    queue: HitQueue,
    transport: Arc<dyn HttpTransport>,
    identity: IdentitySnapshot,
    listener: Arc<dyn SharedStateListener>,
    completions: mpsc::UnboundedReceiver<HitCompletion>,
    pending_replies: HashMap<u64, oneshot::Sender<HashMap<String, String>>>,
    next_signal_id: u64,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        storage: Arc<dyn KeyValueStore>,
        hit_store: Arc<dyn HitStore>,
        transport: Arc<dyn HttpTransport>,
        listener: Arc<dyn SharedStateListener>,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let queue = HitQueue::new(
            hit_store,
            Arc::clone(&transport),
            retry_policy(&config),
            completion_tx,
        );
        let state = StateStore::new(storage, config.privacy_default);

        Self {
            config,
            state,
            queue,
            transport,
            identity: IdentitySnapshot::default(),
            listener,
            completions: completion_rx,
            pending_replies: HashMap::new(),
            next_signal_id: 0,
        }
    }

    /// Drives the pipeline until the signal bus closes. The queue worker
    /// holds its completion sender for its entire life, so termination keys
    /// off the signal receiver alone.
    pub async fn run(mut self, mut signals: mpsc::UnboundedReceiver<Signal>) {
        loop {
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(signal) => self.handle_signal(signal),
                    None => break,
                },
                Some(completion) = self.completions.recv() => self.handle_completion(completion),
            }
        }

        // Fold completions that already resolved before the bus closed.
        while let Ok(completion) = self.completions.try_recv() {
            self.handle_completion(completion);
        }
    }

    fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::SendTraits { traits, reply } => self.submit_hit(&traits, reply),
            Signal::Lifecycle { metrics } => self.submit_hit(&metrics, None),
            Signal::GetProfile { reply } => {
                let _ = reply.send(self.state.visitor_profile());
            }
            Signal::Reset => {
                self.state.clear_identifiers();
                self.publish();
            }
            Signal::PrivacyChanged(status) => self.apply_privacy(status),
            Signal::ConfigurationChanged(config) => {
                self.queue.set_policy(retry_policy(&config));
                self.config = config;
            }
            Signal::IdentitySync(snapshot) => self.identity = snapshot,
            Signal::SetDataProvider { dpid, dpuuid } => {
                self.state.set_identifier(Identifier::DataProviderId, &dpid);
                self.state
                    .set_identifier(Identifier::DataProviderUserId, &dpuuid);
                self.publish();
            }
            Signal::AnalyticsResponse { body } => self.fold_response(&body),
        }
    }

    fn submit_hit(
        &mut self,
        traits: &BTreeMap<String, String>,
        reply: Option<oneshot::Sender<HashMap<String, String>>>,
    ) {
        if self.state.privacy_status() == PrivacyStatus::OptedOut {
            tracing::debug!("signal not queued: privacy opted out");
            return;
        }

        let user_id = self.state.identifier(Identifier::UserId);
        let Some(url) = wire::build_hit_url(
            &self.config.server,
            &self.config.org_id,
            &user_id,
            traits,
            &self.identity,
        ) else {
            tracing::debug!("signal not queued: no server configured");
            return;
        };

        let signal_id = self.next_signal_id;
        self.next_signal_id += 1;

        let hit = PendingHit::new(&url, self.config.timeout_secs, signal_id);
        match self.queue.enqueue(&hit) {
            Ok(()) => {
                if let Some(reply) = reply {
                    self.pending_replies.insert(signal_id, reply);
                }
            }
            Err(e) => tracing::warn!("hit enqueue failed: {e}"),
        }
    }

    fn handle_completion(&mut self, completion: HitCompletion) {
        self.fold_response(&completion.body);

        if let Some(reply) = self.pending_replies.remove(&completion.signal_id) {
            let _ = reply.send(self.state.visitor_profile());
        }
    }

    /// Adopts the server-assigned uuid, replaces the visitor profile with
    /// the response's stuff pairs, and forwards every destination URL as a
    /// detached fire-and-forget request.
    fn fold_response(&mut self, body: &[u8]) {
        let Some(response) = HitResponse::parse(body) else {
            return;
        };

        if let Some(uuid) = response.uuid.as_deref()
            && !uuid.is_empty()
        {
            self.state.set_identifier(Identifier::UserId, uuid);
        }
        self.state.set_visitor_profile(response.profile_pairs());

        for dest in response.destinations() {
            match Url::parse(&dest) {
                Ok(url) => transport::fire_and_forget(Arc::clone(&self.transport), url),
                Err(e) => tracing::debug!("destination url unparsable, skipping: {e}"),
            }
        }

        self.publish();
    }

    fn apply_privacy(&mut self, status: PrivacyStatus) {
        if status == PrivacyStatus::OptedOut {
            // Advisory ping needs the uuid before teardown clears it.
            let user_id = self.state.identifier(Identifier::UserId);
            if let Some(url) = wire::build_opt_out_url(&self.config.server, &user_id) {
                transport::fire_and_forget(Arc::clone(&self.transport), url);
            }
            self.queue.clear();
        }

        self.state.set_privacy_status(status);
        self.publish();
    }

    fn publish(&mut self) {
        self.listener.on_shared_state(self.state.snapshot_for_sharing());
    }
}

fn retry_policy(config: &Config) -> RetryPolicy {
    RetryPolicy {
        interval: Duration::from_secs(config.retry_interval_secs),
        recoverable_statuses: config.recoverable_statuses.clone(),
    }
}

/// Convenience for hosts that do not consume shared state.
pub struct NoopListener;

impl SharedStateListener for NoopListener {
    fn on_shared_state(&self, _state: HashMap<String, serde_json::Value>) {}
}

/// Spawns the orchestrator on the current runtime, returning the sender the
/// host's dispatch layer feeds signals into.
pub fn spawn(orchestrator: Orchestrator) -> (mpsc::UnboundedSender<Signal>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(orchestrator.run(rx));
    (tx, handle)
}
