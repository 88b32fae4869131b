/// Core: single-owner event loop for the playback state.
///
/// Owns the `PlaybackStateMachine`, the catalog provider and the action
/// dispatcher; nothing else touches them.  Remote commands arrive through the
/// latest-wins `CommandReceiver`, are applied one at a time (catalog fetches
/// included, so fetches complete in issue order), and every change is
/// published to the `StateManager` for the render loop and the HTTP API.
///
/// A heartbeat tick checks whether the player process is still alive and
/// moves the machine back to browsing when it exits on its own.
use std::sync::Arc;
use std::time::Duration;

use maxx_proto::catalog::{CatalogEntry, CatalogProvider, QualityOption};
use maxx_proto::config::Config;
use maxx_proto::error::ActionError;
use maxx_proto::machine::{ActionDecision, Phase, PlaybackStateMachine, PlayerKey};
use maxx_proto::protocol::Inbound;
use maxx_proto::quality::QualityPolicy;
use maxx_proto::state::StateManager;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel::CommandReceiver;
use crate::dispatch::Actions;

const HEARTBEAT: Duration = Duration::from_secs(2);

/// Out-of-band inputs into the core loop.
#[derive(Debug)]
pub enum CoreEvent {
    Shutdown,
}

pub struct Core<P, A> {
    machine: PlaybackStateMachine,
    provider: P,
    actions: A,
    policy: QualityPolicy,
    state: Arc<StateManager>,
    default_query: String,
    last_seq: u64,
    last_error: Option<String>,
}

impl<P: CatalogProvider, A: Actions> Core<P, A> {
    pub fn new(config: &Config, provider: P, actions: A, state: Arc<StateManager>) -> Self {
        Self {
            machine: PlaybackStateMachine::new(config.catalog.filters()),
            provider,
            actions,
            policy: config.playback.quality_policy(),
            state,
            default_query: config.catalog.default_query.clone(),
            last_seq: 0,
            last_error: None,
        }
    }

    /// Initial browse before any remote has connected.
    pub async fn start(&mut self) {
        info!("Core: loading default query {:?}", self.default_query);
        if let Err(e) = self.machine.load(&self.default_query, &self.provider).await {
            warn!("Core: initial catalog load failed: {}", e);
            self.last_error = Some(e.to_string());
        }
        self.publish();
    }

    /// Apply one remote command and realize its decisions.
    pub async fn handle_command(&mut self, inbound: Inbound) {
        debug!(
            "Core: command #{} from remote {}: {:?}",
            inbound.seq, inbound.client, inbound.command
        );
        self.last_seq = inbound.seq;

        let applied = self.machine.apply(&inbound.command, &self.provider).await;
        self.last_error = applied.fetch_error.map(|e| e.to_string());
        if applied.decisions.is_empty() {
            self.publish();
            return;
        }

        // Show the transition before the slow part (quality lookup, download).
        self.publish();
        for decision in applied.decisions {
            self.dispatch(decision).await;
        }
        self.publish();
    }

    /// Heartbeat: notice a player that exited without a stop command.
    pub fn check_player(&mut self) {
        if self.machine.phase() != Phase::Requesting {
            return;
        }
        if !self.actions.player_alive() && self.machine.playback_finished() {
            info!("Core: player exited, back to browsing");
            self.publish();
        }
    }

    async fn dispatch(&mut self, decision: ActionDecision) {
        match decision {
            ActionDecision::Start { entry } => match self.realize_start(&entry).await {
                Ok(option) => {
                    info!("Core: playing '{}' in {}", entry.title, option.label);
                    self.machine.set_quality(&option.label);
                }
                Err(e) => {
                    warn!("Core: cannot start '{}': {}", entry.title, e);
                    self.machine.cancel_start();
                    self.last_error = Some(e.to_string());
                }
            },
            ActionDecision::Stop => {
                self.actions.stop_playback().await;
            }
            ActionDecision::Key { symbol } => {
                let key = PlayerKey::from_symbol(symbol);
                if let Err(e) = self.actions.inject_key(key).await {
                    warn!("Core: key {:?} failed: {}", symbol, e);
                    self.last_error = Some(e.to_string());
                }
            }
        }
    }

    async fn realize_start(&mut self, entry: &CatalogEntry) -> Result<QualityOption, ActionError> {
        let options = self.provider.list_qualities(&entry.detail_ref).await?;
        debug!("Core: {} quality options for '{}'", options.len(), entry.title);
        let chosen = self
            .policy
            .select(&options)
            .cloned()
            .ok_or(ActionError::NoAcceptableQuality(options.len()))?;
        self.actions.start_playback(&chosen).await?;
        Ok(chosen)
    }

    fn publish(&self) -> u64 {
        let mut snapshot = self.machine.view();
        snapshot.last_seq = self.last_seq;
        snapshot.last_error = self.last_error.clone();
        self.state.publish(snapshot)
    }

    /// Run until shutdown or until every command producer is gone.
    pub async fn run(
        mut self,
        mut commands: CommandReceiver,
        mut events: mpsc::Receiver<CoreEvent>,
    ) -> anyhow::Result<()> {
        info!("Core: starting event loop");
        self.start().await;

        let mut heartbeat = tokio::time::interval(HEARTBEAT);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                inbound = commands.next() => match inbound {
                    Some(inbound) => self.handle_command(inbound).await,
                    None => {
                        info!("Core: command channel closed, shutting down");
                        break;
                    }
                },

                evt = events.recv() => match evt {
                    Some(CoreEvent::Shutdown) => {
                        info!("Core: shutdown requested");
                        break;
                    }
                    None => {
                        info!("Core: event channel closed, shutting down");
                        break;
                    }
                },

                _ = heartbeat.tick() => self.check_player(),
            }
        }

        if self.machine.phase() == Phase::Requesting {
            info!("Core: stopping player on shutdown");
            self.actions.stop_playback().await;
        }
        Ok(())
    }
}
