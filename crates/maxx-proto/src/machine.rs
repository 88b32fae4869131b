//! Playback/selection state machine.
//!
//! ```text
//!   Idle ──load/query──▶ Browsing ──new start──▶ Requesting
//!                           ▲                        │
//!                           └──new stop / cancel / player exit
//! ```
//!
//! `PlaybackStateMachine` is owned by exactly one task.  Everything else sees
//! it through `Snapshot`s.  A decision is returned at most once per distinct
//! command: the full content of the last applied command is kept as a
//! fingerprint and an identical command is a no-op, so callers may re-submit
//! the latest command as often as they like.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{normalize_entries, wrap_index, CatalogEntry, CatalogProvider, SearchFilters};
use crate::error::CatalogError;
use crate::protocol::RemoteCommand;
use crate::state::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    /// No query has been issued yet.
    #[default]
    Idle,
    /// Entries loaded, nothing playing.
    Browsing,
    /// A start decision was dispatched and not yet stopped.
    Requesting,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "IDLE",
            Phase::Browsing => "BROWSING",
            Phase::Requesting => "PLAYING",
        }
    }
}

/// Something the dispatcher must do, exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionDecision {
    Start { entry: CatalogEntry },
    Stop,
    Key { symbol: char },
}

/// Player key a control symbol stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerKey {
    PlayPause,
    SeekForward,
    SeekBack,
    /// Unknown symbols press a harmless key.
    Filler,
}

impl PlayerKey {
    pub fn from_symbol(symbol: char) -> Self {
        match symbol {
            '+' => PlayerKey::PlayPause,
            '>' => PlayerKey::SeekForward,
            '<' => PlayerKey::SeekBack,
            _ => PlayerKey::Filler,
        }
    }
}

/// Result of applying one command.
#[derive(Debug, Default)]
pub struct Applied {
    /// Playback decision first, then key decision.
    pub decisions: Vec<ActionDecision>,
    /// Catalog failure hit while refreshing the query.
    pub fetch_error: Option<CatalogError>,
}

pub struct PlaybackStateMachine {
    filters: SearchFilters,
    phase: Phase,
    query: Option<String>,
    entries: Arc<Vec<CatalogEntry>>,
    selection: usize,
    fingerprint: Option<RemoteCommand>,
    playing: Option<CatalogEntry>,
    quality: Option<String>,
}

impl PlaybackStateMachine {
    pub fn new(filters: SearchFilters) -> Self {
        Self {
            filters,
            phase: Phase::Idle,
            query: None,
            entries: Arc::new(Vec::new()),
            selection: 0,
            fingerprint: None,
            playing: None,
            quality: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn selection(&self) -> usize {
        self.selection
    }

    pub fn selected(&self) -> Option<&CatalogEntry> {
        self.entries.get(self.selection)
    }

    /// Initial fetch before any client has spoken.
    pub async fn load<P: CatalogProvider>(
        &mut self,
        query: &str,
        provider: &P,
    ) -> Result<(), CatalogError> {
        self.fetch(query, provider).await
    }

    /// Apply one remote command.
    pub async fn apply<P: CatalogProvider>(
        &mut self,
        command: &RemoteCommand,
        provider: &P,
    ) -> Applied {
        let mut applied = Applied::default();

        if let Some(query) = command.query.as_deref() {
            if self.query.as_deref() != Some(query) {
                if let Err(e) = self.fetch(query, provider).await {
                    applied.fetch_error = Some(e);
                }
            }
        }

        if let Some(selection) = command.selection {
            self.selection = wrap_index(selection, self.entries.len());
        }

        if self.fingerprint.as_ref() == Some(command) {
            debug!("machine: repeated command, no decision");
            return applied;
        }
        let previous = self.fingerprint.replace(command.clone());

        if command.play && self.phase == Phase::Browsing {
            match self.selected() {
                Some(entry) if !entry.is_not_found() => {
                    let entry = entry.clone();
                    info!("machine: start '{}'", entry.title);
                    self.phase = Phase::Requesting;
                    self.playing = Some(entry.clone());
                    self.quality = None;
                    applied.decisions.push(ActionDecision::Start { entry });
                }
                _ => warn!("machine: start requested on placeholder entry, ignored"),
            }
        } else if !command.play && self.phase == Phase::Requesting {
            info!("machine: stop");
            self.phase = Phase::Browsing;
            self.playing = None;
            self.quality = None;
            applied.decisions.push(ActionDecision::Stop);
        }

        let previous_key = previous.and_then(|p| p.key);
        if let Some(symbol) = command.key {
            if previous_key != Some(symbol) {
                applied.decisions.push(ActionDecision::Key { symbol });
            }
        }

        applied
    }

    /// A start could not be realized; go back to browsing.  The fingerprint is
    /// kept, so the same packet will not retry on its own.
    pub fn cancel_start(&mut self) -> bool {
        if self.phase != Phase::Requesting {
            return false;
        }
        self.phase = Phase::Browsing;
        self.playing = None;
        self.quality = None;
        true
    }

    /// The player went away without a stop command.
    pub fn playback_finished(&mut self) -> bool {
        self.cancel_start()
    }

    /// Record which quality the running playback uses.
    pub fn set_quality(&mut self, label: &str) {
        if self.phase == Phase::Requesting {
            self.quality = Some(label.to_string());
        }
    }

    /// Read-only view; `rev`, `last_seq` and `last_error` are filled in by
    /// the owner before publishing.
    pub fn view(&self) -> Snapshot {
        Snapshot {
            rev: 0,
            phase: self.phase,
            query: self.query.clone(),
            entries: Arc::clone(&self.entries),
            selection: self.selection,
            playing: self.playing.as_ref().map(|e| e.title.clone()),
            quality: self.quality.clone(),
            last_seq: 0,
            last_error: None,
        }
    }

    async fn fetch<P: CatalogProvider>(
        &mut self,
        query: &str,
        provider: &P,
    ) -> Result<(), CatalogError> {
        info!("machine: searching {:?}", query);
        match provider.search(query, &self.filters).await {
            Ok(entries) => {
                info!("machine: {} entries for {:?}", entries.len(), query);
                self.replace_entries(query, entries);
                Ok(())
            }
            Err(CatalogError::Parse(msg)) => {
                warn!("machine: unusable catalog page for {:?}: {}", query, msg);
                self.replace_entries(query, Vec::new());
                Err(CatalogError::Parse(msg))
            }
            Err(e) => {
                warn!("machine: search {:?} failed, keeping previous entries: {}", query, e);
                if self.entries.is_empty() {
                    self.entries = Arc::new(normalize_entries(Vec::new()));
                    self.selection = 0;
                    if self.phase == Phase::Idle {
                        self.phase = Phase::Browsing;
                    }
                }
                Err(e)
            }
        }
    }

    fn replace_entries(&mut self, query: &str, entries: Vec<CatalogEntry>) {
        self.query = Some(query.to_string());
        self.entries = Arc::new(normalize_entries(entries));
        self.selection = 0;
        if self.phase == Phase::Idle {
            self.phase = Phase::Browsing;
        }
    }
}
