use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use maxx_proto::catalog::{CatalogEntry, CatalogProvider, QualityOption, SearchFilters};
use maxx_proto::error::{CatalogError, ProtocolError};
use maxx_proto::machine::{ActionDecision, Phase, PlaybackStateMachine};
use maxx_proto::protocol::RemoteCommand;

/// In-memory catalog.  Unknown queries return an empty page; queries listed
/// in `failures` return that error.
#[derive(Default)]
struct FakeCatalog {
    pages: HashMap<String, Vec<CatalogEntry>>,
    failures: Mutex<HashMap<String, CatalogError>>,
    searches: AtomicUsize,
    last_filters: Mutex<Option<SearchFilters>>,
}

impl FakeCatalog {
    fn with_page(mut self, query: &str, titles: &[&str]) -> Self {
        self.pages
            .insert(query.to_string(), titles.iter().map(|t| entry(t)).collect());
        self
    }

    fn failing(self, query: &str, err: CatalogError) -> Self {
        self.failures.lock().unwrap().insert(query.to_string(), err);
        self
    }

    fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

impl CatalogProvider for FakeCatalog {
    async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        *self.last_filters.lock().unwrap() = Some(filters.clone());
        if let Some(err) = self.failures.lock().unwrap().get(query) {
            return Err(err.clone());
        }
        Ok(self.pages.get(query).cloned().unwrap_or_default())
    }

    async fn list_qualities(&self, _detail_ref: &str) -> Result<Vec<QualityOption>, CatalogError> {
        Ok(Vec::new())
    }
}

fn entry(title: &str) -> CatalogEntry {
    CatalogEntry {
        title: title.to_string(),
        detail_ref: format!("https://example.test/movies/{}", title.to_lowercase()),
        year: 2012,
        rating: "8.0 / 10".to_string(),
        genres: vec!["Action".to_string(), "Sci-Fi".to_string()],
        banner_ref: format!("https://example.test/img/{}.jpg", title.to_lowercase()),
    }
}

fn cmd(packet: &str) -> RemoteCommand {
    RemoteCommand::parse_str(packet).unwrap()
}

async fn browsing(catalog: &FakeCatalog) -> PlaybackStateMachine {
    let mut machine = PlaybackStateMachine::new(SearchFilters::default());
    machine.load("avengers", catalog).await.unwrap();
    assert_eq!(machine.phase(), Phase::Browsing);
    machine
}

fn three_titles() -> FakeCatalog {
    FakeCatalog::default().with_page("avengers", &["Avengers", "Endgame", "Ultron"])
}

#[tokio::test]
async fn start_packet_fires_once_on_selected_entry() {
    let catalog = three_titles();
    let mut machine = browsing(&catalog).await;

    let applied = machine.apply(&cmd("1^1^"), &catalog).await;
    assert_eq!(
        applied.decisions,
        vec![ActionDecision::Start {
            entry: entry("Endgame")
        }]
    );
    assert_eq!(machine.phase(), Phase::Requesting);

    let repeated = machine.apply(&cmd("1^1^"), &catalog).await;
    assert!(repeated.decisions.is_empty());
    assert_eq!(machine.phase(), Phase::Requesting);
}

#[tokio::test]
async fn stop_and_key_from_one_packet() {
    let catalog = three_titles();
    let mut machine = browsing(&catalog).await;
    machine.apply(&cmd("1^1^"), &catalog).await;

    let applied = machine.apply(&cmd("^0^>"), &catalog).await;
    assert_eq!(
        applied.decisions,
        vec![ActionDecision::Stop, ActionDecision::Key { symbol: '>' }]
    );
    assert_eq!(machine.phase(), Phase::Browsing);
    // Empty selection field kept the selection.
    assert_eq!(machine.selection(), 1);
}

#[tokio::test]
async fn malformed_packet_leaves_state_alone() {
    let catalog = three_titles();
    let mut machine = browsing(&catalog).await;
    machine.apply(&cmd("2^0^"), &catalog).await;
    let before = machine.view();

    let parsed = RemoteCommand::parse_str("abc^1^");
    assert_eq!(parsed, Err(ProtocolError::InvalidSelection("abc".into())));

    let after = machine.view();
    assert_eq!(after.selection, before.selection);
    assert_eq!(after.phase, before.phase);
    assert_eq!(machine.phase(), Phase::Browsing);
}

#[tokio::test]
async fn every_command_is_idempotent() {
    let catalog = three_titles().with_page("matrix", &["Matrix"]);
    let packets = [
        "1^1^", "1^0^", "0^1^+", "^0^<", "matrix^0^1^", "avengers^2^0^>", "-1^1^", "5^0^x",
    ];
    for packet in packets {
        let mut machine = browsing(&catalog).await;
        let first = machine.apply(&cmd(packet), &catalog).await;
        let second = machine.apply(&cmd(packet), &catalog).await;
        assert!(
            second.decisions.is_empty(),
            "{packet:?} fired twice: {:?} then {:?}",
            first.decisions,
            second.decisions
        );
    }
}

#[tokio::test]
async fn same_query_never_refetches() {
    let catalog = three_titles();
    let mut machine = browsing(&catalog).await;
    assert_eq!(catalog.searches(), 1);

    machine.apply(&cmd("avengers^0^0^"), &catalog).await;
    machine.apply(&cmd("avengers^1^0^"), &catalog).await;
    machine.apply(&cmd("2^0^"), &catalog).await;
    assert_eq!(catalog.searches(), 1);
}

#[tokio::test]
async fn new_query_replaces_entries_and_resets_selection() {
    let catalog = three_titles().with_page("matrix", &["Matrix", "Reloaded"]);
    let mut machine = browsing(&catalog).await;
    machine.apply(&cmd("2^0^"), &catalog).await;
    assert_eq!(machine.selection(), 2);

    machine.apply(&cmd("matrix^^0^"), &catalog).await;
    assert_eq!(catalog.searches(), 2);
    assert_eq!(machine.query(), Some("matrix"));
    assert_eq!(machine.entries().len(), 2);
    assert_eq!(machine.selection(), 0);
    assert_eq!(
        catalog.last_filters.lock().unwrap().clone(),
        Some(SearchFilters::default())
    );
}

#[tokio::test]
async fn query_and_selection_in_one_packet() {
    let catalog = three_titles().with_page("matrix", &["Matrix", "Reloaded"]);
    let mut machine = browsing(&catalog).await;

    let applied = machine.apply(&cmd("matrix^1^1^"), &catalog).await;
    assert_eq!(
        applied.decisions,
        vec![ActionDecision::Start {
            entry: entry("Reloaded")
        }]
    );
}

#[tokio::test]
async fn empty_result_shows_sentinel() {
    let catalog = three_titles();
    let mut machine = browsing(&catalog).await;

    let applied = machine.apply(&cmd("nothing-matches^4^0^"), &catalog).await;
    assert!(applied.fetch_error.is_none());
    assert_eq!(machine.entries().len(), 1);
    assert!(machine.entries()[0].is_not_found());
    assert_eq!(machine.selection(), 0);

    // Cannot start the placeholder.
    let start = machine.apply(&cmd("0^1^"), &catalog).await;
    assert!(start.decisions.is_empty());
    assert_eq!(machine.phase(), Phase::Browsing);
}

#[tokio::test]
async fn selection_always_in_range() {
    let catalog = three_titles()
        .with_page("one", &["Solo"])
        .with_page("empty", &[]);
    for query in ["avengers", "one", "empty"] {
        let mut machine = browsing(&catalog).await;
        machine
            .apply(&cmd(&format!("{}^0^0^", query)), &catalog)
            .await;
        let len = machine.entries().len();
        assert!(len > 0);
        for idx in -7i64..7 {
            machine
                .apply(&cmd(&format!("{}^0^", idx)), &catalog)
                .await;
            assert!(machine.selection() < len, "{query}: {idx} -> {}", machine.selection());
        }
    }
}

#[tokio::test]
async fn network_error_keeps_previous_entries() {
    let catalog = three_titles().failing("offline", CatalogError::Network("refused".into()));
    let mut machine = browsing(&catalog).await;
    machine.apply(&cmd("1^0^"), &catalog).await;

    let applied = machine.apply(&cmd("offline^2^0^"), &catalog).await;
    assert!(matches!(applied.fetch_error, Some(CatalogError::Network(_))));
    assert_eq!(machine.query(), Some("avengers"));
    assert_eq!(machine.entries().len(), 3);
    assert_eq!(machine.selection(), 2);

    // The query was not recorded, so the same override retries.
    machine.apply(&cmd("offline^2^0^"), &catalog).await;
    assert_eq!(catalog.searches(), 3);
}

#[tokio::test]
async fn parse_error_shows_sentinel() {
    let catalog = three_titles().failing("broken", CatalogError::Parse("no grid".into()));
    let mut machine = browsing(&catalog).await;

    let applied = machine.apply(&cmd("broken^0^0^"), &catalog).await;
    assert!(matches!(applied.fetch_error, Some(CatalogError::Parse(_))));
    assert_eq!(machine.query(), Some("broken"));
    assert!(machine.entries()[0].is_not_found());
}

#[tokio::test]
async fn failed_first_load_still_has_an_entry() {
    let catalog = FakeCatalog::default().failing("0", CatalogError::Network("dns".into()));
    let mut machine = PlaybackStateMachine::new(SearchFilters::default());

    assert!(machine.load("0", &catalog).await.is_err());
    assert_eq!(machine.phase(), Phase::Browsing);
    assert_eq!(machine.entries().len(), 1);
    assert!(machine.view().selected().unwrap().is_not_found());
}

#[tokio::test]
async fn key_fires_only_when_symbol_changes() {
    let catalog = three_titles();
    let mut machine = browsing(&catalog).await;

    let a = machine.apply(&cmd("0^0^>"), &catalog).await;
    assert_eq!(a.decisions, vec![ActionDecision::Key { symbol: '>' }]);

    // Different selection, same key: no second press.
    let b = machine.apply(&cmd("1^0^>"), &catalog).await;
    assert!(b.decisions.is_empty());

    let c = machine.apply(&cmd("1^0^"), &catalog).await;
    assert!(c.decisions.is_empty());

    let d = machine.apply(&cmd("1^0^>"), &catalog).await;
    assert_eq!(d.decisions, vec![ActionDecision::Key { symbol: '>' }]);
}

#[tokio::test]
async fn start_while_requesting_is_ignored() {
    let catalog = three_titles();
    let mut machine = browsing(&catalog).await;
    machine.apply(&cmd("0^1^"), &catalog).await;

    let applied = machine.apply(&cmd("2^1^"), &catalog).await;
    assert!(applied.decisions.is_empty());
    assert_eq!(machine.phase(), Phase::Requesting);
    assert_eq!(machine.view().playing.as_deref(), Some("Avengers"));
    assert_eq!(machine.selection(), 2);
}

#[tokio::test]
async fn restart_after_player_exit_needs_new_command() {
    let catalog = three_titles();
    let mut machine = browsing(&catalog).await;
    machine.apply(&cmd("0^1^"), &catalog).await;

    assert!(machine.playback_finished());
    assert_eq!(machine.phase(), Phase::Browsing);

    assert!(machine.apply(&cmd("0^1^"), &catalog).await.decisions.is_empty());

    let applied = machine.apply(&cmd("1^1^"), &catalog).await;
    assert_eq!(
        applied.decisions,
        vec![ActionDecision::Start {
            entry: entry("Endgame")
        }]
    );
}

#[tokio::test]
async fn stop_while_browsing_is_a_no_op() {
    let catalog = three_titles();
    let mut machine = browsing(&catalog).await;
    let applied = machine.apply(&cmd("0^0^"), &catalog).await;
    assert!(applied.decisions.is_empty());
    assert_eq!(machine.phase(), Phase::Browsing);
}
