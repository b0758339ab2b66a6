//! Queue, prefetch, and timer behaviour of the rule supplier.
//!
//! Every test runs on a paused Tokio clock, so timer-driven behaviour is
//! deterministic and the 45-90 second auto-mode delays cost nothing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{broadcast, Semaphore};

use glitch::{
    FetchState, GlitchError, GlitchResult, KnownGame, Messages, Phase, RuleSource, RuleSupplier,
    SessionConfig, SupplierEvent, SupplierSnapshot, SupplierTiming,
};

// ─────────────────────── helpers ───────────────────────

/// A rule source that replays scripted bodies, optionally held behind a gate.
struct ScriptedSource {
    responses: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedSource {
    fn new(responses: Vec<Result<String, String>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            gate: None,
        })
    }

    /// Each fetch waits for one permit on `gate` before answering.
    fn gated(responses: Vec<Result<String, String>>, gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            gate: Some(gate),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuleSource for ScriptedSource {
    async fn fetch_raw(&self, _config: &SessionConfig) -> GlitchResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(body)) => Ok(body),
            Some(Err(message)) => Err(GlitchError::Api(message)),
            None => Ok("[]".to_string()),
        }
    }
}

/// JSON body with `n` numbered rules.
fn batch(prefix: &str, n: usize) -> Result<String, String> {
    let rules: Vec<String> = (1..=n).map(|i| format!("{prefix} rule {i}")).collect();
    Ok(json!(rules).to_string())
}

fn supplier_with(source: Arc<ScriptedSource>) -> RuleSupplier {
    RuleSupplier::new(source, Messages::default())
}

fn catan() -> SessionConfig {
    SessionConfig::for_game(KnownGame::Catan)
}

/// Wait until the published snapshot satisfies `pred`.
async fn wait_for(
    supplier: &RuleSupplier,
    pred: impl FnMut(&SupplierSnapshot) -> bool,
) -> SupplierSnapshot {
    let mut rx = supplier.subscribe();
    let snap = tokio::time::timeout(Duration::from_secs(1), rx.wait_for(pred))
        .await
        .expect("timed out waiting for supplier state")
        .expect("supplier dropped")
        .clone();
    snap
}

async fn playing(supplier: &RuleSupplier) -> SupplierSnapshot {
    wait_for(supplier, |s| s.phase == Phase::Playing && !s.fetching).await
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

fn drain(rx: &mut broadcast::Receiver<SupplierEvent>) -> Vec<SupplierEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

// ═══════════════════════════════════════════════════════
// SESSION START
// ═══════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_initial_fetch_fills_queue() {
    let source = ScriptedSource::new(vec![batch("a", 5)]);
    let supplier = supplier_with(source.clone());
    let mut events = supplier.events();

    supplier.start(catan()).unwrap();
    let loading = supplier.snapshot();
    assert!(loading.session_id.is_some());
    assert!(matches!(loading.phase, Phase::Loading | Phase::Playing));

    let snap = playing(&supplier).await;
    assert_eq!(snap.queue_len, 5);
    assert_eq!(snap.fetch_state, FetchState::Idle);
    assert!(!snap.unknown_game);
    assert_eq!(source.calls(), 1);
    assert!(drain(&mut events).contains(&SupplierEvent::Ready { queued: 5 }));
}

#[tokio::test(start_paused = true)]
async fn test_start_rejects_empty_config() {
    let source = ScriptedSource::new(vec![]);
    let supplier = supplier_with(source.clone());

    assert!(supplier.start(SessionConfig::default()).is_err());
    assert_eq!(supplier.snapshot().phase, Phase::Home);
    assert_eq!(source.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_initial_failure_queues_placeholders() {
    let source = ScriptedSource::new(vec![Err("quota exceeded".to_string())]);
    let supplier = supplier_with(source);
    let mut events = supplier.events();

    supplier.start(catan()).unwrap();
    let snap = playing(&supplier).await;
    assert_eq!(snap.queue_len, 3);

    let seen = drain(&mut events);
    assert!(seen.iter().any(|e| matches!(
        e,
        SupplierEvent::FetchFailed { initial: true, message } if message.contains("quota exceeded")
    )));

    assert!(supplier.next());
    advance(700).await;
    assert_eq!(supplier.snapshot().current_rule, "Network hiccup");
}

#[tokio::test(start_paused = true)]
async fn test_unknown_game_sets_flag_without_rules() {
    let source = ScriptedSource::new(vec![Ok("```\nUNKNOWN_GAME\n```".to_string())]);
    let supplier = supplier_with(source);
    let mut events = supplier.events();

    supplier
        .start(SessionConfig::for_custom_name("Gloomhaven Jr. Deluxe"))
        .unwrap();
    let snap = wait_for(&supplier, |s| s.unknown_game).await;
    assert_eq!(snap.queue_len, 0);
    assert_eq!(snap.phase, Phase::Home);
    assert!(!snap.fetching);
    assert!(drain(&mut events).contains(&SupplierEvent::UnknownGame));

    // Not on the play screen, so there is nothing to flip.
    assert!(!supplier.next());

    supplier.dismiss_unknown_game();
    assert!(!supplier.snapshot().unknown_game);
}

#[tokio::test(start_paused = true)]
async fn test_successful_fetch_clears_unknown_flag() {
    let source = ScriptedSource::new(vec![Ok("UNKNOWN_GAME".to_string()), batch("b", 4)]);
    let supplier = supplier_with(source);

    supplier.start(SessionConfig::for_custom_name("Mystery")).unwrap();
    wait_for(&supplier, |s| s.unknown_game).await;

    supplier.start(catan()).unwrap();
    let snap = playing(&supplier).await;
    assert!(!snap.unknown_game);
    assert_eq!(snap.queue_len, 4);
}

// ═══════════════════════════════════════════════════════
// NEXT & COOLDOWN
// ═══════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_next_during_cooldown_is_noop() {
    let source = ScriptedSource::new(vec![batch("a", 5)]);
    let supplier = supplier_with(source.clone());
    supplier.start(catan()).unwrap();
    playing(&supplier).await;

    assert!(supplier.next());
    let before = supplier.snapshot();
    assert!(before.cooling_down);
    assert!(!supplier.next());
    assert_eq!(supplier.snapshot(), before);

    advance(700).await;
    let revealed = supplier.snapshot();
    assert_eq!(revealed.queue_len, 4);
    assert_eq!(revealed.reveals, 1);
    assert!(revealed.cooling_down);

    // Still inside the 5 second window.
    assert!(!supplier.next());
    assert_eq!(supplier.snapshot(), revealed);

    advance(4_400).await;
    assert!(!supplier.snapshot().cooling_down);
    assert!(supplier.next());
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reveal_pops_exactly_one_in_order() {
    let source = ScriptedSource::new(vec![batch("a", 5)]);
    let supplier = supplier_with(source);
    let mut events = supplier.events();
    supplier.start(catan()).unwrap();
    playing(&supplier).await;
    drain(&mut events);

    assert!(supplier.next());
    let hidden = supplier.snapshot();
    assert!(!hidden.face_up);
    assert_eq!(hidden.queue_len, 5);

    advance(599).await;
    assert_eq!(supplier.snapshot().reveals, 0);

    advance(2).await;
    let snap = supplier.snapshot();
    assert_eq!(snap.queue_len, 4);
    assert_eq!(snap.current_rule, "a rule 1");
    assert!(snap.face_up);

    let seen = drain(&mut events);
    assert_eq!(
        seen,
        vec![
            SupplierEvent::Revealed {
                rule: "a rule 1".to_string(),
                from_queue: true
            },
            SupplierEvent::Glitch,
        ]
    );

    advance(5_000).await;
    assert!(supplier.next());
    advance(700).await;
    assert_eq!(supplier.snapshot().current_rule, "a rule 2");
}

#[tokio::test(start_paused = true)]
async fn test_empty_queue_shows_loading_and_refills() {
    let source = ScriptedSource::new(vec![Ok("[]".to_string()), batch("r", 6)]);
    let supplier = supplier_with(source.clone());
    let mut events = supplier.events();
    supplier.start(catan()).unwrap();
    let snap = playing(&supplier).await;
    assert_eq!(snap.queue_len, 0);
    drain(&mut events);

    assert!(supplier.next());
    advance(700).await;

    let snap = wait_for(&supplier, |s| s.reveals == 1).await;
    assert_eq!(snap.current_rule, Messages::default().loading_more);
    assert_eq!(source.calls(), 2);

    let seen = drain(&mut events);
    assert!(seen.contains(&SupplierEvent::Revealed {
        rule: "Loading more...".to_string(),
        from_queue: false
    }));
    assert!(seen.contains(&SupplierEvent::Glitch));

    let refilled = wait_for(&supplier, |s| s.queue_len == 6).await;
    assert_eq!(refilled.fetch_state, FetchState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_next_without_session_is_noop() {
    let source = ScriptedSource::new(vec![]);
    let supplier = supplier_with(source.clone());
    assert!(!supplier.next());
    assert_eq!(supplier.snapshot(), SupplierSnapshot::default());
    assert_eq!(source.calls(), 0);
}

// ═══════════════════════════════════════════════════════
// PREFETCH POLICY
// ═══════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_refill_only_below_low_water_mark() {
    let source = ScriptedSource::new(vec![batch("a", 4), batch("b", 3)]);
    let supplier = supplier_with(source.clone());
    supplier.start(catan()).unwrap();
    playing(&supplier).await;

    // 4 -> 3 left: at the mark, not below it.
    assert!(supplier.next());
    advance(700).await;
    assert_eq!(supplier.snapshot().queue_len, 3);
    assert_eq!(source.calls(), 1);

    // 3 -> 2 left: refill.
    advance(5_000).await;
    assert!(supplier.next());
    advance(700).await;
    assert_eq!(source.calls(), 2);

    let snap = wait_for(&supplier, |s| s.queue_len == 5).await;
    assert!(!snap.fetching);
}

#[tokio::test(start_paused = true)]
async fn test_refill_dropped_while_fetch_in_flight() {
    let gate = Arc::new(Semaphore::new(1));
    let source = ScriptedSource::gated(vec![batch("a", 3), batch("b", 10)], gate.clone());
    let supplier = supplier_with(source.clone());
    supplier.start(catan()).unwrap();
    playing(&supplier).await;

    // 3 -> 2: refill issued, held at the gate.
    assert!(supplier.next());
    advance(700).await;
    let snap = supplier.snapshot();
    assert_eq!(snap.fetch_state, FetchState::FetchingRefill);
    assert!(snap.fetching);
    assert_eq!(source.calls(), 2);

    // 2 -> 1 with the refill still outstanding: no second fetch.
    advance(5_000).await;
    assert!(supplier.next());
    advance(700).await;
    assert_eq!(supplier.snapshot().queue_len, 1);
    assert_eq!(source.calls(), 2);

    gate.add_permits(1);
    let snap = wait_for(&supplier, |s| !s.fetching).await;
    assert_eq!(snap.queue_len, 11);
}

#[tokio::test(start_paused = true)]
async fn test_refill_failure_leaves_queue() {
    let source = ScriptedSource::new(vec![batch("a", 3), Err("503".to_string()), batch("c", 2)]);
    let supplier = supplier_with(source.clone());
    let mut events = supplier.events();
    supplier.start(catan()).unwrap();
    playing(&supplier).await;

    assert!(supplier.next());
    advance(700).await;
    let snap = wait_for(&supplier, |s| !s.fetching).await;
    assert_eq!(snap.queue_len, 2);
    assert_eq!(snap.phase, Phase::Playing);
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, SupplierEvent::FetchFailed { initial: false, .. })));

    // The next pop retries.
    advance(5_000).await;
    assert!(supplier.next());
    advance(700).await;
    assert_eq!(source.calls(), 3);
    wait_for(&supplier, |s| s.queue_len == 3).await;
}

// ═══════════════════════════════════════════════════════
// AUTO MODE
// ═══════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_auto_mode_keeps_one_timer_in_range() {
    let source = ScriptedSource::new(vec![batch("a", 10)]);
    let supplier = supplier_with(source);
    supplier.start(catan()).unwrap();
    playing(&supplier).await;

    supplier.set_auto_mode(true);
    let snap = supplier.snapshot();
    assert!(snap.auto_mode);
    let delay = snap.auto_delay_ms.expect("auto timer armed");
    assert!((45_000..=90_000).contains(&delay));
    assert_eq!(supplier.pending_timers(), 1);

    // Enabling twice does not stack timers.
    supplier.set_auto_mode(true);
    assert_eq!(supplier.pending_timers(), 1);
    assert_eq!(supplier.snapshot().auto_delay_ms, Some(delay));

    advance(delay - 1).await;
    assert_eq!(supplier.snapshot().reveals, 0);

    advance(701).await;
    let fired = supplier.snapshot();
    assert_eq!(fired.reveals, 1);
    let redrawn = fired.auto_delay_ms.expect("auto timer re-armed");
    assert!((45_000..=90_000).contains(&redrawn));

    supplier.set_auto_mode(false);
    let off = supplier.snapshot();
    assert!(!off.auto_mode);
    assert_eq!(off.auto_delay_ms, None);

    advance(300_000).await;
    assert_eq!(supplier.snapshot().reveals, 1);
}

#[tokio::test(start_paused = true)]
async fn test_auto_mode_skips_while_cooling_down() {
    let timing = SupplierTiming {
        cooldown: Duration::from_secs(30),
        auto_min: Duration::from_secs(10),
        auto_max: Duration::from_secs(10),
        ..SupplierTiming::default()
    };
    let source = ScriptedSource::new(vec![batch("a", 10)]);
    let supplier = RuleSupplier::with_timing(source, Messages::default(), timing);
    supplier.start(catan()).unwrap();
    playing(&supplier).await;

    assert!(supplier.next());
    supplier.set_auto_mode(true);

    // Firings at 10s and 20s land inside the manual cooldown.
    advance(25_000).await;
    let snap = supplier.snapshot();
    assert_eq!(snap.reveals, 1);
    assert_eq!(snap.auto_delay_ms, Some(10_000));
    assert_eq!(snap.queue_len, 9);
}

#[tokio::test(start_paused = true)]
async fn test_auto_mode_enabled_while_loading_arms_on_ready() {
    let gate = Arc::new(Semaphore::new(0));
    let source = ScriptedSource::gated(vec![batch("a", 10)], gate.clone());
    let supplier = supplier_with(source);
    supplier.start(catan()).unwrap();

    supplier.set_auto_mode(true);
    assert_eq!(supplier.snapshot().auto_delay_ms, None);

    gate.add_permits(1);
    let snap = playing(&supplier).await;
    assert!(snap.auto_mode);
    assert!(snap.auto_delay_ms.is_some());
}

// ═══════════════════════════════════════════════════════
// RESET
// ═══════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_reset_clears_state_and_timers() {
    let source = ScriptedSource::new(vec![batch("a", 10)]);
    let supplier = supplier_with(source);
    supplier.start(catan()).unwrap();
    playing(&supplier).await;

    supplier.set_auto_mode(true);
    assert!(supplier.next());
    assert_eq!(supplier.pending_timers(), 3);

    supplier.reset();
    let snap = supplier.snapshot();
    assert_eq!(snap.queue_len, 0);
    assert!(!snap.cooling_down);
    assert!(!snap.auto_mode);
    assert_eq!(snap.auto_delay_ms, None);
    assert_eq!(snap.phase, Phase::Home);
    assert_eq!(snap.session_id, None);
    assert_eq!(supplier.pending_timers(), 0);

    advance(300_000).await;
    let later = supplier.snapshot();
    assert_eq!(later.reveals, 0);
    assert_eq!(later.current_rule, "");
    assert_eq!(later, snap);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_landing_after_reset_is_discarded() {
    let gate = Arc::new(Semaphore::new(0));
    let source = ScriptedSource::gated(vec![batch("stale", 10), batch("fresh", 4)], gate.clone());
    let supplier = supplier_with(source.clone());

    supplier.start(catan()).unwrap();
    assert!(supplier.snapshot().fetching);
    supplier.reset();
    let snap = supplier.snapshot();
    assert_eq!(snap.fetch_state, FetchState::Idle);
    assert!(snap.fetching, "the network call is still outstanding");

    gate.add_permits(1);
    advance(10).await;
    let snap = supplier.snapshot();
    assert_eq!(snap.queue_len, 0);
    assert_eq!(snap.phase, Phase::Home);
    assert!(!snap.fetching);

    supplier.start(catan()).unwrap();
    assert_eq!(supplier.snapshot().fetch_state, FetchState::FetchingInitial);
    gate.add_permits(1);
    let snap = playing(&supplier).await;
    assert_eq!(snap.queue_len, 4);
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_double_start_issues_one_fetch() {
    let gate = Arc::new(Semaphore::new(0));
    let source = ScriptedSource::gated(vec![batch("only", 4)], gate.clone());
    let supplier = supplier_with(source.clone());

    supplier.start(catan()).unwrap();
    advance(1).await;
    supplier.start(catan()).unwrap();
    advance(1).await;

    assert_eq!(source.calls(), 1);
    let snap = supplier.snapshot();
    assert_eq!(snap.phase, Phase::Loading);
    assert_eq!(snap.fetch_state, FetchState::FetchingInitial);

    gate.add_permits(1);
    let snap = playing(&supplier).await;
    assert_eq!(snap.queue_len, 4);
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_after_reset_takes_over_running_fetch() {
    let gate = Arc::new(Semaphore::new(0));
    let source = ScriptedSource::gated(vec![batch("only", 4)], gate.clone());
    let supplier = supplier_with(source.clone());
    let mut events = supplier.events();

    supplier.start(catan()).unwrap();
    advance(1).await;
    supplier.reset();
    supplier.start(catan()).unwrap();
    advance(1).await;
    assert_eq!(source.calls(), 1);

    gate.add_permits(1);
    let snap = playing(&supplier).await;
    assert_eq!(snap.queue_len, 4);
    assert_eq!(source.calls(), 1);
    assert!(drain(&mut events).contains(&SupplierEvent::Ready { queued: 4 }));
}

#[tokio::test(start_paused = true)]
async fn test_restart_assigns_new_session() {
    let source = ScriptedSource::new(vec![batch("a", 5), batch("b", 5)]);
    let supplier = supplier_with(source);

    supplier.start(catan()).unwrap();
    let first = playing(&supplier).await.session_id;

    supplier.start(SessionConfig::for_game(KnownGame::Uno)).unwrap();
    let second = playing(&supplier).await.session_id;

    assert!(first.is_some());
    assert_ne!(first, second);
}
