//! The rule supplier: queue, prefetch policy, and reveal timers.
//!
//! All state sits behind one mutex that is never held across an await.
//! Timers are spawned tasks, aborted on reset; every task also compares the
//! session epoch it was started under before touching state, so nothing
//! scheduled before a reset can mutate the session that follows it.
//! Fetches are fire-and-forget and are never aborted, and at most one is
//! outstanding at any time, across resets too. A result that lands after a
//! reset is dropped on the floor unless a new session has since taken the
//! fetch over as its initial one.
//!
//! Every operation spawns onto the ambient Tokio runtime and must be called
//! from within one.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::client::RuleSource;
use crate::messages::Messages;
use crate::parse::{parse_batch, BatchOutcome};
use crate::types::{
    FetchState, GlitchResult, Phase, SessionConfig, SupplierEvent, SupplierSnapshot,
};

const EVENT_CAPACITY: usize = 64;

/// Timer and threshold settings.
#[derive(Debug, Clone)]
pub struct SupplierTiming {
    /// Window after a `next()` during which further calls are rejected.
    pub cooldown: Duration,
    /// Pause between hiding the card and revealing the next rule.
    pub reveal_delay: Duration,
    pub auto_min: Duration,
    pub auto_max: Duration,
    /// Refill when fewer than this many rules remain after a pop.
    pub low_water_mark: usize,
}

impl Default for SupplierTiming {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(5_000),
            reveal_delay: Duration::from_millis(600),
            auto_min: Duration::from_millis(45_000),
            auto_max: Duration::from_millis(90_000),
            low_water_mark: 3,
        }
    }
}

impl SupplierTiming {
    /// Uniform draw from `[auto_min, auto_max]`, millisecond resolution.
    pub fn draw_auto_delay(&self) -> Duration {
        let lo = self.auto_min.as_millis() as u64;
        let hi = (self.auto_max.as_millis() as u64).max(lo);
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
    Initial,
    Refill,
}

/// The session a running fetch will deliver into.
#[derive(Debug, Clone, Copy)]
struct FetchTarget {
    epoch: u64,
    kind: FetchKind,
}

#[derive(Default)]
struct State {
    epoch: u64,
    session_id: Option<Uuid>,
    config: Option<SessionConfig>,
    phase: Phase,
    queue: VecDeque<String>,
    fetch: FetchState,
    /// A `fetch_raw` call is outstanding. Survives reset; only its own
    /// completion clears it.
    in_flight: bool,
    /// `None` once the fetch has been orphaned by a reset.
    fetch_target: Option<FetchTarget>,
    cooling_down: bool,
    auto_mode: bool,
    auto_delay: Option<Duration>,
    current_rule: String,
    face_up: bool,
    unknown_game: bool,
    reveals: u64,
    reveal_timer: Option<JoinHandle<()>>,
    cooldown_timer: Option<JoinHandle<()>>,
    auto_timer: Option<JoinHandle<()>>,
}

impl State {
    fn snapshot(&self) -> SupplierSnapshot {
        SupplierSnapshot {
            session_id: self.session_id,
            phase: self.phase,
            queue_len: self.queue.len(),
            fetch_state: self.fetch,
            fetching: self.in_flight,
            cooling_down: self.cooling_down,
            auto_mode: self.auto_mode,
            auto_delay_ms: self.auto_delay.map(|d| d.as_millis() as u64),
            current_rule: self.current_rule.clone(),
            face_up: self.face_up,
            unknown_game: self.unknown_game,
            reveals: self.reveals,
        }
    }

    fn cancel_timers(&mut self) {
        for handle in [
            self.reveal_timer.take(),
            self.cooldown_timer.take(),
            self.auto_timer.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
        self.auto_delay = None;
    }
}

struct Inner {
    source: Arc<dyn RuleSource>,
    messages: Messages,
    timing: SupplierTiming,
    state: Mutex<State>,
    snapshot_tx: watch::Sender<SupplierSnapshot>,
    events_tx: broadcast::Sender<SupplierEvent>,
}

/// Owns the rule queue and the policy that keeps it full.
pub struct RuleSupplier {
    inner: Arc<Inner>,
}

impl RuleSupplier {
    pub fn new(source: Arc<dyn RuleSource>, messages: Messages) -> Self {
        Self::with_timing(source, messages, SupplierTiming::default())
    }

    pub fn with_timing(
        source: Arc<dyn RuleSource>,
        messages: Messages,
        timing: SupplierTiming,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(SupplierSnapshot::default());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                source,
                messages,
                timing,
                state: Mutex::new(State::default()),
                snapshot_tx,
                events_tx,
            }),
        }
    }

    /// Begin a new session and issue its initial fetch.
    pub fn start(&self, config: SessionConfig) -> GlitchResult<()> {
        config.validate()?;

        let mut st = self.inner.state.lock();
        self.inner.reset_locked(&mut st);

        let session_id = Uuid::new_v4();
        tracing::info!(%session_id, vibe = config.vibe.key(), "Session started");
        st.session_id = Some(session_id);
        st.config = Some(config);
        st.phase = Phase::Loading;

        self.inner.request_fetch(&mut st, FetchKind::Initial);
        self.inner.publish(&st);
        Ok(())
    }

    /// Flip to the next rule. Returns false when the call was ignored.
    pub fn next(&self) -> bool {
        let mut st = self.inner.state.lock();
        let accepted = self.inner.pull_next(&mut st);
        if accepted {
            self.inner.publish(&st);
        }
        accepted
    }

    pub fn set_auto_mode(&self, enabled: bool) {
        let mut st = self.inner.state.lock();
        if st.auto_mode == enabled {
            return;
        }
        st.auto_mode = enabled;

        if enabled {
            if st.phase == Phase::Playing {
                self.inner.arm_auto(&mut st);
            }
        } else {
            if let Some(handle) = st.auto_timer.take() {
                handle.abort();
            }
            st.auto_delay = None;
        }

        tracing::info!("Auto mode {}", if enabled { "on" } else { "off" });
        self.inner.publish(&st);
    }

    /// Tear down the session and return to the home screen.
    pub fn reset(&self) {
        let mut st = self.inner.state.lock();
        if let Some(session_id) = st.session_id {
            tracing::info!(%session_id, reveals = st.reveals, "Session ended");
        }
        self.inner.reset_locked(&mut st);
        self.inner.publish(&st);
    }

    pub fn dismiss_unknown_game(&self) {
        let mut st = self.inner.state.lock();
        if st.unknown_game {
            st.unknown_game = false;
            self.inner.publish(&st);
        }
    }

    pub fn snapshot(&self) -> SupplierSnapshot {
        self.inner.state.lock().snapshot()
    }

    /// Receive a fresh snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<SupplierSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SupplierEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Number of reveal, cooldown and auto timers still armed.
    pub fn pending_timers(&self) -> usize {
        let st = self.inner.state.lock();
        [&st.reveal_timer, &st.cooldown_timer, &st.auto_timer]
            .into_iter()
            .flatten()
            .filter(|h| !h.is_finished())
            .count()
    }

    pub fn messages(&self) -> &Messages {
        &self.inner.messages
    }
}

impl Drop for RuleSupplier {
    fn drop(&mut self) {
        let mut st = self.inner.state.lock();
        st.epoch += 1;
        st.cancel_timers();
    }
}

impl Inner {
    fn publish(&self, st: &State) {
        self.snapshot_tx.send_replace(st.snapshot());
    }

    fn emit(&self, event: SupplierEvent) {
        // No receivers is fine; nobody is rendering.
        let _ = self.events_tx.send(event);
    }

    fn reset_locked(&self, st: &mut State) {
        st.epoch += 1;
        st.cancel_timers();
        st.queue.clear();
        st.fetch = FetchState::Idle;
        st.fetch_target = None;
        st.cooling_down = false;
        st.auto_mode = false;
        st.current_rule.clear();
        st.face_up = false;
        st.phase = Phase::Home;
        st.config = None;
        st.session_id = None;
    }

    /// Issue a fetch unless one is already in flight.
    ///
    /// An initial request that finds an orphaned fetch still running takes
    /// that fetch over instead of issuing a second one.
    fn request_fetch(self: &Arc<Self>, st: &mut State, kind: FetchKind) -> bool {
        let target = FetchTarget {
            epoch: st.epoch,
            kind,
        };
        let state = match kind {
            FetchKind::Initial => FetchState::FetchingInitial,
            FetchKind::Refill => FetchState::FetchingRefill,
        };

        if st.in_flight {
            if kind == FetchKind::Initial && st.fetch_target.is_none() {
                tracing::debug!("Fetch already in flight, adopting it as the initial fetch");
                st.fetch_target = Some(target);
                st.fetch = state;
                return true;
            }
            tracing::debug!("Fetch already in flight, dropping {kind:?} request");
            return false;
        }
        let Some(config) = st.config.clone() else {
            return false;
        };

        st.in_flight = true;
        st.fetch_target = Some(target);
        st.fetch = state;

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let result = this.source.fetch_raw(&config).await;
            this.finish_fetch(result);
        });
        true
    }

    fn finish_fetch(self: &Arc<Self>, result: GlitchResult<String>) {
        let mut st = self.state.lock();
        st.in_flight = false;

        let kind = match st.fetch_target.take() {
            Some(target) if target.epoch == st.epoch => target.kind,
            _ => {
                tracing::debug!("Discarding fetch result from an ended session");
                self.publish(&st);
                return;
            }
        };
        st.fetch = FetchState::Idle;

        match result {
            Ok(raw) => match parse_batch(&raw, &self.messages) {
                BatchOutcome::UnknownGame => {
                    st.unknown_game = true;
                    if kind == FetchKind::Initial {
                        st.phase = Phase::Home;
                    }
                    self.emit(SupplierEvent::UnknownGame);
                }
                BatchOutcome::Rules(rules) => {
                    tracing::info!("Fetched {} rules", rules.len());
                    st.unknown_game = false;
                    st.queue.extend(rules);
                    if kind == FetchKind::Initial {
                        self.enter_play(&mut st);
                    }
                }
            },
            Err(e) => {
                tracing::warn!("Rule fetch failed ({kind:?}): {e}");
                self.emit(SupplierEvent::FetchFailed {
                    initial: kind == FetchKind::Initial,
                    message: e.to_string(),
                });
                if kind == FetchKind::Initial {
                    st.queue = self
                        .messages
                        .network_errors
                        .iter()
                        .map(|s| s.to_string())
                        .collect();
                    self.enter_play(&mut st);
                }
            }
        }

        self.publish(&st);
    }

    fn enter_play(self: &Arc<Self>, st: &mut State) {
        st.phase = Phase::Playing;
        self.emit(SupplierEvent::Ready {
            queued: st.queue.len(),
        });
        if st.auto_mode && st.auto_timer.is_none() {
            self.arm_auto(st);
        }
    }

    fn pull_next(self: &Arc<Self>, st: &mut State) -> bool {
        if st.cooling_down || st.phase != Phase::Playing {
            return false;
        }

        // Set before any suspension so a second call cannot pop twice.
        st.cooling_down = true;
        st.face_up = false;
        let epoch = st.epoch;

        let this = Arc::clone(self);
        let cooldown = self.timing.cooldown;
        st.cooldown_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            let mut st = this.state.lock();
            if st.epoch != epoch {
                return;
            }
            st.cooling_down = false;
            st.cooldown_timer = None;
            this.publish(&st);
        }));

        let this = Arc::clone(self);
        let delay = self.timing.reveal_delay;
        st.reveal_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.reveal(epoch);
        }));

        true
    }

    fn reveal(self: &Arc<Self>, epoch: u64) {
        let mut st = self.state.lock();
        if st.epoch != epoch {
            return;
        }
        st.reveal_timer = None;

        let popped = st.queue.pop_front();
        let (rule, from_queue) = match popped {
            Some(rule) => {
                if st.queue.len() < self.timing.low_water_mark && !st.in_flight {
                    tracing::debug!("Refilling queue ({} left)", st.queue.len());
                    self.request_fetch(&mut st, FetchKind::Refill);
                }
                (rule, true)
            }
            None => {
                self.request_fetch(&mut st, FetchKind::Refill);
                (self.messages.loading_more.to_string(), false)
            }
        };

        st.current_rule = rule.clone();
        st.face_up = true;
        st.reveals += 1;

        self.emit(SupplierEvent::Revealed { rule, from_queue });
        self.emit(SupplierEvent::Glitch);
        self.publish(&st);
    }

    /// Arm the self-rescheduling auto-mode timer, replacing any pending one.
    fn arm_auto(self: &Arc<Self>, st: &mut State) {
        if let Some(handle) = st.auto_timer.take() {
            handle.abort();
        }

        let epoch = st.epoch;
        let first = self.timing.draw_auto_delay();
        st.auto_delay = Some(first);

        let this = Arc::clone(self);
        st.auto_timer = Some(tokio::spawn(async move {
            let mut delay = first;
            loop {
                tokio::time::sleep(delay).await;
                {
                    let mut st = this.state.lock();
                    if st.epoch != epoch || !st.auto_mode {
                        return;
                    }
                    if !st.cooling_down && this.pull_next(&mut st) {
                        tracing::debug!("Auto mode fired");
                    }
                    delay = this.timing.draw_auto_delay();
                    st.auto_delay = Some(delay);
                    this.publish(&st);
                }
            }
        }));
    }
}
