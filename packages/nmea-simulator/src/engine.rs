//! engine.rs — Scenario runtime and control surface
//!
//! [`Simulation`] is the pure part: state, planner, scheduler and digest,
//! stepped with explicit simulated and monotonic time. [`Engine`] owns one
//! running simulation at a time on a dedicated tick task and exposes the four
//! control operations: load, stop, inject, status.
//!
//! The tick task is the only writer of simulation state. Plan edits from
//! inbound traffic reach it through a bounded channel drained between ticks,
//! and readers see a snapshot published once per tick.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nmea_types::{DecodeError, NmeaSentence, Sentence};
use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::broadcast::{BroadcastHub, ConnectionInfo};
use crate::digest::StreamDigest;
use crate::environment::EnvironmentTimeline;
use crate::error::{EngineError, ScenarioError};
use crate::inbound::{self, InboundSender};
use crate::navigation::{validate_waypoint, NavMode, NavigationPlan, Planner, Waypoint};
use crate::performance::VesselProfile;
use crate::scenarios;
use crate::scheduler::Scheduler;
use crate::sentences::{self, EncoderContext, OutboundSentence, SentenceKind};
use crate::vessel::{self, Bathymetry, SimulationState};

const EDIT_QUEUE: usize = 64;

// ── Scenario ──────────────────────────────────────────────────────────────────

/// Everything a run needs, supplied fully formed.
#[derive(Clone)]
pub struct Scenario {
    pub name: String,
    pub profile: VesselProfile,
    pub environment: EnvironmentTimeline,
    pub plan: NavigationPlan,
    pub seabed: Arc<dyn Bathymetry>,
}

impl Scenario {
    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.profile.validate()?;
        self.environment.validate()?;
        self.plan.validate()
    }
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("vessel", &self.profile.name)
            .field("waypoints", &self.plan.waypoints.len())
            .finish()
    }
}

/// Runtime settings that shape output but not physics.
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub epoch: DateTime<Utc>,
    pub magnetic_variation_deg: f64,
    pub intervals: Vec<(SentenceKind, Duration)>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            epoch: DateTime::<Utc>::UNIX_EPOCH,
            magnetic_variation_deg: 0.0,
            intervals: SentenceKind::ALL.iter().map(|k| (*k, k.default_interval())).collect(),
        }
    }
}

/// Edits the tick loop applies between ticks.
#[derive(Debug, Clone)]
pub enum PlanEdit {
    AppendWaypoint(Waypoint),
}

// ── Simulation ────────────────────────────────────────────────────────────────

pub struct Simulation {
    scenario: Scenario,
    planner: Planner,
    state: SimulationState,
    scheduler: Scheduler,
    ctx: EncoderContext,
    digest: StreamDigest,
}

/// Per-tick view of a running simulation.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub scenario: String,
    pub state: SimulationState,
    pub emitted: BTreeMap<SentenceKind, u64>,
    pub sentences_total: u64,
    pub digest: String,
}

impl Simulation {
    /// Validates the scenario; nothing is built if it is defective.
    pub fn new(scenario: Scenario, settings: &SimulationSettings) -> Result<Self, ScenarioError> {
        scenario.validate()?;
        let planner = Planner::new(scenario.plan.clone());
        let state = vessel::initial_state(&scenario.environment, &scenario.profile, &planner, scenario.seabed.as_ref());
        let ctx = EncoderContext {
            epoch: settings.epoch,
            magnetic_variation_deg: settings.magnetic_variation_deg,
            transducer_offset_m: scenario.profile.draft_m,
            arrival_radius_nm: scenario.plan.arrival_radius_nm,
            pgn_source: 1,
        };
        Ok(Self {
            scheduler: Scheduler::new(settings.intervals.iter().copied()),
            scenario,
            planner,
            state,
            ctx,
            digest: StreamDigest::new(),
        })
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn digest(&self) -> &StreamDigest {
        &self.digest
    }

    /// Advance physics by `dt_s` simulated seconds, then encode every sentence
    /// kind due at monotonic time `now`, all from the new state.
    pub fn step(&mut self, dt_s: f64, now: Duration) -> Vec<OutboundSentence> {
        let s = &self.scenario;
        self.state = vessel::advance(
            &self.state,
            dt_s,
            &s.environment,
            &s.profile,
            &mut self.planner,
            s.seabed.as_ref(),
        );
        if self.state.tacked {
            debug!(tick = self.state.tick, heading = self.state.heading_deg, "tack");
        }

        let out: Vec<OutboundSentence> = self
            .scheduler
            .due(now)
            .into_iter()
            .map(|kind| sentences::encode(kind, &self.state, &self.ctx))
            .collect();
        for o in &out {
            self.digest.update(&o.text);
        }
        out
    }

    pub fn apply(&mut self, edit: PlanEdit) {
        match edit {
            PlanEdit::AppendWaypoint(wp) => {
                info!(id = %wp.id, lat = wp.position.lat, lon = wp.position.lon, "📍 Waypoint appended");
                self.planner.push_waypoint(wp);
            }
        }
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            scenario: self.scenario.name.clone(),
            state: self.state.clone(),
            emitted: self.scheduler.emitted().clone(),
            sentences_total: self.digest.count(),
            digest: self.digest.hex(),
        }
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub tick_hz: f64,
    /// Simulated seconds per wall-clock second
    pub speed: f64,
    pub simulation: SimulationSettings,
    pub inbound_capacity: usize,
    /// Ticks between heartbeat log lines; 0 disables
    pub heartbeat_ticks: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_hz: 10.0,
            speed: 1.0,
            simulation: SimulationSettings::default(),
            inbound_capacity: 128,
            heartbeat_ticks: 0,
        }
    }
}

struct RunHandle {
    scenario: String,
    cancel: watch::Sender<bool>,
    edits: mpsc::Sender<PlanEdit>,
    task: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct DecodeCounters {
    accepted: DashMap<String, u64>,
    rejected: DashMap<&'static str, u64>,
    queue_dropped: Arc<AtomicU64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundCounters {
    pub accepted: BTreeMap<String, u64>,
    pub rejected: BTreeMap<String, u64>,
    pub queue_dropped: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub scenario: Option<String>,
    pub tick: u64,
    pub sim_time_s: f64,
    pub nav_mode: Option<NavMode>,
    pub plan_complete: bool,
    pub active_waypoint: Option<String>,
    pub state: Option<SimulationState>,
    pub emitted: BTreeMap<SentenceKind, u64>,
    pub sentences_total: u64,
    pub digest: Option<String>,
    pub inbound: InboundCounters,
    pub connections: Vec<ConnectionInfo>,
}

pub struct Engine {
    config: EngineConfig,
    hub: Arc<BroadcastHub>,
    run: Mutex<Option<RunHandle>>,
    snapshot_tx: watch::Sender<Option<RunSnapshot>>,
    counters: DecodeCounters,
}

impl Engine {
    pub fn new(config: EngineConfig, hub: Arc<BroadcastHub>) -> Arc<Self> {
        let (snapshot_tx, _) = watch::channel(None);
        Arc::new(Self {
            config,
            hub,
            run: Mutex::new(None),
            snapshot_tx,
            counters: DecodeCounters::default(),
        })
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Create the inbound queue and spawn its decode task.
    pub fn start_inbound(self: &Arc<Self>) -> InboundSender {
        let (tx, rx) = inbound::channel(self.config.inbound_capacity, self.counters.queue_dropped.clone());
        tokio::spawn(inbound::run(rx, self.clone()));
        tx
    }

    /// Latest per-tick snapshot, for observers that want every update.
    pub fn subscribe(&self) -> watch::Receiver<Option<RunSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Validate and start `scenario`, replacing any running one. A defective
    /// scenario is rejected before anything changes.
    pub async fn load_scenario(&self, scenario: Scenario) -> Result<(), EngineError> {
        let name = scenario.name.clone();
        let sim = Simulation::new(scenario, &self.config.simulation)?;

        let mut run = self.run.lock().await;
        if let Some(prev) = run.take() {
            self.shutdown(prev).await;
        }

        let (cancel, cancel_rx) = watch::channel(false);
        let (edits, edits_rx) = mpsc::channel(EDIT_QUEUE);
        self.snapshot_tx.send_replace(Some(sim.snapshot()));
        let task = tokio::spawn(tick_loop(
            sim,
            self.hub.clone(),
            edits_rx,
            cancel_rx,
            self.snapshot_tx.clone(),
            self.config.clone(),
        ));
        *run = Some(RunHandle { scenario: name.clone(), cancel, edits, task });
        info!("🧭 Scenario '{name}' loaded at {} Hz × {}", self.config.tick_hz, self.config.speed);
        Ok(())
    }

    /// [`load_scenario`](Self::load_scenario) for a built-in preset.
    pub async fn load_preset(&self, name: &str, seed: u64) -> Result<(), EngineError> {
        let scenario = scenarios::preset(name, seed).ok_or_else(|| EngineError::UnknownPreset(name.to_string()))?;
        self.load_scenario(scenario).await
    }

    /// Stop the tick loop, drain and close every connection. Safe to call
    /// any number of times.
    pub async fn stop(&self) {
        let prev = self.run.lock().await.take();
        if let Some(prev) = prev {
            self.shutdown(prev).await;
        }
    }

    async fn shutdown(&self, run: RunHandle) {
        let _ = run.cancel.send(true);
        if let Err(e) = run.task.await {
            warn!("Tick loop for '{}' ended abnormally: {e}", run.scenario);
        }
        self.hub.close_all();
        info!("⏹ Scenario '{}' stopped", run.scenario);
    }

    /// Decode one sentence from a client or a test harness. Failures are
    /// counted and logged; the outgoing stream is never affected. A `WPL`
    /// appends a waypoint to the running plan.
    pub async fn inject(&self, line: &str) -> Result<NmeaSentence, DecodeError> {
        let sentence = match nmea_types::decode(line) {
            Ok(s) => s,
            Err(e) => {
                *self.counters.rejected.entry(e.class()).or_insert(0) += 1;
                warn!("Inbound sentence rejected: {e}");
                return Err(e);
            }
        };
        *self.counters.accepted.entry(sentence.kind().to_string()).or_insert(0) += 1;

        if let Sentence::Wpl(wpl) = &sentence.sentence {
            let wp = Waypoint { id: wpl.name.clone(), position: wpl.position };
            if let Err(e) = validate_waypoint(&wp) {
                warn!("Ignoring waypoint: {e}");
            } else if let Some(run) = self.run.lock().await.as_ref() {
                if run.edits.try_send(PlanEdit::AppendWaypoint(wp)).is_err() {
                    warn!("Plan edit queue full, waypoint {} dropped", wpl.name);
                }
            } else {
                warn!("No scenario running, waypoint {} not applied", wpl.name);
            }
        }
        Ok(sentence)
    }

    pub async fn status(&self) -> EngineStatus {
        let running_name = self.run.lock().await.as_ref().map(|r| r.scenario.clone());
        let snap = self.snapshot_tx.borrow().clone();
        let inbound = InboundCounters {
            accepted: self.counters.accepted.iter().map(|e| (e.key().clone(), *e.value())).collect(),
            rejected: self.counters.rejected.iter().map(|e| (e.key().to_string(), *e.value())).collect(),
            queue_dropped: self.counters.queue_dropped.load(Ordering::Relaxed),
        };
        let connections = self.hub.connections();

        match snap {
            Some(snap) => EngineStatus {
                running: running_name.is_some(),
                scenario: Some(snap.scenario),
                tick: snap.state.tick,
                sim_time_s: snap.state.time_s,
                nav_mode: Some(snap.state.nav_mode),
                plan_complete: snap.state.plan_complete,
                active_waypoint: Some(snap.state.leg.destination_id.clone()),
                emitted: snap.emitted,
                sentences_total: snap.sentences_total,
                digest: Some(snap.digest),
                state: Some(snap.state),
                inbound,
                connections,
            },
            None => EngineStatus {
                running: false,
                scenario: None,
                tick: 0,
                sim_time_s: 0.0,
                nav_mode: None,
                plan_complete: false,
                active_waypoint: None,
                state: None,
                emitted: BTreeMap::new(),
                sentences_total: 0,
                digest: None,
                inbound,
                connections,
            },
        }
    }
}

// ── Tick loop ─────────────────────────────────────────────────────────────────

async fn tick_loop(
    mut sim: Simulation,
    hub: Arc<BroadcastHub>,
    mut edits: mpsc::Receiver<PlanEdit>,
    mut cancel: watch::Receiver<bool>,
    snapshot_tx: watch::Sender<Option<RunSnapshot>>,
    config: EngineConfig,
) {
    let period = Duration::from_secs_f64(1.0 / config.tick_hz);
    let dt_s = period.as_secs_f64() * config.speed;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let started = Instant::now();

    info!("⚓ Tick loop running at {} Hz ({period:?} period, dt {dt_s:.3}s)", config.tick_hz);

    loop {
        tokio::select! {
            biased;
            _ = cancel.changed() => break,
            _ = ticker.tick() => {}
        }

        while let Ok(edit) = edits.try_recv() {
            sim.apply(edit);
        }

        let out = sim.step(dt_s, started.elapsed());
        for sentence in &out {
            hub.publish(sentence);
        }
        snapshot_tx.send_replace(Some(sim.snapshot()));

        let tick = sim.state().tick;
        if config.heartbeat_ticks > 0 && tick % config.heartbeat_ticks == 0 {
            let s = sim.state();
            info!(
                "⏱ tick={} t={:.0}s | {:.4},{:.4} hdg={:.0} stw={:.1} sog={:.1} | {:?} | sent={}",
                tick,
                s.time_s,
                s.position.lat,
                s.position.lon,
                s.heading_deg,
                s.stw_kn,
                s.sog_kn,
                s.nav_mode,
                sim.digest().count()
            );
        }
    }
}
