//! Pinfall headless driver
//!
//! Runs a scripted session against the in-memory scene: a few seeded throws,
//! a rack reset, and a summary. Usage: `pinfall [settings.json] [seed]`.
//! Logging is controlled with `RUST_LOG`.

use anyhow::{Context, Result};
use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use pinfall::Settings;
use pinfall::audio::{AudioSink, ImpactMixer, SampleId};
use pinfall::input::{Gesture, GestureEvent, Viewport};
use pinfall::scene::SceneGraph;
use pinfall::sim::{FrameStats, ResetPhase, Simulation};

const DEFAULT_SETTINGS: &str = "pinfall.json";
const DEFAULT_SEED: u64 = 0x5eed;
const THROWS_PER_RACK: usize = 2;
const RACKS: usize = 2;
/// How long to watch each throw
const THROW_WATCH_MS: f64 = 6000.0;
/// Reset must finish well within this
const RESET_LIMIT_MS: f64 = 10_000.0;

/// Scripted session state
struct Session<A: AudioSink> {
    sim: Simulation<SceneGraph, A>,
    rng: Pcg32,
    viewport: Viewport,
    /// Simulated wall clock
    now_ms: f64,
    frame_ms: f64,
    dt: f32,
    totals: FrameStats,
}

impl<A: AudioSink> Session<A> {
    fn new(sim: Simulation<SceneGraph, A>, seed: u64, viewport: Viewport) -> Self {
        let dt = sim.settings().physics.fixed_dt;
        Self {
            sim,
            rng: Pcg32::seed_from_u64(seed),
            viewport,
            now_ms: 0.0,
            frame_ms: dt as f64 * 1000.0,
            dt,
            totals: FrameStats::default(),
        }
    }

    fn tick(&mut self) -> FrameStats {
        self.now_ms += self.frame_ms;
        let stats = self.sim.frame(self.now_ms, self.dt);
        self.totals.frame = stats.frame;
        self.totals.substeps += stats.substeps;
        self.totals.retired += stats.retired;
        self.totals.expired += stats.expired;
        self.totals.launched += stats.launched;
        stats
    }

    fn run_for(&mut self, ms: f64) {
        let until = self.now_ms + ms;
        while self.now_ms < until {
            self.tick();
        }
    }

    /// Aim somewhere near the head pin, maybe nudge power, release
    fn throw(&mut self) {
        let center = self.viewport.center();
        let x = center.x + self.rng.random_range(-0.15f32..0.15) * self.viewport.width;
        let y = center.y + self.rng.random_range(-0.05f32..0.05) * self.viewport.height;
        let wheel = self.rng.random_range(-1500.0f32..500.0);
        let at = Vec2::new(x, y);

        let events = [
            Gesture::Wheel { delta_y: wheel },
            Gesture::PointerDown { pos: center, over_ui: false },
            Gesture::PointerMove { pos: at },
            Gesture::PointerUp { pos: at, over_ui: false },
        ];
        for gesture in events {
            self.sim.push_input(GestureEvent::new(gesture, self.now_ms));
        }
        let standing = self.sim.pins_standing();
        self.tick();
        log::info!(
            "Throw: dir={} power={:.1}",
            self.sim.aim().direction(),
            self.sim.aim().power()
        );

        self.run_for(THROW_WATCH_MS);
        let knocked = standing.saturating_sub(self.sim.pins_standing());
        log::info!(
            "  knocked down {} ({} standing)",
            knocked,
            self.sim.pins_standing()
        );
    }

    fn reset_rack(&mut self) -> Result<()> {
        self.sim.trigger_reset().context("reset trigger rejected")?;
        let started = self.now_ms;
        while self.sim.reset_phase() != ResetPhase::Idle {
            if self.now_ms - started > RESET_LIMIT_MS {
                anyhow::bail!("reset stuck in {:?}", self.sim.reset_phase());
            }
            self.tick();
        }
        log::info!(
            "Rack reset in {:.0}ms, {} pins standing",
            self.now_ms - started,
            self.sim.pins_standing()
        );
        Ok(())
    }
}

fn main() -> Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    env_logger::init();
    log::info!("Pinfall (headless) starting...");

    let mut args = std::env::args().skip(1);
    let settings_path = args.next().unwrap_or_else(|| DEFAULT_SETTINGS.to_string());
    let seed = match args.next() {
        Some(s) => s.parse::<u64>().with_context(|| format!("invalid seed {s:?}"))?,
        None => DEFAULT_SEED,
    };

    let settings = Settings::load_or_default(&settings_path)
        .with_context(|| format!("loading settings from {settings_path}"))?;
    let viewport = Viewport::default();

    let mut mixer = ImpactMixer::new(&settings.audio);
    mixer.set_sample(SampleId(0));
    let sim = Simulation::new(settings, SceneGraph::new(), mixer, viewport)
        .context("building the lane")?;
    log::info!("Session seed: {}", seed);

    let mut session = Session::new(sim, seed, viewport);
    for rack in 0..RACKS {
        log::info!("Rack {}", rack + 1);
        for _ in 0..THROWS_PER_RACK {
            session.throw();
        }
        session.reset_rack()?;
    }

    let cues = session.sim.audio_mut().drain();
    let totals = session.totals;
    log::info!(
        "Done: {} frames, {} substeps, {} launched, {} retired, {} timed out, {} impact cues",
        totals.frame,
        totals.substeps,
        totals.launched,
        totals.retired,
        totals.expired,
        cues.len()
    );
    Ok(())
}
