pub mod config;
pub mod error;
pub mod field;
pub mod particles;
pub mod render;
pub mod solver;

use glam::{UVec2, Vec2};
use ndarray::Array3;
use rand::rngs::StdRng;
use rand::SeedableRng;

use particles::ParticleSystem;
use render::Renderer;
use solver::FluidSolver;

pub use config::SimConfig;
pub use error::SimError;
pub use render::RenderMode;

/// A stable-fluids simulation driving particle trails.
///
/// Owns the solver, the particle system and the renderer, and exposes the
/// operations a host application calls: `step`, `inject_force`, `resize`,
/// `set_render_mode`, `set_trail_length`, `request_snapshot` and `render`.
#[derive(Debug, Clone)]
pub struct Simulation {
    config: SimConfig,
    solver: FluidSolver,
    particles: ParticleSystem,
    renderer: Renderer,
    /// Used only when (re)seeding particles, never in steady state.
    rng: StdRng,
    busy: bool,
    snapshot_requested: bool,
}

/// Scoped exclusivity flag for `step`/`resize`. The borrow checker already
/// serializes callers on one thread; the flag makes the contract observable
/// to hosts that drive the simulation through callbacks.
struct BusyGuard<'a> {
    flag: &'a mut bool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a mut bool, op: &'static str) -> Result<Self, SimError> {
        if *flag {
            return Err(SimError::Reentrant(op));
        }
        *flag = true;
        Ok(Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        *self.flag = false;
    }
}

impl Simulation {
    /// Allocates all buffers for a `width`x`height` pixel domain.
    pub fn new(config: SimConfig, width: u32, height: u32) -> Result<Self, SimError> {
        config.validate()?;
        check_dimensions(width, height)?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let solver = FluidSolver::new(&config, width, height);
        let particles = ParticleSystem::new(&config, width, height, &mut rng);

        log::debug!(
            "simulation initialized: {width}x{height} px, {} particles",
            particles.count(),
        );

        Ok(Self {
            config,
            solver,
            particles,
            renderer: Renderer::default(),
            rng,
            busy: false,
            snapshot_requested: false,
        })
    }

    /// Runs one full frame: the four solver stages, then the particle
    /// sub-steps. Atomic from the host's perspective.
    pub fn step(&mut self) -> Result<(), SimError> {
        let _busy = BusyGuard::acquire(&mut self.busy, "step")?;

        self.solver.step();
        self.particles.step(&self.solver);

        Ok(())
    }

    /// Applies a pointer drag from `last` to `current` (screen coordinates,
    /// y down) as a localized velocity perturbation. This is the only
    /// mutation path into the velocity field outside the solver itself.
    pub fn inject_force(&mut self, current: Vec2, last: Vec2) {
        self.solver.inject_force(current, last);
    }

    /// Reallocates every buffer at the new size and reseeds the particles.
    /// All prior simulation state is discarded.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), SimError> {
        check_dimensions(width, height)?;
        let _busy = BusyGuard::acquire(&mut self.busy, "resize")?;

        self.solver.resize(width, height);
        self.particles.resize(&self.config, width, height, &mut self.rng);

        log::debug!(
            "simulation resized: {width}x{height} px, {} particles",
            self.particles.count(),
        );

        Ok(())
    }

    /// Reseeds the simulation in place at its current size.
    pub fn reset(&mut self) -> Result<(), SimError> {
        let screen = self.solver.screen_size();
        self.resize(screen.x, screen.y)
    }

    pub fn set_render_mode(&mut self, mode: RenderMode) {
        self.renderer.set_mode(mode);
    }

    pub fn render_mode(&self) -> RenderMode {
        self.renderer.mode()
    }

    /// Sets the trail fade length in frames; values are clamped to [1, 100].
    pub fn set_trail_length(&mut self, frames: u32) {
        self.particles.set_trail_length(frames);
    }

    /// Flags the next rendered frame for export. An external capture
    /// collaborator consumes the flag via [`take_snapshot_request`].
    ///
    /// [`take_snapshot_request`]: Simulation::take_snapshot_request
    pub fn request_snapshot(&mut self) {
        self.snapshot_requested = true;
    }

    pub fn take_snapshot_request(&mut self) -> bool {
        std::mem::take(&mut self.snapshot_requested)
    }

    /// Rasterizes the current state for the selected render mode into an
    /// RGB frame of shape `(height, width, 3)`.
    pub fn render(&self) -> Array3<u8> {
        self.renderer.render(&self.solver, &self.particles)
    }

    pub fn screen_size(&self) -> UVec2 {
        self.solver.screen_size()
    }

    pub fn particle_count(&self) -> usize {
        self.particles.count()
    }

    pub fn solver(&self) -> &FluidSolver {
        &self.solver
    }

    pub fn particles(&self) -> &ParticleSystem {
        &self.particles
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<(), SimError> {
    if width == 0 || height == 0 {
        return Err(SimError::InvalidConfig(format!(
            "domain dimensions must be nonzero, got {width}x{height}",
        )));
    }

    (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| SimError::Allocation(format!("{width}x{height} pixel buffer overflows")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_dimensions() {
        assert!(matches!(
            Simulation::new(SimConfig::default(), 0, 100),
            Err(SimError::InvalidConfig(_)),
        ));
    }

    #[test]
    fn busy_guard_detects_reentry() {
        let mut busy = true;
        assert!(matches!(
            BusyGuard::acquire(&mut busy, "step"),
            Err(SimError::Reentrant("step")),
        ));

        let mut busy = false;
        let guard = BusyGuard::acquire(&mut busy, "step").unwrap();
        drop(guard);
        // Released on drop, including on unwind.
        assert!(!busy);
    }

    #[test]
    fn snapshot_request_is_consumed_once() {
        let mut sim = Simulation::new(SimConfig::default(), 32, 32).unwrap();
        assert!(!sim.take_snapshot_request());

        sim.request_snapshot();
        assert!(sim.take_snapshot_request());
        assert!(!sim.take_snapshot_request());
    }
}
