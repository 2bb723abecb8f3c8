use glam::{Vec2, Vec3};
use ndarray::Array3;

use crate::particles::ParticleSystem;
use crate::solver::FluidSolver;

/// Which internal buffer is mapped to output pixels. Purely a display
/// choice; the simulation state keeps evolving regardless of mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Particle trails as a two-color blend.
    #[default]
    Fluid,
    /// Signed pressure amplitude.
    Pressure,
    /// Sparse velocity vectors.
    Velocity,
}

const FLUID_BACKGROUND: Vec3 = Vec3::new(0.98, 0.922, 0.843);
const FLUID_PARTICLE: Vec3 = Vec3::new(0.0, 0.0, 0.2);

const PRESSURE_SCALE: f32 = 0.5;

const VECTOR_SPACING: usize = 10;
const VECTOR_SCALE: f32 = 2.5;

#[derive(Debug, Clone, Copy, Default)]
pub struct Renderer {
    mode: RenderMode,
}

impl Renderer {
    pub fn new(mode: RenderMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: RenderMode) {
        self.mode = mode;
    }

    /// Rasterizes the selected buffer into an RGB frame of shape
    /// `(height, width, 3)`, row 0 at the top of the screen.
    pub fn render(&self, solver: &FluidSolver, particles: &ParticleSystem) -> Array3<u8> {
        let screen = solver.screen_size();
        let (w, h) = (screen.x as usize, screen.y as usize);
        let mut frame = Array3::zeros((h, w, 3));

        match self.mode {
            RenderMode::Fluid => self.render_trails(particles, &mut frame),
            RenderMode::Pressure => self.render_pressure(solver, &mut frame),
            RenderMode::Velocity => self.render_velocity(solver, &mut frame),
        }

        frame
    }

    fn render_trails(&self, particles: &ParticleSystem, frame: &mut Array3<u8>) {
        let trail = particles.trail();
        let (h, w, _) = frame.dim();

        for y in 0..h {
            for x in 0..w {
                let t = trail[(x, y)].clamp(0.0, 1.0);
                let color = FLUID_BACKGROUND.lerp(FLUID_PARTICLE, t);
                put_pixel(frame, x, y, color);
            }
        }
    }

    /// Signed-amplitude view: positive pressure reads red, negative blue,
    /// over black.
    fn render_pressure(&self, solver: &FluidSolver, frame: &mut Array3<u8>) {
        let pressure = solver.pressure();
        let grid = solver.grid_size();
        let (h, w, _) = frame.dim();

        for y in 0..h {
            let j = (y * grid.y as usize / h).min(grid.y as usize - 1);
            for x in 0..w {
                let i = (x * grid.x as usize / w).min(grid.x as usize - 1);
                let amplitude = (pressure[(i, j)] * PRESSURE_SCALE).clamp(-1.0, 1.0);
                let color = Vec3::new(amplitude.max(0.0), 0.0, (-amplitude).max(0.0));
                put_pixel(frame, x, y, color);
            }
        }
    }

    /// Sparse black vector segments over white, at fixed spacing and scale.
    fn render_velocity(&self, solver: &FluidSolver, frame: &mut Array3<u8>) {
        frame.fill(255);
        let (h, w, _) = frame.dim();

        let mut y = VECTOR_SPACING / 2;
        while y < h {
            let mut x = VECTOR_SPACING / 2;
            while x < w {
                let origin = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let v = solver.sample_velocity(origin);
                draw_segment(frame, origin, origin + v * VECTOR_SCALE, Vec3::ZERO);
                x += VECTOR_SPACING;
            }
            y += VECTOR_SPACING;
        }
    }
}

/// Writes a pixel given field coordinates (y up); the frame stores row 0 at
/// the top of the screen.
#[inline]
fn put_pixel(frame: &mut Array3<u8>, x: usize, y: usize, color: Vec3) {
    let (h, _, _) = frame.dim();
    let row = h - 1 - y;
    for c in 0..3 {
        frame[(row, x, c)] = (color[c] * 255.0).round().clamp(0.0, 255.0) as u8;
    }
}

fn draw_segment(frame: &mut Array3<u8>, from: Vec2, to: Vec2, color: Vec3) {
    let (h, w, _) = frame.dim();
    let delta = to - from;
    let steps = delta.length().ceil().max(1.0) as usize;

    for s in 0..=steps {
        let p = from + delta * (s as f32 / steps as f32);
        let x = p.x.floor();
        let y = p.y.floor();
        if x >= 0.0 && y >= 0.0 && (x as usize) < w && (y as usize) < h {
            put_pixel(frame, x as usize, y as usize, color);
        }
    }
}
