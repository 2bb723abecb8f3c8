use glam::{UVec2, Vec2};
use ndarray::Ix2;

use crate::config::SimConfig;
use crate::field::{sample_wrap, stamp_capsule, wrap, FieldBuffer};

/// Jacobi relaxation coefficients for the discrete Poisson equation on a
/// 4-neighbor stencil.
const PRESSURE_ALPHA: f32 = -1.0;
const PRESSURE_BETA: f32 = 0.25;

/// Stable-fluids solver over a periodic 2D velocity field.
///
/// The velocity grid is coarser than the screen by `velocity_scale`; all
/// other solver fields share its resolution. Each frame runs, in order:
/// semi-Lagrangian advection, divergence, a fixed number of Jacobi pressure
/// iterations, and the gradient subtraction that projects the velocity field
/// to be approximately divergence-free.
#[derive(Debug, Clone)]
pub struct FluidSolver {
    /// Screen size, in pixels.
    screen: UVec2,
    /// Velocity grid size, in cells.
    grid: UVec2,

    velocity: FieldBuffer<Vec2, Ix2>,
    divergence: FieldBuffer<f32, Ix2>,
    pressure: FieldBuffer<f32, Ix2>,

    jacobi_steps: usize,
    max_velocity: f32,
    force_scale: f32,
    brush_radius: f32,
    velocity_scale: u32,
}

impl FluidSolver {
    pub fn new(config: &SimConfig, width: u32, height: u32) -> Self {
        let screen = UVec2::new(width, height);
        let grid = grid_size(screen, config.velocity_scale);
        let shape = (grid.x as usize, grid.y as usize);

        log::debug!("fluid solver grid {}x{} for {}x{} px", grid.x, grid.y, width, height);

        Self {
            screen,
            grid,
            velocity: FieldBuffer::double(shape, Vec2::ZERO),
            divergence: FieldBuffer::single(shape, 0.0),
            pressure: FieldBuffer::double(shape, 0.0),
            jacobi_steps: config.jacobi_steps,
            max_velocity: config.max_velocity,
            force_scale: config.force_scale,
            brush_radius: config.brush_thickness / 2.0,
            velocity_scale: config.velocity_scale,
        }
    }

    /// Reallocates all solver fields, zeroed, at the new screen size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.screen = UVec2::new(width, height);
        self.grid = grid_size(self.screen, self.velocity_scale);
        let shape = (self.grid.x as usize, self.grid.y as usize);

        self.velocity.resize(shape, Vec2::ZERO);
        self.divergence.resize(shape, 0.0);
        self.pressure.resize(shape, 0.0);
    }

    /// One solver frame: advect, diverge, relax, project.
    pub fn step(&mut self) {
        self.advect();
        self.compute_divergence();
        for _ in 0..self.jacobi_steps {
            self.relax_pressure();
        }
        self.project();
    }

    /// Semi-Lagrangian self-advection: each cell takes the velocity found at
    /// its backtraced source position. Unconditionally stable.
    fn advect(&mut self) {
        let scale = self.grid.as_vec2() / self.screen.as_vec2();
        let max_velocity = self.max_velocity;

        let (src, dst) = self.velocity.ping_pong();
        for ((i, j), out) in dst.indexed_iter_mut() {
            let p = Vec2::new(i as f32 + 0.5, j as f32 + 0.5);
            let v = src[(i, j)];
            *out = sample_wrap(src, p - v * scale).clamp_length_max(max_velocity);
        }
        self.velocity.swap();
    }

    /// Central-difference divergence with periodic neighbors. Recomputed in
    /// full every frame; never carried across frames.
    fn compute_divergence(&mut self) {
        let vel = self.velocity.read();
        let (nx, ny) = vel.dim();

        let div = self.divergence.write_in_place();
        for ((i, j), out) in div.indexed_iter_mut() {
            let e = vel[(wrap(i as isize + 1, nx), j)].x;
            let w = vel[(wrap(i as isize - 1, nx), j)].x;
            let n = vel[(i, wrap(j as isize + 1, ny))].y;
            let s = vel[(i, wrap(j as isize - 1, ny))].y;
            *out = 0.5 * (e - w + n - s);
        }
    }

    /// One Jacobi iteration toward the pressure field whose gradient removes
    /// the divergence. Fixed iteration count, no convergence check; fewer
    /// iterations degrade accuracy, never correctness.
    fn relax_pressure(&mut self) {
        let div = self.divergence.read();

        let (src, dst) = self.pressure.ping_pong();
        let (nx, ny) = src.dim();
        for ((i, j), out) in dst.indexed_iter_mut() {
            let e = src[(wrap(i as isize + 1, nx), j)];
            let w = src[(wrap(i as isize - 1, nx), j)];
            let n = src[(i, wrap(j as isize + 1, ny))];
            let s = src[(i, wrap(j as isize - 1, ny))];
            *out = (n + s + e + w + PRESSURE_ALPHA * div[(i, j)]) * PRESSURE_BETA;
        }
        self.pressure.swap();
    }

    /// Subtracts the pressure gradient from the velocity field, leaving it
    /// approximately divergence-free.
    fn project(&mut self) {
        let pressure = self.pressure.read();
        let (nx, ny) = pressure.dim();
        let max_velocity = self.max_velocity;

        let (src, dst) = self.velocity.ping_pong();
        for ((i, j), out) in dst.indexed_iter_mut() {
            let e = pressure[(wrap(i as isize + 1, nx), j)];
            let w = pressure[(wrap(i as isize - 1, nx), j)];
            let n = pressure[(i, wrap(j as isize + 1, ny))];
            let s = pressure[(i, wrap(j as isize - 1, ny))];
            let gradient = 0.5 * Vec2::new(e - w, n - s);
            *out = (src[(i, j)] - gradient).clamp_length_max(max_velocity);
        }
        self.velocity.swap();
    }

    /// Writes a pointer drag into the velocity field as a localized
    /// perturbation over the capsule between the two points.
    ///
    /// Points are in screen coordinates with y down; the injected vector is
    /// `(dx, -dy)` so screen-space drags map onto the y-up field. Only cells
    /// whose centers fall inside the capsule are touched, and each affected
    /// cell reads nothing but itself, so this mutates the front buffer in
    /// place rather than ping-ponging.
    pub fn inject_force(&mut self, current: Vec2, last: Vec2) {
        let screen = self.screen.as_vec2();
        let a = Vec2::new(last.x, screen.y - last.y);
        let b = Vec2::new(current.x, screen.y - current.y);
        let force = Vec2::new(current.x - last.x, -(current.y - last.y)) * self.force_scale;

        let cell_px = screen / self.grid.as_vec2();
        let max_velocity = self.max_velocity;

        let vel = self.velocity.write_in_place();
        stamp_capsule(vel, a, b, self.brush_radius, cell_px, |v, r| {
            *v = (*v + (1.0 - r * r) * force).clamp_length_max(max_velocity);
        });
    }

    /// Velocity at a screen-space position, bilinearly interpolated with
    /// periodic wrap.
    pub fn sample_velocity(&self, p: Vec2) -> Vec2 {
        let scale = self.grid.as_vec2() / self.screen.as_vec2();
        sample_wrap(self.velocity.read(), p * scale)
    }

    pub fn velocity(&self) -> &ndarray::Array2<Vec2> {
        self.velocity.read()
    }

    pub fn divergence(&self) -> &ndarray::Array2<f32> {
        self.divergence.read()
    }

    pub fn pressure(&self) -> &ndarray::Array2<f32> {
        self.pressure.read()
    }

    pub fn grid_size(&self) -> UVec2 {
        self.grid
    }

    pub fn screen_size(&self) -> UVec2 {
        self.screen
    }

    #[cfg(test)]
    pub(crate) fn fill_velocity(&mut self, v: Vec2) {
        self.velocity.fill(v);
    }
}

fn grid_size(screen: UVec2, velocity_scale: u32) -> UVec2 {
    UVec2::new(
        screen.x.div_ceil(velocity_scale).max(1),
        screen.y.div_ceil(velocity_scale).max(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::segment_distance;

    fn solver_100() -> FluidSolver {
        FluidSolver::new(&SimConfig::default(), 100, 100)
    }

    #[test]
    fn zero_field_is_a_fixed_point() {
        let mut solver = solver_100();
        for _ in 0..10 {
            solver.step();
        }
        assert!(solver.velocity().iter().all(|v| *v == Vec2::ZERO));
        assert!(solver.divergence().iter().all(|&d| d == 0.0));
        assert!(solver.pressure().iter().all(|&p| p == 0.0));
    }

    #[test]
    fn injection_stays_inside_capsule() {
        let mut solver = solver_100();
        let before = solver.velocity().clone();

        // Drag of magnitude 10 along y = 50, brush thickness 30.
        solver.inject_force(Vec2::new(60.0, 50.0), Vec2::new(50.0, 50.0));

        let cell_px = solver.screen_size().as_vec2() / solver.grid_size().as_vec2();
        let a = Vec2::new(50.0, 50.0);
        let b = Vec2::new(60.0, 50.0);
        let mut touched = 0;

        for ((i, j), v) in solver.velocity().indexed_iter() {
            let center = Vec2::new(i as f32 + 0.5, j as f32 + 0.5) * cell_px;
            let dist = segment_distance(center, a, b);
            if dist > 15.0 {
                assert_eq!(*v, before[(i, j)], "cell outside the capsule changed");
            } else if *v != before[(i, j)] {
                touched += 1;
            }
        }

        assert!(touched > 0, "no cell inside the capsule changed");
    }

    #[test]
    fn velocity_stays_clamped() {
        let mut solver = solver_100();
        for _ in 0..20 {
            solver.inject_force(Vec2::new(90.0, 50.0), Vec2::new(10.0, 50.0));
            assert!(solver.velocity().iter().all(|v| v.length() <= 60.0 + 1e-3));
            solver.step();
            assert!(solver.velocity().iter().all(|v| v.length() <= 60.0 + 1e-3));
        }
    }

    #[test]
    fn injection_removes_screen_y_flip() {
        let mut solver = solver_100();
        // A downward drag on screen injects (dx, -dy) = (0, -10) into the
        // y-up field.
        solver.inject_force(Vec2::new(50.0, 60.0), Vec2::new(50.0, 50.0));

        let sum: Vec2 = solver.velocity().iter().copied().sum();
        assert!(sum.y < 0.0);
        assert!(sum.x.abs() < 1e-3);
    }

    #[test]
    fn divergence_shrinks_under_projection() {
        let mut solver = solver_100();
        solver.inject_force(Vec2::new(60.0, 50.0), Vec2::new(50.0, 50.0));

        solver.step();
        let d0: f32 = solver.divergence().iter().map(|d| d.abs()).sum();
        for _ in 0..30 {
            solver.step();
        }
        let d1: f32 = solver.divergence().iter().map(|d| d.abs()).sum();
        assert!(d1 < d0);
    }
}
