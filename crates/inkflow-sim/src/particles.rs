use glam::{UVec2, Vec2, Vec4};
use ndarray::{Array1, Ix1, Ix2};
use rand::Rng;

use crate::config::SimConfig;
use crate::field::FieldBuffer;
use crate::solver::FluidSolver;

/// Squared displacement (in pixels) above which the accumulator is folded
/// into the absolute position.
const MERGE_THRESHOLD_SQ: f32 = 20.0;

/// Particles advected through the velocity field, accumulating a fading
/// trail image at screen resolution.
///
/// Positions are stored split into an absolute part and a small displacement
/// accumulator (a `Vec4` per particle). The displacement is only folded into
/// the absolute position once it has grown past a threshold, which keeps
/// sub-pixel motion from being rounded away on large absolute coordinates
/// under limited-precision storage, and is also the only moment the position
/// is wrapped back into the domain.
#[derive(Debug, Clone)]
pub struct ParticleSystem {
    screen: UVec2,
    count: usize,
    lifetime: i32,
    render_steps: usize,
    /// Trail fade per frame, `1 / trail_length`.
    trail_decay: f32,

    /// (absolute x, absolute y, displacement x, displacement y).
    positions: FieldBuffer<Vec4, Ix1>,
    /// Immutable after (re)seeding; the reset targets.
    initial: FieldBuffer<Vec4, Ix1>,
    /// Frames lived, in `[0, lifetime]`; 0 marks "just reset".
    ages: FieldBuffer<i32, Ix1>,
    /// Fading particle brightness, one scalar per screen pixel.
    trail: FieldBuffer<f32, Ix2>,
}

impl ParticleSystem {
    pub fn new<R: Rng>(config: &SimConfig, width: u32, height: u32, rng: &mut R) -> Self {
        let count = config.particle_count(width, height);
        let lifetime = config.particle_lifetime;

        log::debug!("seeding {count} particles over {width}x{height} px");

        let positions = seed_positions(count, width, height, rng);
        let ages = seed_ages(count, lifetime, rng);

        Self {
            screen: UVec2::new(width, height),
            count,
            lifetime,
            render_steps: config.render_steps,
            trail_decay: config.trail_decay(),
            positions: FieldBuffer::double_from(positions.clone()),
            initial: FieldBuffer::single_from(positions),
            ages: FieldBuffer::double_from(ages),
            trail: FieldBuffer::double((width as usize, height as usize), 0.0),
        }
    }

    /// Reallocates every buffer and reseeds positions and ages. Prior state
    /// is discarded.
    pub fn resize<R: Rng>(&mut self, config: &SimConfig, width: u32, height: u32, rng: &mut R) {
        self.screen = UVec2::new(width, height);
        self.count = config.particle_count(width, height);

        let positions = seed_positions(self.count, width, height, rng);
        let ages = seed_ages(self.count, self.lifetime, rng);

        self.positions.resize_from(positions.clone());
        self.initial.resize_from(positions);
        self.ages.resize_from(ages);
        self.trail.resize((width as usize, height as usize), 0.0);
    }

    pub fn set_trail_length(&mut self, frames: u32) {
        self.trail_decay = 1.0 / frames.clamp(1, 100) as f32;
    }

    /// One particle frame: age, decay the trail, then advect and paint in
    /// sub-steps.
    pub fn step(&mut self, solver: &FluidSolver) {
        self.age_particles();
        self.fade_trails();
        for _ in 0..self.render_steps {
            self.advect(solver);
            self.paint(solver);
        }
    }

    /// Ages every particle by one frame. Any age that reaches the lifetime
    /// maps to 0, which is the sole reset trigger picked up by [`advect`].
    ///
    /// [`advect`]: ParticleSystem::advect
    fn age_particles(&mut self) {
        let lifetime = self.lifetime;
        let (src, dst) = self.ages.ping_pong();
        for (k, out) in dst.indexed_iter_mut() {
            let age = src[k] + 1;
            *out = if age >= lifetime { 0 } else { age };
        }
        self.ages.swap();
    }

    /// Linear trail fade toward zero, clamped at zero.
    fn fade_trails(&mut self) {
        let decay = self.trail_decay;
        let (src, dst) = self.trail.ping_pong();
        for ((i, j), out) in dst.indexed_iter_mut() {
            *out = (src[(i, j)] - decay).max(0.0);
        }
        self.trail.swap();
    }

    /// RK2 (midpoint) advection of one sub-step through the velocity field.
    ///
    /// A particle whose age reads 0 discards the integrated position and
    /// copies its immutable initial position instead, giving it a fresh
    /// start rather than letting it integrate out of a stale clump.
    fn advect(&mut self, solver: &FluidSolver) {
        let dt = 1.0 / self.render_steps as f32;
        let dims = self.screen.as_vec2();

        let ages = self.ages.read();
        let initial = self.initial.read();
        let (src, dst) = self.positions.ping_pong();

        for (k, out) in dst.indexed_iter_mut() {
            let data = src[k];
            let mut absolute = Vec2::new(data.x, data.y);
            let mut displacement = Vec2::new(data.z, data.w);
            let position = absolute + displacement;

            let v1 = solver.sample_velocity(position);
            let half_step = position + v1 * 0.5 * dt;
            let v2 = solver.sample_velocity(half_step);
            displacement += v2 * dt;

            // Fold the displacement into the absolute position once it is
            // large enough, wrapping into the periodic domain.
            if displacement.length_squared() >= MERGE_THRESHOLD_SQ {
                absolute = (absolute + displacement).rem_euclid(dims);
                displacement = Vec2::ZERO;
            }

            *out = if ages[k] == 0 {
                initial[k]
            } else {
                Vec4::new(absolute.x, absolute.y, displacement.x, displacement.y)
            };
        }

        self.positions.swap();
    }

    /// Accumulates each particle into its screen pixel. Opacity fades in
    /// over the first 10% of the lifetime and out over the last 10%, and is
    /// modulated by the local speed so the fastest regions read darker.
    fn paint(&mut self, solver: &FluidSolver) {
        let lifetime = self.lifetime as f32;
        let (w, h) = (self.screen.x as usize, self.screen.y as usize);
        let dims = self.screen.as_vec2();

        let positions = self.positions.read();
        let ages = self.ages.read();
        let trail = self.trail.write_in_place();

        for (k, data) in positions.indexed_iter() {
            let position = Vec2::new(data.x + data.z, data.y + data.w);

            let age_fraction = ages[k] as f32 / lifetime;
            let fade_in = (age_fraction * 10.0).min(1.0);
            let fade_out = 1.0 - ((age_fraction - 0.9) * 10.0).clamp(0.0, 1.0);

            let velocity = solver.sample_velocity(position);
            let multiplier = (velocity.length_squared() * 0.05 + 0.7).clamp(0.0, 1.0);

            let p = position.rem_euclid(dims);
            let x = (p.x as usize).min(w - 1);
            let y = (p.y as usize).min(h - 1);
            trail[(x, y)] += fade_in * fade_out * multiplier;
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn trail(&self) -> &ndarray::Array2<f32> {
        self.trail.read()
    }

    pub fn positions(&self) -> &Array1<Vec4> {
        self.positions.read()
    }

    pub fn ages(&self) -> &Array1<i32> {
        self.ages.read()
    }
}

fn seed_positions<R: Rng>(count: usize, width: u32, height: u32, rng: &mut R) -> Array1<Vec4> {
    Array1::from_shape_fn(count, |_| {
        Vec4::new(
            rng.gen::<f32>() * width as f32,
            rng.gen::<f32>() * height as f32,
            0.0,
            0.0,
        )
    })
}

fn seed_ages<R: Rng>(count: usize, lifetime: i32, rng: &mut R) -> Array1<i32> {
    Array1::from_shape_fn(count, |_| rng.gen_range(0..=lifetime))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn system_100() -> (ParticleSystem, FluidSolver) {
        let config = SimConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        (
            ParticleSystem::new(&config, 100, 100, &mut rng),
            FluidSolver::new(&config, 100, 100),
        )
    }

    #[test]
    fn count_matches_density_and_seeding_is_in_bounds() {
        let (system, _) = system_100();
        assert_eq!(system.count(), 5000);
        assert_eq!(system.positions().len(), 5000);
        assert_eq!(system.ages().len(), 5000);

        for p in system.positions() {
            assert!(p.x >= 0.0 && p.x < 100.0);
            assert!(p.y >= 0.0 && p.y < 100.0);
        }
        for &age in system.ages() {
            assert!((0..=1000).contains(&age));
        }
    }

    #[test]
    fn ages_stay_in_range_and_wrap_to_zero() {
        let (mut system, solver) = system_100();

        // Pin one particle just short of its lifetime.
        system.ages.write_in_place()[0] = 999;
        system.step(&solver);
        assert_eq!(system.ages()[0], 0);

        // A stored age equal to the lifetime also maps to zero.
        system.ages.write_in_place()[1] = 1000;
        system.step(&solver);
        assert_eq!(system.ages()[1], 0);

        for _ in 0..50 {
            system.step(&solver);
            for &age in system.ages() {
                assert!((0..1000).contains(&age));
            }
        }
    }

    #[test]
    fn zero_age_resets_to_initial_position() {
        let (mut system, solver) = system_100();

        system.ages.write_in_place()[0] = 999;
        let initial = system.initial.read()[0];

        // Drift the particle away from its seed point first.
        let moved = Vec4::new(1.0, 2.0, 3.0, 4.0);
        system.positions.write_in_place()[0] = moved;

        system.step(&solver);
        assert_eq!(system.positions()[0], initial);
    }

    #[test]
    fn trail_fades_by_exact_decrement() {
        let (mut system, _) = system_100();
        system.set_trail_length(10);

        system.trail.write_in_place()[(3, 4)] = 1.0;
        system.trail.write_in_place()[(5, 6)] = 0.05;

        system.fade_trails();
        assert!((system.trail()[(3, 4)] - 0.9).abs() < 1e-6);
        // Clamped at zero, never negative.
        assert_eq!(system.trail()[(5, 6)], 0.0);
    }

    #[test]
    fn trail_length_one_clears_in_a_single_frame() {
        let (mut system, _) = system_100();
        system.set_trail_length(1);

        system.trail.write_in_place()[(10, 10)] = 1.0;
        system.fade_trails();
        assert_eq!(system.trail()[(10, 10)], 0.0);
    }

    #[test]
    fn trail_length_zero_is_clamped() {
        let (mut system, _) = system_100();
        system.set_trail_length(0);
        assert_eq!(system.trail_decay, 1.0);
    }

    #[test]
    fn painting_accumulates_additively() {
        let (mut system, solver) = system_100();

        // Every particle on the same pixel, all mid-life, zero velocity:
        // each contributes the 0.7 base multiplier.
        for k in 0..system.count {
            system.positions.write_in_place()[k] = Vec4::new(50.2, 50.2, 0.0, 0.0);
            system.ages.write_in_place()[k] = 500;
        }

        system.paint(&solver);
        let expected = 0.7 * system.count as f32;
        assert!((system.trail()[(50, 50)] - expected).abs() < expected * 1e-3);
    }

    #[test]
    fn displacement_merges_and_wraps_at_the_threshold() {
        let (mut system, mut solver) = system_100();
        // Uniform 3 px/frame rightward flow; with dt = 1/3 each sub-step
        // adds exactly one pixel of displacement.
        solver.fill_velocity(Vec2::new(3.0, 0.0));

        system.ages.write_in_place()[0] = 500;
        system.positions.write_in_place()[0] = Vec4::new(98.0, 40.0, 0.0, 0.0);

        system.advect(&solver);
        let p = system.positions()[0];
        assert_eq!(Vec2::new(p.x, p.y), Vec2::new(98.0, 40.0));
        assert!((p.z - 1.0).abs() < 1e-3);
        assert!(p.w.abs() < 1e-3);

        // Below the threshold the accumulator keeps growing and the absolute
        // part stays put, even though the effective position has already
        // crossed the domain edge.
        for _ in 0..3 {
            system.advect(&solver);
        }
        let p = system.positions()[0];
        assert_eq!(Vec2::new(p.x, p.y), Vec2::new(98.0, 40.0));
        assert!((p.z - 4.0).abs() < 1e-3);
        assert!(p.z * p.z + p.w * p.w < MERGE_THRESHOLD_SQ);

        // The fifth sub-step pushes |d|^2 past 20: the accumulator folds
        // into the absolute position, wraps at the right edge and zeroes.
        system.advect(&solver);
        let p = system.positions()[0];
        assert!((p.x - 3.0).abs() < 1e-2, "absolute x {} did not wrap", p.x);
        assert!((p.y - 40.0).abs() < 1e-2);
        assert_eq!(Vec2::new(p.z, p.w), Vec2::ZERO);
        assert!(p.x >= 0.0 && p.x < 100.0);
    }

    #[test]
    fn resize_reseeds_in_new_bounds() {
        let (mut system, _) = system_100();
        let config = SimConfig::default();
        let mut rng = StdRng::seed_from_u64(11);

        system.resize(&config, 40, 30, &mut rng);
        assert_eq!(system.count(), 600);
        assert_eq!(system.trail().dim(), (40, 30));
        for p in system.positions() {
            assert!(p.x >= 0.0 && p.x < 40.0);
            assert!(p.y >= 0.0 && p.y < 30.0);
        }
    }
}
