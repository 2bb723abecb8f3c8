use crate::error::SimError;

/// Build-time tunables for the simulation. Fixed once the simulation is
/// constructed; only the trail length has a runtime setter.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Approximate average number of particles per screen pixel.
    pub particle_density: f32,
    /// Hard cap on the particle count, regardless of domain size.
    pub max_particles: usize,
    /// Number of frames a particle lives before it is reset.
    ///
    /// Without periodic resets the particles tend to clump up in
    /// convergent regions of the flow.
    pub particle_lifetime: i32,
    /// Number of Jacobi iterations used to relax the pressure field.
    pub jacobi_steps: usize,
    /// Number of particle sub-steps per frame. Keeps the trails smooth when
    /// particles move more than a pixel per frame.
    pub render_steps: usize,
    /// Screen pixels per velocity cell. The velocity field is computed at a
    /// lower resolution than the screen.
    pub velocity_scale: u32,
    /// Speed limit on the velocity field, otherwise pointer interactions
    /// get out of control.
    pub max_velocity: f32,
    /// Scaling factor applied to the pointer drag vector.
    pub force_scale: f32,
    /// Width of the pointer brush, in screen pixels.
    pub brush_thickness: f32,
    /// Trail fade length, in frames. Clamped to [1, 100].
    pub trail_length: u32,
    /// Seed for the particle reseeding RNG. Randomness is used only at
    /// initialization and resize, never in steady state.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            particle_density: 0.5,
            max_particles: 100_000_000,
            particle_lifetime: 1000,
            jacobi_steps: 3,
            render_steps: 3,
            velocity_scale: 8,
            max_velocity: 60.0,
            force_scale: 2.0,
            brush_thickness: 30.0,
            trail_length: 15,
            seed: 0,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        if !(self.particle_density > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "particle density must be positive, got {}",
                self.particle_density,
            )));
        }

        if self.particle_lifetime <= 0 {
            return Err(SimError::InvalidConfig(format!(
                "particle lifetime must be positive, got {}",
                self.particle_lifetime,
            )));
        }

        if self.render_steps == 0 {
            return Err(SimError::InvalidConfig(
                "render step count must be nonzero".into(),
            ));
        }

        if self.velocity_scale == 0 {
            return Err(SimError::InvalidConfig(
                "velocity scale factor must be nonzero".into(),
            ));
        }

        if !(self.max_velocity > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "max velocity must be positive, got {}",
                self.max_velocity,
            )));
        }

        if !(self.brush_thickness > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "brush thickness must be positive, got {}",
                self.brush_thickness,
            )));
        }

        Ok(())
    }

    /// Trail decay per frame, guarding the degenerate zero length.
    pub fn trail_decay(&self) -> f32 {
        1.0 / self.trail_length.clamp(1, 100) as f32
    }

    pub fn particle_count(&self, width: u32, height: u32) -> usize {
        let area = width as f64 * height as f64;
        let count = (area * self.particle_density as f64).ceil() as usize;
        count.min(self.max_particles)
    }
}
