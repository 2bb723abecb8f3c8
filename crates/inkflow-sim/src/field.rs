use glam::Vec2;
use ndarray::{Array, Array2, Dimension, ShapeBuilder};

/// A single- or double-buffered array of simulation state.
///
/// Double buffering is an explicit two-slot arena with a front index: kernels
/// read the front slot and write the back slot, and the owner swaps the index
/// once the pass completes. A kernel whose output aliases its input therefore
/// never reads a cell it has already written this pass.
#[derive(Debug, Clone)]
pub struct FieldBuffer<T, D: Dimension> {
    slots: Vec<Array<T, D>>,
    front: usize,
}

impl<T: Clone, D: Dimension> FieldBuffer<T, D> {
    pub fn single<Sh>(shape: Sh, fill: T) -> Self
    where
        Sh: ShapeBuilder<Dim = D>,
    {
        Self {
            slots: vec![Array::from_elem(shape, fill)],
            front: 0,
        }
    }

    pub fn double<Sh>(shape: Sh, fill: T) -> Self
    where
        Sh: ShapeBuilder<Dim = D> + Clone,
    {
        Self {
            slots: vec![
                Array::from_elem(shape.clone(), fill.clone()),
                Array::from_elem(shape, fill),
            ],
            front: 0,
        }
    }

    /// Seed both slots from explicit data.
    pub fn double_from(data: Array<T, D>) -> Self {
        Self {
            slots: vec![data.clone(), data],
            front: 0,
        }
    }

    pub fn single_from(data: Array<T, D>) -> Self {
        Self {
            slots: vec![data],
            front: 0,
        }
    }

    /// The current readable state.
    #[inline]
    pub fn read(&self) -> &Array<T, D> {
        &self.slots[self.front]
    }

    /// Mutable access to the current state, for kernels that only ever read
    /// the cell they write (single-buffered fields and localized stamps).
    #[inline]
    pub fn write_in_place(&mut self) -> &mut Array<T, D> {
        &mut self.slots[self.front]
    }

    /// Split into (front, back) for a self-referential pass. Call [`swap`]
    /// once the back slot holds the new state.
    ///
    /// [`swap`]: FieldBuffer::swap
    pub fn ping_pong(&mut self) -> (&Array<T, D>, &mut Array<T, D>) {
        debug_assert_eq!(self.slots.len(), 2, "ping-pong requires a double-buffered field");
        let (head, tail) = self.slots.split_at_mut(1);
        if self.front == 0 {
            (&head[0], &mut tail[0])
        } else {
            (&tail[0], &mut head[0])
        }
    }

    #[inline]
    pub fn swap(&mut self) {
        if self.slots.len() == 2 {
            self.front ^= 1;
        }
    }

    pub fn fill(&mut self, value: T) {
        for slot in &mut self.slots {
            slot.fill(value.clone());
        }
    }

    /// Reallocates every slot at the new shape, discarding prior contents.
    pub fn resize<Sh>(&mut self, shape: Sh, fill: T)
    where
        Sh: ShapeBuilder<Dim = D> + Clone,
    {
        for slot in &mut self.slots {
            *slot = Array::from_elem(shape.clone(), fill.clone());
        }
        self.front = 0;
    }

    /// Reallocates and seeds every slot from explicit data.
    pub fn resize_from(&mut self, data: Array<T, D>) {
        let n = self.slots.len();
        for slot in self.slots.iter_mut().take(n - 1) {
            *slot = data.clone();
        }
        self.slots[n - 1] = data;
        self.front = 0;
    }
}

/// Periodic index wrap.
#[inline]
pub fn wrap(i: isize, n: usize) -> usize {
    i.rem_euclid(n as isize) as usize
}

/// Bilinear sample of a periodic vector field.
///
/// `p` is in cell units with values stored at cell centers, i.e. the value of
/// cell `(i, j)` sits at `(i + 0.5, j + 0.5)`.
pub fn sample_wrap(field: &Array2<Vec2>, p: Vec2) -> Vec2 {
    let (nx, ny) = field.dim();

    let q = p - 0.5;
    let ix = q.x.floor() as isize;
    let iy = q.y.floor() as isize;
    let tx = q.x - ix as f32;
    let ty = q.y - iy as f32;

    let x0 = wrap(ix, nx);
    let x1 = wrap(ix + 1, nx);
    let y0 = wrap(iy, ny);
    let y1 = wrap(iy + 1, ny);

    let v00 = field[(x0, y0)];
    let v10 = field[(x1, y0)];
    let v01 = field[(x0, y1)];
    let v11 = field[(x1, y1)];

    v00 * (1.0 - tx) * (1.0 - ty)
        + v10 * tx * (1.0 - ty)
        + v01 * (1.0 - tx) * ty
        + v11 * tx * ty
}

/// Applies `f` to every cell whose center falls inside the capsule between
/// `a` and `b` (rounded end caps), wrapping across the periodic boundary.
/// Cells outside the capsule are left untouched. `a`, `b` and `radius` share
/// the units of `cell_size`, which converts cell indices to positions; `f`
/// receives the distance from the segment centerline normalized by the
/// radius, in [0, 1].
pub fn stamp_capsule<T>(
    field: &mut Array2<T>,
    a: Vec2,
    b: Vec2,
    radius: f32,
    cell_size: Vec2,
    mut f: impl FnMut(&mut T, f32),
) {
    let (nx, ny) = field.dim();

    let lo = (a.min(b) - radius) / cell_size;
    let hi = (a.max(b) + radius) / cell_size;
    let i0 = lo.x.floor() as isize;
    let j0 = lo.y.floor() as isize;
    // Never visit a wrapped cell twice.
    let i1 = (hi.x.ceil() as isize).min(i0 + nx as isize - 1);
    let j1 = (hi.y.ceil() as isize).min(j0 + ny as isize - 1);

    for j in j0..=j1 {
        for i in i0..=i1 {
            let center = Vec2::new(i as f32 + 0.5, j as f32 + 0.5) * cell_size;
            let dist = segment_distance(center, a, b);
            if dist <= radius {
                f(&mut field[(wrap(i, nx), wrap(j, ny))], dist / radius);
            }
        }
    }
}

/// Distance from `p` to the segment `ab`, including the rounded end caps.
pub fn segment_distance(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    let t = if len_sq > 0.0 {
        ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    p.distance(a + ab * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Ix2};

    #[test]
    fn ping_pong_reads_old_state() {
        let mut buf: FieldBuffer<f32, Ix2> = FieldBuffer::double((2, 2), 1.0);

        let (src, dst) = buf.ping_pong();
        for ((i, j), out) in dst.indexed_iter_mut() {
            *out = src[(i, j)] + 1.0;
        }
        buf.swap();

        assert!(buf.read().iter().all(|&v| v == 2.0));

        // Second pass still reads the state committed by the first.
        let (src, dst) = buf.ping_pong();
        for ((i, j), out) in dst.indexed_iter_mut() {
            *out = src[(i, j)] + 1.0;
        }
        buf.swap();

        assert!(buf.read().iter().all(|&v| v == 3.0));
    }

    #[test]
    fn resize_discards_contents() {
        let mut buf: FieldBuffer<f32, Ix2> = FieldBuffer::double((2, 2), 5.0);
        buf.resize((3, 4), 0.0);
        assert_eq!(buf.read().dim(), (3, 4));
        assert!(buf.read().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn wrap_is_periodic() {
        assert_eq!(wrap(-1, 4), 3);
        assert_eq!(wrap(4, 4), 0);
        assert_eq!(wrap(-5, 4), 3);
    }

    #[test]
    fn sample_at_cell_center_is_exact() {
        let mut field = Array2::from_elem((4, 4), Vec2::ZERO);
        field[(1, 2)] = Vec2::new(3.0, -1.0);

        let v = sample_wrap(&field, Vec2::new(1.5, 2.5));
        assert_eq!(v, Vec2::new(3.0, -1.0));
    }

    #[test]
    fn capsule_stamp_leaves_outside_untouched() {
        let mut field = Array2::from_elem((10, 10), 0.0f32);
        let a = Vec2::new(2.0, 5.0);
        let b = Vec2::new(7.0, 5.0);

        stamp_capsule(&mut field, a, b, 1.5, Vec2::ONE, |v, _| *v = 1.0);

        for ((i, j), &v) in field.indexed_iter() {
            let center = Vec2::new(i as f32 + 0.5, j as f32 + 0.5);
            let dist = segment_distance(center, a, b);
            if dist <= 1.5 {
                assert_eq!(v, 1.0, "cell ({i}, {j}) inside the capsule untouched");
            } else {
                assert_eq!(v, 0.0, "cell ({i}, {j}) outside the capsule written");
            }
        }
    }

    #[test]
    fn capsule_stamp_wraps_at_the_boundary() {
        let mut field = Array2::from_elem((8, 8), 0.0f32);
        // A brush centered just inside the left edge spills onto the right.
        let p = Vec2::new(0.5, 4.0);

        stamp_capsule(&mut field, p, p, 2.0, Vec2::ONE, |v, _| *v = 1.0);

        assert_eq!(field[(0, 4)], 1.0);
        assert_eq!(field[(7, 4)], 1.0);
    }

    #[test]
    fn sample_wraps_across_edges() {
        let mut field = Array2::from_elem((4, 4), Vec2::ZERO);
        field[(0, 0)] = Vec2::splat(1.0);
        field[(3, 0)] = Vec2::splat(1.0);

        // Halfway between the last and first columns.
        let v = sample_wrap(&field, Vec2::new(0.0, 0.5));
        assert!((v.x - 1.0).abs() < 1e-6);
    }
}
