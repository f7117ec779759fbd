//! Order-independent accumulation across lanes.

use std::sync::atomic::{AtomicI64, Ordering};

/// Fractional bits of the fixed-point representation.
const FRACTION_BITS: u32 = 20;
const SCALE: f64 = (1u64 << FRACTION_BITS) as f64;

/// A table of `elements × components` sums that many lanes add into concurrently.
///
/// Values are quantised to fixed point and accumulated with integer atomics, so the final sum
/// is bit-identical no matter in which order the contributions arrive.
pub struct FixedPointAccumulator {
    cells: Box<[AtomicI64]>,
    components: usize,
}

impl FixedPointAccumulator {
    pub fn new(elements: usize, components: usize) -> Self {
        Self {
            cells: (0..elements * components).map(|_| AtomicI64::new(0)).collect(),
            components,
        }
    }

    pub fn elements(&self) -> usize {
        self.cells.len() / self.components.max(1)
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn add(&self, element: usize, component: usize, value: f32) {
        let quantised = (value as f64 * SCALE).round() as i64;
        if quantised != 0 {
            self.cells[element * self.components + component].fetch_add(quantised, Ordering::Relaxed);
        }
    }

    pub fn add_all(&self, element: usize, values: &[f32]) {
        for (component, value) in values.iter().enumerate() {
            self.add(element, component, *value);
        }
    }

    pub fn read(&self, element: usize, component: usize) -> f32 {
        (self.cells[element * self.components + component].load(Ordering::Relaxed) as f64 / SCALE)
            as f32
    }

    pub fn read_all<const N: usize>(&self, element: usize) -> [f32; N] {
        std::array::from_fn(|component| self.read(element, component))
    }

    pub fn clear(&mut self) {
        for cell in self.cells.iter_mut() {
            *cell.get_mut() = 0;
        }
    }
}
