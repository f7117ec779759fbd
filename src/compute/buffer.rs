//! Fixed-size typed buffers.

use std::ops::{Index, IndexMut};

use bytemuck::Pod;

/// A labelled, fixed-length buffer of GPU-layout records.
///
/// The element stride is the size of `T`; records are `#[repr(C)]` + `Pod` so a buffer can be
/// viewed as raw bytes for upload or inspection.
#[derive(Clone, Debug)]
pub struct Buffer<T: Pod> {
    label: &'static str,
    data: Vec<T>,
}

impl<T: Pod> Buffer<T> {
    /// Allocate a zero-initialised buffer of `len` elements.
    pub fn zeroed(label: &'static str, len: usize) -> Self {
        Self {
            label,
            data: vec![T::zeroed(); len],
        }
    }

    /// Allocate a buffer with every element set to `value`.
    pub fn filled(label: &'static str, len: usize, value: T) -> Self {
        Self {
            label,
            data: vec![value; len],
        }
    }

    /// Allocate a buffer initialised from `contents`.
    pub fn from_slice(label: &'static str, contents: &[T]) -> Self {
        Self {
            label,
            data: contents.to_vec(),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of one element in bytes.
    pub fn stride() -> usize {
        std::mem::size_of::<T>()
    }

    /// Total size of the buffer in bytes.
    pub fn byte_size(&self) -> u64 {
        (self.data.len() * Self::stride()) as u64
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Buffer-to-buffer copy. Both buffers must have the same length.
    pub fn copy_from(&mut self, source: &Buffer<T>) {
        self.data.copy_from_slice(&source.data);
    }
}

impl<T: Pod> Index<usize> for Buffer<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.data[index]
    }
}

impl<T: Pod> IndexMut<usize> for Buffer<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.data[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_size_follows_stride() {
        let buffer = Buffer::<[f32; 2]>::zeroed("Test Buffer", 10);
        assert_eq!(Buffer::<[f32; 2]>::stride(), 8);
        assert_eq!(buffer.byte_size(), 80);
        assert_eq!(buffer.as_bytes().len(), 80);
    }

    #[test]
    fn copy_between_buffers() {
        let source = Buffer::from_slice("Source", &[1u32, 2, 3]);
        let mut target = Buffer::filled("Target", 3, 9u32);
        target.copy_from(&source);
        assert_eq!(target.as_slice(), &[1, 2, 3]);
    }
}
