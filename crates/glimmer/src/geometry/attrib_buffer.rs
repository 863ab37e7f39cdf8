//! A flat typed buffer viewed as fixed-width elements.
//!
//! `AttribBuffer<f32>` with `num_components == 3` holds positions as
//! `[x0, y0, z0, x1, y1, z1, ...]`. The length of the backing storage is
//! always `num_components * num_elements()`: there is no way to append a
//! partial element, and all mutating methods preserve the invariant.

use bytemuck::Pod;

#[derive(Debug, Clone, PartialEq)]
pub struct AttribBuffer<T: Pod> {
    num_components: usize,
    data: Vec<T>,
}

impl<T: Pod + Default> AttribBuffer<T> {
    /// `num_elements` zeroed elements.
    ///
    /// # Panics
    ///
    /// If `num_components` is zero.
    pub fn new(num_components: usize, num_elements: usize) -> Self {
        assert!(num_components > 0, "num_components must be non-zero");
        Self {
            num_components,
            data: vec![T::default(); num_components * num_elements],
        }
    }

    /// Empty buffer with room for `num_elements` elements.
    ///
    /// # Panics
    ///
    /// If `num_components` is zero.
    pub fn with_capacity(num_components: usize, num_elements: usize) -> Self {
        assert!(num_components > 0, "num_components must be non-zero");
        Self {
            num_components,
            data: Vec::with_capacity(num_components * num_elements),
        }
    }

    /// Wrap existing data.
    ///
    /// # Panics
    ///
    /// If `data.len()` is not a multiple of `num_components`.
    pub fn from_vec(num_components: usize, data: Vec<T>) -> Self {
        assert!(num_components > 0, "num_components must be non-zero");
        assert!(
            data.len() % num_components == 0,
            "{} values do not divide into {}-component elements",
            data.len(),
            num_components
        );
        Self { num_components, data }
    }

    /// Append one element.
    ///
    /// # Panics
    ///
    /// If `value.len() != num_components`.
    pub fn push(&mut self, value: &[T]) {
        assert_eq!(value.len(), self.num_components, "element width mismatch");
        self.data.extend_from_slice(value);
    }

    /// Append one element given as a fixed-size array.
    pub fn push_array<const N: usize>(&mut self, value: [T; N]) {
        self.push(&value);
    }

    /// # Panics
    ///
    /// If `index >= num_elements()`.
    pub fn element(&self, index: usize) -> &[T] {
        let n = self.num_components;
        &self.data[index * n..(index + 1) * n]
    }

    /// Copy out element `index` as an array.
    ///
    /// # Panics
    ///
    /// If `N != num_components` or `index` is out of range.
    pub fn element_array<const N: usize>(&self, index: usize) -> [T; N] {
        assert_eq!(N, self.num_components, "element width mismatch");
        let mut out = [T::default(); N];
        out.copy_from_slice(self.element(index));
        out
    }

    /// # Panics
    ///
    /// If `value.len() != num_components` or `index` is out of range.
    pub fn set_element(&mut self, index: usize, value: &[T]) {
        assert_eq!(value.len(), self.num_components, "element width mismatch");
        let n = self.num_components;
        self.data[index * n..(index + 1) * n].copy_from_slice(value);
    }

    /// Set `count` elements starting at `start` to `value`.
    ///
    /// # Panics
    ///
    /// If the range runs past the end or `value` has the wrong width.
    pub fn fill_range(&mut self, start: usize, count: usize, value: &[T]) {
        for i in start..start + count {
            self.set_element(i, value);
        }
    }

    /// Append every element of `other`.
    ///
    /// # Panics
    ///
    /// If the element widths differ.
    pub fn extend_from(&mut self, other: &AttribBuffer<T>) {
        assert_eq!(
            self.num_components, other.num_components,
            "element width mismatch"
        );
        self.data.extend_from_slice(&other.data);
    }

    /// New buffer holding `self` followed by `other`.
    pub fn concat(&self, other: &AttribBuffer<T>) -> Self {
        let mut out = self.clone();
        out.extend_from(other);
        out
    }

    pub fn num_components(&self) -> usize {
        self.num_components
    }

    pub fn num_elements(&self) -> usize {
        self.data.len() / self.num_components
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable view of the values. The length cannot change through it.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn elements(&self) -> std::slice::ChunksExact<'_, T> {
        self.data.chunks_exact(self.num_components)
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_invariant_holds_through_mutation() {
        let mut b = AttribBuffer::<f32>::with_capacity(3, 4);
        assert_eq!(b.num_elements(), 0);
        b.push(&[1.0, 2.0, 3.0]);
        b.push_array([4.0, 5.0, 6.0]);
        assert_eq!(b.num_elements(), 2);
        assert_eq!(b.as_slice().len(), 6);

        b.set_element(0, &[7.0, 8.0, 9.0]);
        assert_eq!(b.element(0), &[7.0, 8.0, 9.0]);
        assert_eq!(b.element_array::<3>(1), [4.0, 5.0, 6.0]);

        let c = b.concat(&AttribBuffer::new(3, 2));
        assert_eq!(c.num_elements(), 4);
        assert_eq!(c.as_slice().len(), c.num_components() * c.num_elements());
    }

    #[test]
    fn fill_range_sets_each_element() {
        let mut b = AttribBuffer::<u16>::new(2, 5);
        b.fill_range(1, 3, &[9, 8]);
        assert_eq!(b.as_slice(), &[0, 0, 9, 8, 9, 8, 9, 8, 0, 0]);
        assert_eq!(b.as_bytes().len(), 20);
    }

    #[test]
    #[should_panic(expected = "element width mismatch")]
    fn pushing_wrong_width_panics() {
        let mut b = AttribBuffer::<f32>::new(3, 0);
        b.push(&[1.0, 2.0]);
    }

    #[test]
    #[should_panic]
    fn from_vec_rejects_partial_elements() {
        let _ = AttribBuffer::from_vec(4, vec![0.0_f32; 6]);
    }
}
