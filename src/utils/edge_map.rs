use tinyvec::TinyVec;

use super::index_set::KeyIndex;

/// Per-edge storage laid out as one row per node, with one slot per outgoing
/// edge in successor-list order. This is the only shape the frequency passes
/// need: every lookup is either "walk a node's out-edges in order" or "read
/// the slot for a known (node, successor-position) pair".
pub struct EdgeMap<T: Copy + Default> {
    rows: Vec<TinyVec<[T; 2]>>,
}

impl<T: Copy + Default> EdgeMap<T> {
    /// Build a map with `rows[i].len() == successor_counts(i)`, every slot
    /// holding `T::default()`.
    pub fn new(num_nodes: usize, successor_counts: impl Fn(usize) -> usize) -> Self {
        let mut rows = Vec::with_capacity(num_nodes);

        for index in 0..num_nodes {
            let mut row = TinyVec::new();
            row.resize(successor_counts(index), T::default());
            rows.push(row);
        }

        Self { rows }
    }

    pub fn row(&self, node: impl KeyIndex) -> &[T] {
        &self.rows[node.index()]
    }

    pub fn at(&self, node: impl KeyIndex, successor_index: usize) -> T {
        self.rows[node.index()][successor_index]
    }

    pub fn set(&mut self, node: impl KeyIndex, successor_index: usize, value: T) {
        self.rows[node.index()][successor_index] = value;
    }

    pub fn fill_row(&mut self, node: impl KeyIndex, value: T) {
        for slot in self.rows[node.index()].iter_mut() {
            *slot = value;
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.rows.len()
    }
}

impl<T: Copy + Default> Clone for EdgeMap<T> {
    fn clone(&self) -> Self {
        Self {
            rows: self.rows.clone(),
        }
    }
}
