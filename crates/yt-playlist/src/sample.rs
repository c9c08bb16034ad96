use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::warn;

/// Distinct indices into a collection, in the order they were drawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSet {
    indices: Vec<usize>,
}

impl SampleSet {
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Resolve the indices against the collection they were drawn from
    pub fn select<'a, T>(&self, members: &'a [T]) -> Vec<&'a T> {
        self.indices.iter().filter_map(|&i| members.get(i)).collect()
    }
}

/// Draw `count` distinct indices uniformly from `0..len`.
///
/// A drawn index that was already taken is discarded and drawn again. When
/// `count >= len` every index is returned exactly once, shuffled.
pub fn sample_indices<R: Rng + ?Sized>(len: usize, count: usize, rng: &mut R) -> SampleSet {
    if count >= len {
        if count > len {
            warn!(
                requested = count,
                available = len,
                "sample size exceeds collection size, taking every member"
            );
        }
        let mut indices: Vec<usize> = (0..len).collect();
        indices.shuffle(rng);
        return SampleSet { indices };
    }

    let mut seen = HashSet::with_capacity(count);
    let mut indices = Vec::with_capacity(count);
    while indices.len() < count {
        let index = rng.gen_range(0..len);
        if seen.insert(index) {
            indices.push(index);
        } else {
            warn!(index, "same index drawn twice, drawing again");
        }
    }

    SampleSet { indices }
}

/// Pick `count` members uniformly at random without replacement
pub fn sample_without_replacement<T: Clone, R: Rng + ?Sized>(
    members: &[T],
    count: usize,
    rng: &mut R,
) -> Vec<T> {
    sample_indices(members.len(), count, rng)
        .select(members)
        .into_iter()
        .cloned()
        .collect()
}
