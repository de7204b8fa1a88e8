//! Swapped-argument permutations.
//!
//! A command may declare a set of parameter positions whose arguments can be
//! typed in any order. For every non-identity ordering of that set a
//! [`Swapper`] is built; the service registers one variant command per
//! swapper, with its parameters permuted `forward` and its converted values
//! permuted `backward` before execution.

use std::collections::BTreeMap;

use itertools::Itertools;

use crate::command::Parameter;
use crate::error::RegistrationError;

/// Largest swappable set accepted; `n!` variants are registered.
pub const MAX_SWAPPABLE_PARAMETERS: usize = 6;

/// Bijection between declared positions and one swapped ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Swapper {
    transpositions: Vec<(usize, usize)>,
    // declared position -> swapped position
    forward_map: BTreeMap<usize, usize>,
    // swapped position -> declared position
    backward_map: BTreeMap<usize, usize>,
}

impl Swapper {
    /// Build the swapper that places `order[k]` at the k-th smallest position
    /// of the set.
    ///
    /// Selection-sorting `order` yields the minimal transposition sequence;
    /// replaying it backwards over the identity gives the net mapping.
    pub fn build(order: &[usize]) -> Self {
        let positions: Vec<usize> = order.iter().copied().sorted_unstable().collect();

        let mut arrangement = order.to_vec();
        let mut transpositions = Vec::new();
        for slot in 0..arrangement.len() {
            let Some(min_slot) = (slot..arrangement.len()).min_by_key(|&i| arrangement[i]) else {
                continue;
            };
            if min_slot != slot {
                arrangement.swap(slot, min_slot);
                transpositions.push((positions[slot], positions[min_slot]));
            }
        }

        // position -> declared position of the value that ends up there
        let mut placement: BTreeMap<usize, usize> = positions.iter().map(|&p| (p, p)).collect();
        for &(a, b) in transpositions.iter().rev() {
            let at_a = placement.get(&a).copied();
            let at_b = placement.get(&b).copied();
            if let (Some(at_a), Some(at_b)) = (at_a, at_b) {
                placement.insert(a, at_b);
                placement.insert(b, at_a);
            }
        }

        let forward_map = placement.iter().map(|(&to, &from)| (from, to)).collect();
        let backward_map = placement;

        Self {
            transpositions,
            forward_map,
            backward_map,
        }
    }

    /// The pairwise swaps, in parameter positions, that undo this ordering.
    pub fn transpositions(&self) -> &[(usize, usize)] {
        &self.transpositions
    }

    /// Declared order to swapped order. Positions outside the list are ignored.
    pub fn forward<T: Clone>(&self, list: &[T]) -> Vec<T> {
        Self::apply(&self.forward_map, list)
    }

    /// Swapped order back to declared order. Positions outside the list are ignored.
    pub fn backward<T: Clone>(&self, list: &[T]) -> Vec<T> {
        Self::apply(&self.backward_map, list)
    }

    fn apply<T: Clone>(map: &BTreeMap<usize, usize>, list: &[T]) -> Vec<T> {
        let mut out = list.to_vec();
        for (&from, &to) in map {
            if let (Some(value), Some(slot)) = (list.get(from), out.get_mut(to)) {
                *slot = value.clone();
            }
        }
        out
    }
}

/// Build one swapper for every ordering of `indices` other than the declared
/// (ascending) one. Duplicate indices collapse.
pub fn create_swappers(indices: &[usize]) -> Vec<Swapper> {
    let declared: Vec<usize> = indices.iter().copied().sorted_unstable().dedup().collect();
    if declared.len() < 2 {
        return Vec::new();
    }

    declared
        .iter()
        .copied()
        .permutations(declared.len())
        .filter(|order| *order != declared)
        .map(|order| Swapper::build(&order))
        .collect()
}

/// Reject swappable sets that cannot be honoured.
pub(crate) fn validate_swappable(
    command: &str,
    parameters: &[Parameter],
    indices: &[usize],
) -> Result<(), RegistrationError> {
    let error = |reason: String| RegistrationError::SwapConfiguration {
        command: command.to_string(),
        reason,
    };

    let distinct = indices.iter().copied().sorted_unstable().dedup().count();
    if distinct > MAX_SWAPPABLE_PARAMETERS {
        return Err(error(format!(
            "{distinct} swappable parameters exceed the limit of {MAX_SWAPPABLE_PARAMETERS}"
        )));
    }

    for &index in indices {
        let Some(parameter) = parameters.get(index) else {
            return Err(error(format!(
                "index {index} is out of range for {} parameters",
                parameters.len()
            )));
        };
        if parameter.is_remainder() {
            return Err(error(format!(
                "remainder parameter `{}` cannot be swapped",
                parameter.name()
            )));
        }
    }

    Ok(())
}
