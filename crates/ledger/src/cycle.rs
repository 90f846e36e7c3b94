//! Incremental cycle tracking for Proof-of-Diversity.
//!
//! A cycle is the run of distinct signers between two occurrences of the same
//! signer. The tracker keeps a rolling window of recent signer identifiers,
//! just enough to reconstruct the last four cycles, and derives the next
//! tracker from the parent plus one signer identifier. No chain traversal,
//! no I/O.

use std::collections::HashSet;

use crate::identifier::Identifier;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Continuity {
    Undetermined,
    Continuous,
    /// Terminal once the tracker is complete; the represented block must not
    /// be frozen.
    Discontinuous,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NewVerifierState {
    Undetermined,
    NewVerifier,
    ExistingVerifier,
}

#[derive(Clone, Debug)]
pub struct CycleTracker {
    /// Rolling signer window, oldest first. The last entry is the signer of
    /// the represented block.
    identifiers: Vec<Identifier>,
    /// Start index (into `identifiers`) of each of the up-to-four most
    /// recent cycles; slot 0 is the running cycle.
    cycle_start_indices: [usize; 4],
    cycle_lengths: [u32; 4],
    /// Cycles closed by a repeated signer inside the window.
    closed_cycles: usize,
    /// True while the window still begins at the Genesis block.
    rooted_at_genesis: bool,
    complete: bool,
    continuity: Continuity,
    new_verifier_states: Vec<NewVerifierState>,
}

impl CycleTracker {
    /// Tracker for the Genesis block itself.
    pub fn genesis(signer: Identifier) -> CycleTracker {
        Self::compute(vec![signer], true)
    }

    /// Tracker for a child block signed by `signer`. Pure derivation from the
    /// parent window.
    pub fn advanced(&self, signer: Identifier) -> CycleTracker {
        let mut ids = Vec::with_capacity(self.identifiers.len() + 1);
        ids.extend_from_slice(&self.identifiers);
        ids.push(signer);
        Self::compute(ids, self.rooted_at_genesis)
    }

    fn compute(mut ids: Vec<Identifier>, mut rooted: bool) -> CycleTracker {
        let n = ids.len();

        // Walk backwards collecting distinct signers. Each repeat closes a
        // cycle starting just after it; the set restarts with the repeat so
        // the next cycle is measured against its own membership.
        let mut starts: Vec<usize> = Vec::with_capacity(4);
        let mut seen: HashSet<Identifier> = HashSet::new();
        for j in (0..n).rev() {
            if seen.contains(&ids[j]) {
                starts.push(j + 1);
                if starts.len() == 4 {
                    break;
                }
                seen.clear();
            }
            seen.insert(ids[j]);
        }
        let closed = starts.len();
        let complete = closed == 4 || rooted;

        let mut cycle_start_indices = [0usize; 4];
        for (i, s) in starts.iter().enumerate() {
            cycle_start_indices[i] = *s;
        }
        let mut cycle_lengths = [0u32; 4];
        for i in 0..4 {
            let upper = if i == 0 { n } else { cycle_start_indices[i - 1] };
            // Slots past the closed cycles only carry a length when the
            // window is rooted and the oldest run extends to Genesis.
            if i < closed || (rooted && i == closed) {
                cycle_lengths[i] = (upper - cycle_start_indices[i]) as u32;
            }
        }

        // Trim the window to four cycles plus one leading slot.
        if closed == 4 {
            let keep_from = cycle_start_indices[3].saturating_sub(1);
            if keep_from > 0 {
                ids.drain(..keep_from);
                rooted = false;
                for s in cycle_start_indices.iter_mut() {
                    *s -= keep_from;
                }
            }
        }
        let n = ids.len();

        // Forward pass: an identifier first seen inside the running cycle is
        // a new verifier (four cycles of history, or all of history when the
        // window is rooted, say it never signed before). Earlier first
        // occurrences stay undetermined unless rooted.
        let current_start = cycle_start_indices[0];
        let mut states = vec![NewVerifierState::Undetermined; n];
        let mut seen_forward: HashSet<Identifier> = HashSet::new();
        for (idx, id) in ids.iter().enumerate() {
            if seen_forward.contains(id) {
                states[idx] = NewVerifierState::ExistingVerifier;
            } else {
                seen_forward.insert(*id);
                if complete && (rooted || idx >= current_start) {
                    states[idx] = NewVerifierState::NewVerifier;
                }
            }
        }

        let continuity = if !complete {
            Continuity::Undetermined
        } else {
            Self::verdict(&states, &cycle_lengths, n)
        };

        CycleTracker {
            identifiers: ids,
            cycle_start_indices,
            cycle_lengths,
            closed_cycles: closed,
            rooted_at_genesis: rooted,
            complete,
            continuity,
            new_verifier_states: states,
        }
    }

    fn verdict(states: &[NewVerifierState], cycle_lengths: &[u32; 4], n: usize) -> Continuity {
        let current_len = cycle_lengths[0] as usize;

        // New-verifier spacing: a new signer must be the only new signer in
        // the span of one full cycle behind it.
        if n > 0 && states[n - 1] == NewVerifierState::NewVerifier {
            let lookback = current_len.saturating_sub(1).min(n - 1);
            let span = &states[n - 1 - lookback..n - 1];
            if span.contains(&NewVerifierState::NewVerifier) {
                return Continuity::Discontinuous;
            }
        }

        // Shrinkage bound: the running cycle may not collapse below half of
        // the largest recent cycle, plus one. A single-signer predecessor
        // cycle is exempt; the margin has no room at that scale and a solo
        // chain would otherwise never extend itself.
        let max_prev = cycle_lengths[1..].iter().copied().max().unwrap_or(0);
        let floor = (max_prev as usize + 1) / 2 + 1;
        if max_prev > 1 && current_len < floor {
            return Continuity::Discontinuous;
        }

        Continuity::Continuous
    }

    #[inline]
    pub fn continuity(&self) -> Continuity {
        self.continuity
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Length of the running cycle, which is the committee size.
    #[inline]
    pub fn cycle_length(&self) -> usize {
        self.cycle_lengths[0] as usize
    }

    pub fn cycle_lengths(&self) -> [u32; 4] {
        self.cycle_lengths
    }

    /// The running cycle, oldest signer first. All entries are distinct.
    pub fn current_cycle(&self) -> &[Identifier] {
        &self.identifiers[self.cycle_start_indices[0]..]
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.current_cycle().contains(id)
    }

    /// True while no signer has repeated since Genesis: the bootstrap era in
    /// which admission and retention rules are relaxed.
    #[inline]
    pub fn in_genesis_cycle(&self) -> bool {
        self.rooted_at_genesis && self.closed_cycles == 0
    }

    /// State of the represented block's signer.
    pub fn signer_state(&self) -> NewVerifierState {
        self.new_verifier_states
            .last()
            .copied()
            .unwrap_or(NewVerifierState::Undetermined)
    }

    #[cfg(test)]
    pub(crate) fn window_len(&self) -> usize {
        self.identifiers.len()
    }
}
