use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::player::PlayerId;

/// A layer of the pot that only some players can win.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidePot {
    pub amount: u64,
    /// Players committed at or above this layer's level, in table order.
    pub eligible: Vec<PlayerId>,
}

/// Splits commitments into layered pots.
///
/// Each distinct commitment level of a non-folded player opens a layer worth
/// `(level - previous level)` from every player who reached it. Folded
/// players' chips are dead money: they fill the layers they reach but make no
/// one eligible, and anything above the highest live level joins the top
/// layer. The layers always sum to the total committed.
///
/// `commitments` must be in table order; eligibility lists keep that order.
pub fn compute_side_pots(
    commitments: &[(PlayerId, u64)],
    folded: &BTreeSet<PlayerId>,
) -> Vec<SidePot> {
    let mut levels: Vec<u64> = commitments
        .iter()
        .filter(|(id, amount)| *amount > 0 && !folded.contains(id))
        .map(|(_, amount)| *amount)
        .collect();
    levels.sort_unstable();
    levels.dedup();

    let mut pots = Vec::with_capacity(levels.len());
    let mut prev_level = 0u64;
    for &level in &levels {
        let amount: u64 = commitments
            .iter()
            .map(|(_, c)| (*c).min(level) - (*c).min(prev_level))
            .sum();
        let eligible: Vec<PlayerId> = commitments
            .iter()
            .filter(|(id, c)| *c >= level && !folded.contains(id))
            .map(|(id, _)| id.clone())
            .collect();
        pots.push(SidePot { amount, eligible });
        prev_level = level;
    }

    let dead_above: u64 = commitments
        .iter()
        .map(|(_, c)| c.saturating_sub(prev_level))
        .sum();
    if dead_above > 0 {
        match pots.last_mut() {
            Some(top) => top.amount += dead_above,
            None => pots.push(SidePot {
                amount: dead_above,
                eligible: commitments
                    .iter()
                    .filter(|(id, _)| !folded.contains(id))
                    .map(|(id, _)| id.clone())
                    .collect(),
            }),
        }
    }
    pots
}
