//! Stake sizing
//!
//! Stakes are drawn and carved in raw units, then scaled by the fixed
//! multiplier into currency amounts. The hard rule: no single chunk may
//! ever reach the per-bet ceiling, so the largest legal chunk is one
//! multiplier short of it.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use tracing::warn;

use crate::config::Policy;

use super::{Outcome, SkipReason, Stake};

/// Currency units per raw unit
pub const STAKE_MULTIPLIER: i64 = 1_000;

/// Exclusive upper bound for any single bet
pub const BET_CEILING: i64 = 200_000;

/// Largest chunk, in units, that stays strictly under the ceiling
const MAX_CHUNK_UNITS: i64 = (BET_CEILING - 1) / STAKE_MULTIPLIER;

/// Chunks are carved on this unit granularity
const STEP_UNITS: i64 = 10;

/// Minimum accounts on each door
const MIN_SIDE: u32 = 4;

/// Carve one door's total into per-slot amounts
///
/// Peels random step-aligned chunks until the total is spent or the
/// remainder is too small to carve, at which point the remainder rides
/// on the final slot. May fill fewer slots than requested; never emits
/// a zero chunk.
fn split_side(total_units: i64, slots: u32, rng: &mut dyn RngCore) -> Vec<i64> {
    let mut out = Vec::with_capacity(slots as usize);
    let mut remain = total_units;

    for slot in 0..slots {
        let last_slot = slot + 1 == slots;
        if last_slot || remain < STEP_UNITS {
            let amount = remain.min(MAX_CHUNK_UNITS);
            if amount > 0 {
                out.push(amount * STAKE_MULTIPLIER);
            }
            break;
        }

        let max_allowed = remain.min(MAX_CHUNK_UNITS);
        let steps = max_allowed / STEP_UNITS;
        let amount = STEP_UNITS * rng.gen_range(1..=steps);
        out.push(amount * STAKE_MULTIPLIER);
        remain -= amount;
    }

    out
}

/// Draw a full round's worth of sized chunks for both doors
///
/// Both doors share one per-side total drawn from the policy's stake
/// range. Should any chunk land at or over the ceiling, the entire draw
/// is discarded and resampled, up to `resample_cap` attempts.
pub fn draw_round_stakes(
    policy: &Policy,
    rng: &mut dyn RngCore,
    resample_cap: usize,
) -> Result<Vec<Stake>, SkipReason> {
    let players = policy.player_count;
    if players < MIN_SIDE * 2 {
        return Err(SkipReason::TooFewPlayers);
    }
    if !policy.bet_range.is_valid() {
        return Err(SkipReason::InvalidBetRange);
    }

    let range = policy.bet_range;
    let choices: Vec<i64> = (range.start..=range.stop)
        .step_by(range.step as usize)
        .collect();

    for _ in 0..resample_cap.max(1) {
        let total = *choices.choose(rng).expect("validated range is non-empty");
        let tai_slots = rng.gen_range(MIN_SIDE..=players - MIN_SIDE);
        let xiu_slots = players - tai_slots;

        let mut stakes: Vec<Stake> = split_side(total, tai_slots, rng)
            .into_iter()
            .map(|amount| Stake { amount, outcome: Outcome::Tai })
            .collect();
        stakes.extend(
            split_side(total, xiu_slots, rng)
                .into_iter()
                .map(|amount| Stake { amount, outcome: Outcome::Xiu }),
        );

        if stakes.iter().all(|s| s.amount < BET_CEILING) {
            return Ok(stakes);
        }
        warn!("stake draw produced a chunk at or over {BET_CEILING}, resampling");
    }

    Err(SkipReason::SizingRetriesExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BetRange, PriorityTiers};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn policy(range: BetRange, players: u32) -> Policy {
        Policy {
            pause: false,
            bet_range: range,
            player_count: players,
            strategy_id: 1,
            tiers: PriorityTiers::default(),
        }
    }

    #[test]
    fn side_total_is_conserved() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let chunks = split_side(50, 3, &mut rng);
            assert_eq!(chunks.iter().sum::<i64>(), 50 * STAKE_MULTIPLIER);
            assert!(chunks.len() <= 3);
            assert!(chunks.iter().all(|c| *c > 0));
        }
    }

    #[test]
    fn single_slot_takes_the_whole_side() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(split_side(70, 1, &mut rng), vec![70 * STAKE_MULTIPLIER]);
    }

    #[test]
    fn chunks_stay_step_aligned_except_the_tail() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let chunks = split_side(67, 4, &mut rng);
            assert_eq!(chunks.iter().sum::<i64>(), 67 * STAKE_MULTIPLIER);
            for chunk in &chunks[..chunks.len() - 1] {
                assert_eq!(chunk % (STEP_UNITS * STAKE_MULTIPLIER), 0);
            }
        }
    }

    #[test]
    fn draws_come_from_the_configured_grid() {
        let mut rng = StdRng::seed_from_u64(3);
        let p = policy(BetRange { start: 50, stop: 71, step: 10 }, 8);

        for _ in 0..100 {
            let stakes = draw_round_stakes(&p, &mut rng, 8).unwrap();
            for outcome in [Outcome::Tai, Outcome::Xiu] {
                let side: i64 = stakes
                    .iter()
                    .filter(|s| s.outcome == outcome)
                    .map(|s| s.amount)
                    .sum();
                assert!(
                    [50_000, 60_000, 70_000].contains(&side),
                    "unexpected side total {side}"
                );
            }
        }
    }

    #[test]
    fn no_chunk_ever_reaches_the_ceiling() {
        let mut rng = StdRng::seed_from_u64(5);
        // stop pushed high enough that totals exceed a single max chunk
        let p = policy(BetRange { start: 150, stop: 391, step: 20 }, 10);

        for _ in 0..300 {
            let stakes = draw_round_stakes(&p, &mut rng, 8).unwrap();
            assert!(stakes.iter().all(|s| s.amount < BET_CEILING));
        }
    }

    #[test]
    fn degenerate_policies_are_skipped() {
        let mut rng = StdRng::seed_from_u64(9);

        let too_few = policy(BetRange { start: 50, stop: 71, step: 10 }, 7);
        assert_eq!(
            draw_round_stakes(&too_few, &mut rng, 8),
            Err(SkipReason::TooFewPlayers)
        );

        let empty_range = policy(BetRange { start: 70, stop: 70, step: 10 }, 8);
        assert_eq!(
            draw_round_stakes(&empty_range, &mut rng, 8),
            Err(SkipReason::InvalidBetRange)
        );
    }
}
