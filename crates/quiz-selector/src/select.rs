use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use quiz_core::entity::{Question, QuestionSourceMode};
use quiz_store::Store;

use crate::difficulty::progression;
use crate::error::SelectorError;

/// Runs the ordered adaptive-selection algorithm (§4.4) for the question at
/// `position` of `total_questions`, then atomically records the pick
/// (marks it used, appends `QuizQuestionHistory`) before returning it.
pub async fn select_and_record(
    store: &dyn Store,
    quiz_id: i64,
    mode: QuestionSourceMode,
    position: i32,
    total_questions: i32,
    max_difficulty: i32,
    seed: u64,
) -> Result<Question, SelectorError> {
    let question = select_question(store, quiz_id, mode, position, total_questions, max_difficulty, seed).await?;

    let history_len = store.history_len(quiz_id).await?;
    let question_order = history_len + 1;
    store
        .pick_and_record_question(quiz_id, question.id, question_order)
        .await?;
    Ok(question)
}

/// The selection algorithm alone, without the recording side effect —
/// split out so it can be tested without a `Store::pick_and_record_question`
/// round trip.
pub async fn select_question(
    store: &dyn Store,
    quiz_id: i64,
    mode: QuestionSourceMode,
    position: i32,
    total_questions: i32,
    max_difficulty: i32,
    seed: u64,
) -> Result<Question, SelectorError> {
    let target = progression(position, total_questions, max_difficulty);

    for distance in 0..=2i32 {
        let tiers = tiers_at_distance(target, distance, max_difficulty);
        for tier in tiers {
            let own = store.own_unused_questions(quiz_id, tier).await?;
            if let Some(q) = pick_tiebreak(&own, seed, quiz_id, tier) {
                return Ok(q);
            }

            if matches!(mode, QuestionSourceMode::Hybrid) {
                let pool = store.pool_unused_questions(tier).await?;
                if let Some(q) = pick_tiebreak(&pool, seed, quiz_id, tier) {
                    return Ok(q);
                }
            }
        }
    }

    Err(SelectorError::NoQuestionAvailable(quiz_id))
}

/// Difficulty tiers to try at a given distance from `target`: the target
/// itself at distance 0, then `target - distance` before `target + distance`
/// for distance > 0, dropping any tier outside `[1, max_difficulty]`.
fn tiers_at_distance(target: i32, distance: i32, max_difficulty: i32) -> Vec<i32> {
    if distance == 0 {
        return vec![target];
    }
    [target - distance, target + distance]
        .into_iter()
        .filter(|t| *t >= 1 && *t <= max_difficulty)
        .collect()
}

/// Deterministic-by-default tie-break: ascending by id (`seed == 0`), or a
/// seeded pseudo-random pick otherwise so two same-day cohorts don't
/// necessarily see identical sequences.
fn pick_tiebreak(candidates: &[Question], seed: u64, quiz_id: i64, tier: i32) -> Option<Question> {
    if candidates.is_empty() {
        return None;
    }
    if seed == 0 {
        return candidates.first().cloned();
    }
    let combined = seed
        .wrapping_mul(31)
        .wrapping_add(quiz_id as u64)
        .wrapping_mul(31)
        .wrapping_add(tier as u64);
    let mut rng = StdRng::seed_from_u64(combined);
    let idx = rng.gen_range(0..candidates.len());
    candidates.get(idx).cloned()
}
