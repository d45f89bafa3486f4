//! Pure scoring and ranking rules (§4.6, §4.7). No I/O, no clocks beyond the
//! timestamps callers pass in — every function here is a referentially
//! transparent mapping from inputs to a verdict, kept separate from
//! `quiz-answer`'s pipeline so the rules can be table-tested in isolation,
//! the way `mqk-execution`'s `oms` crate keeps its fill-math free of the
//! state machine that calls it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use quiz_core::entity::{EliminationReason, UserAnswer};

/// Milliseconds between a question opening and a submission arriving.
/// Never negative in practice; a clock skew producing a negative value is
/// clamped to zero rather than propagated as a negative score input.
pub fn time_taken_ms(opened_at: DateTime<Utc>, received_at: DateTime<Utc>) -> i64 {
    (received_at - opened_at).num_milliseconds().max(0)
}

pub fn is_time_exceeded(time_taken_ms: i64, time_limit_sec: i32) -> bool {
    time_taken_ms > i64::from(time_limit_sec) * 1000
}

pub fn is_correct(selected_option: i32, correct_option: i32) -> bool {
    selected_option == correct_option
}

/// Correct-but-late yields zero: lateness elimination overrides correctness.
pub fn score(is_correct: bool, is_time_exceeded: bool, point_value: i32) -> i32 {
    if is_correct && !is_time_exceeded {
        point_value
    } else {
        0
    }
}

pub fn is_eliminated(is_correct: bool, is_time_exceeded: bool) -> bool {
    !is_correct || is_time_exceeded
}

pub fn elimination_reason(is_correct: bool, is_time_exceeded: bool) -> Option<EliminationReason> {
    if is_time_exceeded {
        Some(EliminationReason::TimeExceeded)
    } else if !is_correct {
        Some(EliminationReason::IncorrectAnswer)
    } else {
        None
    }
}

/// The full verdict for one submitted answer, derived in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub time_taken_ms: i64,
    pub is_time_exceeded: bool,
    pub is_correct: bool,
    pub score: i32,
    pub is_eliminated: bool,
    pub elimination_reason: Option<EliminationReason>,
}

pub fn score_answer(
    opened_at: DateTime<Utc>,
    received_at: DateTime<Utc>,
    time_limit_sec: i32,
    point_value: i32,
    selected_option: i32,
    correct_option: i32,
) -> Verdict {
    let time_taken_ms = time_taken_ms(opened_at, received_at);
    let exceeded = is_time_exceeded(time_taken_ms, time_limit_sec);
    let correct = is_correct(selected_option, correct_option);
    Verdict {
        time_taken_ms,
        is_time_exceeded: exceeded,
        is_correct: correct,
        score: score(correct, exceeded, point_value),
        is_eliminated: is_eliminated(correct, exceeded),
        elimination_reason: elimination_reason(correct, exceeded),
    }
}

/// Per-user aggregate over every answer recorded for a quiz (§4.7 step 1).
#[derive(Debug, Clone, PartialEq)]
pub struct UserTally {
    pub user_id: i64,
    pub total_score: i32,
    pub correct_answers: i32,
    pub is_eliminated: bool,
    pub eliminated_on_question: Option<i32>,
    pub elimination_reason: Option<EliminationReason>,
    pub first_answer_time: DateTime<Utc>,
}

/// Groups raw answer rows by user and reduces each group to a [`UserTally`].
/// `eliminated_on_question` is the minimum `question_order` at which the
/// user was marked eliminated, regardless of later rows (there should be
/// none — elimination is terminal — but the minimum is taken defensively).
pub fn tally_answers(answers: &[UserAnswer]) -> Vec<UserTally> {
    let mut by_user: HashMap<i64, UserTally> = HashMap::new();

    for a in answers {
        let entry = by_user.entry(a.user_id).or_insert_with(|| UserTally {
            user_id: a.user_id,
            total_score: 0,
            correct_answers: 0,
            is_eliminated: false,
            eliminated_on_question: None,
            elimination_reason: None,
            first_answer_time: a.created_at,
        });

        entry.total_score += a.score;
        if a.is_correct && !a.is_eliminated {
            entry.correct_answers += 1;
        }
        if a.created_at < entry.first_answer_time {
            entry.first_answer_time = a.created_at;
        }
        if a.is_eliminated {
            entry.is_eliminated = true;
            entry.eliminated_on_question = Some(
                entry
                    .eliminated_on_question
                    .map_or(a.question_order, |q| q.min(a.question_order)),
            );
            if entry.elimination_reason.is_none() {
                entry.elimination_reason = a.elimination_reason;
            }
        }
    }

    let mut tallies: Vec<UserTally> = by_user.into_values().collect();
    tallies.sort_by_key(|t| t.user_id);
    tallies
}

/// A tally with its dense rank assigned (§4.7 step 3).
#[derive(Debug, Clone, PartialEq)]
pub struct RankedUser {
    pub tally: UserTally,
    pub rank: i32,
}

/// Sorts by `(score desc, correct_answers desc, first_answer_time asc)` and
/// assigns dense ranks: ties on the full sort key share a rank, the next
/// distinct key takes the following integer (no gaps).
pub fn rank_users(mut tallies: Vec<UserTally>) -> Vec<RankedUser> {
    tallies.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then(b.correct_answers.cmp(&a.correct_answers))
            .then(a.first_answer_time.cmp(&b.first_answer_time))
    });

    let mut ranked = Vec::with_capacity(tallies.len());
    let mut rank = 0;
    let mut prev_key: Option<(i32, i32, DateTime<Utc>)> = None;

    for tally in tallies {
        let key = (tally.total_score, tally.correct_answers, tally.first_answer_time);
        if prev_key != Some(key) {
            rank += 1;
            prev_key = Some(key);
        }
        ranked.push(RankedUser { tally, rank });
    }
    ranked
}

/// Winners are users who answered every actual question correctly and were
/// never eliminated (§4.7 step 4). `total_questions` is the *actual* count
/// asked (history length), not the quiz's planned `question_count`.
pub fn is_winner(tally: &UserTally, total_questions: i32) -> bool {
    !tally.is_eliminated && tally.correct_answers == total_questions
}

/// Integer-divides `prize_fund` across `winner_count` winners. Returns
/// `(per_winner, remainder)`; the remainder is retained by the house under
/// the default policy (§4.7 step 5). `winner_count == 0` yields `(0, 0)` —
/// callers must check for an empty winner set themselves, since an empty
/// set means the fund is held, not split zero ways.
pub fn split_prize(prize_fund: i64, winner_count: i64) -> (i64, i64) {
    if winner_count <= 0 {
        return (0, 0);
    }
    (prize_fund / winner_count, prize_fund % winner_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn correct_on_time_scores_full_points() {
        let v = score_answer(ts(0), ts(5), 10, 100, 2, 2);
        assert!(v.is_correct);
        assert!(!v.is_time_exceeded);
        assert_eq!(v.score, 100);
        assert!(!v.is_eliminated);
        assert_eq!(v.elimination_reason, None);
    }

    #[test]
    fn correct_but_late_scores_zero_and_eliminates() {
        let v = score_answer(ts(0), ts(11), 10, 100, 2, 2);
        assert!(v.is_correct);
        assert!(v.is_time_exceeded);
        assert_eq!(v.score, 0, "lateness overrides correctness per the scoring contract");
        assert!(v.is_eliminated);
        assert_eq!(v.elimination_reason, Some(EliminationReason::TimeExceeded));
    }

    #[test]
    fn incorrect_on_time_scores_zero_and_eliminates() {
        let v = score_answer(ts(0), ts(3), 10, 100, 1, 2);
        assert!(!v.is_correct);
        assert!(!v.is_time_exceeded);
        assert_eq!(v.score, 0);
        assert!(v.is_eliminated);
        assert_eq!(v.elimination_reason, Some(EliminationReason::IncorrectAnswer));
    }

    #[test]
    fn time_taken_never_negative() {
        let ms = time_taken_ms(ts(5), ts(0) - Duration::milliseconds(1));
        assert_eq!(ms, 0);
    }

    #[test]
    fn rank_users_assigns_dense_ranks_with_ties() {
        let tallies = vec![
            UserTally {
                user_id: 1,
                total_score: 100,
                correct_answers: 3,
                is_eliminated: false,
                eliminated_on_question: None,
                elimination_reason: None,
                first_answer_time: ts(1),
            },
            UserTally {
                user_id: 2,
                total_score: 100,
                correct_answers: 3,
                is_eliminated: false,
                eliminated_on_question: None,
                elimination_reason: None,
                first_answer_time: ts(1),
            },
            UserTally {
                user_id: 3,
                total_score: 50,
                correct_answers: 1,
                is_eliminated: true,
                eliminated_on_question: Some(2),
                elimination_reason: Some(EliminationReason::IncorrectAnswer),
                first_answer_time: ts(2),
            },
        ];

        let ranked = rank_users(tallies);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].rank, 1);
        assert_eq!(ranked[2].rank, 2);
    }

    #[test]
    fn split_prize_keeps_remainder() {
        assert_eq!(split_prize(100, 3), (33, 1));
        assert_eq!(split_prize(100, 0), (0, 0));
        assert_eq!(split_prize(100, 4), (25, 0));
    }

    #[test]
    fn winner_requires_perfect_uneliminated_run() {
        let winner = UserTally {
            user_id: 1,
            total_score: 100,
            correct_answers: 5,
            is_eliminated: false,
            eliminated_on_question: None,
            elimination_reason: None,
            first_answer_time: ts(0),
        };
        let eliminated = UserTally {
            is_eliminated: true,
            ..winner.clone()
        };
        assert!(is_winner(&winner, 5));
        assert!(!is_winner(&eliminated, 5));
        assert!(!is_winner(&winner, 6));
    }
}
