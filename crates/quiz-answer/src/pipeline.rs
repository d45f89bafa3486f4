use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use quiz_cache::{keys, Cache};
use quiz_core::entity::UserAnswer;
use quiz_scoring::{score_answer, Verdict};
use quiz_store::Store;

use crate::context::{ActiveQuestionView, AdmissionPolicy};
use crate::error::AnswerError;

/// Outcome of a successfully processed answer. The caller (orchestrator) is
/// responsible for turning this into the `quiz:answer_result` /
/// `quiz:elimination` events emitted to the submitting user's socket — this
/// crate only computes and persists, it never touches the hub.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    pub verdict: Verdict,
    /// `true` when `selectedOption` wasn't one of the question's option ids.
    /// The answer is still scored (as incorrect) and persisted; this flag
    /// exists purely so the caller can log/telemetry-tag it distinctly.
    pub invalid_option: bool,
}

/// `ProcessAnswer` (§4.6). Runs the ordered precondition checks, scores the
/// submission, persists it, and updates cache-side elimination/answered-set
/// bookkeeping. Every rejection variant in [`AnswerError`] before
/// `Store`/`Cache` is a precondition failure — nothing is persisted for
/// `StaleAnswer`, `NotAParticipant`, or `AlreadyEliminated`.
pub async fn process_answer(
    store: &dyn Store,
    cache: &dyn Cache,
    ctx: &ActiveQuestionView,
    policy: AdmissionPolicy,
    user_id: i64,
    question_id: i64,
    selected_option: i32,
    server_receive_time: DateTime<Utc>,
) -> Result<AnswerOutcome, AnswerError> {
    use quiz_core::entity::QuizStatus;

    if ctx.quiz_status != QuizStatus::InProgress || ctx.question.id != question_id {
        return Err(AnswerError::StaleAnswer {
            active: ctx.question.id,
            submitted: question_id,
        });
    }

    let participants_key = keys::participants(ctx.quiz_id);
    let user_id_str = user_id.to_string();
    let is_participant = cache.set_contains(&participants_key, &user_id_str).await?;
    if !is_participant {
        match policy {
            AdmissionPolicy::Strict => return Err(AnswerError::NotAParticipant(user_id)),
            AdmissionPolicy::AutoAdmitOnFirstAnswer => {
                cache.set_add(&participants_key, &user_id_str).await?;
                debug!(user_id, quiz_id = ctx.quiz_id, "auto-admitted on first answer");
            }
        }
    }

    let eliminated_key = keys::eliminated(ctx.quiz_id, user_id);
    if cache.get_flag(&eliminated_key).await? {
        return Err(AnswerError::AlreadyEliminated(user_id));
    }

    if let Some(existing) = store.get_user_answer(user_id, ctx.quiz_id, question_id).await? {
        let _ = existing;
        return Err(AnswerError::DuplicateAnswer { user_id, question_id });
    }

    let invalid_option = !ctx.question.has_option(selected_option);

    let verdict = score_answer(
        ctx.opened_at,
        server_receive_time,
        ctx.question.time_limit_sec,
        ctx.question.point_value,
        selected_option,
        ctx.question.correct_option,
    );

    let answer = UserAnswer {
        user_id,
        quiz_id: ctx.quiz_id,
        question_id,
        question_order: ctx.question_order,
        selected_option: Some(selected_option),
        is_correct: verdict.is_correct,
        response_time_ms: verdict.time_taken_ms,
        score: verdict.score,
        is_eliminated: verdict.is_eliminated,
        elimination_reason: verdict.elimination_reason,
        created_at: server_receive_time,
    };

    if let Err(e) = store.insert_user_answer(answer).await {
        return match e {
            quiz_store::StoreError::DuplicateAnswer { user_id, question_id } => {
                Err(AnswerError::DuplicateAnswer { user_id, question_id })
            }
            other => Err(other.into()),
        };
    }

    let answered_key = keys::answered(ctx.quiz_id, question_id);
    cache.set_add(&answered_key, &user_id_str).await?;

    if verdict.is_eliminated {
        cache.set_flag(&eliminated_key, true, None).await?;
    }

    if invalid_option && !verdict.is_time_exceeded {
        warn!(user_id, question_id, selected_option, "submitted option id not on the question");
    }

    Ok(AnswerOutcome { verdict, invalid_option })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_cache::InMemoryCache;
    use quiz_core::entity::{Question, QuestionOption, QuizStatus};
    use quiz_store::MemoryStore;

    fn view(opened_at: DateTime<Utc>) -> ActiveQuestionView {
        ActiveQuestionView {
            quiz_id: 1,
            quiz_status: QuizStatus::InProgress,
            question: Question {
                id: 10,
                quiz_id: Some(1),
                text: "2+2?".into(),
                text_alt: None,
                options: vec![
                    QuestionOption { id: 1, text: "3".into() },
                    QuestionOption { id: 2, text: "4".into() },
                ],
                correct_option: 2,
                time_limit_sec: 10,
                point_value: 100,
                difficulty: 1,
                is_used: true,
            },
            question_order: 1,
            opened_at,
        }
    }

    #[tokio::test]
    async fn correct_answer_scores_and_does_not_eliminate() {
        let store = MemoryStore::new();
        let cache = InMemoryCache::new();
        let ctx = view(Utc::now());
        cache.set_add(&keys::participants(1), "7").await.unwrap();

        let outcome = process_answer(&store, &cache, &ctx, AdmissionPolicy::Strict, 7, 10, 2, ctx.opened_at)
            .await
            .unwrap();
        assert!(outcome.verdict.is_correct);
        assert!(!outcome.verdict.is_eliminated);
        assert_eq!(outcome.verdict.score, 100);
        assert!(!cache.get_flag(&keys::eliminated(1, 7)).await.unwrap());
    }

    #[tokio::test]
    async fn stale_question_id_is_rejected() {
        let store = MemoryStore::new();
        let cache = InMemoryCache::new();
        let ctx = view(Utc::now());

        let err = process_answer(&store, &cache, &ctx, AdmissionPolicy::Strict, 7, 999, 2, ctx.opened_at)
            .await
            .unwrap_err();
        assert!(matches!(err, AnswerError::StaleAnswer { .. }));
    }

    #[tokio::test]
    async fn strict_policy_rejects_non_participant() {
        let store = MemoryStore::new();
        let cache = InMemoryCache::new();
        let ctx = view(Utc::now());

        let err = process_answer(&store, &cache, &ctx, AdmissionPolicy::Strict, 7, 10, 2, ctx.opened_at)
            .await
            .unwrap_err();
        assert!(matches!(err, AnswerError::NotAParticipant(7)));
    }

    #[tokio::test]
    async fn auto_admit_policy_admits_on_first_answer() {
        let store = MemoryStore::new();
        let cache = InMemoryCache::new();
        let ctx = view(Utc::now());

        let outcome = process_answer(
            &store,
            &cache,
            &ctx,
            AdmissionPolicy::AutoAdmitOnFirstAnswer,
            7,
            10,
            2,
            ctx.opened_at,
        )
        .await
        .unwrap();
        assert!(outcome.verdict.is_correct);
        assert!(cache.set_contains(&keys::participants(1), "7").await.unwrap());
    }

    #[tokio::test]
    async fn already_eliminated_user_is_rejected() {
        let store = MemoryStore::new();
        let cache = InMemoryCache::new();
        let ctx = view(Utc::now());
        cache.set_add(&keys::participants(1), "7").await.unwrap();
        cache.set_flag(&keys::eliminated(1, 7), true, None).await.unwrap();

        let err = process_answer(&store, &cache, &ctx, AdmissionPolicy::Strict, 7, 10, 2, ctx.opened_at)
            .await
            .unwrap_err();
        assert!(matches!(err, AnswerError::AlreadyEliminated(7)));
    }

    #[tokio::test]
    async fn invalid_option_scores_as_incorrect_and_eliminates() {
        let store = MemoryStore::new();
        let cache = InMemoryCache::new();
        let ctx = view(Utc::now());
        cache.set_add(&keys::participants(1), "7").await.unwrap();

        let outcome = process_answer(&store, &cache, &ctx, AdmissionPolicy::Strict, 7, 10, 99, ctx.opened_at)
            .await
            .unwrap();
        assert!(outcome.invalid_option);
        assert!(!outcome.verdict.is_correct);
        assert!(outcome.verdict.is_eliminated);
        assert_eq!(outcome.verdict.score, 0);
        assert!(cache.get_flag(&keys::eliminated(1, 7)).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_submission_is_rejected() {
        let store = MemoryStore::new();
        let cache = InMemoryCache::new();
        let ctx = view(Utc::now());
        cache.set_add(&keys::participants(1), "7").await.unwrap();

        process_answer(&store, &cache, &ctx, AdmissionPolicy::Strict, 7, 10, 2, ctx.opened_at)
            .await
            .unwrap();
        let err = process_answer(&store, &cache, &ctx, AdmissionPolicy::Strict, 7, 10, 2, ctx.opened_at)
            .await
            .unwrap_err();
        assert!(matches!(err, AnswerError::DuplicateAnswer { .. }));
    }

    #[tokio::test]
    async fn late_answer_scores_zero_even_if_correct() {
        let store = MemoryStore::new();
        let cache = InMemoryCache::new();
        let opened_at = Utc::now() - chrono::Duration::seconds(20);
        let ctx = view(opened_at);
        cache.set_add(&keys::participants(1), "7").await.unwrap();

        let outcome = process_answer(&store, &cache, &ctx, AdmissionPolicy::Strict, 7, 10, 2, Utc::now())
            .await
            .unwrap();
        assert!(outcome.verdict.is_time_exceeded);
        assert_eq!(outcome.verdict.score, 0);
        assert!(outcome.verdict.is_eliminated);
    }
}
