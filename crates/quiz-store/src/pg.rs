use async_trait::async_trait;
use sqlx::PgPool;

use quiz_core::entity::{
    AdSlot, EliminationReason, Question, QuestionOption, QuestionSourceMode, Quiz,
    QuizQuestionHistoryEntry, QuizResult, QuizStatus, UserAnswer,
};

use crate::error::StoreError;
use crate::rows::{AdSlotRow, QuestionRow, QuizResultRow, QuizRow, UserAnswerRow};
use crate::traits::Store;

/// PostgreSQL-backed [`Store`].
///
/// Every query goes through `sqlx::query_as::<_, Row>` with a hand-written
/// `#[derive(sqlx::FromRow)]` row struct rather than the `query!`
/// compile-time macro, so this crate never needs a live database to build —
/// the same choice the teacher makes throughout `stupid-server`'s `api/*`
/// modules (e.g. `stille_post.rs`).
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and run migrations. Returns `None` if `database_url` can't be
    /// reached, mirroring `stupid_server::db::init_pg_pool`'s fail-soft
    /// startup behavior (logged, not fatal).
    pub async fn connect_and_migrate(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            StoreError::Database(sqlx::Error::Migrate(Box::new(e)))
        })?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_quiz(&self, quiz_id: i64) -> Result<Option<Quiz>, StoreError> {
        let row = sqlx::query_as::<_, QuizRow>(
            "SELECT id, title, description, scheduled_time, prize_fund, status,
                    question_count, actual_question_count, finish_on_zero_players,
                    question_source_mode
             FROM quizzes WHERE id = $1",
        )
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Quiz::from))
    }

    async fn atomic_start(&self, quiz_id: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM quizzes WHERE id = $1 FOR UPDATE")
                .bind(quiz_id)
                .fetch_optional(&mut *tx)
                .await?;

        match current.as_deref() {
            None => return Err(StoreError::QuizNotFound(quiz_id)),
            Some("scheduled") => {}
            Some(_) => return Err(StoreError::QuizNotScheduled(quiz_id)),
        }

        // The partial unique index `quizzes_single_in_progress` is the real
        // guarantee; this UPDATE racing against it is what turns a second
        // writer into a database error we translate below.
        let result = sqlx::query(
            "UPDATE quizzes SET status = 'in_progress' WHERE id = $1 AND status = 'scheduled'",
        )
        .bind(quiz_id)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(r) if r.rows_affected() == 1 => {
                tx.commit().await?;
                Ok(())
            }
            Ok(_) => {
                tx.rollback().await.ok();
                Err(StoreError::QuizNotScheduled(quiz_id))
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await.ok();
                Err(StoreError::AnotherQuizInProgress)
            }
            Err(e) => {
                tx.rollback().await.ok();
                Err(e.into())
            }
        }
    }

    async fn cancel_quiz(&self, quiz_id: i64, reason: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE quizzes SET status = 'cancelled', cancellation_reason = $2
             WHERE id = $1 AND status NOT IN ('completed', 'cancelled')",
        )
        .bind(quiz_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_quiz(&self, quiz_id: i64) -> Result<(), StoreError> {
        // Status-only — must never touch actual_question_count (§4.3, §4.7).
        sqlx::query("UPDATE quizzes SET status = 'completed' WHERE id = $1")
            .bind(quiz_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_actual_question_count(&self, quiz_id: i64, count: i32) -> Result<(), StoreError> {
        sqlx::query("UPDATE quizzes SET actual_question_count = $2 WHERE id = $1")
            .bind(quiz_id)
            .bind(count)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn available_question_count(
        &self,
        quiz_id: i64,
        mode: QuestionSourceMode,
    ) -> Result<i64, StoreError> {
        let count = match mode {
            QuestionSourceMode::AdminOnly => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM questions WHERE quiz_id = $1 AND is_used = FALSE",
                )
                .bind(quiz_id)
                .fetch_one(&self.pool)
                .await?
            }
            QuestionSourceMode::Hybrid => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM questions
                     WHERE is_used = FALSE AND (quiz_id = $1 OR quiz_id IS NULL)",
                )
                .bind(quiz_id)
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(count)
    }

    async fn own_unused_questions(&self, quiz_id: i64, difficulty: i32) -> Result<Vec<Question>, StoreError> {
        let rows = sqlx::query_as::<_, QuestionRow>(
            "SELECT id, quiz_id, text, text_alt, options, correct_option,
                    time_limit_sec, point_value, difficulty, is_used
             FROM questions
             WHERE quiz_id = $1 AND difficulty = $2 AND is_used = FALSE
             ORDER BY id ASC",
        )
        .bind(quiz_id)
        .bind(difficulty)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Question::try_from).collect()
    }

    async fn pool_unused_questions(&self, difficulty: i32) -> Result<Vec<Question>, StoreError> {
        let rows = sqlx::query_as::<_, QuestionRow>(
            "SELECT id, quiz_id, text, text_alt, options, correct_option,
                    time_limit_sec, point_value, difficulty, is_used
             FROM questions
             WHERE quiz_id IS NULL AND difficulty = $1 AND is_used = FALSE
             ORDER BY id ASC",
        )
        .bind(difficulty)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Question::try_from).collect()
    }

    async fn pick_and_record_question(
        &self,
        quiz_id: i64,
        question_id: i64,
        question_order: i32,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE questions SET is_used = TRUE WHERE id = $1")
            .bind(question_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO quiz_question_history (quiz_id, question_order, question_id)
             VALUES ($1, $2, $3)",
        )
        .bind(quiz_id)
        .bind(question_order)
        .bind(question_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn history(&self, quiz_id: i64) -> Result<Vec<QuizQuestionHistoryEntry>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, i32, i64, chrono::DateTime<chrono::Utc>)>(
            "SELECT quiz_id, question_order, question_id, asked_at
             FROM quiz_question_history WHERE quiz_id = $1 ORDER BY question_order ASC",
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(quiz_id, question_order, question_id, asked_at)| QuizQuestionHistoryEntry {
                quiz_id,
                question_order,
                question_id,
                asked_at,
            })
            .collect())
    }

    async fn history_len(&self, quiz_id: i64) -> Result<i32, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM quiz_question_history WHERE quiz_id = $1")
                .bind(quiz_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as i32)
    }

    async fn insert_user_answer(&self, answer: UserAnswer) -> Result<(), StoreError> {
        let reason = answer.elimination_reason.map(|r| r.as_str().to_string());
        let result = sqlx::query(
            "INSERT INTO user_answers
                (user_id, quiz_id, question_id, question_order, selected_option,
                 is_correct, response_time_ms, score, is_eliminated, elimination_reason)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(answer.user_id)
        .bind(answer.quiz_id)
        .bind(answer.question_id)
        .bind(answer.question_order)
        .bind(answer.selected_option)
        .bind(answer.is_correct)
        .bind(answer.response_time_ms)
        .bind(answer.score)
        .bind(answer.is_eliminated)
        .bind(reason)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::DuplicateAnswer {
                    user_id: answer.user_id,
                    question_id: answer.question_id,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_user_answer(
        &self,
        user_id: i64,
        quiz_id: i64,
        question_id: i64,
    ) -> Result<Option<UserAnswer>, StoreError> {
        let row = sqlx::query_as::<_, UserAnswerRow>(
            "SELECT user_id, quiz_id, question_id, question_order, selected_option,
                    is_correct, response_time_ms, score, is_eliminated, elimination_reason, created_at
             FROM user_answers WHERE user_id = $1 AND quiz_id = $2 AND question_id = $3",
        )
        .bind(user_id)
        .bind(quiz_id)
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(UserAnswer::try_from).transpose()
    }

    async fn answers_for_quiz(&self, quiz_id: i64) -> Result<Vec<UserAnswer>, StoreError> {
        let rows = sqlx::query_as::<_, UserAnswerRow>(
            "SELECT user_id, quiz_id, question_id, question_order, selected_option,
                    is_correct, response_time_ms, score, is_eliminated, elimination_reason, created_at
             FROM user_answers WHERE quiz_id = $1 ORDER BY question_order ASC, created_at ASC",
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(UserAnswer::try_from).collect()
    }

    async fn upsert_results(&self, results: Vec<QuizResult>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for r in results {
            let reason = r.elimination_reason.map(|e| e.as_str().to_string());
            sqlx::query(
                "INSERT INTO results
                    (user_id, quiz_id, score, correct_answers, total_questions, rank,
                     is_winner, prize_fund, is_eliminated, eliminated_on_question, elimination_reason)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                 ON CONFLICT (user_id, quiz_id) DO UPDATE SET
                    score = EXCLUDED.score,
                    correct_answers = EXCLUDED.correct_answers,
                    total_questions = EXCLUDED.total_questions,
                    rank = EXCLUDED.rank,
                    is_winner = EXCLUDED.is_winner,
                    prize_fund = EXCLUDED.prize_fund,
                    is_eliminated = EXCLUDED.is_eliminated,
                    eliminated_on_question = EXCLUDED.eliminated_on_question,
                    elimination_reason = EXCLUDED.elimination_reason",
            )
            .bind(r.user_id)
            .bind(r.quiz_id)
            .bind(r.score)
            .bind(r.correct_answers)
            .bind(r.total_questions)
            .bind(r.rank)
            .bind(r.is_winner)
            .bind(r.prize_fund)
            .bind(r.is_eliminated)
            .bind(r.eliminated_on_question)
            .bind(reason)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn results_for_quiz(&self, quiz_id: i64) -> Result<Vec<QuizResult>, StoreError> {
        let rows = sqlx::query_as::<_, QuizResultRow>(
            "SELECT user_id, quiz_id, score, correct_answers, total_questions, rank,
                    is_winner, prize_fund, is_eliminated, eliminated_on_question,
                    elimination_reason, completed_at
             FROM results WHERE quiz_id = $1 ORDER BY rank ASC",
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(QuizResult::try_from).collect()
    }

    async fn ad_slot_after(&self, quiz_id: i64, after_question_order: i32) -> Result<Option<AdSlot>, StoreError> {
        let row = sqlx::query_as::<_, AdSlotRow>(
            "SELECT quiz_id, after_question_order, asset_id, duration_sec
             FROM quiz_ad_slots WHERE quiz_id = $1 AND after_question_order = $2",
        )
        .bind(quiz_id)
        .bind(after_question_order)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AdSlot::from))
    }
}

// Parse helpers kept local since they depend on the wire-level enum
// representations chosen for storage (`status` as free text rather than a
// Postgres native enum, for painless future value additions).
pub(crate) fn parse_status(s: &str) -> QuizStatus {
    match s {
        "scheduled" => QuizStatus::Scheduled,
        "in_progress" => QuizStatus::InProgress,
        "completed" => QuizStatus::Completed,
        _ => QuizStatus::Cancelled,
    }
}

pub(crate) fn parse_source_mode(s: &str) -> QuestionSourceMode {
    match s {
        "admin_only" => QuestionSourceMode::AdminOnly,
        _ => QuestionSourceMode::Hybrid,
    }
}

pub(crate) fn parse_elimination_reason(s: &str) -> EliminationReason {
    match s {
        "time_exceeded" => EliminationReason::TimeExceeded,
        "no_answer_timeout" => EliminationReason::NoAnswerTimeout,
        _ => EliminationReason::IncorrectAnswer,
    }
}

pub(crate) fn options_from_json(v: serde_json::Value) -> Result<Vec<QuestionOption>, StoreError> {
    Ok(serde_json::from_value(v)?)
}
