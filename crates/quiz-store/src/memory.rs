use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use quiz_core::entity::{
    AdSlot, Question, QuestionSourceMode, Quiz, QuizQuestionHistoryEntry, QuizResult, QuizStatus,
    UserAnswer,
};

use crate::error::StoreError;
use crate::traits::Store;

/// In-memory [`Store`] test double.
///
/// Not conditionally compiled behind `cfg(test)` — like
/// `quiz_core::clock::MockClock`, it is ordinary library code so that
/// `quiz-orchestrator` and `quiz-answer`'s own test suites (in other
/// crates) can depend on it without a live Postgres instance, the same way
/// the pack's `Kaskade` scheduler integration test stands up an in-memory
/// SQL database rather than mocking the repository trait by hand.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    quizzes: HashMap<i64, Quiz>,
    questions: HashMap<i64, Question>,
    history: HashMap<i64, Vec<QuizQuestionHistoryEntry>>,
    answers: HashMap<(i64, i64, i64), UserAnswer>,
    results: HashMap<(i64, i64), QuizResult>,
    ad_slots: HashMap<(i64, i32), AdSlot>,
    any_in_progress: Option<i64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_quiz(&self, quiz: Quiz) {
        self.inner.lock().unwrap().quizzes.insert(quiz.id, quiz);
    }

    pub fn insert_question(&self, question: Question) {
        self.inner.lock().unwrap().questions.insert(question.id, question);
    }

    pub fn insert_ad_slot(&self, slot: AdSlot) {
        self.inner
            .lock()
            .unwrap()
            .ad_slots
            .insert((slot.quiz_id, slot.after_question_order), slot);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_quiz(&self, quiz_id: i64) -> Result<Option<Quiz>, StoreError> {
        Ok(self.inner.lock().unwrap().quizzes.get(&quiz_id).cloned())
    }

    async fn atomic_start(&self, quiz_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(other) = inner.any_in_progress {
            if other != quiz_id {
                return Err(StoreError::AnotherQuizInProgress);
            }
        }
        let quiz = inner
            .quizzes
            .get_mut(&quiz_id)
            .ok_or(StoreError::QuizNotFound(quiz_id))?;
        if quiz.status != QuizStatus::Scheduled {
            return Err(StoreError::QuizNotScheduled(quiz_id));
        }
        quiz.status = QuizStatus::InProgress;
        inner.any_in_progress = Some(quiz_id);
        Ok(())
    }

    async fn cancel_quiz(&self, quiz_id: i64, _reason: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.any_in_progress == Some(quiz_id) {
            inner.any_in_progress = None;
        }
        if let Some(quiz) = inner.quizzes.get_mut(&quiz_id) {
            if !quiz.status.is_terminal() {
                quiz.status = QuizStatus::Cancelled;
            }
        }
        Ok(())
    }

    async fn complete_quiz(&self, quiz_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.any_in_progress == Some(quiz_id) {
            inner.any_in_progress = None;
        }
        if let Some(quiz) = inner.quizzes.get_mut(&quiz_id) {
            quiz.status = QuizStatus::Completed;
        }
        Ok(())
    }

    async fn set_actual_question_count(&self, quiz_id: i64, count: i32) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(quiz) = inner.quizzes.get_mut(&quiz_id) {
            quiz.actual_question_count = Some(count);
        }
        Ok(())
    }

    async fn available_question_count(
        &self,
        quiz_id: i64,
        mode: QuestionSourceMode,
    ) -> Result<i64, StoreError> {
        let inner = self.inner.lock().unwrap();
        let count = inner
            .questions
            .values()
            .filter(|q| !q.is_used)
            .filter(|q| match mode {
                QuestionSourceMode::AdminOnly => q.quiz_id == Some(quiz_id),
                QuestionSourceMode::Hybrid => q.quiz_id == Some(quiz_id) || q.quiz_id.is_none(),
            })
            .count();
        Ok(count as i64)
    }

    async fn own_unused_questions(&self, quiz_id: i64, difficulty: i32) -> Result<Vec<Question>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<Question> = inner
            .questions
            .values()
            .filter(|q| q.quiz_id == Some(quiz_id) && q.difficulty == difficulty && !q.is_used)
            .cloned()
            .collect();
        out.sort_by_key(|q| q.id);
        Ok(out)
    }

    async fn pool_unused_questions(&self, difficulty: i32) -> Result<Vec<Question>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<Question> = inner
            .questions
            .values()
            .filter(|q| q.quiz_id.is_none() && q.difficulty == difficulty && !q.is_used)
            .cloned()
            .collect();
        out.sort_by_key(|q| q.id);
        Ok(out)
    }

    async fn pick_and_record_question(
        &self,
        quiz_id: i64,
        question_id: i64,
        question_order: i32,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(q) = inner.questions.get_mut(&question_id) {
            q.is_used = true;
        }
        inner.history.entry(quiz_id).or_default().push(QuizQuestionHistoryEntry {
            quiz_id,
            question_order,
            question_id,
            asked_at: Utc::now(),
        });
        Ok(())
    }

    async fn history(&self, quiz_id: i64) -> Result<Vec<QuizQuestionHistoryEntry>, StoreError> {
        Ok(self.inner.lock().unwrap().history.get(&quiz_id).cloned().unwrap_or_default())
    }

    async fn history_len(&self, quiz_id: i64) -> Result<i32, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .history
            .get(&quiz_id)
            .map(|h| h.len())
            .unwrap_or(0) as i32)
    }

    async fn insert_user_answer(&self, answer: UserAnswer) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let key = (answer.user_id, answer.quiz_id, answer.question_id);
        if inner.answers.contains_key(&key) {
            return Err(StoreError::DuplicateAnswer {
                user_id: answer.user_id,
                question_id: answer.question_id,
            });
        }
        inner.answers.insert(key, answer);
        Ok(())
    }

    async fn get_user_answer(
        &self,
        user_id: i64,
        quiz_id: i64,
        question_id: i64,
    ) -> Result<Option<UserAnswer>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .answers
            .get(&(user_id, quiz_id, question_id))
            .cloned())
    }

    async fn answers_for_quiz(&self, quiz_id: i64) -> Result<Vec<UserAnswer>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<UserAnswer> = inner
            .answers
            .values()
            .filter(|a| a.quiz_id == quiz_id)
            .cloned()
            .collect();
        out.sort_by_key(|a| (a.question_order, a.created_at));
        Ok(out)
    }

    async fn upsert_results(&self, results: Vec<QuizResult>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        for r in results {
            inner.results.insert((r.user_id, r.quiz_id), r);
        }
        Ok(())
    }

    async fn results_for_quiz(&self, quiz_id: i64) -> Result<Vec<QuizResult>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<QuizResult> = inner
            .results
            .values()
            .filter(|r| r.quiz_id == quiz_id)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.rank);
        Ok(out)
    }

    async fn ad_slot_after(&self, quiz_id: i64, after_question_order: i32) -> Result<Option<AdSlot>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .ad_slots
            .get(&(quiz_id, after_question_order))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::entity::QuestionOption;

    fn sample_quiz(id: i64) -> Quiz {
        Quiz {
            id,
            title: "Test".into(),
            description: String::new(),
            scheduled_time: Utc::now(),
            prize_fund: 300,
            status: QuizStatus::Scheduled,
            question_count: 2,
            actual_question_count: None,
            finish_on_zero_players: false,
            question_source_mode: QuestionSourceMode::Hybrid,
        }
    }

    fn sample_question(id: i64, quiz_id: Option<i64>, difficulty: i32) -> Question {
        Question {
            id,
            quiz_id,
            text: "q".into(),
            text_alt: None,
            options: vec![
                QuestionOption { id: 1, text: "a".into() },
                QuestionOption { id: 2, text: "b".into() },
            ],
            correct_option: 1,
            time_limit_sec: 10,
            point_value: 10,
            difficulty,
            is_used: false,
        }
    }

    #[tokio::test]
    async fn atomic_start_enforces_single_writer() {
        let store = MemoryStore::new();
        store.insert_quiz(sample_quiz(1));
        store.insert_quiz(sample_quiz(2));

        store.atomic_start(1).await.unwrap();
        let err = store.atomic_start(2).await.unwrap_err();
        assert!(matches!(err, StoreError::AnotherQuizInProgress));

        store.cancel_quiz(1, "test").await.unwrap();
        store.atomic_start(2).await.unwrap();
    }

    #[tokio::test]
    async fn atomic_start_rejects_non_scheduled() {
        let store = MemoryStore::new();
        store.insert_quiz(sample_quiz(1));
        store.atomic_start(1).await.unwrap();
        let err = store.atomic_start(1).await.unwrap_err();
        assert!(matches!(err, StoreError::QuizNotScheduled(_)));
    }

    #[tokio::test]
    async fn duplicate_answer_rejected() {
        let store = MemoryStore::new();
        let answer = UserAnswer {
            user_id: 1,
            quiz_id: 1,
            question_id: 10,
            question_order: 1,
            selected_option: Some(1),
            is_correct: true,
            response_time_ms: 500,
            score: 10,
            is_eliminated: false,
            elimination_reason: None,
            created_at: Utc::now(),
        };
        store.insert_user_answer(answer.clone()).await.unwrap();
        let err = store.insert_user_answer(answer).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateAnswer { .. }));
    }

    #[tokio::test]
    async fn pick_and_record_marks_used_and_appends_history() {
        let store = MemoryStore::new();
        store.insert_question(sample_question(5, None, 1));
        store.pick_and_record_question(1, 5, 1).await.unwrap();

        let pool = store.pool_unused_questions(1).await.unwrap();
        assert!(pool.is_empty());

        let history = store.history(1).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].question_id, 5);
        assert_eq!(store.history_len(1).await.unwrap(), 1);
    }
}
