use chrono::{DateTime, Utc};

use quiz_core::entity::{
    AdSlot, Question, Quiz, QuizResult, UserAnswer,
};

use crate::error::StoreError;
use crate::pg::{options_from_json, parse_elimination_reason, parse_source_mode, parse_status};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QuizRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub scheduled_time: DateTime<Utc>,
    pub prize_fund: i64,
    pub status: String,
    pub question_count: i32,
    pub actual_question_count: Option<i32>,
    pub finish_on_zero_players: bool,
    pub question_source_mode: String,
}

impl From<QuizRow> for Quiz {
    fn from(r: QuizRow) -> Self {
        Quiz {
            id: r.id,
            title: r.title,
            description: r.description,
            scheduled_time: r.scheduled_time,
            prize_fund: r.prize_fund,
            status: parse_status(&r.status),
            question_count: r.question_count,
            actual_question_count: r.actual_question_count,
            finish_on_zero_players: r.finish_on_zero_players,
            question_source_mode: parse_source_mode(&r.question_source_mode),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QuestionRow {
    pub id: i64,
    pub quiz_id: Option<i64>,
    pub text: String,
    pub text_alt: Option<String>,
    pub options: serde_json::Value,
    pub correct_option: i32,
    pub time_limit_sec: i32,
    pub point_value: i32,
    pub difficulty: i32,
    pub is_used: bool,
}

impl TryFrom<QuestionRow> for Question {
    type Error = StoreError;

    fn try_from(r: QuestionRow) -> Result<Self, Self::Error> {
        Ok(Question {
            id: r.id,
            quiz_id: r.quiz_id,
            text: r.text,
            text_alt: r.text_alt,
            options: options_from_json(r.options)?,
            correct_option: r.correct_option,
            time_limit_sec: r.time_limit_sec,
            point_value: r.point_value,
            difficulty: r.difficulty,
            is_used: r.is_used,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserAnswerRow {
    pub user_id: i64,
    pub quiz_id: i64,
    pub question_id: i64,
    pub question_order: i32,
    pub selected_option: Option<i32>,
    pub is_correct: bool,
    pub response_time_ms: i64,
    pub score: i32,
    pub is_eliminated: bool,
    pub elimination_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<UserAnswerRow> for UserAnswer {
    type Error = StoreError;

    fn try_from(r: UserAnswerRow) -> Result<Self, Self::Error> {
        Ok(UserAnswer {
            user_id: r.user_id,
            quiz_id: r.quiz_id,
            question_id: r.question_id,
            question_order: r.question_order,
            selected_option: r.selected_option,
            is_correct: r.is_correct,
            response_time_ms: r.response_time_ms,
            score: r.score,
            is_eliminated: r.is_eliminated,
            elimination_reason: r.elimination_reason.as_deref().map(parse_elimination_reason),
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QuizResultRow {
    pub user_id: i64,
    pub quiz_id: i64,
    pub score: i32,
    pub correct_answers: i32,
    pub total_questions: i32,
    pub rank: i32,
    pub is_winner: bool,
    pub prize_fund: i64,
    pub is_eliminated: bool,
    pub eliminated_on_question: Option<i32>,
    pub elimination_reason: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl TryFrom<QuizResultRow> for QuizResult {
    type Error = StoreError;

    fn try_from(r: QuizResultRow) -> Result<Self, Self::Error> {
        Ok(QuizResult {
            user_id: r.user_id,
            quiz_id: r.quiz_id,
            score: r.score,
            correct_answers: r.correct_answers,
            total_questions: r.total_questions,
            rank: r.rank,
            is_winner: r.is_winner,
            prize_fund: r.prize_fund,
            is_eliminated: r.is_eliminated,
            eliminated_on_question: r.eliminated_on_question,
            elimination_reason: r.elimination_reason.as_deref().map(parse_elimination_reason),
            completed_at: r.completed_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdSlotRow {
    pub quiz_id: i64,
    pub after_question_order: i32,
    pub asset_id: String,
    pub duration_sec: i32,
}

impl From<AdSlotRow> for AdSlot {
    fn from(r: AdSlotRow) -> Self {
        AdSlot {
            quiz_id: r.quiz_id,
            after_question_order: r.after_question_order,
            asset_id: r.asset_id,
            duration_sec: r.duration_sec as u32,
        }
    }
}
