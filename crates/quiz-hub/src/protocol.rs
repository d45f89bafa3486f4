//! Wire protocol (§6.1). Frame envelope is `{ "type": <string>, "data": <object> }`;
//! all timestamps are integer milliseconds since epoch, server-authoritative.

use serde::{Deserialize, Serialize};

/// Inbound, client → server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "user:ready")]
    Ready { quiz_id: i64 },
    #[serde(rename = "user:answer")]
    Answer {
        question_id: i64,
        selected_option: i32,
        timestamp: i64,
    },
    #[serde(rename = "user:heartbeat")]
    Heartbeat {},
    #[serde(rename = "user:resync")]
    Resync { quiz_id: i64 },
}

/// Outbound, server → client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "quiz:start")]
    QuizStart {
        quiz_id: i64,
        title: String,
        question_count: i32,
    },
    #[serde(rename = "quiz:countdown")]
    QuizCountdown { seconds_remaining: i64 },
    #[serde(rename = "quiz:question")]
    QuizQuestion {
        question_id: i64,
        number: i32,
        text: String,
        text_alt: Option<String>,
        options: Vec<QuestionOptionWire>,
        time_limit_sec: i32,
        total_questions: i32,
        start_time_ms: i64,
        server_timestamp_ms: i64,
    },
    #[serde(rename = "quiz:timer")]
    QuizTimer { seconds_remaining: i64 },
    #[serde(rename = "quiz:answer_result")]
    QuizAnswerResult {
        question_id: i64,
        is_correct: bool,
        score: i32,
        is_eliminated: bool,
    },
    #[serde(rename = "quiz:answer_reveal")]
    QuizAnswerReveal { question_id: i64, correct_option: i32 },
    #[serde(rename = "quiz:elimination")]
    QuizElimination { reason: String },
    #[serde(rename = "quiz:finish")]
    QuizFinish { quiz_id: i64 },
    #[serde(rename = "quiz:results_available")]
    QuizResultsAvailable { quiz_id: i64 },
    #[serde(rename = "quiz:state")]
    QuizState {
        quiz_id: i64,
        current_question_id: Option<i64>,
        seconds_remaining: Option<i64>,
        score: i32,
        is_eliminated: bool,
    },
    #[serde(rename = "quiz:ad_break")]
    QuizAdBreak { asset_id: String, duration_sec: u32 },
    #[serde(rename = "quiz:ad_break_end")]
    QuizAdBreakEnd {},
    #[serde(rename = "quiz:player_count")]
    QuizPlayerCount { count: usize },
    #[serde(rename = "quiz:user_ready")]
    QuizUserReady { user_id: i64 },
    #[serde(rename = "quiz:cancelled")]
    QuizCancelled { reason: String },
    #[serde(rename = "server:heartbeat")]
    ServerHeartbeat {},
    #[serde(rename = "server:error")]
    ServerError { message: String },
    #[serde(rename = "TOKEN_EXPIRE_SOON")]
    TokenExpireSoon {},
    #[serde(rename = "TOKEN_EXPIRED")]
    TokenExpired {},
    #[serde(rename = "session_revoked")]
    SessionRevoked {},
    #[serde(rename = "logout_all_devices")]
    LogoutAllDevices {},
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionOptionWire {
    pub id: i32,
    pub text: String,
}

/// Close codes (§6.1).
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const POLICY_VIOLATION: u16 = 1008;
    pub const SERVER_RECONNECT: u16 = 4001;
}
