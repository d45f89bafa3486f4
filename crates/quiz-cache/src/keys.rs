//! Namespaced cache key builders (§6.3).
//!
//! Centralized so that no call site hand-assembles a key string — renaming a
//! namespace is a one-line change here instead of a grep-and-replace.

pub fn participants(quiz_id: i64) -> String {
    format!("quiz:{quiz_id}:participants")
}

pub fn eliminated(quiz_id: i64, user_id: i64) -> String {
    format!("quiz:{quiz_id}:user:{user_id}:eliminated")
}

pub fn answered(quiz_id: i64, question_id: i64) -> String {
    format!("quiz:{quiz_id}:q:{question_id}:answered")
}

pub fn rate_limit(scope: &str) -> String {
    format!("rl:{scope}")
}

pub fn start_lock(quiz_id: i64) -> String {
    format!("quiz:{quiz_id}:start_lock")
}
