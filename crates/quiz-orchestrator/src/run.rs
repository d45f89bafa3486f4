use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tracing::{info, warn};

use quiz_cache::{keys, Cache};
use quiz_core::entity::{EliminationReason, QuizResult, QuizStatus, UserAnswer};
use quiz_core::Clock;
use quiz_hub::{Hub, QuestionOptionWire, ServerMessage};
use quiz_scoring::{is_winner, rank_users, split_prize, tally_answers, RankedUser};
use quiz_selector::{select_and_record, SelectorError};
use quiz_store::{Store, StoreError};

use crate::command::OrchestratorCommand;
use crate::error::OrchestratorError;
use crate::state::{ActiveQuestion, ActiveQuizState};

/// Fixed difficulty ceiling; `questions.difficulty` ranges `1..5` by
/// definition (§3), so the selector never needs a per-quiz override.
const MAX_DIFFICULTY: i32 = 5;

/// Everything one `run_quiz` task needs, handed to it once at spawn time
/// by [`crate::registry::OrchestratorRegistry`].
pub struct RunHandle {
    pub store: Arc<dyn Store>,
    pub cache: Arc<dyn Cache>,
    pub hub: Arc<Hub>,
    pub clock: Arc<dyn Clock>,
    pub active: Arc<RwLock<HashMap<i64, ActiveQuizState>>>,
    pub controls: Arc<RwLock<HashMap<i64, mpsc::Sender<OrchestratorCommand>>>>,
    pub question_grace_ms: i64,
    pub deterministic_seed: bool,
    pub admission_policy: quiz_answer::AdmissionPolicy,
    pub retain_remainder: bool,
}

/// One quiz's entire lifecycle from start trigger to teardown (§4.3). Runs
/// as its own supervisory task; nothing else ever mutates this quiz's
/// `ActiveQuizState` while this function is running.
pub async fn run_quiz(quiz_id: i64, ctx: RunHandle, mut commands: mpsc::Receiver<OrchestratorCommand>) {
    match run_quiz_inner(quiz_id, &ctx, &mut commands).await {
        Ok(()) => {}
        Err(OrchestratorError::Cancelled) => {
            let _ = ctx.store.cancel_quiz(quiz_id, "operator_cancelled").await;
            ctx.hub
                .broadcast_to_quiz(quiz_id, ServerMessage::QuizCancelled { reason: "operator_cancelled".into() })
                .await;
        }
        Err(e) => {
            warn!(quiz_id, error = %e, "quiz ended in error, cancelling");
            let _ = ctx.store.cancel_quiz(quiz_id, "internal_error").await;
            ctx.hub
                .broadcast_to_quiz(quiz_id, ServerMessage::QuizCancelled { reason: "internal_error".into() })
                .await;
        }
    }
    ctx.active.write().await.remove(&quiz_id);
    ctx.controls.write().await.remove(&quiz_id);
}

async fn run_quiz_inner(
    quiz_id: i64,
    ctx: &RunHandle,
    commands: &mut mpsc::Receiver<OrchestratorCommand>,
) -> Result<(), OrchestratorError> {
    match ctx.store.atomic_start(quiz_id).await {
        Ok(()) => {}
        Err(StoreError::AnotherQuizInProgress) | Err(StoreError::QuizNotScheduled(_)) => {
            return Err(OrchestratorError::Cancelled);
        }
        Err(e) => return Err(e.into()),
    }

    let quiz = ctx
        .store
        .get_quiz(quiz_id)
        .await?
        .ok_or(OrchestratorError::QuizNotFound(quiz_id))?;

    // Freeze the cohort: whoever sent `user:ready` before this line is a
    // participant for result computation, no matter who connects or drops
    // later (§4.3 step 2, §4.7 "frozen cohort").
    let participants: HashSet<i64> = ctx
        .cache
        .set_members(&keys::participants(quiz_id))
        .await?
        .into_iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    set_status(ctx, quiz_id, QuizStatus::InProgress).await;

    ctx.hub
        .broadcast_to_quiz(
            quiz_id,
            ServerMessage::QuizStart {
                quiz_id,
                title: quiz.title.clone(),
                question_count: quiz.question_count,
            },
        )
        .await;

    let mut live: HashSet<i64> = participants.clone();
    let seed: u64 = if ctx.deterministic_seed { 0 } else { quiz_id as u64 ^ ctx.clock.now_ms() as u64 };

    let mut asked = 0i32;

    for position in 1..=quiz.question_count {
        if live.is_empty() {
            info!(quiz_id, "exiting question loop: all participants eliminated");
            break;
        }
        if quiz.finish_on_zero_players {
            let connected = ctx.hub.connected_users_of(quiz_id).await;
            if !live.iter().any(|u| connected.contains(u)) {
                info!(quiz_id, "exiting question loop: zero connected players (finish_on_zero_players)");
                break;
            }
        }

        let question = match select_and_record(
            ctx.store.as_ref(),
            quiz_id,
            quiz.question_source_mode,
            position,
            quiz.question_count,
            MAX_DIFFICULTY,
            seed,
        )
        .await
        {
            Ok(q) => q,
            Err(SelectorError::NoQuestionAvailable(_)) => break,
            Err(e) => return Err(e.into()),
        };
        asked += 1;
        let question_order = ctx.store.history_len(quiz_id).await?;

        let opened_at = ctx.clock.now();
        let server_ts_ms = ctx.clock.now_ms();

        {
            let mut active = ctx.active.write().await;
            if let Some(state) = active.get_mut(&quiz_id) {
                state.current_question = Some(ActiveQuestion {
                    question: question.clone(),
                    question_order,
                    opened_at,
                });
            }
        }

        ctx.hub
            .broadcast_to_quiz(
                quiz_id,
                ServerMessage::QuizQuestion {
                    question_id: question.id,
                    number: position,
                    text: question.text.clone(),
                    text_alt: question.text_alt.clone(),
                    options: question
                        .options
                        .iter()
                        .map(|o| QuestionOptionWire { id: o.id, text: o.text.clone() })
                        .collect(),
                    time_limit_sec: question.time_limit_sec,
                    total_questions: quiz.question_count,
                    start_time_ms: server_ts_ms,
                    server_timestamp_ms: server_ts_ms,
                },
            )
            .await;

        let answered_key = keys::answered(quiz_id, question.id);
        let window = StdDuration::from_millis(question.time_limit_sec as u64 * 1000 + ctx.question_grace_ms.max(0) as u64);
        let deadline = Instant::now() + window;

        if !wait_for_answers_or_deadline(deadline, commands, ctx, &answered_key, live.len()).await {
            return Err(OrchestratorError::Cancelled);
        }

        let answered_set: HashSet<i64> = ctx
            .cache
            .set_members(&answered_key)
            .await?
            .into_iter()
            .filter_map(|s| s.parse().ok())
            .collect();

        let mut still_live = HashSet::new();
        for &user_id in &live {
            let eliminated_key = keys::eliminated(quiz_id, user_id);
            let mut eliminated = ctx.cache.get_flag(&eliminated_key).await?;

            if !eliminated && !answered_set.contains(&user_id) {
                let answer = UserAnswer {
                    user_id,
                    quiz_id,
                    question_id: question.id,
                    question_order,
                    selected_option: None,
                    is_correct: false,
                    response_time_ms: window.as_millis() as i64,
                    score: 0,
                    is_eliminated: true,
                    elimination_reason: Some(EliminationReason::NoAnswerTimeout),
                    created_at: ctx.clock.now(),
                };
                if let Err(e) = ctx.store.insert_user_answer(answer).await {
                    warn!(quiz_id, user_id, error = %e, "failed to persist no-answer elimination");
                }
                ctx.cache.set_flag(&eliminated_key, true, None).await?;
                let _ = ctx
                    .hub
                    .send_to_user(
                        user_id,
                        ServerMessage::QuizElimination { reason: EliminationReason::NoAnswerTimeout.as_str().into() },
                    )
                    .await;
                eliminated = true;
            }

            if !eliminated {
                still_live.insert(user_id);
            }
        }
        live = still_live;

        ctx.hub
            .broadcast_to_quiz(
                quiz_id,
                ServerMessage::QuizAnswerReveal { question_id: question.id, correct_option: question.correct_option },
            )
            .await;

        if let Some(slot) = ctx.store.ad_slot_after(quiz_id, question_order).await? {
            ctx.hub
                .broadcast_to_quiz(
                    quiz_id,
                    ServerMessage::QuizAdBreak { asset_id: slot.asset_id.clone(), duration_sec: slot.duration_sec },
                )
                .await;
            let ad_deadline = Instant::now() + StdDuration::from_secs(slot.duration_sec as u64);
            if !wait_cancellable(ad_deadline, commands).await {
                return Err(OrchestratorError::Cancelled);
            }
            ctx.hub.broadcast_to_quiz(quiz_id, ServerMessage::QuizAdBreakEnd {}).await;
        }

        if live.is_empty() {
            info!(quiz_id, "exiting question loop: all participants eliminated");
            break;
        }
        if quiz.finish_on_zero_players {
            let connected = ctx.hub.connected_users_of(quiz_id).await;
            if !live.iter().any(|u| connected.contains(u)) {
                info!(quiz_id, "exiting question loop: zero connected players (finish_on_zero_players)");
                break;
            }
        }
    }

    finish_quiz(quiz_id, ctx, asked).await?;
    Ok(())
}

/// Waits for the question deadline, polling every 200ms whether every
/// still-live participant has answered so a fully-answered question can
/// close early instead of idling out the full window (§5 suspension point
/// "deadline or all-answered signal, whichever first"). Returns `false` if
/// an admin cancel arrives first.
async fn wait_for_answers_or_deadline(
    deadline: Instant,
    commands: &mut mpsc::Receiver<OrchestratorCommand>,
    ctx: &RunHandle,
    answered_key: &str,
    live_count: usize,
) -> bool {
    if live_count == 0 {
        return true;
    }
    loop {
        if Instant::now() >= deadline {
            return true;
        }
        tokio::select! {
            biased;
            cmd = commands.recv() => {
                return matches!(cmd, None);
            }
            _ = tokio::time::sleep_until(deadline) => return true,
            _ = tokio::time::sleep(StdDuration::from_millis(200)) => {
                if let Ok(n) = ctx.cache.set_len(answered_key).await {
                    if n >= live_count {
                        return true;
                    }
                }
            }
        }
    }
}

/// Waits out a fixed-duration sleep (ad break), interruptible by cancel.
async fn wait_cancellable(deadline: Instant, commands: &mut mpsc::Receiver<OrchestratorCommand>) -> bool {
    tokio::select! {
        biased;
        cmd = commands.recv() => matches!(cmd, None),
        _ = tokio::time::sleep_until(deadline) => true,
    }
}

async fn set_status(ctx: &RunHandle, quiz_id: i64, status: QuizStatus) {
    let mut active = ctx.active.write().await;
    if let Some(state) = active.get_mut(&quiz_id) {
        state.status = status;
    }
}

/// §4.7: tally, rank, assign winners, split the prize, persist, broadcast.
async fn finish_quiz(quiz_id: i64, ctx: &RunHandle, asked: i32) -> Result<(), OrchestratorError> {
    ctx.store.set_actual_question_count(quiz_id, asked).await?;

    let answers = ctx.store.answers_for_quiz(quiz_id).await?;
    let tallies = tally_answers(&answers);
    let ranked: Vec<RankedUser> = rank_users(tallies);

    let winner_count = ranked.iter().filter(|r| is_winner(&r.tally, asked)).count() as i64;
    let quiz = ctx.store.get_quiz(quiz_id).await?.ok_or(OrchestratorError::QuizNotFound(quiz_id))?;
    let (per_winner, remainder) = split_prize(quiz.prize_fund, winner_count);

    let completed_at = ctx.clock.now();
    let results: Vec<QuizResult> = ranked
        .into_iter()
        .map(|r| {
            let wins = is_winner(&r.tally, asked);
            let mut prize = if wins { per_winner } else { 0 };
            if wins && !ctx.retain_remainder && r.rank == 1 {
                prize += remainder;
            }
            QuizResult {
                user_id: r.tally.user_id,
                quiz_id,
                score: r.tally.total_score,
                correct_answers: r.tally.correct_answers,
                total_questions: asked,
                rank: r.rank,
                is_winner: wins,
                prize_fund: prize,
                is_eliminated: r.tally.is_eliminated,
                eliminated_on_question: r.tally.eliminated_on_question,
                elimination_reason: r.tally.elimination_reason,
                completed_at,
            }
        })
        .collect();

    ctx.store.upsert_results(results).await?;
    ctx.store.complete_quiz(quiz_id).await?;

    info!(quiz_id, winner_count, asked, "quiz finished");

    ctx.hub.broadcast_to_quiz(quiz_id, ServerMessage::QuizFinish { quiz_id }).await;
    ctx.hub.broadcast_to_quiz(quiz_id, ServerMessage::QuizResultsAvailable { quiz_id }).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::entity::{Question, QuestionOption, QuestionSourceMode, Quiz, QuizStatus};
    use quiz_core::SystemClock;
    use quiz_cache::InMemoryCache;
    use quiz_hub::InMemoryTicketStore;
    use quiz_store::MemoryStore;

    fn hub_config() -> quiz_core::config::HubConfig {
        quiz_core::config::HubConfig {
            shard_count: 2,
            outbound_queue_depth: 16,
            heartbeat_interval_secs: 15,
            reap_after_secs: 38,
            hot_shard_load_fraction: 0.75,
            ticket_ttl_secs: 60,
            write_deadline_secs: 5,
            max_connections_per_shard: 64,
        }
    }

    fn question(id: i64, quiz_id: i64, correct: i32, time_limit_sec: i32, points: i32) -> Question {
        Question {
            id,
            quiz_id: Some(quiz_id),
            text: format!("q{id}"),
            text_alt: None,
            options: vec![
                QuestionOption { id: 1, text: "a".into() },
                QuestionOption { id: 2, text: "b".into() },
            ],
            correct_option: correct,
            time_limit_sec,
            point_value: points,
            difficulty: 1,
            is_used: false,
        }
    }

    fn quiz(id: i64, question_count: i32, prize_fund: i64) -> Quiz {
        Quiz {
            id,
            title: "Trivia Night".into(),
            description: String::new(),
            scheduled_time: chrono::Utc::now(),
            prize_fund,
            status: QuizStatus::Scheduled,
            question_count,
            actual_question_count: None,
            finish_on_zero_players: false,
            question_source_mode: QuestionSourceMode::Hybrid,
        }
    }

    fn handle(store: Arc<MemoryStore>, cache: Arc<InMemoryCache>, hub: Arc<Hub>) -> RunHandle {
        RunHandle {
            store,
            cache,
            hub,
            clock: Arc::new(SystemClock),
            active: Arc::new(RwLock::new(HashMap::new())),
            controls: Arc::new(RwLock::new(HashMap::new())),
            question_grace_ms: 0,
            deterministic_seed: true,
            admission_policy: quiz_answer::AdmissionPolicy::Strict,
            retain_remainder: true,
        }
    }

    #[tokio::test]
    async fn happy_path_three_players_two_questions() {
        let store = Arc::new(MemoryStore::new());
        let q = quiz(42, 2, 300);
        store.insert_quiz(q.clone());
        store.insert_question(question(1, 42, 1, 1, 10));
        store.insert_question(question(2, 42, 2, 1, 10));

        let cache = Arc::new(InMemoryCache::new());
        cache.set_add(&keys::participants(42), "1").await.unwrap();
        cache.set_add(&keys::participants(42), "2").await.unwrap();
        cache.set_add(&keys::participants(42), "3").await.unwrap();

        let hub = Arc::new(Hub::new(&hub_config(), Arc::new(InMemoryTicketStore::new())));
        for user_id in [1, 2, 3] {
            let (_h, _rx, _ctrl) = hub.register_client(user_id, "d".into(), 0).await;
            hub.subscribe_quiz(42, user_id).await;
        }

        let ctx = handle(store.clone(), cache.clone(), hub.clone());
        ctx.active.write().await.insert(42, ActiveQuizState::new(42));
        let (_tx, rx) = mpsc::channel(4);

        run_quiz(42, ctx, rx).await;

        let results = store.results_for_quiz(42).await.unwrap();
        assert_eq!(results.len(), 3);
        let winner = results.iter().find(|r| r.user_id == 1).unwrap();
        assert!(winner.is_winner);
        assert_eq!(winner.prize_fund, 300);

        let stored = store.get_quiz(42).await.unwrap().unwrap();
        assert_eq!(stored.status, QuizStatus::Completed);
        assert_eq!(stored.actual_question_count, Some(2));
    }

    #[tokio::test]
    async fn cancel_command_stops_the_quiz() {
        let store = Arc::new(MemoryStore::new());
        let q = quiz(7, 5, 100);
        store.insert_quiz(q.clone());
        store.insert_question(question(1, 7, 1, 30, 10));

        let cache = Arc::new(InMemoryCache::new());
        cache.set_add(&keys::participants(7), "9").await.unwrap();

        let hub = Arc::new(Hub::new(&hub_config(), Arc::new(InMemoryTicketStore::new())));
        let (_h, mut rx_msgs, _ctrl) = hub.register_client(9, "d".into(), 0).await;
        hub.subscribe_quiz(7, 9).await;

        let ctx = handle(store.clone(), cache.clone(), hub.clone());
        ctx.active.write().await.insert(7, ActiveQuizState::new(7));
        let (tx, rx) = mpsc::channel(4);

        let run_handle_task = tokio::spawn(run_quiz(7, ctx, rx));
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        tx.send(OrchestratorCommand::Cancel).await.unwrap();
        run_handle_task.await.unwrap();

        let stored = store.get_quiz(7).await.unwrap().unwrap();
        assert_eq!(stored.status, QuizStatus::Cancelled);

        let mut saw_cancel = false;
        while let Ok(msg) = rx_msgs.try_recv() {
            if matches!(msg, ServerMessage::QuizCancelled { .. }) {
                saw_cancel = true;
            }
        }
        assert!(saw_cancel);
    }

    #[tokio::test]
    async fn finish_on_zero_players_exits_early_when_cohort_never_connects() {
        let store = Arc::new(MemoryStore::new());
        let mut q = quiz(11, 5, 100);
        q.finish_on_zero_players = true;
        store.insert_quiz(q.clone());
        for id in 1..=5 {
            store.insert_question(question(id, 11, 1, 10, 10));
        }

        // User 3 sent `ready` (a frozen participant) but never opened a
        // socket, so the hub has no subscriber for this quiz at all.
        let cache = Arc::new(InMemoryCache::new());
        cache.set_add(&keys::participants(11), "3").await.unwrap();

        let hub = Arc::new(Hub::new(&hub_config(), Arc::new(InMemoryTicketStore::new())));

        let ctx = handle(store.clone(), cache.clone(), hub.clone());
        ctx.active.write().await.insert(11, ActiveQuizState::new(11));
        let (_tx, rx) = mpsc::channel(4);

        run_quiz(11, ctx, rx).await;

        let stored = store.get_quiz(11).await.unwrap().unwrap();
        assert_eq!(stored.status, QuizStatus::Completed);
        assert_eq!(stored.actual_question_count, Some(0), "loop must exit before asking any question");
    }

    #[tokio::test]
    async fn finish_on_zero_players_false_keeps_running_without_any_socket() {
        let store = Arc::new(MemoryStore::new());
        let q = quiz(12, 1, 100);
        store.insert_quiz(q.clone());
        store.insert_question(question(1, 12, 1, 1, 10));

        let cache = Arc::new(InMemoryCache::new());
        cache.set_add(&keys::participants(12), "3").await.unwrap();

        let hub = Arc::new(Hub::new(&hub_config(), Arc::new(InMemoryTicketStore::new())));

        let ctx = handle(store.clone(), cache.clone(), hub.clone());
        ctx.active.write().await.insert(12, ActiveQuizState::new(12));
        let (_tx, rx) = mpsc::channel(4);

        run_quiz(12, ctx, rx).await;

        let stored = store.get_quiz(12).await.unwrap().unwrap();
        assert_eq!(stored.status, QuizStatus::Completed);
        assert_eq!(stored.actual_question_count, Some(1), "disabled flag must still ask the question");
    }
}
