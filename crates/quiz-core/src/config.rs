use std::env;

use serde::{Deserialize, Serialize};

/// Load a `.env` file if present (silently ignores a missing one).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries `{PROFILE}_{KEY}` first, falls back to `{KEY}`.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{profile}_{key}");
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_i64(profile: &str, key: &str, default: i64) -> i64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub hub: HubConfig,
    pub scheduler: SchedulerConfig,
    pub selector: SelectorConfig,
    pub prize: PrizeConfig,
    pub answer: AnswerConfig,
}

impl Config {
    /// Build config from environment variables (call [`load_dotenv`] first).
    /// Profile is read from `QUIZ_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("QUIZ_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            postgres: PostgresConfig::from_env_profiled(p),
            hub: HubConfig::from_env_profiled(p),
            scheduler: SchedulerConfig::from_env_profiled(p),
            selector: SelectorConfig::from_env_profiled(p),
            prize: PrizeConfig::from_env_profiled(p),
            answer: AnswerConfig::from_env_profiled(p),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_host: String,
    pub bind_port: u16,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            bind_host: profiled_env_or(p, "BIND_HOST", "0.0.0.0"),
            bind_port: profiled_env_u16(p, "BIND_PORT", 8080),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub pg_url: Option<String>,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            pg_url: profiled_env_opt(p, "PG_URL"),
        }
    }

    pub fn database_url(&self) -> String {
        self.pg_url
            .clone()
            .unwrap_or_else(|| "postgres://localhost/quiz".to_string())
    }
}

/// Sharded WebSocket hub tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Number of shards clients are partitioned across by `hash(user_id) % shard_count`.
    pub shard_count: u32,
    /// Bounded outbound queue depth per client before it is considered slow.
    pub outbound_queue_depth: usize,
    /// Seconds between `server:heartbeat` emissions.
    pub heartbeat_interval_secs: u64,
    /// Seconds of inbound inactivity before a client is reaped (typically 2.5x heartbeat).
    pub reap_after_secs: u64,
    /// Hot-shard alert threshold as a fraction of shard capacity (0..1).
    pub hot_shard_load_fraction: f64,
    /// Ticket lifetime in seconds (single-use, short-lived).
    pub ticket_ttl_secs: u64,
    /// Socket write deadline in seconds.
    pub write_deadline_secs: u64,
    /// Connection ceiling per shard; the denominator for
    /// `ShardStats::load_percentage` and the hot-shard threshold (§4.8/§4.10).
    pub max_connections_per_shard: usize,
}

impl HubConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            shard_count: profiled_env_u32(p, "HUB_SHARD_COUNT", 16),
            outbound_queue_depth: profiled_env_u32(p, "HUB_QUEUE_DEPTH", 256) as usize,
            heartbeat_interval_secs: profiled_env_u64(p, "HUB_HEARTBEAT_SECS", 15),
            reap_after_secs: profiled_env_u64(p, "HUB_REAP_SECS", 38),
            hot_shard_load_fraction: profiled_env_opt(p, "HUB_HOT_SHARD_FRACTION")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.75),
            ticket_ttl_secs: profiled_env_u64(p, "HUB_TICKET_TTL_SECS", 60),
            write_deadline_secs: profiled_env_u64(p, "HUB_WRITE_DEADLINE_SECS", 5),
            max_connections_per_shard: profiled_env_u32(p, "HUB_MAX_CONNECTIONS_PER_SHARD", 2048) as usize,
        }
    }
}

/// Lifecycle timer gaps relative to `scheduled_time` (T).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// T - announce_gap: when `quiz:announced` style bookkeeping begins.
    pub announce_gap_secs: i64,
    /// T - lobby_gap: when the lobby opens for `user:ready`.
    pub lobby_gap_secs: i64,
    /// T - countdown_window: when the countdown loop starts ticking.
    pub countdown_window_secs: i64,
    /// Minimum horizon required between `Schedule()` and `scheduled_time`.
    pub min_schedule_horizon_secs: i64,
    /// Extra grace added to each question's deadline to absorb network jitter.
    pub question_grace_ms: i64,
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            announce_gap_secs: profiled_env_i64(p, "SCHED_ANNOUNCE_GAP_SECS", 3600),
            lobby_gap_secs: profiled_env_i64(p, "SCHED_LOBBY_GAP_SECS", 300),
            countdown_window_secs: profiled_env_i64(p, "SCHED_COUNTDOWN_WINDOW_SECS", 10),
            min_schedule_horizon_secs: profiled_env_i64(p, "SCHED_MIN_HORIZON_SECS", 60),
            question_grace_ms: profiled_env_i64(p, "SCHED_QUESTION_GRACE_MS", 800),
        }
    }
}

/// Adaptive selector tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Whether randomization is reproducible per-quiz (seeded by quiz id) or
    /// time-seeded for cross-cohort diversity. See spec.md Open Questions.
    pub deterministic_per_quiz: bool,
}

impl SelectorConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            deterministic_per_quiz: profiled_env_or(p, "SELECTOR_DETERMINISTIC", "true")
                .parse()
                .unwrap_or(true),
        }
    }
}

/// Prize-split policy (spec.md Open Questions: remainder disposition).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrizeConfig {
    /// If true, any remainder from integer division is retained by the house.
    /// If false, it is awarded to the rank-1 winner. Default: retained.
    pub retain_remainder: bool,
}

impl PrizeConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            retain_remainder: profiled_env_or(p, "PRIZE_RETAIN_REMAINDER", "true")
                .parse()
                .unwrap_or(true),
        }
    }
}

/// Answer-pipeline admission policy (spec.md Open Questions: a participant
/// not in the frozen set may be rejected, or auto-admitted on their first
/// valid answer — fixed per deployment, not per quiz).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerConfig {
    /// If true, a user outside the frozen participants set is rejected with
    /// `NotAParticipant`. If false, their first valid answer admits them.
    pub strict_admission: bool,
}

impl AnswerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            strict_admission: profiled_env_or(p, "ANSWER_STRICT_ADMISSION", "true")
                .parse()
                .unwrap_or(true),
        }
    }
}
