use async_trait::async_trait;

/// Invoked when a quiz's start timer fires (T = `scheduled_time`).
///
/// Implemented by `quiz-orchestrator`'s registry; kept as a trait here so
/// this crate never depends on the orchestrator crate, the same way
/// `compute::scheduler::Scheduler` is generic over a `ComputeTask` it plugs
/// in rather than importing the task implementations it schedules.
#[async_trait]
pub trait StartTrigger: Send + Sync + 'static {
    async fn start_due(&self, quiz_id: i64);
}
