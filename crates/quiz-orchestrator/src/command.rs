/// Admin commands delivered to a running quiz's supervisory task (§5:
/// "waiting on admin commands ... on the orchestrator's command channel").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorCommand {
    Cancel,
}
