use std::time::Duration;

/// How many nodes are up versus how many acknowledgments a write asks for.
#[derive(Debug, Clone, Copy)]
pub struct QuorumScenario {
    pub live_nodes: usize,
    pub replicas: usize,
    pub timeout: Duration,
}

pub const ALL_LIVE: QuorumScenario = QuorumScenario {
    live_nodes: 3,
    replicas: 3,
    timeout: Duration::from_secs(1),
};

/// One node short of the requested quorum.
pub const DEGRADED: QuorumScenario = QuorumScenario {
    live_nodes: 2,
    replicas: 3,
    timeout: Duration::from_millis(500),
};

impl QuorumScenario {
    pub fn expects_quorum(&self) -> bool {
        self.live_nodes >= self.replicas
    }
}
