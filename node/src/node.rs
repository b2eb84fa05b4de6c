//! Full node implementation

use crate::api::start_api_server;
use crate::runtime::NodeRuntime;
use d21_core::{NodeConfig, SharedClock, SystemClock};
use d21_election::ElectionSetup;
use d21_store::open_store;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, error, info};

/// Full D21 node
pub struct D21Node {
    config: NodeConfig,
    clock: SharedClock,
    setup: Option<ElectionSetup>,
}

impl D21Node {
    /// Create a new node
    pub fn new(config: NodeConfig, clock: SharedClock, setup: Option<ElectionSetup>) -> Self {
        Self {
            config,
            clock,
            setup,
        }
    }

    /// Open storage, restore elections and apply the setup document if any
    pub async fn init(&self) -> anyhow::Result<Arc<NodeRuntime>> {
        let store = open_store(&self.config)?;
        let runtime = Arc::new(NodeRuntime::new(
            self.config.clone(),
            self.clock.clone(),
            store,
        ));

        let restored = runtime.restore_elections().await?;

        // The setup only bootstraps an empty node
        if let Some(setup) = &self.setup {
            if restored > 0 {
                info!(
                    "Skipping election setup, {} elections restored from storage",
                    restored
                );
                return Ok(runtime);
            }

            let election = runtime.open_setup(setup).await?;
            info!(
                "Opened election {} with {} subjects and {} voters, closes {}",
                election.id(),
                election.subject_count(),
                election.voter_count(),
                election.deadline().to_rfc3339()
            );
        }

        Ok(runtime)
    }

    /// Start the node
    pub async fn start(&self) -> anyhow::Result<()> {
        info!("Starting D21 node {}...", self.config.name);

        let runtime = self.init().await?;

        // Event accounting
        let event_handle = runtime.take_event_receiver().map(|mut events| {
            let runtime = runtime.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    debug!("Election event: {:?}", event);
                    runtime.record_event(&event);
                }
            })
        });

        // Start API server
        let api_handle = if self.config.api.enabled {
            let api_runtime = runtime.clone();
            let api_addr = self.config.api.listen_addr.clone();

            Some(tokio::spawn(async move {
                if let Err(e) = start_api_server(api_runtime, &api_addr).await {
                    error!("API server error: {}", e);
                }
            }))
        } else {
            None
        };

        let stats = runtime.stats();
        info!("Node started successfully");
        info!(
            "Hosting {} elections ({} open)",
            stats.elections, stats.open_elections
        );

        // Wait for shutdown signal
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping node...");
            }
            Err(e) => {
                error!("Error waiting for shutdown signal: {}", e);
            }
        }

        // Cleanup
        if let Some(handle) = api_handle {
            handle.abort();
        }
        if let Some(handle) = event_handle {
            handle.abort();
        }

        info!("Node stopped");

        Ok(())
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }
}

/// Node builder for easier configuration
pub struct NodeBuilder {
    config: NodeConfig,
    clock: SharedClock,
    setup: Option<ElectionSetup>,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self {
            config: NodeConfig::default(),
            clock: Arc::new(SystemClock::new()),
            setup: None,
        }
    }

    pub fn config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn setup(mut self, setup: ElectionSetup) -> Self {
        self.setup = Some(setup);
        self
    }

    pub fn api_addr(mut self, addr: &str) -> Self {
        self.config.api.listen_addr = addr.to_string();
        self
    }

    pub fn data_dir(mut self, dir: PathBuf) -> Self {
        self.config.data_dir = dir;
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.config.storage.persistent = persistent;
        self
    }

    pub fn voting_duration_secs(mut self, secs: u64) -> Self {
        self.config.election = self.config.election.with_duration_secs(secs);
        self
    }

    pub fn build(self) -> D21Node {
        D21Node::new(self.config, self.clock, self.setup)
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use d21_core::{Address, ManualClock, SubjectId, Timestamp};
    use d21_election::Polarity;

    #[tokio::test]
    async fn test_init_opens_setup() {
        let admin = Address([0xAD; 32]);
        let voter = Address([1u8; 32]);
        let setup = ElectionSetup::new(&admin)
            .add_subject("A")
            .add_subject("B")
            .add_voter(&voter)
            .with_duration_secs(120);

        let node = NodeBuilder::new()
            .clock(Arc::new(ManualClock::new(Timestamp::from_secs(50))))
            .setup(setup)
            .build();
        let runtime = node.init().await.unwrap();

        let ids = runtime.election_ids();
        assert_eq!(ids.len(), 1);
        let election = runtime.election(ids[0]).unwrap();
        assert_eq!(election.subject_count(), 2);
        assert!(election.is_eligible_voter(&voter));
        assert_eq!(election.deadline(), Timestamp::from_secs(170));

        runtime
            .cast_vote(ids[0], voter, SubjectId::new(1), Polarity::Positive)
            .await
            .unwrap();
        assert_eq!(election.get_results()[0].name, "B");
    }

    #[tokio::test]
    async fn test_init_restores_persistent_elections() {
        let tmp = tempfile::TempDir::new().unwrap();
        let clock: SharedClock = Arc::new(ManualClock::new(Timestamp::from_secs(50)));
        let setup = ElectionSetup::new(&Address([0xAD; 32])).add_subject("A");

        let first = NodeBuilder::new()
            .clock(clock.clone())
            .data_dir(tmp.path().to_path_buf())
            .persistent(true)
            .setup(setup)
            .build();
        let id = first.init().await.unwrap().election_ids()[0];

        let second = NodeBuilder::new()
            .clock(clock)
            .data_dir(tmp.path().to_path_buf())
            .persistent(true)
            .build();
        let runtime = second.init().await.unwrap();
        assert_eq!(runtime.election_ids(), vec![id]);
    }

    #[tokio::test]
    async fn test_setup_applied_once_across_restarts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let clock: SharedClock = Arc::new(ManualClock::new(Timestamp::from_secs(50)));
        let setup = ElectionSetup::new(&Address([0xAD; 32]))
            .add_subject("A")
            .add_subject("B");

        let mut first_id = None;
        for _ in 0..3 {
            let node = NodeBuilder::new()
                .clock(clock.clone())
                .data_dir(tmp.path().to_path_buf())
                .persistent(true)
                .setup(setup.clone())
                .build();
            let ids = node.init().await.unwrap().election_ids();

            assert_eq!(ids.len(), 1);
            assert_eq!(*first_id.get_or_insert(ids[0]), ids[0]);
        }
    }

    #[test]
    fn test_builder_overrides() {
        let node = NodeBuilder::new()
            .api_addr("0.0.0.0:9000")
            .voting_duration_secs(60)
            .build();
        assert_eq!(node.config().api.listen_addr, "0.0.0.0:9000");
        assert_eq!(node.config().election.voting_duration_secs, 60);
    }
}
