//! Proposal lifecycle driver.
//!
//! Each tick scans `SetupVote` events in `[next_from, head]`, then checks
//! every tracked proposal: once the deadline block is reached, or the used
//! voting weight meets the configured threshold, the member tallies and the
//! proposal is retired. Proposals are evaluated concurrently and a failure on
//! one never holds up the others.

use std::collections::BTreeMap;
use std::fmt;

use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use zkvote_ledger::{Ledger, LedgerError, PollPolicy};
use zkvote_types::ProposalId;

use crate::tally::{TallyEngine, TallyError, TallyOutcome};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Reading {what} failed: {source}")]
    Ledger {
        what: &'static str,
        #[source]
        source: LedgerError,
    },
}

impl OrchestratorError {
    pub fn is_transient(&self) -> bool {
        match self {
            OrchestratorError::Ledger { source, .. } => source.is_transient(),
        }
    }
}

/// Configuration for the orchestrator loop.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// First block scanned for `SetupVote` events
    pub start_block: u64,
    /// Tick interval for the event scan
    pub event_poll: PollPolicy,
    /// Tally early once this much voting weight has been used
    pub vote_weight_threshold: Option<u64>,
    /// Tally attempts per proposal before it is dropped
    pub max_tally_attempts: u32,
    /// Stop after this many ticks; `None` runs until an error
    pub max_ticks: Option<u32>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            start_block: 0,
            event_poll: PollPolicy::events(),
            vote_weight_threshold: None,
            max_tally_attempts: 10,
            max_ticks: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalPhase {
    Discovered,
    AwaitingThresholdOrDeadline,
    TallyTriggered,
    Done,
}

impl fmt::Display for ProposalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProposalPhase::Discovered => "discovered",
            ProposalPhase::AwaitingThresholdOrDeadline => "awaiting threshold or deadline",
            ProposalPhase::TallyTriggered => "tally triggered",
            ProposalPhase::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct TrackedProposal {
    pub proposal_id: ProposalId,
    pub end_block: u64,
    pub phase: ProposalPhase,
    pub attempts: u32,
}

/// What a single tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub head: u64,
    pub discovered: Vec<ProposalId>,
    pub completed: Vec<(ProposalId, TallyOutcome)>,
    pub failed: Vec<ProposalId>,
}

enum Step {
    Waiting,
    Tallied(TallyOutcome),
    Failed(TallyError),
}

pub struct Orchestrator<L> {
    engine: TallyEngine<L>,
    config: OrchestratorConfig,
    next_from: u64,
    tracked: BTreeMap<ProposalId, TrackedProposal>,
}

impl<L: Ledger> Orchestrator<L> {
    pub fn new(engine: TallyEngine<L>, config: OrchestratorConfig) -> Self {
        Self {
            engine,
            next_from: config.start_block,
            config,
            tracked: BTreeMap::new(),
        }
    }

    pub fn tracked(&self) -> impl Iterator<Item = &TrackedProposal> {
        self.tracked.values()
    }

    fn read_err(what: &'static str) -> impl FnOnce(LedgerError) -> OrchestratorError {
        move |source| OrchestratorError::Ledger { what, source }
    }

    async fn discover(&mut self, head: u64) -> Result<Vec<ProposalId>, OrchestratorError> {
        if head < self.next_from {
            return Ok(Vec::new());
        }
        let events = self
            .engine
            .ledger()
            .setup_vote_events(self.next_from, head)
            .await
            .map_err(Self::read_err("setup vote events"))?;
        self.next_from = head + 1;

        let mut discovered = Vec::new();
        for event in events {
            if self.tracked.contains_key(&event.proposal_id) {
                continue;
            }
            info!(
                proposal_id = event.proposal_id,
                end_block = event.end_block,
                block = event.block_number,
                "proposal discovered"
            );
            self.tracked.insert(
                event.proposal_id,
                TrackedProposal {
                    proposal_id: event.proposal_id,
                    end_block: event.end_block,
                    phase: ProposalPhase::Discovered,
                    attempts: 0,
                },
            );
            discovered.push(event.proposal_id);
        }
        Ok(discovered)
    }

    async fn triggered(&self, proposal: &TrackedProposal, head: u64) -> Result<bool, TallyError> {
        if head >= proposal.end_block {
            debug!(proposal_id = proposal.proposal_id, head, "deadline reached");
            return Ok(true);
        }
        let Some(threshold) = self.config.vote_weight_threshold else {
            return Ok(false);
        };
        let used = self
            .engine
            .ledger()
            .voting_weight_used(proposal.proposal_id)
            .await
            .map_err(|source| TallyError::Ledger {
                proposal_id: proposal.proposal_id,
                source,
            })?;
        if used >= threshold {
            debug!(proposal_id = proposal.proposal_id, used, threshold, "weight threshold reached");
        }
        Ok(used >= threshold)
    }

    async fn step(&self, proposal: &TrackedProposal, head: u64) -> Step {
        match self.triggered(proposal, head).await {
            Ok(false) => Step::Waiting,
            Ok(true) => match self.engine.tally(proposal.proposal_id).await {
                Ok(outcome) => Step::Tallied(outcome),
                Err(err) => Step::Failed(err),
            },
            Err(err) => Step::Failed(err),
        }
    }

    /// Scan for new proposals and advance every tracked one.
    pub async fn tick(&mut self) -> Result<TickReport, OrchestratorError> {
        let head = self
            .engine
            .ledger()
            .block_number()
            .await
            .map_err(Self::read_err("block number"))?;
        let discovered = self.discover(head).await?;

        let proposals: Vec<TrackedProposal> = self.tracked.values().cloned().collect();
        let steps = join_all(proposals.iter().map(|p| self.step(p, head))).await;

        let mut report = TickReport {
            head,
            discovered,
            ..TickReport::default()
        };
        for (proposal, step) in proposals.into_iter().zip(steps) {
            let id = proposal.proposal_id;
            match step {
                Step::Waiting => {
                    if let Some(tracked) = self.tracked.get_mut(&id) {
                        tracked.phase = ProposalPhase::AwaitingThresholdOrDeadline;
                    }
                }
                Step::Tallied(outcome) => {
                    self.tracked.remove(&id);
                    info!(proposal_id = id, ?outcome, phase = %ProposalPhase::Done, "proposal retired");
                    report.completed.push((id, outcome));
                }
                Step::Failed(err) => {
                    let Some(tracked) = self.tracked.get_mut(&id) else {
                        continue;
                    };
                    tracked.phase = ProposalPhase::TallyTriggered;
                    tracked.attempts += 1;
                    if err.is_retryable() && tracked.attempts < self.config.max_tally_attempts {
                        warn!(proposal_id = id, attempt = tracked.attempts, error = %err, "tally failed, retrying next tick");
                    } else {
                        error!(proposal_id = id, attempts = tracked.attempts, error = %err, "tally failed, dropping proposal");
                        self.tracked.remove(&id);
                        report.failed.push(id);
                    }
                }
            }
        }
        Ok(report)
    }

    /// Tick until `max_ticks` is reached or a non-transient ledger read fails.
    pub async fn run(&mut self) -> Result<(), OrchestratorError> {
        let mut ticks = 0u32;
        loop {
            match self.tick().await {
                Ok(report) => debug!(
                    head = report.head,
                    tracked = self.tracked.len(),
                    completed = report.completed.len(),
                    "tick"
                ),
                Err(err) if err.is_transient() => warn!(error = %err, "tick failed"),
                Err(err) => return Err(err),
            }
            ticks += 1;
            if self.config.max_ticks.is_some_and(|max| ticks >= max) {
                return Ok(());
            }
            tokio::time::sleep(self.config.event_poll.interval).await;
        }
    }
}

/// Wait until `threshold` voting weight has been used on `proposal_id`,
/// returning the weight observed.
pub async fn wait_for_votes<L: Ledger + ?Sized>(
    ledger: &L,
    proposal_id: ProposalId,
    threshold: u64,
    poll: &PollPolicy,
) -> Result<u64, LedgerError> {
    poll.wait_for("vote weight threshold", || async move {
        let used = ledger.voting_weight_used(proposal_id).await?;
        Ok((used >= threshold).then_some(used))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{quick_poll, Fixture};
    use zkvote_ledger::RetryPolicy;
    use std::time::Duration;
    use zkvote_types::VoteChoice;

    fn quick_config() -> OrchestratorConfig {
        OrchestratorConfig {
            event_poll: PollPolicy::events().with_interval(Duration::from_millis(10)),
            ..OrchestratorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_deadline_triggers_tally() {
        let fixture = Fixture::new(3, 2).await;
        let end_block = fixture.open_proposal(1, 10).await;
        fixture.vote(1, 5, 1, VoteChoice::Yay).await;

        let mut first = Orchestrator::new(fixture.engine(1), quick_config());
        let mut second = Orchestrator::new(fixture.engine(2), quick_config());

        let report = first.tick().await.unwrap();
        assert_eq!(report.discovered, vec![1]);
        assert!(report.completed.is_empty());
        assert_eq!(
            first.tracked().next().unwrap().phase,
            ProposalPhase::AwaitingThresholdOrDeadline
        );

        fixture.chain.advance_blocks(end_block);
        let report = first.tick().await.unwrap();
        assert_eq!(report.completed, vec![(1, TallyOutcome::Submitted)]);
        let report = second.tick().await.unwrap();
        assert_eq!(report.completed, vec![(1, TallyOutcome::Submitted)]);
        assert_eq!(first.tracked().count(), 0);

        let ledger = fixture.chain.connect([0xEE; 32]);
        assert_eq!(ledger.get_vote_totals(1).await.unwrap(), [0, 0, 5]);
    }

    #[tokio::test]
    async fn test_weight_threshold_triggers_early() {
        let fixture = Fixture::new(2, 1).await;
        fixture.open_proposal(3, 1_000).await;
        fixture.vote(1, 4, 3, VoteChoice::Nay).await;

        let config = OrchestratorConfig {
            vote_weight_threshold: Some(6),
            ..quick_config()
        };
        let mut orchestrator = Orchestrator::new(fixture.engine(1), config);
        assert!(orchestrator.tick().await.unwrap().completed.is_empty());

        fixture.vote(2, 2, 3, VoteChoice::Abstain).await;
        let report = orchestrator.tick().await.unwrap();
        assert_eq!(report.completed, vec![(3, TallyOutcome::Submitted)]);

        let ledger = fixture.chain.connect([0xEE; 32]);
        assert_eq!(ledger.get_vote_totals(3).await.unwrap(), [2, 4, 0]);
    }

    #[tokio::test]
    async fn test_proposals_progress_independently() {
        let fixture = Fixture::new(2, 1).await;
        fixture.open_proposal(1, 1_000).await;
        let end_block = fixture.open_proposal(2, 5).await;

        let mut orchestrator = Orchestrator::new(fixture.engine(1), quick_config());
        let report = orchestrator.tick().await.unwrap();
        assert_eq!(report.discovered, vec![1, 2]);

        fixture.chain.advance_blocks(end_block);
        let report = orchestrator.tick().await.unwrap();
        assert!(report.discovered.is_empty());
        assert_eq!(report.completed, vec![(2, TallyOutcome::Submitted)]);
        let remaining: Vec<_> = orchestrator.tracked().map(|p| p.proposal_id).collect();
        assert_eq!(remaining, vec![1]);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_next_tick() {
        let fixture = Fixture::new(2, 1).await;
        let end_block = fixture.open_proposal(5, 3).await;
        fixture.chain.advance_blocks(end_block);

        let engine = fixture
            .engine(2)
            .with_retry(RetryPolicy::fixed(2, Duration::from_millis(1)));
        let mut orchestrator = Orchestrator::new(engine, quick_config());

        fixture.chain.inject_write_conflicts(2);
        let report = orchestrator.tick().await.unwrap();
        assert!(report.completed.is_empty() && report.failed.is_empty());
        let tracked = orchestrator.tracked().next().unwrap();
        assert_eq!(tracked.phase, ProposalPhase::TallyTriggered);
        assert_eq!(tracked.attempts, 1);

        let report = orchestrator.tick().await.unwrap();
        assert_eq!(report.completed, vec![(5, TallyOutcome::Submitted)]);
    }

    #[tokio::test]
    async fn test_exhausted_proposal_dropped() {
        let fixture = Fixture::new(2, 1).await;
        let end_block = fixture.open_proposal(6, 3).await;
        fixture.chain.advance_blocks(end_block);

        let engine = fixture
            .engine(1)
            .with_retry(RetryPolicy::fixed(1, Duration::from_millis(1)));
        let config = OrchestratorConfig {
            max_tally_attempts: 1,
            ..quick_config()
        };
        let mut orchestrator = Orchestrator::new(engine, config);

        fixture.chain.inject_write_conflicts(1);
        let report = orchestrator.tick().await.unwrap();
        assert_eq!(report.failed, vec![6]);
        assert_eq!(orchestrator.tracked().count(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_after_max_ticks() {
        let fixture = Fixture::new(2, 1).await;
        let end_block = fixture.open_proposal(8, 2).await;
        fixture.chain.advance_blocks(end_block);

        let config = OrchestratorConfig {
            max_ticks: Some(2),
            ..quick_config()
        };
        let mut orchestrator = Orchestrator::new(fixture.engine(1), config);
        orchestrator.run().await.unwrap();

        let ledger = fixture.chain.connect([0xEE; 32]);
        assert!(ledger.is_tally_complete(8).await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_for_votes() {
        let fixture = Fixture::new(2, 1).await;
        fixture.open_proposal(1, 100).await;
        fixture.vote(1, 5, 1, VoteChoice::Yay).await;

        let ledger = fixture.chain.connect([0xEE; 32]);
        assert_eq!(wait_for_votes(&ledger, 1, 5, &quick_poll()).await.unwrap(), 5);

        let short = quick_poll().with_max_polls(3);
        assert!(matches!(
            wait_for_votes(&ledger, 1, 6, &short).await,
            Err(LedgerError::Timeout { polls: 3, .. })
        ));
    }
}
