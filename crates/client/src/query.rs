//! Read-only views of proposals for voters.

use std::fmt;

use zkvote_ledger::{Ledger, LedgerResult, PollPolicy};
use zkvote_types::{ProposalId, VoteChoice, VoteTotals};

/// Snapshot of a proposal's public state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalStatus {
    pub proposal_id: ProposalId,
    pub weight_used: u64,
    pub tally_complete: bool,
    pub totals: VoteTotals,
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Proposal {}:", self.proposal_id)?;
        writeln!(f, "  Weight used: {}", self.weight_used)?;
        if self.tally_complete {
            write!(f, "{}", TotalsDisplay(&self.totals))
        } else {
            write!(f, "  Tally pending")
        }
    }
}

/// Totals printed in ballot order: Abstain, Nay, Yay.
pub struct TotalsDisplay<'a>(pub &'a VoteTotals);

impl fmt::Display for TotalsDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, choice) in VoteChoice::ALL.iter().enumerate() {
            let label = match choice {
                VoteChoice::Abstain => "Abstain",
                VoteChoice::Nay => "Nay",
                VoteChoice::Yay => "Yay",
            };
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  {}: {}", label, self.0[choice.index()])?;
        }
        Ok(())
    }
}

pub async fn proposal_status<L: Ledger + ?Sized>(
    ledger: &L,
    proposal_id: ProposalId,
) -> LedgerResult<ProposalStatus> {
    Ok(ProposalStatus {
        proposal_id,
        weight_used: ledger.voting_weight_used(proposal_id).await?,
        tally_complete: ledger.is_tally_complete(proposal_id).await?,
        totals: ledger.get_vote_totals(proposal_id).await?,
    })
}

/// Poll until the committee's tally has been recorded, then read totals.
pub async fn wait_for_tally<L: Ledger + ?Sized>(
    ledger: &L,
    proposal_id: ProposalId,
    poll: &PollPolicy,
) -> LedgerResult<VoteTotals> {
    poll.wait_until("tally complete", || ledger.is_tally_complete(proposal_id))
        .await?;
    ledger.get_vote_totals(proposal_id).await
}
