use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// The four independently metered resources.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostKind {
    Allocation,
    Invocation,
    Jump,
    Throw,
}

impl CostKind {
    pub const ALL: [CostKind; 4] = [
        CostKind::Allocation,
        CostKind::Invocation,
        CostKind::Jump,
        CostKind::Throw,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CostKind::Allocation => "allocation",
            CostKind::Invocation => "invocation",
            CostKind::Jump => "jump",
            CostKind::Throw => "throw",
        }
    }
}

/// Per-counter ceilings for one execution.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionProfile {
    pub allocation: u64,
    pub invocation: u64,
    pub jump: u64,
    pub throw: u64,
}

impl ExecutionProfile {
    pub const DEFAULT: ExecutionProfile = ExecutionProfile {
        allocation: 1024 * 1024 * 1024,
        invocation: 1_000_000,
        jump: 1_000_000,
        throw: 1_000_000,
    };

    pub const UNLIMITED: ExecutionProfile = ExecutionProfile {
        allocation: u64::MAX,
        invocation: u64::MAX,
        jump: u64::MAX,
        throw: u64::MAX,
    };

    pub fn ceiling(&self, kind: CostKind) -> u64 {
        match kind {
            CostKind::Allocation => self.allocation,
            CostKind::Invocation => self.invocation,
            CostKind::Jump => self.jump,
            CostKind::Throw => self.throw,
        }
    }
}

impl Default for ExecutionProfile {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Accumulates runtime costs for a single execution.
///
/// Counters only grow until [`RuntimeCostLedger::reset`]. Comparing against a
/// ceiling never stops the counting; enforcing the budget is up to the caller.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RuntimeCostLedger {
    allocation: u64,
    invocation: u64,
    jump: u64,
    throw: u64,
}

impl RuntimeCostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one event of the given kind.
    pub fn record(&mut self, kind: CostKind) {
        self.record_cost(kind, 1);
    }

    pub fn record_cost(&mut self, kind: CostKind, amount: u64) {
        let counter = self.counter_mut(kind);
        *counter = counter.saturating_add(amount);
    }

    pub fn record_allocation(&mut self) {
        self.record(CostKind::Allocation);
    }

    /// Charges `length * element_size` to the allocation counter.
    pub fn record_array_allocation(&mut self, length: u64, element_size: u64) {
        self.record_cost(CostKind::Allocation, length.saturating_mul(element_size));
    }

    pub fn record_invocation(&mut self) {
        self.record(CostKind::Invocation);
    }

    pub fn record_jump(&mut self) {
        self.record(CostKind::Jump);
    }

    pub fn record_throw(&mut self) {
        self.record(CostKind::Throw);
    }

    pub fn total(&self, kind: CostKind) -> u64 {
        match kind {
            CostKind::Allocation => self.allocation,
            CostKind::Invocation => self.invocation,
            CostKind::Jump => self.jump,
            CostKind::Throw => self.throw,
        }
    }

    pub fn allocation_cost(&self) -> u64 {
        self.allocation
    }

    pub fn invocation_cost(&self) -> u64 {
        self.invocation
    }

    pub fn jump_cost(&self) -> u64 {
        self.jump
    }

    pub fn throw_cost(&self) -> u64 {
        self.throw
    }

    /// Whether the counter is strictly above its ceiling.
    pub fn exceeded(&self, kind: CostKind, profile: &ExecutionProfile) -> bool {
        let exceeded = self.total(kind) > profile.ceiling(kind);
        if exceeded {
            debug!(
                kind = kind.name(),
                total = self.total(kind),
                ceiling = profile.ceiling(kind),
                "cost ceiling exceeded"
            );
        }
        exceeded
    }

    pub fn exceeded_kinds(&self, profile: &ExecutionProfile) -> Vec<CostKind> {
        CostKind::ALL
            .into_iter()
            .filter(|kind| self.exceeded(*kind, profile))
            .collect()
    }

    pub fn summary(&self, profile: &ExecutionProfile) -> CostSummary {
        CostSummary {
            entries: CostKind::ALL
                .into_iter()
                .map(|kind| CostEntry {
                    kind,
                    total: self.total(kind),
                    ceiling: profile.ceiling(kind),
                    exceeded: self.total(kind) > profile.ceiling(kind),
                })
                .collect(),
        }
    }

    pub fn reset(&mut self) {
        debug!("resetting runtime cost ledger");
        *self = Self::default();
    }

    fn counter_mut(&mut self, kind: CostKind) -> &mut u64 {
        match kind {
            CostKind::Allocation => &mut self.allocation,
            CostKind::Invocation => &mut self.invocation,
            CostKind::Jump => &mut self.jump,
            CostKind::Throw => &mut self.throw,
        }
    }
}

/// Totals of one execution measured against a profile.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CostSummary {
    pub entries: Vec<CostEntry>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct CostEntry {
    pub kind: CostKind,
    pub total: u64,
    pub ceiling: u64,
    pub exceeded: bool,
}

impl CostSummary {
    pub fn any_exceeded(&self) -> bool {
        self.entries.iter().any(|entry| entry.exceeded)
    }
}

impl fmt::Display for CostSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            let status = if entry.exceeded { "exceeded" } else { "ok" };
            writeln!(
                f,
                "{:<10} {:>20} / {:<20} {status}",
                entry.kind.name(),
                entry.total,
                entry.ceiling
            )?;
        }
        Ok(())
    }
}
