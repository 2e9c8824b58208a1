//! Fault Injection
//!
//! Explicit, constructor-injected failure points for exercising the
//! recovery machinery. The default injector is inert; production code paths
//! never consult anything but the instance they were handed.

use crate::transfer::types::TransferStep;

/// Substep id for a step's main operation.
pub const SUBSTEP_MAIN: u32 = 0;
/// Substep id for the first rename attempt, before the remove-and-retry.
pub const SUBSTEP_RENAME_FIRST: u32 = 1;

/// A set of (step, substep) points that are forced to fail.
#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    faults: Vec<(TransferStep, u32)>,
}

impl FaultInjector {
    /// An injector that never fires.
    pub fn none() -> Self {
        Self::default()
    }

    /// Fail a step's main operation.
    pub fn fail_step(step: TransferStep) -> Self {
        Self {
            faults: vec![(step, SUBSTEP_MAIN)],
        }
    }

    /// Fail a specific substep within a step.
    pub fn fail_substep(step: TransferStep, substep: u32) -> Self {
        Self {
            faults: vec![(step, substep)],
        }
    }

    /// Whether this (step, substep) point is armed.
    pub fn should_fail(&self, step: TransferStep, substep: u32) -> bool {
        self.faults.contains(&(step, substep))
    }
}
