// SPDX-License-Identifier: MIT

//! CMD32 / CMD33 / CMD38 pre-erase of a sector range.

use core::fmt;

use flashio::command::{CommandIssuer, SdCommand};

use crate::extent::{errors::*, range::SectorRange};

/// One command of the erase sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EraseStage {
    SetStart,
    SetEnd,
    Trigger,
}

impl EraseStage {
    pub const fn command(self) -> SdCommand {
        match self {
            EraseStage::SetStart => SdCommand::EraseWrBlkStart,
            EraseStage::SetEnd => SdCommand::EraseWrBlkEnd,
            EraseStage::Trigger => SdCommand::Erase,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            EraseStage::SetStart => "set-start",
            EraseStage::SetEnd => "set-end",
            EraseStage::Trigger => "trigger",
        }
    }
}

impl fmt::Display for EraseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.command())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseState {
    Idle,
    StartSet,
    EndSet,
    Erased,
    /// The command of this stage failed; nothing after it was sent.
    Aborted(EraseStage),
}

/// Erase of one range, driven one command at a time.
///
/// A sequence is single-use: once `Erased` or `Aborted` it issues nothing
/// more. Erasing the same range again takes a new sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseSequence {
    range: SectorRange,
    state: EraseState,
}

impl EraseSequence {
    pub const fn new(range: SectorRange) -> Self {
        Self {
            range,
            state: EraseState::Idle,
        }
    }

    #[inline]
    pub const fn range(&self) -> SectorRange {
        self.range
    }

    #[inline]
    pub const fn state(&self) -> EraseState {
        self.state
    }

    /// Stage the next `step` would issue.
    pub const fn pending_stage(&self) -> Option<EraseStage> {
        match self.state {
            EraseState::Idle => Some(EraseStage::SetStart),
            EraseState::StartSet => Some(EraseStage::SetEnd),
            EraseState::EndSet => Some(EraseStage::Trigger),
            EraseState::Erased | EraseState::Aborted(_) => None,
        }
    }

    /// Issues the pending command.
    pub fn step<C: CommandIssuer + ?Sized>(&mut self, issuer: &mut C) -> ExtentResult<EraseState> {
        let Some(stage) = self.pending_stage() else {
            return Err(ExtentError::InvalidVolumeState("erase sequence already finished"));
        };
        let arg = match stage {
            EraseStage::SetStart => self.range.start(),
            EraseStage::SetEnd => self.range.end(),
            EraseStage::Trigger => 0,
        };

        if let Err(cause) = issuer.send_command(stage.command(), arg) {
            self.state = EraseState::Aborted(stage);
            return Err(ExtentError::EraseCommandRejected { stage, cause });
        }

        self.state = match stage {
            EraseStage::SetStart => EraseState::StartSet,
            EraseStage::SetEnd => EraseState::EndSet,
            EraseStage::Trigger => EraseState::Erased,
        };
        Ok(self.state)
    }

    /// Steps until erased or the first failure.
    pub fn run<C: CommandIssuer + ?Sized>(&mut self, issuer: &mut C) -> ExtentResult {
        while self.pending_stage().is_some() {
            self.step(issuer)?;
        }
        match self.state {
            EraseState::Erased => Ok(()),
            _ => Err(ExtentError::InvalidVolumeState("erase sequence already finished")),
        }
    }
}

/// Erases `range` with CMD32, CMD33 and CMD38, strictly in that order.
///
/// Stops at the first rejected command. There is no retry, and a trigger
/// failure leaves the range contents indeterminate.
pub fn erase_sectors<C: CommandIssuer + ?Sized>(
    issuer: &mut C,
    range: SectorRange,
) -> ExtentResult<SectorRange> {
    let mut seq = EraseSequence::new(range);
    match seq.run(issuer) {
        Ok(()) => {
            log::info!(
                "erase: sectors {} erased ({} sectors)",
                range,
                range.len()
            );
            Ok(range)
        }
        Err(e) => {
            log::error!("erase: sectors {range} failed: {e}");
            Err(e)
        }
    }
}
