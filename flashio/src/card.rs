// SPDX-License-Identifier: MIT

use alloc::{rc::Rc, vec, vec::Vec};
use core::cell::RefCell;

use crate::{BlockIO, SECTOR_SIZE, command::*, errors::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EraseState {
    Idle,
    StartSet(u32),
    EndSet(u32, u32),
}

/// In-memory SD card model.
///
/// Follows the card-side rules that matter for pre-erasing:
/// - CMD32 → CMD33 → CMD38 ordering, anything else resets the sequence
/// - block addresses beyond capacity are rejected
/// - erased blocks read back as `erased_byte` (`DATA_STAT_AFTER_ERASE`)
///
/// Every raw command is recorded, and faults can be injected per command so
/// callers can exercise each failure point.
#[derive(Debug, Clone)]
pub struct EmulatedCard {
    data: Vec<u8>,
    erased_byte: u8,
    erase: EraseState,
    history: Vec<(SdCommand, u32)>,
    faults: Vec<(SdCommand, CommandError)>,
    erase_count: usize,
}

impl EmulatedCard {
    /// A blank card of `blocks` 512-byte blocks.
    pub fn new(blocks: u32) -> Self {
        Self::from_image(vec![0u8; blocks as usize * SECTOR_SIZE])
    }

    /// Wraps an existing image. Trailing bytes past the last whole block are ignored.
    pub fn from_image(mut data: Vec<u8>) -> Self {
        let whole = data.len() - data.len() % SECTOR_SIZE;
        data.truncate(whole);
        Self {
            data,
            erased_byte: 0x00,
            erase: EraseState::Idle,
            history: Vec::new(),
            faults: Vec::new(),
            erase_count: 0,
        }
    }

    pub fn with_erased_byte(mut self, erased_byte: u8) -> Self {
        self.erased_byte = erased_byte;
        self
    }

    /// Moves the card behind a shareable port.
    pub fn shared(self) -> CardPort {
        CardPort {
            inner: Rc::new(RefCell::new(self)),
            partition_offset: 0,
        }
    }

    #[inline]
    pub fn blocks(&self) -> u32 {
        (self.data.len() / SECTOR_SIZE) as u32
    }

    #[inline]
    pub fn erased_byte(&self) -> u8 {
        self.erased_byte
    }

    /// Raw commands seen on the bus, in order.
    pub fn history(&self) -> &[(SdCommand, u32)] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Number of CMD38 that completed.
    pub fn erase_count(&self) -> usize {
        self.erase_count
    }

    /// Makes every later `cmd` fail with `err` until [`clear_faults`](Self::clear_faults).
    pub fn inject_fault(&mut self, cmd: SdCommand, err: CommandError) {
        self.faults.retain(|(c, _)| *c != cmd);
        self.faults.push((cmd, err));
    }

    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    /// Contents of one block.
    pub fn block(&self, lba: u32) -> Option<&[u8]> {
        let start = lba as usize * SECTOR_SIZE;
        self.data.get(start..start + SECTOR_SIZE)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    fn check_block(&self, lba: u32) -> CommandResult {
        if lba >= self.blocks() {
            return Err(CommandError::OutOfRange);
        }
        Ok(())
    }

    fn fault_for(&self, cmd: SdCommand) -> Option<CommandError> {
        self.faults.iter().find(|(c, _)| *c == cmd).map(|(_, e)| *e)
    }

    fn erase_range(&mut self, start: u32, end: u32) {
        let from = start as usize * SECTOR_SIZE;
        let to = (end as usize + 1) * SECTOR_SIZE;
        self.data[from..to].fill(self.erased_byte);
        self.erase_count += 1;
        log::trace!("card: erased blocks {start}..={end}");
    }
}

impl CommandIssuer for EmulatedCard {
    fn send_command(&mut self, cmd: SdCommand, arg: u32) -> CommandResult {
        self.history.push((cmd, arg));

        if let Some(err) = self.fault_for(cmd) {
            self.erase = EraseState::Idle;
            return Err(err);
        }

        let state = self.erase;
        self.erase = EraseState::Idle;

        match (cmd, state) {
            (SdCommand::EraseWrBlkStart, _) => {
                self.check_block(arg)?;
                self.erase = EraseState::StartSet(arg);
                Ok(())
            }
            (SdCommand::EraseWrBlkEnd, EraseState::StartSet(start)) => {
                self.check_block(arg)?;
                if arg < start {
                    return Err(CommandError::Rejected(R1_ERASE_PARAM));
                }
                self.erase = EraseState::EndSet(start, arg);
                Ok(())
            }
            (SdCommand::Erase, EraseState::EndSet(start, end)) => {
                self.erase_range(start, end);
                Ok(())
            }
            (SdCommand::EraseWrBlkEnd, _) | (SdCommand::Erase, _) => {
                Err(CommandError::EraseSequence)
            }
            // CMD25 carries a data phase and only goes through `write_blocks`.
            (SdCommand::WriteMultipleBlock, _) => Err(CommandError::Rejected(0)),
        }
    }
}

impl RawBlockWriter for EmulatedCard {
    fn block_size(&self) -> usize {
        SECTOR_SIZE
    }

    fn write_blocks(&mut self, lba: u32, data: &[u8]) -> CommandResult {
        self.history.push((SdCommand::WriteMultipleBlock, lba));
        self.erase = EraseState::Idle;

        if let Some(err) = self.fault_for(SdCommand::WriteMultipleBlock) {
            return Err(err);
        }
        if data.is_empty() || !data.len().is_multiple_of(SECTOR_SIZE) {
            return Err(CommandError::IO(BlockIOError::Unaligned));
        }

        let count = (data.len() / SECTOR_SIZE) as u64;
        if lba as u64 + count > self.blocks() as u64 {
            return Err(CommandError::OutOfRange);
        }

        let from = lba as usize * SECTOR_SIZE;
        self.data[from..from + data.len()].copy_from_slice(data);
        Ok(())
    }
}

/// Cloneable handle onto one [`EmulatedCard`].
///
/// The filesystem mounts through the `BlockIO` side while raw erase and
/// block writes go through the command side, all against the same medium.
#[derive(Debug, Clone)]
pub struct CardPort {
    inner: Rc<RefCell<EmulatedCard>>,
    partition_offset: u64,
}

impl CardPort {
    /// Inspect the card.
    pub fn with<R>(&self, f: impl FnOnce(&EmulatedCard) -> R) -> R {
        f(&self.inner.borrow())
    }

    /// Mutate the card (fault injection, history reset, ...).
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut EmulatedCard) -> R) -> R {
        f(&mut self.inner.borrow_mut())
    }

    fn check_bounds(card: &EmulatedCard, abs_off: u64, len: usize) -> BlockIOResult<usize> {
        let end = abs_off
            .checked_add(len as u64)
            .ok_or(BlockIOError::OutOfBounds)?;
        if end > card.data.len() as u64 {
            return Err(BlockIOError::OutOfBounds);
        }
        Ok(abs_off as usize)
    }
}

impl BlockIO for CardPort {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlockIOResult {
        let mut card = self.inner.borrow_mut();
        let start = Self::check_bounds(&card, self.partition_offset + offset, data.len())?;
        card.erase = EraseState::Idle;
        card.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlockIOResult {
        let card = self.inner.borrow();
        let start = Self::check_bounds(&card, self.partition_offset + offset, buf.len())?;
        buf.copy_from_slice(&card.data[start..start + buf.len()]);
        Ok(())
    }

    fn flush(&mut self) -> BlockIOResult {
        Ok(())
    }

    fn set_offset(&mut self, partition_offset: u64) -> u64 {
        self.partition_offset = partition_offset;
        partition_offset
    }

    fn partition_offset(&self) -> u64 {
        self.partition_offset
    }
}

impl CommandIssuer for CardPort {
    fn send_command(&mut self, cmd: SdCommand, arg: u32) -> CommandResult {
        self.inner.borrow_mut().send_command(cmd, arg)
    }
}

impl RawBlockWriter for CardPort {
    fn block_size(&self) -> usize {
        SECTOR_SIZE
    }

    fn write_blocks(&mut self, lba: u32, data: &[u8]) -> CommandResult {
        self.inner.borrow_mut().write_blocks(lba, data)
    }
}
