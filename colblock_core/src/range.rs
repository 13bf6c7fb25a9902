use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::block::BlockSnapshot;
use crate::engine::{DecodeEngine, Request};
use crate::error::{Error, Result};
use crate::value::FlexValue;

/// Values decoded per refill when a range is used as an iterator.
pub const DEFAULT_VALUES_BATCH: usize = 256;

/// Lifecycle of an [`EncodedBlockRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeStatus {
    /// Created, nothing decoded yet.
    Unstarted,
    Running,
    /// Every value has been returned.
    Exhausted,
    /// A decode error was hit; every later call returns it again.
    Faulted,
    Released,
}

enum State {
    Unstarted(Arc<BlockSnapshot>),
    Running(DecodeEngine),
    Exhausted,
    Faulted(Error),
    Released,
}

/// Single-pass reader over one block snapshot, returned by
/// [`EncodedBlock::get_range`](crate::EncodedBlock::get_range).
///
/// The range holds its own reference to the snapshot, so it is unaffected
/// by later `init`/`release` calls on the originating handle. A range is not
/// concurrent, but independent ranges may be read in parallel.
///
/// ```ignore
/// let mut range = block.get_range();
/// let mut buf = vec![FlexValue::Null; 1024];
/// range.skip(10)?;
/// while range.decode_to(&mut buf)? > 0 { /* ... */ }
/// ```
pub struct EncodedBlockRange {
    state: State,
    position: u64,
    declared: u64,
}

impl EncodedBlockRange {
    pub(crate) fn new(snapshot: Option<Arc<BlockSnapshot>>) -> Self {
        match snapshot {
            Some(snapshot) => Self {
                declared: snapshot.info().num_elem,
                state: State::Unstarted(snapshot),
                position: 0,
            },
            None => Self {
                state: State::Exhausted,
                position: 0,
                declared: 0,
            },
        }
    }

    pub fn status(&self) -> RangeStatus {
        match self.state {
            State::Unstarted(_) => RangeStatus::Unstarted,
            State::Running(_) => RangeStatus::Running,
            State::Exhausted => RangeStatus::Exhausted,
            State::Faulted(_) => RangeStatus::Faulted,
            State::Released => RangeStatus::Released,
        }
    }

    /// Number of values decoded or skipped so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Declared values not yet consumed.
    pub fn remaining(&self) -> u64 {
        self.declared.saturating_sub(self.position)
    }

    /// Decodes the next `target.len()` values into `target`.
    ///
    /// Returns the number of values written, which is smaller than
    /// `target.len()` only when the block runs out or a decode error stops
    /// it. Returns `Ok(0)` once exhausted.
    ///
    /// An error hit after some values were written faults the range but
    /// still returns those values; the error is reported by the next call.
    /// An error hit before any value was written is returned directly.
    pub fn decode_to(&mut self, target: &mut [FlexValue]) -> Result<usize> {
        self.start_if_needed()?;
        let mut written = 0;
        while written < target.len() {
            let State::Running(engine) = &mut self.state else {
                break;
            };
            match engine.resume(Request::Fill(&mut target[written..])) {
                Ok(response) => {
                    written += response.produced as usize;
                    if response.exhausted {
                        self.finish();
                    }
                }
                Err(e) => {
                    self.fault(e.clone());
                    if written == 0 {
                        return Err(e);
                    }
                    break;
                }
            }
        }
        self.position += written as u64;
        Ok(written)
    }

    /// Skips the next `n` values, returning how many were skipped.
    ///
    /// Equivalent to decoding `n` values into a throwaway buffer, except that
    /// whole chunks covered by the skip are stepped over without being
    /// decompressed. A corrupt payload inside such a chunk is therefore not
    /// reported by `skip`.
    ///
    /// Errors follow [`decode_to`](Self::decode_to): values already skipped
    /// are counted and the error is deferred to the next call.
    pub fn skip(&mut self, n: u64) -> Result<u64> {
        self.start_if_needed()?;
        let mut skipped = 0;
        while skipped < n {
            let State::Running(engine) = &mut self.state else {
                break;
            };
            match engine.resume(Request::Skip(n - skipped)) {
                Ok(response) => {
                    skipped += response.produced;
                    if response.exhausted {
                        self.finish();
                    }
                }
                Err(e) => {
                    self.fault(e.clone());
                    if skipped == 0 {
                        return Err(e);
                    }
                    break;
                }
            }
        }
        self.position += skipped;
        Ok(skipped)
    }

    /// Releases the range and everything it holds. Idempotent.
    ///
    /// Reading a released range is an error ([`Error::is_misuse`]).
    pub fn release(&mut self) {
        if let State::Running(engine) = std::mem::replace(&mut self.state, State::Released) {
            debug!(position = self.position, "releasing running block range");
            shutdown(engine);
        }
    }

    /// Turns the range into an iterator that decodes `batch` values at a time.
    pub fn into_values(self, batch: usize) -> Values {
        let batch = batch.max(1);
        Values {
            range: self,
            buf: vec![FlexValue::Null; batch],
            pos: 0,
            len: 0,
            done: false,
        }
    }

    fn start_if_needed(&mut self) -> Result<()> {
        if let State::Unstarted(snapshot) = &self.state {
            self.state = match DecodeEngine::start(snapshot.clone()) {
                Ok(engine) => State::Running(engine),
                Err(e) => {
                    debug!(error = %e, "block range failed to start");
                    State::Faulted(e)
                }
            };
        }
        match &self.state {
            State::Faulted(e) => Err(e.clone()),
            State::Released => Err(Error::released()),
            _ => Ok(()),
        }
    }

    fn finish(&mut self) {
        if let State::Running(engine) = std::mem::replace(&mut self.state, State::Exhausted) {
            shutdown(engine);
        }
    }

    fn fault(&mut self, error: Error) {
        debug!(error = %error, position = self.position, "block range faulted");
        if let State::Running(engine) =
            std::mem::replace(&mut self.state, State::Faulted(error))
        {
            shutdown(engine);
        }
    }
}

/// Final handshake with an engine before it is dropped.
fn shutdown(mut engine: DecodeEngine) {
    if let Err(e) = engine.resume(Request::Terminate) {
        warn!(error = %e, "decode engine did not terminate cleanly");
    }
    debug_assert!(engine.is_terminated());
}

impl Default for EncodedBlockRange {
    /// An empty range with nothing to decode.
    fn default() -> Self {
        Self::new(None)
    }
}

impl Drop for EncodedBlockRange {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for EncodedBlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedBlockRange")
            .field("status", &self.status())
            .field("position", &self.position)
            .field("declared", &self.declared)
            .finish()
    }
}

impl IntoIterator for EncodedBlockRange {
    type Item = Result<FlexValue>;
    type IntoIter = Values;

    fn into_iter(self) -> Values {
        self.into_values(DEFAULT_VALUES_BATCH)
    }
}

/// Iterator over the values of a range, refilled in batches through
/// [`EncodedBlockRange::decode_to`].
///
/// A decode error is yielded once, after which the iterator ends.
pub struct Values {
    range: EncodedBlockRange,
    buf: Vec<FlexValue>,
    pos: usize,
    len: usize,
    done: bool,
}

impl Values {
    pub fn range(&self) -> &EncodedBlockRange {
        &self.range
    }
}

impl Iterator for Values {
    type Item = Result<FlexValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos == self.len {
            if self.done {
                return None;
            }
            match self.range.decode_to(&mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(n) => {
                    self.pos = 0;
                    self.len = n;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        let value = std::mem::take(&mut self.buf[self.pos]);
        self.pos += 1;
        Some(Ok(value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let buffered = self.len - self.pos;
        if self.done {
            return (buffered, Some(buffered));
        }
        let rest = usize::try_from(self.range.remaining()).unwrap_or(usize::MAX);
        (buffered, Some(buffered.saturating_add(rest)))
    }
}
