use std::sync::Arc;

use tracing::{debug, trace};
use xxhash_rust::xxh3::xxh3_64;

use crate::block::BlockSnapshot;
use crate::encoding::{ChunkDecoder, Encoding};
use crate::error::{Error, Result};
use crate::format::{ChunkHeader, ChunkHeaders, CHUNK_HEADER_SIZE, FLAG_CHUNK_CHECKSUM};
use crate::value::FlexValue;

/// What a range asks of the engine on each resume.
pub(crate) enum Request<'a> {
    /// Write decoded values into the front of the slice.
    Fill(&'a mut [FlexValue]),
    /// Step over this many values.
    Skip(u64),
    /// Drop any in-flight chunk state; the engine is discarded afterwards.
    Terminate,
}

/// What the engine did during one resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Response {
    /// Values written (for `Fill`) or stepped over (for `Skip`).
    pub produced: u64,
    /// No values remain after this response.
    pub exhausted: bool,
}

impl Response {
    fn progress(produced: u64) -> Self {
        Self {
            produced,
            exhausted: false,
        }
    }

    fn end() -> Self {
        Self {
            produced: 0,
            exhausted: true,
        }
    }
}

enum Cursor {
    /// `offset` points at the next chunk header.
    BetweenChunks,
    /// A chunk is open; `offset` already points past it.
    InChunk(Box<dyn ChunkDecoder>),
    Done,
    Terminated,
}

enum Position {
    Ready,
    SkippedChunk(u64),
    End,
}

/// Resumable producer of the values in one block snapshot.
///
/// Each call to [`resume`](DecodeEngine::resume) does at most one physical
/// chunk's worth of work and then returns control to the range. Values are
/// written straight into the slice carried by the request.
pub(crate) struct DecodeEngine {
    snapshot: Arc<BlockSnapshot>,
    encoding: Arc<dyn Encoding>,
    cursor: Cursor,
    offset: usize,
    chunk_index: usize,
    produced: u64,
}

impl DecodeEngine {
    pub(crate) fn start(snapshot: Arc<BlockSnapshot>) -> Result<Self> {
        let info = *snapshot.info();
        let len = snapshot.data().len();
        if info.block_size != len as u64 {
            return Err(Error::corrupt(
                0,
                format!(
                    "block declares {} bytes but holds {len}",
                    info.block_size
                ),
            ));
        }
        let encoding = snapshot.registry().encoding(info.encoding)?;
        debug!(
            encoding = encoding.name(),
            num_elem = info.num_elem,
            block_size = len,
            "starting block decode"
        );
        Ok(Self {
            snapshot,
            encoding,
            cursor: Cursor::BetweenChunks,
            offset: 0,
            chunk_index: 0,
            produced: 0,
        })
    }

    pub(crate) fn resume(&mut self, request: Request<'_>) -> Result<Response> {
        match request {
            Request::Fill(target) => self.fill(target),
            Request::Skip(n) => self.skip(n),
            Request::Terminate => {
                self.terminate();
                Ok(Response::end())
            }
        }
    }

    fn fill(&mut self, target: &mut [FlexValue]) -> Result<Response> {
        if target.is_empty() {
            return Ok(Response::progress(0));
        }
        if let Position::End = self.position(None)? {
            return Ok(Response::end());
        }
        let chunk = self.chunk_index;
        let written = match &mut self.cursor {
            Cursor::InChunk(decoder) => {
                let expected = target.len().min(decoder.remaining());
                let written = decoder
                    .decode_into(target)
                    .map_err(|e| chunk_failure(chunk, e))?;
                if written != expected {
                    return Err(Error::corrupt(
                        chunk,
                        format!("decoder produced {written} values, expected {expected}"),
                    ));
                }
                written
            }
            _ => 0,
        };
        self.produced += written as u64;
        self.after_progress(written as u64)
    }

    fn skip(&mut self, n: u64) -> Result<Response> {
        if n == 0 {
            return Ok(Response::progress(0));
        }
        match self.position(Some(n))? {
            Position::End => return Ok(Response::end()),
            Position::SkippedChunk(skipped) => return self.after_progress(skipped),
            Position::Ready => {}
        }
        let chunk = self.chunk_index;
        let skipped = match &mut self.cursor {
            Cursor::InChunk(decoder) => {
                let want = usize::try_from(n)
                    .unwrap_or(usize::MAX)
                    .min(decoder.remaining());
                let skipped = decoder.skip(want).map_err(|e| chunk_failure(chunk, e))?;
                if skipped != want {
                    return Err(Error::corrupt(
                        chunk,
                        format!("decoder skipped {skipped} values, expected {want}"),
                    ));
                }
                skipped
            }
            _ => 0,
        };
        self.produced += skipped as u64;
        self.after_progress(skipped as u64)
    }

    /// Makes sure a chunk is open, unless the block is finished.
    ///
    /// With a skip budget, a chunk that fits entirely within the budget is
    /// stepped over using its header alone.
    fn position(&mut self, skip_budget: Option<u64>) -> Result<Position> {
        match self.cursor {
            Cursor::InChunk(_) => return Ok(Position::Ready),
            Cursor::Done | Cursor::Terminated => return Ok(Position::End),
            Cursor::BetweenChunks => {}
        }
        if self.at_declared_end()? {
            self.cursor = Cursor::Done;
            return Ok(Position::End);
        }

        let header = self.read_header()?;
        let num_elem = u64::from(header.num_elem);
        if skip_budget.is_some_and(|budget| num_elem <= budget) {
            trace!(
                chunk = self.chunk_index,
                num_elem,
                "skipping chunk without decoding"
            );
            self.offset += header.total_len();
            self.chunk_index += 1;
            self.produced += num_elem;
            return Ok(Position::SkippedChunk(num_elem));
        }

        let decoder = self.open_chunk(&header)?;
        self.cursor = Cursor::InChunk(decoder);
        Ok(Position::Ready)
    }

    /// Closes a drained chunk and reports exhaustion as soon as the declared
    /// count is reached cleanly.
    fn after_progress(&mut self, produced: u64) -> Result<Response> {
        let chunk = self.chunk_index;
        let drained = match &mut self.cursor {
            Cursor::InChunk(decoder) if decoder.remaining() == 0 => {
                decoder.finish().map_err(|e| chunk_failure(chunk, e))?;
                true
            }
            Cursor::InChunk(_) => false,
            // a chunk stepped over by header
            Cursor::BetweenChunks => true,
            Cursor::Done | Cursor::Terminated => false,
        };
        if !drained {
            return Ok(Response::progress(produced));
        }
        if matches!(self.cursor, Cursor::InChunk(_)) {
            self.cursor = Cursor::BetweenChunks;
            self.chunk_index += 1;
        }

        let info = self.snapshot.info();
        let clean_end =
            self.produced == info.num_elem && self.offset == self.snapshot.data().len();
        if clean_end {
            debug!(num_elem = info.num_elem, "block decode exhausted");
            self.cursor = Cursor::Done;
        }
        Ok(Response {
            produced,
            exhausted: clean_end,
        })
    }

    /// True when every declared value has been produced and nothing follows.
    fn at_declared_end(&self) -> Result<bool> {
        let declared = self.snapshot.info().num_elem;
        let data = self.snapshot.data();
        if self.produced == declared {
            if self.offset == data.len() {
                return Ok(true);
            }
            // Count what follows so the error says how far off the declared
            // count is; fall back to a framing error if the tail is garbage.
            let extra = ChunkHeaders::new(&data[self.offset..])
                .map(|h| h.map(|(_, header)| u64::from(header.num_elem)))
                .sum::<Result<u64>>();
            return Err(match extra {
                Ok(extra) => Error::count_mismatch(declared, declared + extra),
                Err(_) => Error::corrupt(
                    self.chunk_index,
                    format!(
                        "{} trailing bytes after the declared {declared} elements",
                        data.len() - self.offset
                    ),
                ),
            });
        }
        if self.offset >= data.len() {
            return Err(Error::count_mismatch(declared, self.produced));
        }
        Ok(false)
    }

    fn read_header(&self) -> Result<ChunkHeader> {
        let header = ChunkHeader::read_at(self.snapshot.data(), self.offset, self.chunk_index)?;
        let declared = self.snapshot.info().num_elem;
        let total = self.produced + u64::from(header.num_elem);
        if total > declared {
            return Err(Error::count_mismatch(declared, total));
        }
        Ok(header)
    }

    fn open_chunk(&mut self, header: &ChunkHeader) -> Result<Box<dyn ChunkDecoder>> {
        let chunk = self.chunk_index;
        let info = *self.snapshot.info();
        let start = self.offset + CHUNK_HEADER_SIZE;
        let stored = &self.snapshot.data()[start..start + header.compressed_len as usize];

        if info.has_flag(FLAG_CHUNK_CHECKSUM) {
            let actual = xxh3_64(stored);
            if actual != header.checksum {
                return Err(Error::checksum_mismatch(chunk, header.checksum, actual));
            }
        }

        let codec = self.snapshot.registry().codec(header.codec_id)?;
        let payload = codec
            .decompress(stored, header.raw_len as usize)
            .map_err(|e| chunk_failure(chunk, e))?;
        if payload.len() != header.raw_len as usize {
            return Err(Error::corrupt(
                chunk,
                format!(
                    "payload decompressed to {} bytes but header says {}",
                    payload.len(),
                    header.raw_len
                ),
            ));
        }

        let decoder = self
            .encoding
            .open_chunk(payload, header.num_elem as usize, info.element_width)
            .map_err(|e| chunk_failure(chunk, e))?;
        if decoder.remaining() != header.num_elem as usize {
            return Err(Error::corrupt(
                chunk,
                format!(
                    "decoder reports {} values but header says {}",
                    decoder.remaining(),
                    header.num_elem
                ),
            ));
        }

        trace!(
            chunk,
            num_elem = header.num_elem,
            raw_len = header.raw_len,
            codec = codec.name(),
            "opened chunk"
        );
        self.offset += header.total_len();
        Ok(decoder)
    }

    fn terminate(&mut self) {
        if let Cursor::InChunk(decoder) = std::mem::replace(&mut self.cursor, Cursor::Terminated) {
            trace!(
                chunk = self.chunk_index,
                remaining = decoder.remaining(),
                "dropping partially consumed chunk"
            );
        }
    }

    pub(crate) fn is_terminated(&self) -> bool {
        matches!(self.cursor, Cursor::Terminated)
    }

    #[cfg(test)]
    pub(crate) fn chunk_index(&self) -> usize {
        self.chunk_index
    }
}

fn chunk_failure(chunk: usize, e: anyhow::Error) -> Error {
    Error::corrupt(chunk, format!("{e:#}"))
}
