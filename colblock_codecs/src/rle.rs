use anyhow::ensure;
use colblock_core::format::ENCODING_RLE;
use colblock_core::{ChunkDecoder, Encoding, FlexValue};

use crate::payload::{write_value, Payload};

/// Run-length encoding: `(run_len: u32, tagged value)` pairs.
///
/// The decoder keeps the value of the current run and how much of it is
/// left across calls, so a chunk can be consumed a few values at a time.
/// Skipping inside a run only adjusts the counter.
pub struct RleEncoding;

impl Encoding for RleEncoding {
    fn tag(&self) -> u16 {
        ENCODING_RLE
    }

    fn name(&self) -> &'static str {
        "rle"
    }

    fn encode_chunk(
        &self,
        values: &[FlexValue],
        _element_width: Option<u8>,
        out: &mut Vec<u8>,
    ) -> anyhow::Result<()> {
        let mut iter = values.iter().peekable();
        while let Some(value) = iter.next() {
            let mut run_len = 1u32;
            while iter.peek().is_some_and(|next| *next == value) {
                iter.next();
                run_len += 1;
            }
            out.extend_from_slice(&run_len.to_le_bytes());
            write_value(value, out)?;
        }
        Ok(())
    }

    fn open_chunk(
        &self,
        payload: Vec<u8>,
        num_elem: usize,
        _element_width: Option<u8>,
    ) -> anyhow::Result<Box<dyn ChunkDecoder>> {
        Ok(Box::new(RleDecoder {
            payload: Payload::new(payload),
            current: FlexValue::Null,
            run_left: 0,
            remaining: num_elem,
        }))
    }
}

struct RleDecoder {
    payload: Payload,
    /// Value of the run being consumed.
    current: FlexValue,
    /// Values of `current` not yet consumed.
    run_left: usize,
    remaining: usize,
}

impl RleDecoder {
    fn next_run(&mut self) -> anyhow::Result<()> {
        let run_len = self.payload.read_u32()? as usize;
        ensure!(run_len > 0, "empty run");
        ensure!(
            run_len <= self.remaining,
            "run of {run_len} exceeds the {} values left in the chunk",
            self.remaining
        );
        self.current = self.payload.read_value()?;
        self.run_left = run_len;
        Ok(())
    }
}

impl ChunkDecoder for RleDecoder {
    fn remaining(&self) -> usize {
        self.remaining
    }

    fn decode_into(&mut self, target: &mut [FlexValue]) -> anyhow::Result<usize> {
        let n = target.len().min(self.remaining);
        let mut written = 0;
        while written < n {
            if self.run_left == 0 {
                self.next_run()?;
            }
            let k = self.run_left.min(n - written);
            for slot in &mut target[written..written + k] {
                slot.clone_from(&self.current);
            }
            self.run_left -= k;
            self.remaining -= k;
            written += k;
        }
        Ok(written)
    }

    fn skip(&mut self, n: usize) -> anyhow::Result<usize> {
        let n = n.min(self.remaining);
        let mut skipped = 0;
        while skipped < n {
            if self.run_left == 0 {
                self.next_run()?;
            }
            let k = self.run_left.min(n - skipped);
            self.run_left -= k;
            self.remaining -= k;
            skipped += k;
        }
        Ok(skipped)
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        self.payload.expect_end()
    }
}
