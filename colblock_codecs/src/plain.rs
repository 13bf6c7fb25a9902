use colblock_core::format::ENCODING_PLAIN;
use colblock_core::{ChunkDecoder, Encoding, FlexValue};

use crate::payload::{write_value, Payload};

/// Self-describing encoding: every value carries its own type tag.
///
/// Handles any mix of value types, including nulls. Skipping still has to
/// walk each value because values are variable-length.
pub struct PlainEncoding;

impl Encoding for PlainEncoding {
    fn tag(&self) -> u16 {
        ENCODING_PLAIN
    }

    fn name(&self) -> &'static str {
        "plain"
    }

    fn encode_chunk(
        &self,
        values: &[FlexValue],
        _element_width: Option<u8>,
        out: &mut Vec<u8>,
    ) -> anyhow::Result<()> {
        for value in values {
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
        Ok(Box::new(PlainDecoder {
            payload: Payload::new(payload),
            remaining: num_elem,
        }))
    }
}

struct PlainDecoder {
    payload: Payload,
    remaining: usize,
}

impl ChunkDecoder for PlainDecoder {
    fn remaining(&self) -> usize {
        self.remaining
    }

    fn decode_into(&mut self, target: &mut [FlexValue]) -> anyhow::Result<usize> {
        let n = target.len().min(self.remaining);
        for slot in &mut target[..n] {
            *slot = self.payload.read_value()?;
        }
        self.remaining -= n;
        Ok(n)
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        self.payload.expect_end()
    }
}
