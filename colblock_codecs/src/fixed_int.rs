use anyhow::{bail, ensure};
use colblock_core::format::ENCODING_FIXED_INT;
use colblock_core::{ChunkDecoder, Encoding, FlexValue};

use crate::payload::Payload;

/// Width used when the block metadata does not carry one.
pub const DEFAULT_INT_WIDTH: u8 = 8;

/// Little-endian signed integers, `element_width` bytes each.
///
/// Every value has the same size, so skipping is a pointer bump.
pub struct FixedIntEncoding;

fn resolve_width(element_width: Option<u8>) -> anyhow::Result<usize> {
    match element_width.unwrap_or(DEFAULT_INT_WIDTH) {
        w @ (1 | 2 | 4 | 8) => Ok(w as usize),
        w => bail!("unsupported fixed-int width {w}; expected 1, 2, 4 or 8"),
    }
}

fn fits(value: i64, width: usize) -> bool {
    if width == 8 {
        return true;
    }
    let bits = width as u32 * 8;
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << (bits - 1)) - 1;
    (min..=max).contains(&value)
}

impl Encoding for FixedIntEncoding {
    fn tag(&self) -> u16 {
        ENCODING_FIXED_INT
    }

    fn name(&self) -> &'static str {
        "fixed-int"
    }

    fn encode_chunk(
        &self,
        values: &[FlexValue],
        element_width: Option<u8>,
        out: &mut Vec<u8>,
    ) -> anyhow::Result<()> {
        let width = resolve_width(element_width)?;
        out.reserve(values.len() * width);
        for value in values {
            let Some(v) = value.as_integer() else {
                bail!(
                    "fixed-int encoding only stores integers, got {:?}",
                    value.flex_type()
                );
            };
            ensure!(fits(v, width), "{v} does not fit in {width} bytes");
            out.extend_from_slice(&v.to_le_bytes()[..width]);
        }
        Ok(())
    }

    fn open_chunk(
        &self,
        payload: Vec<u8>,
        num_elem: usize,
        element_width: Option<u8>,
    ) -> anyhow::Result<Box<dyn ChunkDecoder>> {
        let width = resolve_width(element_width)?;
        ensure!(
            num_elem.checked_mul(width) == Some(payload.len()),
            "payload of {} bytes cannot hold {num_elem} values of {width} bytes",
            payload.len()
        );
        Ok(Box::new(FixedIntDecoder {
            payload: Payload::new(payload),
            width,
            remaining: num_elem,
        }))
    }
}

struct FixedIntDecoder {
    payload: Payload,
    width: usize,
    remaining: usize,
}

impl ChunkDecoder for FixedIntDecoder {
    fn remaining(&self) -> usize {
        self.remaining
    }

    fn decode_into(&mut self, target: &mut [FlexValue]) -> anyhow::Result<usize> {
        let n = target.len().min(self.remaining);
        let width = self.width;
        let shift = 64 - 8 * width as u32;
        let bytes = self.payload.take(n * width)?;
        for (slot, raw) in target[..n].iter_mut().zip(bytes.chunks_exact(width)) {
            let mut b = [0u8; 8];
            b[..width].copy_from_slice(raw);
            // sign-extend from `width` bytes
            let v = (i64::from_le_bytes(b) << shift) >> shift;
            *slot = FlexValue::Integer(v);
        }
        self.remaining -= n;
        Ok(n)
    }

    fn skip(&mut self, n: usize) -> anyhow::Result<usize> {
        let n = n.min(self.remaining);
        self.payload.take(n * self.width)?;
        self.remaining -= n;
        Ok(n)
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        self.payload.expect_end()
    }
}
