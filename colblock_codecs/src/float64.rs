use anyhow::{bail, ensure};
use colblock_core::format::ENCODING_FLOAT64;
use colblock_core::{ChunkDecoder, Encoding, FlexValue};

use crate::payload::Payload;

/// Raw little-endian `f64` values. Integers are widened on write.
pub struct Float64Encoding;

impl Encoding for Float64Encoding {
    fn tag(&self) -> u16 {
        ENCODING_FLOAT64
    }

    fn name(&self) -> &'static str {
        "float64"
    }

    fn encode_chunk(
        &self,
        values: &[FlexValue],
        _element_width: Option<u8>,
        out: &mut Vec<u8>,
    ) -> anyhow::Result<()> {
        out.reserve(values.len() * 8);
        for value in values {
            let Some(v) = value.as_float() else {
                bail!(
                    "float64 encoding only stores numbers, got {:?}",
                    value.flex_type()
                );
            };
            out.extend_from_slice(&v.to_le_bytes());
        }
        Ok(())
    }

    fn open_chunk(
        &self,
        payload: Vec<u8>,
        num_elem: usize,
        _element_width: Option<u8>,
    ) -> anyhow::Result<Box<dyn ChunkDecoder>> {
        ensure!(
            num_elem.checked_mul(8) == Some(payload.len()),
            "payload of {} bytes cannot hold {num_elem} f64 values",
            payload.len()
        );
        Ok(Box::new(Float64Decoder {
            payload: Payload::new(payload),
            remaining: num_elem,
        }))
    }
}

struct Float64Decoder {
    payload: Payload,
    remaining: usize,
}

impl ChunkDecoder for Float64Decoder {
    fn remaining(&self) -> usize {
        self.remaining
    }

    fn decode_into(&mut self, target: &mut [FlexValue]) -> anyhow::Result<usize> {
        let n = target.len().min(self.remaining);
        for slot in &mut target[..n] {
            *slot = FlexValue::Float(self.payload.read_f64()?);
        }
        self.remaining -= n;
        Ok(n)
    }

    fn skip(&mut self, n: usize) -> anyhow::Result<usize> {
        let n = n.min(self.remaining);
        self.payload.take(n * 8)?;
        self.remaining -= n;
        Ok(n)
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        self.payload.expect_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_widen() {
        let mut out = Vec::new();
        Float64Encoding
            .encode_chunk(&[FlexValue::Integer(2), FlexValue::Float(-0.5)], None, &mut out)
            .unwrap();
        let mut decoder = Float64Encoding.open_chunk(out, 2, None).unwrap();
        let mut buf = vec![FlexValue::Null; 2];
        decoder.decode_into(&mut buf).unwrap();
        assert_eq!(buf, vec![FlexValue::Float(2.0), FlexValue::Float(-0.5)]);
    }

    #[test]
    fn test_rejects_strings() {
        let mut out = Vec::new();
        assert!(Float64Encoding
            .encode_chunk(&[FlexValue::from("x")], None, &mut out)
            .is_err());
    }
}
