use crate::value::FlexValue;

/// A value encoding: turns a run of values into one chunk payload and opens
/// decoders over such payloads.
///
/// Like [`Codec`](crate::Codec), an encoding must never carry state from one
/// chunk into the next.
pub trait Encoding: Send + Sync {
    /// Stable encoding tag stored in [`BlockInfo`](crate::BlockInfo).
    fn tag(&self) -> u16;

    fn name(&self) -> &'static str;

    /// Append the encoded form of `values` to `out`.
    fn encode_chunk(
        &self,
        values: &[FlexValue],
        element_width: Option<u8>,
        out: &mut Vec<u8>,
    ) -> anyhow::Result<()>;

    /// Open a decoder over a decompressed chunk payload holding `num_elem`
    /// values.
    fn open_chunk(
        &self,
        payload: Vec<u8>,
        num_elem: usize,
        element_width: Option<u8>,
    ) -> anyhow::Result<Box<dyn ChunkDecoder>>;
}

/// Stateful decoder over one chunk.
///
/// The decode engine keeps feeding a chunk decoder until `remaining()`
/// drops to zero, then calls [`finish`](ChunkDecoder::finish) and moves on to
/// the next chunk. Dropping a decoder early releases its payload.
pub trait ChunkDecoder: Send {
    /// Values not yet decoded or skipped.
    fn remaining(&self) -> usize;

    /// Decode the next `min(target.len(), remaining())` values into the
    /// front of `target`, returning how many were written.
    fn decode_into(&mut self, target: &mut [FlexValue]) -> anyhow::Result<usize>;

    /// Advance past the next `min(n, remaining())` values, returning how many
    /// were skipped. The decoder must end up in exactly the state that
    /// decoding those values would have left it in.
    fn skip(&mut self, n: usize) -> anyhow::Result<usize> {
        let n = n.min(self.remaining());
        let mut scratch = vec![FlexValue::Null; n.min(SKIP_SCRATCH_LEN)];
        let mut skipped = 0;
        while skipped < n {
            let want = (n - skipped).min(scratch.len());
            let got = self.decode_into(&mut scratch[..want])?;
            if got == 0 {
                break;
            }
            skipped += got;
        }
        Ok(skipped)
    }

    /// Called once every value has been consumed. Implementations verify
    /// that no payload bytes were left over.
    fn finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

const SKIP_SCRATCH_LEN: usize = 256;
