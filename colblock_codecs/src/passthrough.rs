use colblock_core::format::CODEC_PASSTHROUGH;
use colblock_core::Codec;

/// No-op codec: stores chunk payloads verbatim.
///
/// Useful for:
/// - Testing encodings independently of any compression.
/// - Payloads that do not compress, such as high-entropy floats.
pub struct PassThroughCodec;

impl Codec for PassThroughCodec {
    fn id(&self) -> u16 {
        CODEC_PASSTHROUGH
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn compress(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress(&self, compressed: &[u8], _raw_len: usize) -> anyhow::Result<Vec<u8>> {
        Ok(compressed.to_vec())
    }
}
