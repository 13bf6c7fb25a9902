use anyhow::Context;
use colblock_core::format::CODEC_ZSTD;
use colblock_core::Codec;

/// Zstandard chunk codec.
///
/// Each chunk is compressed independently at the configured level
/// (default: 3). Best for cold columns where size dominates.
pub struct ZstdCodec {
    /// Compression level (1 = fast / larger, 22 = slow / smallest).
    pub level: i32,
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self { level: 3 }
    }
}

impl ZstdCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Codec for ZstdCodec {
    fn id(&self) -> u16 {
        CODEC_ZSTD
    }

    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        let compressed = zstd::bulk::compress(raw, self.level)?;
        Ok(compressed)
    }

    fn decompress(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>> {
        // The header's raw_len bounds the output; a frame claiming more is
        // rejected by zstd rather than allocated.
        let raw = zstd::bulk::decompress(compressed, raw_len).context("zstd decompress error")?;
        Ok(raw)
    }
}
