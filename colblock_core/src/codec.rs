/// Chunk compression abstraction.
///
/// Each `Codec` implementation:
/// - Is identified by a stable numeric `id()` stored in every chunk header.
/// - Must compress/decompress individual chunks independently. No cross-chunk
///   state is permitted; this is what lets a range step over a whole chunk
///   by reading its header alone.
pub trait Codec: Send + Sync {
    /// Stable codec ID stored in the chunk header.
    fn id(&self) -> u16;

    /// Human-readable codec name for CLI display.
    fn name(&self) -> &'static str;

    /// Compress the encoded payload of a single chunk.
    fn compress(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Decompress the payload of a single chunk.
    ///
    /// `raw_len` is the uncompressed length recorded in the chunk header; it
    /// may be used as a capacity hint. The caller verifies the result length.
    fn decompress(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>>;
}
