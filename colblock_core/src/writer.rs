use std::sync::Arc;

use tracing::{debug, instrument, trace, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::block::EncodedBlock;
use crate::codec::Codec;
use crate::encoding::Encoding;
use crate::error::{Error, Result};
use crate::format::{
    BlockInfo, ChunkHeader, CODEC_ZSTD, DEFAULT_CHUNK_LEN, ENCODING_PLAIN, FLAG_CHUNK_CHECKSUM,
};
use crate::registry::EncodingRegistry;
use crate::value::FlexValue;

/// Settings for [`BlockWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    /// Encoding tag applied to every chunk.
    pub encoding: u16,
    /// Compression codec applied to every chunk payload.
    pub codec: u16,
    /// Values per chunk (the last chunk may be smaller).
    pub chunk_len: usize,
    /// Byte width for fixed-width encodings.
    pub element_width: Option<u8>,
    /// Store an xxhash3-64 checksum of every chunk payload.
    pub checksum: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            encoding: ENCODING_PLAIN,
            codec: CODEC_ZSTD,
            chunk_len: DEFAULT_CHUNK_LEN,
            element_width: None,
            checksum: true,
        }
    }
}

impl WriterConfig {
    pub fn with_encoding(mut self, encoding: u16) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_codec(mut self, codec: u16) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_chunk_len(mut self, chunk_len: usize) -> Self {
        self.chunk_len = chunk_len;
        self
    }

    pub fn with_element_width(mut self, element_width: Option<u8>) -> Self {
        self.element_width = element_width;
        self
    }

    pub fn with_checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }
}

/// Streaming builder for one encoded block.
///
/// # Write contract
/// Call [`write`](BlockWriter::write) or [`push`](BlockWriter::push) any
/// number of times. The writer buffers values and emits an independent chunk
/// every `chunk_len` values. [`finish`](BlockWriter::finish) flushes the
/// partial trailing chunk and returns the block metadata and bytes.
///
/// # Layout written
/// ```text
/// [CHUNK HEADER 0][PAYLOAD 0] [CHUNK HEADER 1][PAYLOAD 1] ...
/// ```
pub struct BlockWriter {
    registry: Arc<EncodingRegistry>,
    encoding: Arc<dyn Encoding>,
    codec: Arc<dyn Codec>,
    config: WriterConfig,
    /// Values not yet flushed into a chunk.
    pending: Vec<FlexValue>,
    data: Vec<u8>,
    num_elem: u64,
    chunk_count: usize,
    scratch: Vec<u8>,
    /// Set when a chunk failed to flush; every later call returns it.
    failed: Option<Error>,
}

impl BlockWriter {
    pub fn new(registry: Arc<EncodingRegistry>, config: WriterConfig) -> Result<Self> {
        if config.chunk_len == 0 || config.chunk_len > u32::MAX as usize {
            return Err(Error::invalid_arg(
                "chunk_len",
                format!("must be in 1..={}, got {}", u32::MAX, config.chunk_len),
            ));
        }
        let encoding = registry.encoding(config.encoding)?;
        let codec = registry.codec(config.codec)?;
        Ok(Self {
            registry,
            encoding,
            codec,
            pending: Vec::with_capacity(config.chunk_len),
            config,
            data: Vec::new(),
            num_elem: 0,
            chunk_count: 0,
            scratch: Vec::new(),
            failed: None,
        })
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Values accepted so far, flushed or not.
    pub fn num_elem(&self) -> u64 {
        self.num_elem + self.pending.len() as u64
    }

    /// Buffer `values` and flush complete chunks as they fill up.
    ///
    /// If a chunk fails to encode or compress, the writer keeps the error
    /// and rejects every later `write`, `push` and `finish` with it.
    pub fn write(&mut self, values: &[FlexValue]) -> Result<()> {
        self.check_failed()?;
        self.pending.extend_from_slice(values);
        while self.pending.len() >= self.config.chunk_len {
            self.flush_front(self.config.chunk_len)?;
        }
        Ok(())
    }

    pub fn push(&mut self, value: FlexValue) -> Result<()> {
        self.check_failed()?;
        self.pending.push(value);
        if self.pending.len() >= self.config.chunk_len {
            self.flush_front(self.config.chunk_len)?;
        }
        Ok(())
    }

    fn check_failed(&self) -> Result<()> {
        match &self.failed {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Flush the first `n` pending values as one chunk. They leave the
    /// buffer only once the chunk has been written.
    fn flush_front(&mut self, n: usize) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        let result = self.flush_chunk(&pending[..n]);
        self.pending = pending;
        if let Err(e) = result {
            warn!(error = %e, chunk = self.chunk_count, "chunk flush failed");
            self.failed = Some(e.clone());
            return Err(e);
        }
        self.pending.drain(..n);
        Ok(())
    }

    /// Encode and compress `values` as a single chunk.
    fn flush_chunk(&mut self, values: &[FlexValue]) -> Result<()> {
        self.scratch.clear();
        self.encoding
            .encode_chunk(values, self.config.element_width, &mut self.scratch)
            .map_err(|e| Error::encode(format!("{e:#}")))?;
        let compressed = self
            .codec
            .compress(&self.scratch)
            .map_err(|e| Error::encode(format!("{e:#}")))?;

        let raw_len = u32::try_from(self.scratch.len())
            .map_err(|_| Error::encode("chunk payload exceeds 4 GiB"))?;
        let compressed_len = u32::try_from(compressed.len())
            .map_err(|_| Error::encode("compressed chunk exceeds 4 GiB"))?;
        let checksum = if self.config.checksum {
            xxh3_64(&compressed)
        } else {
            0
        };

        let header = ChunkHeader {
            num_elem: values.len() as u32,
            raw_len,
            compressed_len,
            codec_id: self.codec.id(),
            checksum,
        };
        self.data.extend_from_slice(&header.to_bytes());
        self.data.extend_from_slice(&compressed);
        self.num_elem += values.len() as u64;
        self.chunk_count += 1;

        trace!(
            chunk = self.chunk_count - 1,
            num_elem = values.len(),
            raw_len,
            compressed_len,
            "flushed chunk"
        );
        Ok(())
    }

    /// Flush any remaining values and return the block metadata and bytes.
    #[instrument(level = "debug", skip_all)]
    pub fn finish(mut self) -> Result<(BlockInfo, Vec<u8>)> {
        self.check_failed()?;
        if !self.pending.is_empty() {
            self.flush_front(self.pending.len())?;
        }
        let info = BlockInfo {
            encoding: self.encoding.tag(),
            num_elem: self.num_elem,
            block_size: self.data.len() as u64,
            element_width: self.config.element_width,
            flags: if self.config.checksum {
                FLAG_CHUNK_CHECKSUM
            } else {
                0
            },
        };
        debug!(
            encoding = self.encoding.name(),
            codec = self.codec.name(),
            num_elem = info.num_elem,
            block_size = info.block_size,
            chunks = self.chunk_count,
            "finished block"
        );
        Ok((info, self.data))
    }

    /// Like [`finish`](BlockWriter::finish), wrapped in a block handle that
    /// shares this writer's registry.
    pub fn finish_block(self) -> Result<EncodedBlock> {
        let registry = self.registry.clone();
        let (info, data) = self.finish()?;
        Ok(EncodedBlock::from_vec(registry, info, data))
    }
}
