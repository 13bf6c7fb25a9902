use crate::error::{Error, Result};

/// Magic bytes of a serialized [`BlockInfo`]: "CBLK1\n" followed by 2 null bytes.
pub const BLOCK_MAGIC: &[u8; 8] = b"CBLK1\n\x00\x00";

pub const BLOCK_FORMAT_VERSION: u16 = 1;

/// Fixed size of a serialized [`BlockInfo`] in bytes.
///   magic[8] + version:u16 + encoding:u16 + element_width:u8 + _pad[3]
///   + num_elem:u64 + block_size:u64 + flags:u64
///   = 8 + 2 + 2 + 1 + 3 + 8 + 8 + 8 = 40
pub const BLOCK_HEADER_SIZE: usize = 40;

/// Size of each chunk header inside the block bytes.
///   num_elem:u32 + raw_len:u32 + compressed_len:u32
///   + codec_id:u16 + _pad[2] + checksum:u64
///   = 4 + 4 + 4 + 2 + 2 + 8 = 24
pub const CHUNK_HEADER_SIZE: usize = 24;

/// Default number of values per physical chunk.
pub const DEFAULT_CHUNK_LEN: usize = 1024;

// ── Flags ──────────────────────────────────────────────────────────────────

/// Every chunk carries an xxhash3-64 checksum of its compressed payload.
pub const FLAG_CHUNK_CHECKSUM: u64 = 1 << 0;

// ── Codec IDs ──────────────────────────────────────────────────────────────

pub const CODEC_PASSTHROUGH: u16 = 0;
pub const CODEC_ZSTD: u16 = 1;
pub const CODEC_LZ4: u16 = 2;

// ── Encoding tags ──────────────────────────────────────────────────────────

pub const ENCODING_PLAIN: u16 = 0;
pub const ENCODING_FIXED_INT: u16 = 1;
pub const ENCODING_RLE: u16 = 2;
pub const ENCODING_FLOAT64: u16 = 3;

// ── Block metadata ─────────────────────────────────────────────────────────

/// Metadata describing one encoded block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockInfo {
    /// Encoding tag used to pick the per-chunk decoder.
    pub encoding: u16,
    /// Declared number of values in the block.
    pub num_elem: u64,
    /// Length of the encoded block bytes.
    pub block_size: u64,
    /// Byte width of each value, for fixed-width encodings.
    pub element_width: Option<u8>,
    pub flags: u64,
}

impl BlockInfo {
    pub fn has_flag(&self, flag: u64) -> bool {
        self.flags & flag != 0
    }

    /// Serialize to exactly `BLOCK_HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut buf = [0u8; BLOCK_HEADER_SIZE];
        buf[..8].copy_from_slice(BLOCK_MAGIC);
        buf[8..10].copy_from_slice(&BLOCK_FORMAT_VERSION.to_le_bytes());
        buf[10..12].copy_from_slice(&self.encoding.to_le_bytes());
        buf[12] = self.element_width.unwrap_or(0);
        // buf[13..16] padding
        buf[16..24].copy_from_slice(&self.num_elem.to_le_bytes());
        buf[24..32].copy_from_slice(&self.block_size.to_le_bytes());
        buf[32..40].copy_from_slice(&self.flags.to_le_bytes());
        buf
    }

    /// Deserialize from the first `BLOCK_HEADER_SIZE` bytes of `buf`,
    /// checking the magic and version.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < BLOCK_HEADER_SIZE {
            return Err(Error::invalid_format(
                "block header",
                format!("need {BLOCK_HEADER_SIZE} bytes, got {}", buf.len()),
            ));
        }
        if &buf[..8] != BLOCK_MAGIC {
            return Err(Error::invalid_format(
                "block header",
                "invalid magic bytes, not a CBLK1 block",
            ));
        }
        let version = read_u16(buf, 8);
        if version != BLOCK_FORMAT_VERSION {
            return Err(Error::invalid_format(
                "block header",
                format!("unsupported version {version}"),
            ));
        }
        Ok(Self {
            encoding: read_u16(buf, 10),
            element_width: match buf[12] {
                0 => None,
                w => Some(w),
            },
            num_elem: read_u64(buf, 16),
            block_size: read_u64(buf, 24),
            flags: read_u64(buf, 32),
        })
    }
}

// ── Chunk header ───────────────────────────────────────────────────────────

/// Header in front of every physical chunk of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkHeader {
    /// Values encoded in this chunk.
    pub num_elem: u32,
    /// Length of the payload after decompression.
    pub raw_len: u32,
    /// Length of the payload as stored.
    pub compressed_len: u32,
    pub codec_id: u16,
    /// xxhash3-64 of the stored payload.
    pub checksum: u64,
}

impl ChunkHeader {
    /// Serialize to exactly `CHUNK_HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; CHUNK_HEADER_SIZE] {
        let mut buf = [0u8; CHUNK_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.num_elem.to_le_bytes());
        buf[4..8].copy_from_slice(&self.raw_len.to_le_bytes());
        buf[8..12].copy_from_slice(&self.compressed_len.to_le_bytes());
        buf[12..14].copy_from_slice(&self.codec_id.to_le_bytes());
        // buf[14..16] padding
        buf[16..24].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Parse the header starting at `offset`, verifying that both the header
    /// and its payload lie within `data`. `chunk` is only used for errors.
    pub fn read_at(data: &[u8], offset: usize, chunk: usize) -> Result<Self> {
        let header_end = offset
            .checked_add(CHUNK_HEADER_SIZE)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| {
                Error::corrupt(
                    chunk,
                    format!(
                        "truncated chunk header at offset {offset} (block is {} bytes)",
                        data.len()
                    ),
                )
            })?;
        let buf = &data[offset..header_end];
        let header = Self {
            num_elem: read_u32(buf, 0),
            raw_len: read_u32(buf, 4),
            compressed_len: read_u32(buf, 8),
            codec_id: read_u16(buf, 12),
            checksum: read_u64(buf, 16),
        };
        if header.num_elem == 0 {
            return Err(Error::corrupt(chunk, "chunk holds no elements"));
        }
        if header_end + header.compressed_len as usize > data.len() {
            return Err(Error::corrupt(
                chunk,
                format!(
                    "chunk payload of {} bytes at offset {header_end} overruns block of {} bytes",
                    header.compressed_len,
                    data.len()
                ),
            ));
        }
        Ok(header)
    }

    /// Bytes occupied by this chunk, header included.
    pub fn total_len(&self) -> usize {
        CHUNK_HEADER_SIZE + self.compressed_len as usize
    }
}

/// Walks the chunk headers of a block without touching any payload.
pub struct ChunkHeaders<'a> {
    data: &'a [u8],
    offset: usize,
    chunk: usize,
    failed: bool,
}

impl<'a> ChunkHeaders<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            chunk: 0,
            failed: false,
        }
    }
}

impl Iterator for ChunkHeaders<'_> {
    /// `(byte offset of the header, header)`
    type Item = Result<(usize, ChunkHeader)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }
        match ChunkHeader::read_at(self.data, self.offset, self.chunk) {
            Ok(header) => {
                let at = self.offset;
                self.offset += header.total_len();
                self.chunk += 1;
                Some(Ok((at, header)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(b)
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_info_bytes() {
        let info = BlockInfo {
            encoding: ENCODING_FIXED_INT,
            num_elem: 5,
            block_size: 77,
            element_width: Some(4),
            flags: FLAG_CHUNK_CHECKSUM,
        };
        let bytes = info.to_bytes();
        assert_eq!(BlockInfo::from_bytes(&bytes).unwrap(), info);

        let mut bad = bytes;
        bad[0] = b'X';
        let err = BlockInfo::from_bytes(&bad).unwrap_err();
        assert!(err.to_string().contains("magic"));
        assert!(BlockInfo::from_bytes(&bytes[..10]).is_err());
    }

    #[test]
    fn test_chunk_header_bounds() {
        let header = ChunkHeader {
            num_elem: 3,
            raw_len: 10,
            compressed_len: 4,
            codec_id: CODEC_PASSTHROUGH,
            checksum: 0,
        };
        let mut data = header.to_bytes().to_vec();
        data.extend_from_slice(&[1, 2, 3]);
        // payload one byte short
        let err = ChunkHeader::read_at(&data, 0, 0).unwrap_err();
        assert!(err.is_decode());
        data.push(4);
        assert_eq!(ChunkHeader::read_at(&data, 0, 0).unwrap(), header);
        assert!(ChunkHeader::read_at(&data, 1, 0).is_err());
    }

    #[test]
    fn test_chunk_headers_walk() {
        let mut data = Vec::new();
        for n in [2u32, 5] {
            let header = ChunkHeader {
                num_elem: n,
                compressed_len: n,
                raw_len: n,
                ..Default::default()
            };
            data.extend_from_slice(&header.to_bytes());
            data.extend(std::iter::repeat(0u8).take(n as usize));
        }
        let headers: Vec<_> = ChunkHeaders::new(&data).map(|h| h.unwrap()).collect();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].0, 0);
        assert_eq!(headers[1].0, CHUNK_HEADER_SIZE + 2);
        assert_eq!(headers[1].1.num_elem, 5);

        data.push(0xff);
        let last = ChunkHeaders::new(&data).last().unwrap();
        assert!(last.is_err());
    }
}
