pub mod block;
pub mod codec;
pub mod encoding;
mod engine;
pub mod error;
pub mod format;
pub mod range;
pub mod registry;
pub mod value;
pub mod writer;

pub use block::{BlockSnapshot, EncodedBlock};
pub use codec::Codec;
pub use encoding::{ChunkDecoder, Encoding};
pub use error::{Error, ErrorKind, Result};
pub use format::{BlockInfo, ChunkHeader, BLOCK_HEADER_SIZE, CHUNK_HEADER_SIZE};
pub use range::{EncodedBlockRange, RangeStatus, Values};
pub use registry::EncodingRegistry;
pub use value::{FlexType, FlexValue};
pub use writer::{BlockWriter, WriterConfig};
