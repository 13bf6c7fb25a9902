mod fixed_int;
mod float64;
mod lz4_codec;
mod passthrough;
mod payload;
mod plain;
mod rle;
mod zstd_codec;

pub use fixed_int::{FixedIntEncoding, DEFAULT_INT_WIDTH};
pub use float64::Float64Encoding;
pub use lz4_codec::Lz4Codec;
pub use passthrough::PassThroughCodec;
pub use plain::PlainEncoding;
pub use rle::RleEncoding;
pub use zstd_codec::ZstdCodec;

use colblock_core::EncodingRegistry;
use std::sync::Arc;

/// A registry holding every bundled codec and encoding, with zstd at its
/// default level.
pub fn default_registry() -> Arc<EncodingRegistry> {
    Arc::new(registry_with_zstd_level(ZstdCodec::default().level))
}

/// Like [`default_registry`], with a custom zstd compression level. The
/// level only affects writing.
pub fn registry_with_zstd_level(level: i32) -> EncodingRegistry {
    let mut registry = EncodingRegistry::new();
    registry
        .register_codec(Arc::new(PassThroughCodec))
        .register_codec(Arc::new(ZstdCodec::new(level)))
        .register_codec(Arc::new(Lz4Codec))
        .register_encoding(Arc::new(PlainEncoding))
        .register_encoding(Arc::new(FixedIntEncoding))
        .register_encoding(Arc::new(RleEncoding))
        .register_encoding(Arc::new(Float64Encoding));
    registry
}
