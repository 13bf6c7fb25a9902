use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::codec::Codec;
use crate::encoding::Encoding;
use crate::error::{Error, Result};

/// Lookup table from on-disk ids to codec and encoding implementations.
///
/// A registry is built once, wrapped in an `Arc`, and shared read-only by
/// every block handle and range that needs to resolve a chunk.
#[derive(Default, Clone)]
pub struct EncodingRegistry {
    codecs: BTreeMap<u16, Arc<dyn Codec>>,
    encodings: BTreeMap<u16, Arc<dyn Encoding>>,
}

impl EncodingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `codec` under its id, replacing any previous entry.
    pub fn register_codec(&mut self, codec: Arc<dyn Codec>) -> &mut Self {
        self.codecs.insert(codec.id(), codec);
        self
    }

    /// Registers `encoding` under its tag, replacing any previous entry.
    pub fn register_encoding(&mut self, encoding: Arc<dyn Encoding>) -> &mut Self {
        self.encodings.insert(encoding.tag(), encoding);
        self
    }

    pub fn codec(&self, id: u16) -> Result<Arc<dyn Codec>> {
        self.codecs
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::unknown_codec(id))
    }

    pub fn encoding(&self, tag: u16) -> Result<Arc<dyn Encoding>> {
        self.encodings
            .get(&tag)
            .cloned()
            .ok_or_else(|| Error::unknown_encoding(tag))
    }

    pub fn codec_by_name(&self, name: &str) -> Option<Arc<dyn Codec>> {
        self.codecs.values().find(|c| c.name() == name).cloned()
    }

    pub fn encoding_by_name(&self, name: &str) -> Option<Arc<dyn Encoding>> {
        self.encodings.values().find(|e| e.name() == name).cloned()
    }

    pub fn codecs(&self) -> impl Iterator<Item = &Arc<dyn Codec>> {
        self.codecs.values()
    }

    pub fn encodings(&self) -> impl Iterator<Item = &Arc<dyn Encoding>> {
        self.encodings.values()
    }
}

impl fmt::Debug for EncodingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodingRegistry")
            .field(
                "codecs",
                &self.codecs.values().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field(
                "encodings",
                &self.encodings.values().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
