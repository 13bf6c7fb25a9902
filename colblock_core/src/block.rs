use std::sync::Arc;

use crate::format::BlockInfo;
use crate::range::EncodedBlockRange;
use crate::registry::EncodingRegistry;

/// Immutable pairing of block metadata with its encoded bytes.
///
/// Snapshots are shared through `Arc`; nothing ever mutates the bytes of a
/// snapshot once it has been built.
#[derive(Debug)]
pub struct BlockSnapshot {
    info: BlockInfo,
    data: Arc<Vec<u8>>,
    registry: Arc<EncodingRegistry>,
}

impl BlockSnapshot {
    pub fn info(&self) -> &BlockInfo {
        &self.info
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn shared_data(&self) -> &Arc<Vec<u8>> {
        &self.data
    }

    pub fn registry(&self) -> &Arc<EncodingRegistry> {
        &self.registry
    }
}

/// Handle to one encoded column block.
///
/// The block stays compressed; values are only produced by the ranges
/// returned from [`get_range`](EncodedBlock::get_range). Cloning a handle
/// copies a single `Arc`.
///
/// Re-pointing a handle with [`init`](EncodedBlock::init) swaps in a new
/// snapshot. Ranges obtained earlier keep reading the snapshot they captured.
#[derive(Debug, Clone)]
pub struct EncodedBlock {
    registry: Arc<EncodingRegistry>,
    snapshot: Option<Arc<BlockSnapshot>>,
}

impl EncodedBlock {
    /// An empty handle. Ranges obtained from it are immediately exhausted.
    pub fn new(registry: Arc<EncodingRegistry>) -> Self {
        Self {
            registry,
            snapshot: None,
        }
    }

    pub fn from_vec(registry: Arc<EncodingRegistry>, info: BlockInfo, data: Vec<u8>) -> Self {
        Self::from_shared(registry, info, Arc::new(data))
    }

    pub fn from_shared(
        registry: Arc<EncodingRegistry>,
        info: BlockInfo,
        data: Arc<Vec<u8>>,
    ) -> Self {
        let mut block = Self::new(registry);
        block.init_shared(info, data);
        block
    }

    /// Points this handle at new data. Existing ranges are not invalidated.
    pub fn init(&mut self, info: BlockInfo, data: Vec<u8>) {
        self.init_shared(info, Arc::new(data));
    }

    /// Points this handle at new, shared data. Existing ranges are not
    /// invalidated.
    ///
    /// Nothing is validated here: a mismatch between `info` and `data`
    /// surfaces as a decode error on the first read of a range.
    pub fn init_shared(&mut self, info: BlockInfo, data: Arc<Vec<u8>>) {
        self.snapshot = Some(Arc::new(BlockSnapshot {
            info,
            data,
            registry: self.registry.clone(),
        }));
    }

    /// Returns a single-pass reader over the current contents.
    ///
    /// No decoding happens until the range is first read. The range holds its
    /// own reference to the data and may be moved to another thread.
    pub fn get_range(&self) -> EncodedBlockRange {
        EncodedBlockRange::new(self.snapshot.clone())
    }

    /// Drops this handle's reference to the block. Acquired ranges stay valid.
    pub fn release(&mut self) {
        self.snapshot = None;
    }

    /// Declared number of values in the current block.
    pub fn size(&self) -> u64 {
        self.snapshot.as_ref().map_or(0, |s| s.info.num_elem)
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_none()
    }

    pub fn block_info(&self) -> Option<BlockInfo> {
        self.snapshot.as_ref().map(|s| s.info)
    }

    pub fn block_data(&self) -> Option<Arc<Vec<u8>>> {
        self.snapshot.as_ref().map(|s| s.data.clone())
    }

    pub fn snapshot(&self) -> Option<Arc<BlockSnapshot>> {
        self.snapshot.clone()
    }

    pub fn registry(&self) -> &Arc<EncodingRegistry> {
        &self.registry
    }
}
