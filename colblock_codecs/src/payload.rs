use anyhow::{bail, ensure};
use colblock_core::{FlexType, FlexValue};

/// Owned chunk payload with a read position.
///
/// Every read is bounds-checked and reports truncation as an error.
pub(crate) struct Payload {
    bytes: Vec<u8>,
    pos: usize,
}

impl Payload {
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn unread(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Fails if any byte is left unread.
    pub(crate) fn expect_end(&self) -> anyhow::Result<()> {
        ensure!(
            self.unread() == 0,
            "{} trailing payload bytes after the last value",
            self.unread()
        );
        Ok(())
    }

    pub(crate) fn take(&mut self, n: usize) -> anyhow::Result<&[u8]> {
        ensure!(
            n <= self.unread(),
            "payload truncated: need {n} bytes at offset {}, {} left",
            self.pos,
            self.unread()
        );
        let start = self.pos;
        self.pos += n;
        Ok(&self.bytes[start..self.pos])
    }

    pub(crate) fn read_u8(&mut self) -> anyhow::Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u32(&mut self) -> anyhow::Result<u32> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(b))
    }

    pub(crate) fn read_i64(&mut self) -> anyhow::Result<i64> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(i64::from_le_bytes(b))
    }

    pub(crate) fn read_f64(&mut self) -> anyhow::Result<f64> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(f64::from_le_bytes(b))
    }

    /// Reads a value written by [`write_value`].
    pub(crate) fn read_value(&mut self) -> anyhow::Result<FlexValue> {
        let tag = self.read_u8()?;
        let Some(flex_type) = FlexType::from_u8(tag) else {
            bail!("unknown value type tag {tag}");
        };
        Ok(match flex_type {
            FlexType::Null => FlexValue::Null,
            FlexType::Integer => FlexValue::Integer(self.read_i64()?),
            FlexType::Float => FlexValue::Float(self.read_f64()?),
            FlexType::String => {
                let len = self.read_u32()? as usize;
                let bytes = self.take(len)?;
                FlexValue::String(String::from_utf8(bytes.to_vec())?)
            }
            FlexType::Vector => {
                let len = self.read_u32()? as usize;
                ensure!(
                    len.checked_mul(8).is_some_and(|n| n <= self.unread()),
                    "vector of {len} elements overruns payload"
                );
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(self.read_f64()?);
                }
                FlexValue::Vector(v)
            }
        })
    }
}

/// Appends `value` as a type tag followed by its little-endian payload.
pub(crate) fn write_value(value: &FlexValue, out: &mut Vec<u8>) -> anyhow::Result<()> {
    out.push(value.flex_type() as u8);
    match value {
        FlexValue::Null => {}
        FlexValue::Integer(v) => out.extend_from_slice(&v.to_le_bytes()),
        FlexValue::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
        FlexValue::String(s) => {
            out.extend_from_slice(&len_u32(s.len())?.to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        FlexValue::Vector(v) => {
            out.extend_from_slice(&len_u32(v.len())?.to_le_bytes());
            for x in v {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
    }
    Ok(())
}

fn len_u32(len: usize) -> anyhow::Result<u32> {
    u32::try_from(len).map_err(|_| anyhow::anyhow!("value of length {len} is too long"))
}
