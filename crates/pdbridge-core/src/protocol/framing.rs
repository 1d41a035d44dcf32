//! Byte-level writer and reader for control frames

use super::error::{FrameError, FrameResult};

/// Opening and closing marker of a selection list
pub const SELECTION_SENTINEL: &str = "#";

/// Append-only frame builder
#[derive(Debug, Default, Clone)]
pub struct MessageWriter {
    buf: Vec<u8>,
}

impl MessageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_f32(&mut self, value: f32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.buf.push(value as u8);
        self
    }

    /// UTF-8 bytes followed by a NUL terminator
    ///
    /// Interior NULs would truncate the string on the reading side, so the
    /// string is cut at the first one.
    pub fn write_str(&mut self, value: &str) -> &mut Self {
        let bytes = value.as_bytes();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.buf.extend_from_slice(&bytes[..end]);
        self.buf.push(0);
        self
    }

    /// `"#"`, each id, `"#"`
    pub fn write_selection<I, S>(&mut self, ids: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.write_str(SELECTION_SENTINEL);
        for id in ids {
            self.write_str(id.as_ref());
        }
        self.write_str(SELECTION_SENTINEL)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a received frame
#[derive(Debug, Clone)]
pub struct MessageReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MessageReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// True once every byte has been consumed
    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Bytes left to read
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    /// Current byte offset
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, count: usize) -> FrameResult<&'a [u8]> {
        let available = self.data.len().saturating_sub(self.pos);
        if available < count {
            return Err(FrameError::UnexpectedEof {
                offset: self.pos,
                needed: count - available,
            });
        }
        let bytes = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> FrameResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_i32(&mut self) -> FrameResult<i32> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> FrameResult<f32> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    /// Any non-zero byte is `true`
    pub fn read_bool(&mut self) -> FrameResult<bool> {
        Ok(self.take(1)?[0] != 0)
    }

    pub fn read_string(&mut self) -> FrameResult<String> {
        let start = self.pos;
        let rest = self.remaining();
        let Some(len) = rest.iter().position(|&b| b == 0) else {
            if rest.is_empty() {
                return Err(FrameError::UnexpectedEof {
                    offset: start,
                    needed: 1,
                });
            }
            return Err(FrameError::UnterminatedString(start));
        };
        let text = std::str::from_utf8(&rest[..len]).map_err(|_| FrameError::InvalidUtf8(start))?;
        self.pos += len + 1;
        Ok(text.to_string())
    }

    /// Read a `"#"`-bracketed id list
    ///
    /// A missing closing sentinel at end of input is tolerated.
    pub fn read_selection(&mut self) -> FrameResult<Vec<String>> {
        let open = self.read_string()?;
        if open != SELECTION_SENTINEL {
            return Err(FrameError::MissingSentinel(open));
        }

        let mut ids = Vec::new();
        while !self.is_exhausted() {
            let id = self.read_string()?;
            if id == SELECTION_SENTINEL {
                break;
            }
            ids.push(id);
        }
        Ok(ids)
    }
}
