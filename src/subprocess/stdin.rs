use std::collections::VecDeque;

/// Queue of bytes waiting to be written to a child's stdin
///
/// Appends never copy existing data; writes consume from the front chunk.
#[derive(Debug, Default)]
pub struct StdinBuffer {
    chunks: VecDeque<Vec<u8>>,
    offset: usize,
    len: usize,
}

impl StdinBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.len += data.len();
        self.chunks.push_back(data.to_vec());
    }

    /// Unwritten bytes of the front chunk
    pub fn front(&self) -> &[u8] {
        self.chunks
            .front()
            .map(|chunk| &chunk[self.offset..])
            .unwrap_or(&[])
    }

    /// Mark `n` bytes from the front as written
    pub fn consume(&mut self, mut n: usize) {
        n = n.min(self.len);
        self.len -= n;
        while n > 0 {
            let Some(front) = self.chunks.front() else {
                break;
            };
            let remaining = front.len() - self.offset;
            if n < remaining {
                self.offset += n;
                return;
            }
            n -= remaining;
            self.chunks.pop_front();
            self.offset = 0;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.offset = 0;
        self.len = 0;
    }
}
