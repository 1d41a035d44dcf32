//! Interpreter print output, joined into console lines

/// Longest line forwarded in one piece, in bytes (including the terminator slot)
pub const CONSOLE_LINE_CAPACITY: usize = 2048;

/// Concatenates print fragments into lines
///
/// The interpreter prints a line in several fragments (`"print: "`, `"1"`,
/// `"\n"`). A line is emitted when a fragment ends it with `\n`, which is
/// stripped. Text that would overflow the buffer is emitted in pieces of at
/// most `CONSOLE_LINE_CAPACITY - 1` bytes, split between characters.
#[derive(Debug)]
pub struct ConsoleBuffer {
    pending: Vec<u8>,
}

impl Default for ConsoleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleBuffer {
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(CONSOLE_LINE_CAPACITY),
        }
    }

    /// Append a fragment, calling `emit` for every completed line
    pub fn push(&mut self, fragment: &str, mut emit: impl FnMut(String)) {
        let mut rest = fragment;

        while self.pending.len() + rest.len() >= CONSOLE_LINE_CAPACITY {
            let mut take = CONSOLE_LINE_CAPACITY - 1 - self.pending.len();
            while !rest.is_char_boundary(take) {
                take -= 1;
            }
            self.pending.extend_from_slice(&rest.as_bytes()[..take]);
            emit(self.take_line());
            rest = &rest[take..];
        }

        self.pending.extend_from_slice(rest.as_bytes());
        if self.pending.last() == Some(&b'\n') {
            self.pending.pop();
            emit(self.take_line());
        }
    }

    /// Bytes waiting for the end of their line
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }
}
