//! Variable-width LZW compression in the flavour GIF expects.
//!
//! The dictionary is a tree stored as an arena: node `n` holds one outgoing
//! edge per possible input byte, and an edge value of 0 means "no child"
//! (code 0 is a root and can never be a child). The tree is rebuilt from its
//! roots every time the 4096 code limit is reached.

use super::EncodingError;

/// Largest number of dictionary codes GIF allows.
pub const MAX_CODES: usize = 4096;

/// Receives every produced code word together with its width in bits.
pub trait CodeSink {
    fn consume(&mut self, code: u16, width: u8);
}

impl<C: CodeSink + ?Sized> CodeSink for &mut C {
    fn consume(&mut self, code: u16, width: u8) {
        (**self).consume(code, width);
    }
}

type Node = [u16; 256];

/// Streaming GIF LZW encoder.
///
/// Feed pixel indices with [`push`](Self::push) and terminate the stream
/// with [`finish`](Self::finish). Dropping an unfinished encoder finishes it.
pub struct LzwEncoder<C: CodeSink> {
    sink: C,
    depth: u8,
    code_width: u8,
    tree: Vec<Node>,
    prefix: Option<u16>,
    finished: bool,
}

impl<C: CodeSink> LzwEncoder<C> {
    /// `depth` is the number of significant bits per input sample, 1 to 8.
    ///
    /// A clear code is written immediately so the stream always starts from a
    /// known dictionary state.
    pub fn new(depth: u8, sink: C) -> Result<Self, EncodingError> {
        if !(1..=8).contains(&depth) {
            return Err(EncodingError::InvalidBitDepth(depth));
        }
        let mut encoder = Self {
            sink,
            depth,
            code_width: depth + 1,
            tree: Vec::with_capacity(MAX_CODES),
            prefix: None,
            finished: false,
        };
        encoder.reset();
        let clear = encoder.clear_code();
        encoder.sink.consume(clear, encoder.code_width);
        Ok(encoder)
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn clear_code(&self) -> u16 {
        1 << self.depth
    }

    pub fn end_code(&self) -> u16 {
        self.clear_code() + 1
    }

    /// Width in bits of the next emitted code.
    pub fn code_width(&self) -> u8 {
        self.code_width
    }

    pub fn push(&mut self, value: u8) {
        debug_assert!(
            u16::from(value) < self.clear_code(),
            "sample {} does not fit in {} bits",
            value,
            self.depth
        );
        if self.finished {
            return;
        }

        let Some(pos) = self.prefix else {
            self.prefix = Some(u16::from(value));
            return;
        };

        let next = self.tree[usize::from(pos)][usize::from(value)];
        if next != 0 {
            self.prefix = Some(next);
            return;
        }

        self.sink.consume(pos, self.code_width);

        let code = self.tree.len() as u16;
        self.tree.push([0; 256]);
        self.tree[usize::from(pos)][usize::from(value)] = code;

        if u32::from(code) == 1u32 << self.code_width {
            self.code_width += 1;
        }

        if self.tree.len() == MAX_CODES {
            let clear = self.clear_code();
            self.sink.consume(clear, self.code_width);
            self.reset();
        }

        self.prefix = Some(u16::from(value));
    }

    pub fn extend<I: IntoIterator<Item = u8>>(&mut self, values: I) {
        for value in values {
            self.push(value);
        }
    }

    /// Flush the pending prefix and write the clear and end codes.
    /// Calling it again does nothing.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        if let Some(pos) = self.prefix.take() {
            self.sink.consume(pos, self.code_width);
            // The decoder adds one more entry on reading that code than we
            // did; the clear code must use the width it will then expect.
            if self.tree.len() == 1usize << self.code_width {
                self.code_width += 1;
            }
        }

        let clear = self.clear_code();
        let end = self.end_code();
        self.sink.consume(clear, self.code_width);
        self.sink.consume(end, self.depth + 1);
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn reset(&mut self) {
        let roots = usize::from(self.end_code()) + 1;
        self.tree.truncate(roots);
        for node in self.tree.iter_mut() {
            node.fill(0);
        }
        self.tree.resize(roots, [0; 256]);
        self.code_width = self.depth + 1;
        self.prefix = None;
    }
}

impl<C: CodeSink> Drop for LzwEncoder<C> {
    fn drop(&mut self) {
        self.finish();
    }
}
