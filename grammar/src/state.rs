//! Backtrackable cursors over parser input.
//!
//! Every combinator reads and moves the cursor through the [`State`] interface, which is all it
//! needs to restore the cursor after a failed attempt.  Text-based terminals additionally need to
//! see the unread input and the enclosing indentation blocks, which [`TextState`] provides.

/// Everything needed to put a [`State`] back exactly where it was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checkpoint {
    pub position: usize,
    /// Identifies the stack of indentation blocks open at `position`.  Only meaningful to the
    /// state which made the checkpoint.
    pub block: usize,
}

/// A mutable cursor over some immutable input.  Positions are offsets into the input.
pub trait State {
    fn position(&self) -> usize;

    /// Moves the cursor to `position`, clamped to the end of the input.
    fn set_position(&mut self, position: usize);

    /// Moves the cursor forward by `n`, clamped to the end of the input.  Returns the new
    /// position.
    fn advance(&mut self, n: usize) -> usize {
        let target = self.position().saturating_add(n);
        self.set_position(target);
        self.position()
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            position: self.position(),
            block: 0,
        }
    }

    /// Returns to a [`Checkpoint`] previously made by this state
    fn restore(&mut self, checkpoint: Checkpoint) {
        self.set_position(checkpoint.position);
    }
}

/// A [`State`] whose input is a string.  Positions are byte offsets.
pub trait TextState: State {
    /// The full input
    fn source(&self) -> &str;

    /// The indentation of every open block, outermost first.  The outermost is always `""`.
    fn indents(&self) -> Vec<&str>;

    /// Opens a block indented by `indent`
    fn push_indent(&mut self, indent: &str);

    /// Closes the innermost `n` blocks.  The outermost block is never closed.
    fn pop_indents(&mut self, n: usize);

    /// The input which hasn't been consumed yet
    fn remaining(&self) -> &str {
        self.source().get(self.position()..).unwrap_or("")
    }

    /// If the remaining input starts with `s`, consume it and return `true`.  Otherwise, return
    /// `false` without moving.
    #[must_use]
    fn eat(&mut self, s: &str) -> bool {
        if !self.remaining().starts_with(s) {
            return false;
        }
        self.advance(s.len());
        true
    }

    /// The length of the full input, in bytes
    fn len(&self) -> usize {
        self.source().len()
    }

    /// Returns `true` if the whole input has been consumed
    fn is_done(&self) -> bool {
        self.position() >= self.len()
    }
}

/// A [`TextState`] over a borrowed [`str`].
#[derive(Debug, Clone)]
pub struct StringState<'s> {
    source: &'s str,
    position: usize,
    /// Every block opened so far, as `(enclosing block, indentation)`.  Block 0 is the unindented
    /// top level.  Blocks are never removed, so the index of the innermost block identifies the
    /// whole stack.
    blocks: Vec<(usize, String)>,
    block: usize,
}

impl<'s> StringState<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            position: 0,
            blocks: vec![(0, String::new())],
            block: 0,
        }
    }

    /// The 1-indexed `(line, column)` of a byte offset, counting columns in `char`s.  Offsets past
    /// the end of the input are clamped.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let offset = clamp_to_boundary(self.source, offset);
        let before = &self.source[..offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |idx| idx + 1);
        let col = before[line_start..].chars().count() + 1;
        (line, col)
    }
}

impl State for StringState<'_> {
    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, position: usize) {
        self.position = clamp_to_boundary(self.source, position);
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            position: self.position,
            block: self.block,
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.set_position(checkpoint.position);
        if checkpoint.block < self.blocks.len() {
            self.block = checkpoint.block;
        }
    }
}

impl TextState for StringState<'_> {
    fn source(&self) -> &str {
        self.source
    }

    fn indents(&self) -> Vec<&str> {
        let mut indents = Vec::new();
        let mut block = self.block;
        while block != 0 {
            let (parent, indent) = &self.blocks[block];
            indents.push(indent.as_str());
            block = *parent;
        }
        indents.push("");
        indents.reverse();
        indents
    }

    fn push_indent(&mut self, indent: &str) {
        // Backtracking often re-opens the block which was opened last
        let reopened = self.blocks.len() - 1;
        if reopened != 0 && self.blocks[reopened].0 == self.block && self.blocks[reopened].1 == indent
        {
            self.block = reopened;
            return;
        }
        self.blocks.push((self.block, indent.to_owned()));
        self.block = self.blocks.len() - 1;
    }

    fn pop_indents(&mut self, n: usize) {
        for _ in 0..n {
            self.block = self.blocks[self.block].0;
        }
    }
}

/// Clamps `offset` to `s.len()`, then rounds it up to the next `char` boundary
fn clamp_to_boundary(s: &str, offset: usize) -> usize {
    let mut offset = offset.min(s.len());
    while !s.is_char_boundary(offset) {
        offset += 1;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::{State, StringState, TextState};

    #[test]
    fn eat() {
        let mut state = StringState::new("let x");
        assert!(!state.eat("x"));
        assert_eq!(state.position(), 0);
        assert!(state.eat("let"));
        assert_eq!(state.remaining(), " x");
        assert!(state.eat(" x"));
        assert!(state.is_done());
        assert!(!state.eat("x"));
    }

    #[test]
    fn advance_clamps() {
        let mut state = StringState::new("abc");
        assert_eq!(state.advance(2), 2);
        assert_eq!(state.advance(10), 3);
        assert_eq!(state.remaining(), "");
        state.set_position(1);
        assert_eq!(state.remaining(), "bc");
        state.set_position(usize::MAX);
        assert_eq!(state.position(), 3);
    }

    #[test]
    fn char_boundaries() {
        // 'é' takes two bytes
        let mut state = StringState::new("éa");
        state.set_position(1);
        assert_eq!(state.position(), 2);
        assert_eq!(state.remaining(), "a");
    }

    #[test]
    fn line_col() {
        let state = StringState::new("ab\ncé\n\nx");
        assert_eq!(state.line_col(0), (1, 1));
        assert_eq!(state.line_col(2), (1, 3));
        assert_eq!(state.line_col(3), (2, 1));
        assert_eq!(state.line_col(6), (2, 3));
        assert_eq!(state.line_col(7), (3, 1));
        assert_eq!(state.line_col(8), (4, 1));
        assert_eq!(state.line_col(100), (4, 2));
    }

    #[test]
    fn indent_blocks() {
        let mut state = StringState::new("");
        assert_eq!(state.indents(), vec![""]);
        let top = state.checkpoint();

        state.push_indent("  ");
        state.push_indent("    ");
        assert_eq!(state.indents(), vec!["", "  ", "    "]);
        let nested = state.checkpoint();
        state.pop_indents(2);
        assert_eq!(state.indents(), vec![""]);
        state.pop_indents(5);
        assert_eq!(state.indents(), vec![""]);

        state.restore(nested);
        assert_eq!(state.indents(), vec!["", "  ", "    "]);
        state.restore(top);
        assert_eq!(state.indents(), vec![""]);

        // Re-opening the same block doesn't grow the history
        state.push_indent("\t");
        state.restore(top);
        state.push_indent("\t");
        assert_eq!(state.blocks.len(), 4);
        assert_eq!(state.indents(), vec!["", "\t"]);
    }
}
