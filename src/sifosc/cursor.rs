//! Backtracking scanner over an immutable source string.

/// Deepest chain of nested rules a cursor allows. Anything deeper does not match.
pub const MAX_NESTING: usize = 128;

/// A read position over `text` plus a stack of saved positions.
///
/// Every rule that may fail opens a scope on entry and closes it on exit, restoring the
/// saved position when it failed and dropping it when it succeeded.
#[derive(Debug, Clone)]
pub struct SourceCursor<'a> {
    text: &'a str,
    pos: usize,
    saved: Vec<usize>,
    nesting: usize,
}

impl<'a> SourceCursor<'a> {
    pub fn new(text: &'a str) -> SourceCursor<'a> {
        SourceCursor {
            text,
            pos: 0,
            saved: Vec::new(),
            nesting: 0,
        }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    /// Byte offset of the next character.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> &'a str {
        &self.text[self.pos..]
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    /// Number of scopes currently open.
    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    pub fn begin_scope(&mut self) {
        self.saved.push(self.pos);
    }

    /// Closes the innermost scope. With `restore` the position goes back to where the scope
    /// began; closing a scope that was never opened rewinds to the start.
    pub fn end_scope(&mut self, restore: bool) {
        match self.saved.pop() {
            Some(pos) if restore => self.pos = pos,
            None if restore => self.pos = 0,
            _ => {}
        }
    }

    /// Runs `rule` inside its own scope. The position is kept only if the rule produced a
    /// value.
    pub fn attempt<T, E>(
        &mut self,
        rule: impl FnOnce(&mut Self) -> Result<Option<T>, E>,
    ) -> Result<Option<T>, E> {
        self.begin_scope();
        let result = rule(self);
        self.end_scope(!matches!(result, Ok(Some(_))));
        result
    }

    /// Like [`attempt`](Self::attempt), for rules that may recurse. Fails without running
    /// `rule` once [`MAX_NESTING`] levels are open.
    pub fn nested<T, E>(
        &mut self,
        rule: impl FnOnce(&mut Self) -> Result<Option<T>, E>,
    ) -> Result<Option<T>, E> {
        if self.nesting >= MAX_NESTING {
            return Ok(None);
        }
        self.nesting += 1;
        let result = self.attempt(rule);
        self.nesting -= 1;
        result
    }

    pub fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    pub fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    pub fn advance_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    pub fn advance_if_str(&mut self, pattern: &str) -> bool {
        if self.remaining().starts_with(pattern) {
            self.pos += pattern.len();
            true
        } else {
            false
        }
    }

    /// Skips spaces, tabs and the `\n`..=`\r` control range.
    pub fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some('\n'..='\r' | '\t' | ' ')) {
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_restore_or_commit() {
        let mut cursor = SourceCursor::new("abcdef");
        cursor.begin_scope();
        cursor.advance();
        cursor.advance();
        cursor.begin_scope();
        cursor.advance();
        cursor.end_scope(true);
        assert_eq!(cursor.position(), 2);

        cursor.end_scope(false);
        assert_eq!(cursor.position(), 2);
        assert_eq!(cursor.depth(), 0);
    }

    #[test]
    fn unbalanced_restore_rewinds_to_start() {
        let mut cursor = SourceCursor::new("xyz");
        cursor.advance();
        cursor.end_scope(true);
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn attempt_keeps_position_only_on_success() {
        let mut cursor = SourceCursor::new("hello");
        let failed: Result<Option<()>, ()> = cursor.attempt(|c| {
            c.advance_if_str("hel");
            Ok(None)
        });
        assert_eq!(failed, Ok(None));
        assert_eq!(cursor.position(), 0);

        let matched: Result<Option<()>, ()> =
            cursor.attempt(|c| Ok(c.advance_if_str("hel").then_some(())));
        assert_eq!(matched, Ok(Some(())));
        assert_eq!(cursor.remaining(), "lo");
        assert_eq!(cursor.depth(), 0);
    }

    fn descend(cursor: &mut SourceCursor<'_>) -> Result<Option<usize>, ()> {
        if !cursor.advance_if('(') {
            return Ok(Some(0));
        }
        Ok(cursor.nested(descend)?.map(|depth| depth + 1))
    }

    #[test]
    fn nesting_is_capped() {
        // The outermost call takes one level itself.
        let shallow = "(".repeat(MAX_NESTING - 1);
        let mut cursor = SourceCursor::new(&shallow);
        assert_eq!(cursor.nested(descend), Ok(Some(MAX_NESTING - 1)));

        let deep = "(".repeat(MAX_NESTING);
        let mut cursor = SourceCursor::new(&deep);
        assert_eq!(cursor.nested(descend), Ok(None));
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.depth(), 0);

        // The budget is released on the way out.
        assert_eq!(cursor.nested(|_| Ok::<_, ()>(Some(()))), Ok(Some(())));
    }

    #[test]
    fn skips_the_whole_space_range() {
        let mut cursor = SourceCursor::new(" \t\n\x0b\x0c\r x");
        cursor.skip_spaces();
        assert_eq!(cursor.peek(), Some('x'));
    }

    #[test]
    fn walks_multibyte_characters() {
        let mut cursor = SourceCursor::new("名無し");
        assert_eq!(cursor.advance(), Some('名'));
        assert_eq!(cursor.remaining(), "無し");
        assert!(cursor.advance_if('無'));
        assert_eq!(cursor.advance(), Some('し'));
        assert!(cursor.is_at_end());
        assert_eq!(cursor.advance(), None);
    }
}
