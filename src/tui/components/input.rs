//! Single text buffer with a byte-offset cursor.

/// Text being typed, with the cursor always on a char boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputBuffer {
    text: String,
    cursor: usize,
}

impl InputBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer holding `text`, cursor at the end.
    #[must_use]
    pub fn with_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let cursor = text.len();
        Self { text, cursor }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Cursor as a byte offset.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn prev_boundary(&self) -> usize {
        self.text[..self.cursor]
            .char_indices()
            .next_back()
            .map_or(0, |(i, _)| i)
    }

    fn next_boundary(&self) -> usize {
        self.text[self.cursor..]
            .chars()
            .next()
            .map_or(self.text.len(), |c| self.cursor + c.len_utf8())
    }

    pub fn insert(&mut self, c: char) {
        self.text.insert(self.cursor, c);
        self.cursor += c.len_utf8();
    }

    pub fn insert_str(&mut self, s: &str) {
        self.text.insert_str(self.cursor, s);
        self.cursor += s.len();
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            let prev = self.prev_boundary();
            self.text.drain(prev..self.cursor);
            self.cursor = prev;
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.text.len() {
            let next = self.next_boundary();
            self.text.drain(self.cursor..next);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.prev_boundary();
    }

    pub fn right(&mut self) {
        self.cursor = self.next_boundary();
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.text.len();
    }

    /// Delete the word before the cursor (trailing spaces included).
    pub fn delete_word(&mut self) {
        let before = self.text[..self.cursor].trim_end();
        let start = before
            .char_indices()
            .rfind(|(_, c)| c.is_whitespace())
            .map_or(0, |(i, c)| i + c.len_utf8());
        self.text.drain(start..self.cursor);
        self.cursor = start;
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    /// Take the text out, leaving the buffer empty.
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }

    /// Cursor column in characters on its line, and the line index.
    #[must_use]
    pub fn cursor_line_col(&self) -> (usize, usize) {
        let before = &self.text[..self.cursor];
        let line = before.matches('\n').count();
        let start = before.rfind('\n').map_or(0, |i| i + 1);
        (line, before[start..].chars().count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_and_backspace() {
        let mut buf = InputBuffer::new();
        for c in "hey".chars() {
            buf.insert(c);
        }
        buf.backspace();
        assert_eq!(buf.text(), "he");
        assert_eq!(buf.cursor(), 2);
    }

    #[test]
    fn cursor_moves_by_char_not_byte() {
        let mut buf = InputBuffer::with_text("aé😀");
        buf.left();
        assert_eq!(buf.cursor(), 3);
        buf.left();
        buf.delete();
        assert_eq!(buf.text(), "a😀");
        buf.right();
        assert_eq!(buf.cursor(), buf.text().len());
        buf.right();
        assert_eq!(buf.cursor(), buf.text().len());
    }

    #[test]
    fn delete_word_before_cursor() {
        let mut buf = InputBuffer::with_text("write the file  ");
        buf.delete_word();
        assert_eq!(buf.text(), "write the ");
        buf.home();
        buf.delete_word();
        assert_eq!(buf.text(), "write the ");
    }

    #[test]
    fn take_empties_buffer() {
        let mut buf = InputBuffer::with_text("send me");
        assert_eq!(buf.take(), "send me");
        assert!(buf.is_empty());
        assert_eq!(buf.cursor(), 0);
    }

    #[test]
    fn line_and_column() {
        let mut buf = InputBuffer::with_text("ab\ncd");
        assert_eq!(buf.cursor_line_col(), (1, 2));
        buf.home();
        buf.insert_str("x");
        assert_eq!(buf.cursor_line_col(), (0, 1));
    }

    #[test]
    fn delete_word_after_wide_whitespace() {
        let mut buf = InputBuffer::with_text("hello\u{a0}world");
        buf.delete_word();
        assert_eq!(buf.text(), "hello\u{a0}");
        assert_eq!(buf.cursor(), buf.text().len());

        let mut buf = InputBuffer::with_text("\u{3000}\u{3000}word");
        buf.delete_word();
        assert_eq!(buf.text(), "\u{3000}\u{3000}");
    }
}
