//! Line/column conversion for diagnostic rendering.
//!
//! The AST and diagnostics use byte offsets; terminal output wants
//! line/column pairs and the text of the offending line. `LineMap` stores
//! the starting offset of every line for O(log n) conversion.

/// A position in a source file (0-indexed line and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Position {
    /// 0-indexed line number
    pub line: u32,
    /// 0-indexed column in bytes from the line start
    pub column: u32,
}

impl Position {
    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Line map for byte offset -> position conversion.
#[derive(Debug, Clone)]
pub struct LineMap {
    /// Starting offset of each line; `line_starts[0]` is always 0.
    line_starts: Vec<u32>,
}

impl LineMap {
    /// Build a line map from source text.
    #[must_use]
    pub fn build(source: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        Self { line_starts }
    }

    /// Convert a byte offset to a position.
    #[must_use]
    pub fn position(&self, offset: u32) -> Position {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert_point) => insert_point.saturating_sub(1),
        };
        let line_start = self.line_starts.get(line).copied().unwrap_or(0);
        Position::new(line as u32, offset.saturating_sub(line_start))
    }

    /// The full text of the line containing `offset`, without its newline.
    #[must_use]
    pub fn line_text<'a>(&self, offset: u32, source: &'a str) -> &'a str {
        let pos = self.position(offset);
        let start = self.line_starts[pos.line as usize] as usize;
        let end = self
            .line_starts
            .get(pos.line as usize + 1)
            .map_or(source.len(), |&s| s as usize);
        source[start.min(source.len())..end.min(source.len())].trim_end_matches(['\n', '\r'])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_across_lines() {
        let map = LineMap::build("ab\ncd\n\nef");
        assert_eq!(map.position(0), Position::new(0, 0));
        assert_eq!(map.position(1), Position::new(0, 1));
        assert_eq!(map.position(3), Position::new(1, 0));
        assert_eq!(map.position(6), Position::new(2, 0));
        assert_eq!(map.position(8), Position::new(3, 1));
    }

    #[test]
    fn line_text_strips_newline() {
        let src = "ab\ncd\n";
        let map = LineMap::build(src);
        assert_eq!(map.line_text(4, src), "cd");
        assert_eq!(map.line_text(0, src), "ab");
    }
}
