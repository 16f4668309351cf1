//! Line-oriented reader for the material text grammar.
//!
//! The grammar is quirky enough to need its own pre-processing pass: lines
//! are trimmed, `//` comments stripped, and any line containing a fifth
//! quote character is split in two at that quote. The format uses that
//! convention to pack two quoted key/value pairs onto one physical line.

/// Pre-processed line stream with single-token lookahead.
pub struct LineReader {
    lines: Vec<String>,
    offset: usize,
}

impl LineReader {
    pub fn new(text: &str) -> Self {
        let mut lines: Vec<String> = text.lines().map(trim_line).collect();

        let mut i = 0;
        while i < lines.len() {
            if let Some(split_at) = fifth_quote(&lines[i]) {
                let tail = lines[i][split_at..].trim_start().to_string();
                let head = lines[i][..split_at].trim_end().to_string();
                lines[i] = head;
                lines.insert(i + 1, tail);
            }
            i += 1;
        }

        Self { lines, offset: 0 }
    }

    /// Consume the next non-empty line if it equals `token` exactly.
    pub fn read_token(&mut self, token: &str) -> bool {
        let mut cursor = self.offset;
        while cursor < self.lines.len() {
            let line = &self.lines[cursor];
            cursor += 1;
            if line.is_empty() {
                continue;
            }
            if line != token {
                return false;
            }
            self.offset = cursor;
            return true;
        }
        false
    }

    /// Consume the next non-empty line if `parse` accepts it.
    pub fn read_match<T>(&mut self, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let mut cursor = self.offset;
        while cursor < self.lines.len() {
            let line = &self.lines[cursor];
            cursor += 1;
            if line.is_empty() {
                continue;
            }
            let parsed = parse(line.as_str())?;
            self.offset = cursor;
            return Some(parsed);
        }
        None
    }

    /// 1-based number and text of the next non-empty line, for error
    /// reporting. Past the end of input, reports the line count and an empty
    /// line.
    pub fn context(&self) -> (usize, String) {
        let mut cursor = self.offset;
        while cursor < self.lines.len() {
            if !self.lines[cursor].is_empty() {
                return (cursor + 1, self.lines[cursor].clone());
            }
            cursor += 1;
        }
        (self.lines.len(), String::new())
    }
}

fn trim_line(line: &str) -> String {
    let line = match line.find("//") {
        Some(comment) => &line[..comment],
        None => line,
    };
    line.trim().to_string()
}

fn fifth_quote(line: &str) -> Option<usize> {
    line.char_indices()
        .filter(|&(_, c)| c == '"')
        .nth(4)
        .map(|(i, _)| i)
}
