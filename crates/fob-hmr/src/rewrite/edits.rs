//! Offset-based text edits over an immutable source.

#[derive(Debug, Clone, PartialEq, Eq)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

/// Pending edits, applied in one pass. Offsets refer to the original text.
#[derive(Debug, Default)]
pub struct SourceEdits {
    edits: Vec<Edit>,
}

impl SourceEdits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `start..end`. No-op when the text is already there.
    pub fn overwrite(&mut self, source: &str, start: u32, end: u32, text: impl Into<String>) {
        let (start, end) = (start as usize, end as usize);
        let text = text.into();
        if source.get(start..end) == Some(text.as_str()) {
            return;
        }
        self.edits.push(Edit { start, end, text });
    }

    /// Insert before the character at `at`.
    pub fn insert(&mut self, at: u32, text: impl Into<String>) {
        let at = at as usize;
        self.edits.push(Edit {
            start: at,
            end: at,
            text: text.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    /// Apply all edits. Inserts at one offset keep their call order; edits
    /// overlapping an earlier one are dropped.
    pub fn apply(mut self, source: &str) -> String {
        // stable sort keeps insertion order for equal starts
        self.edits.sort_by_key(|edit| (edit.start, edit.end != edit.start));

        let mut out = String::with_capacity(source.len() + self.edits.len() * 16);
        let mut cursor = 0;
        for edit in self.edits {
            if edit.start < cursor || edit.end > source.len() {
                tracing::warn!(start = edit.start, end = edit.end, "dropping overlapping edit");
                continue;
            }
            out.push_str(&source[cursor..edit.start]);
            out.push_str(&edit.text);
            cursor = edit.end;
        }
        out.push_str(&source[cursor..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_and_insert() {
        let source = "hot.accept('./a', cb)";
        let mut edits = SourceEdits::new();
        edits.insert(11, "\"/main.js\", ");
        edits.overwrite(source, 12, 15, "/a.js");

        assert_eq!(edits.apply(source), "hot.accept(\"/main.js\", '/a.js', cb)");
    }

    #[test]
    fn test_inserts_keep_order() {
        let mut edits = SourceEdits::new();
        edits.insert(1, "b");
        edits.insert(1, "c");
        assert_eq!(edits.apply("ad"), "abcd");
    }

    #[test]
    fn test_identical_overwrite_is_skipped() {
        let source = "import '/a.js'";
        let mut edits = SourceEdits::new();
        edits.overwrite(source, 8, 13, "/a.js");
        assert!(edits.is_empty());
    }

    #[test]
    fn test_insert_before_replacement_at_same_offset() {
        let source = "xy";
        let mut edits = SourceEdits::new();
        edits.overwrite(source, 0, 1, "X");
        edits.insert(0, "<");
        assert_eq!(edits.apply(source), "<Xy");
    }
}
