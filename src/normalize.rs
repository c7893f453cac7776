//! OCR text normalization.
//!
//! Raw OCR artifacts are decoded leniently and have column-boundary
//! hyphenation repaired so that words split across scan lines are indexed
//! whole.

use std::borrow::Cow;

use tracing::warn;

/// Decode raw artifact bytes as UTF-8, degrading to a lossy conversion.
pub fn decode_text(id: &str, bytes: &[u8]) -> String {
    match String::from_utf8_lossy(bytes) {
        Cow::Borrowed(s) => s.to_string(),
        Cow::Owned(s) => {
            warn!(id, "full text is not valid UTF-8; using lossy decoding");
            s
        }
    }
}

fn ends_with_hyphen(line: &str) -> bool {
    line.trim_end().ends_with('-')
}

/// Join lines that end in a hyphen (plus optional trailing whitespace) to
/// the following line, dropping the hyphen, the whitespace and the break.
///
/// A joined line is re-checked, so a chain of hyphenated lines collapses in
/// one pass and `repair_hyphenation(repair_hyphenation(s)) ==
/// repair_hyphenation(s)`.
pub fn repair_hyphenation(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending = String::new();
    let mut lines = text.split('\n').peekable();

    while let Some(line) = lines.next() {
        pending.push_str(line);

        if lines.peek().is_some() && ends_with_hyphen(&pending) {
            let keep = pending.trim_end().len() - 1;
            pending.truncate(keep);
            continue;
        }

        out.push_str(&pending);
        pending.clear();
        if lines.peek().is_some() {
            out.push('\n');
        }
    }

    out
}

/// Decode and repair a raw OCR artifact.
pub fn normalize_fulltext(id: &str, bytes: &[u8]) -> String {
    repair_hyphenation(&decode_text(id, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_joins_hyphenated_line() {
        assert_eq!(
            repair_hyphenation("the news-\npaper was printed"),
            "the newspaper was printed"
        );
    }

    #[test]
    fn test_trailing_whitespace_after_hyphen() {
        assert_eq!(repair_hyphenation("com- \t\nmittee"), "committee");
        assert_eq!(repair_hyphenation("com-\r\nmittee"), "committee");
    }

    #[test]
    fn test_hyphen_inside_line_untouched() {
        let s = "well-known fact\nsecond line";
        assert_eq!(repair_hyphenation(s), s);
    }

    #[test]
    fn test_chain_of_hyphenated_lines() {
        assert_eq!(repair_hyphenation("a-\nb-\nc\nd"), "abc\nd");
    }

    #[test]
    fn test_final_line_hyphen_kept() {
        assert_eq!(repair_hyphenation("end-"), "end-");
        assert_eq!(repair_hyphenation("x\nend- "), "x\nend- ");
    }

    #[test]
    fn test_empty_and_blank() {
        assert_eq!(repair_hyphenation(""), "");
        assert_eq!(repair_hyphenation("\n\n"), "\n\n");
    }

    #[test]
    fn test_repair_is_idempotent() {
        let samples = [
            "",
            "-",
            "-\n",
            "--\n-\n",
            "a-\n-\nb",
            "foo--\nbar-\n\nbaz",
            "line one-  \n  two-\r\nthree\n",
            "mixed - \n - dashes -\n\n-\nend",
            "no hyphens at all\nhere",
            "trailing -\n",
        ];
        for s in samples {
            let once = repair_hyphenation(s);
            let twice = repair_hyphenation(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", s);
        }
    }

    proptest! {
        #[test]
        fn prop_repair_is_idempotent(s in "[a-z\\- \\t\\r\\n]{0,80}") {
            let once = repair_hyphenation(&s);
            prop_assert_eq!(repair_hyphenation(&once), once);
        }

        #[test]
        fn prop_repair_is_idempotent_on_any_text(s in any::<String>()) {
            let once = repair_hyphenation(&s);
            prop_assert_eq!(repair_hyphenation(&once), once);
        }

        #[test]
        fn prop_repair_never_grows_text(s in "[a-z\\- \\n]{0,80}") {
            prop_assert!(repair_hyphenation(&s).len() <= s.len());
        }
    }

    #[test]
    fn test_decode_lossy_on_invalid_utf8() {
        let bytes = b"caf\xe9 society";
        let text = decode_text("x", bytes);
        assert!(text.starts_with("caf"));
        assert!(text.ends_with(" society"));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_normalize_fulltext() {
        assert_eq!(normalize_fulltext("x", b"hyphen-\nated"), "hyphenated");
    }
}
