//! Line reading that tolerates bytes which are not UTF-8.
//!
//! Device logs and monitor captures regularly carry stray binary bytes. Such
//! bytes are replaced with U+FFFD so the line can still be matched (or
//! skipped) instead of aborting the whole read.

use std::io::{self, BufRead};

/// Iterator over `\n`-terminated lines, with a trailing `\r` removed.
pub struct LossyLines<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: usize,
}

impl<R: BufRead> LossyLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for LossyLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                self.line_no += 1;
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                    if self.buf.last() == Some(&b'\r') {
                        self.buf.pop();
                    }
                }
                let line = String::from_utf8_lossy(&self.buf);
                if let std::borrow::Cow::Owned(_) = line {
                    log::debug!("line {}: replaced bytes that are not UTF-8", self.line_no);
                }
                Some(Ok(line.into_owned()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_strips_line_endings() {
        let lines: Vec<String> = LossyLines::new("a\r\nb\nc".as_bytes())
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines, vec!["a", "b", "c"]);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let raw: &[u8] = b"ok\n\xff\xfe junk\nstill ok\n";
        let lines: Vec<String> = LossyLines::new(raw).map(|l| l.unwrap()).collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with(" junk"));
        assert_eq!(lines[2], "still ok");
    }

    #[test]
    fn empty_input_has_no_lines() {
        assert_eq!(LossyLines::new("".as_bytes()).count(), 0);
    }
}
