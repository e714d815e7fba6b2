use std::str;

/// Filtered view over a growing stdout buffer.
///
/// Lines equal to the banner (ignoring a trailing `\r`) are dropped together with their newline.
/// Complete lines are filtered once as they arrive; only the trailing partial line is
/// re-examined on each push, so cost stays linear in the total output.
#[derive(Debug, Clone, Default)]
pub struct ResultFilter {
    banner: Option<&'static str>,
    text: String,
    committed_len: usize,
    partial: String,
}

impl ResultFilter {
    pub fn new(banner: Option<&'static str>) -> Self {
        Self {
            banner,
            ..Self::default()
        }
    }

    pub fn push(&mut self, chunk: &str) {
        self.text.truncate(self.committed_len);
        let mut rest = chunk;
        while let Some(newline) = rest.find('\n') {
            self.partial.push_str(&rest[..newline]);
            if !self.is_banner(&self.partial) {
                self.text.push_str(&self.partial);
                self.text.push('\n');
            }
            self.partial.clear();
            rest = &rest[newline + 1..];
        }
        self.partial.push_str(rest);
        self.committed_len = self.text.len();
        if !self.is_banner(&self.partial) {
            self.text.push_str(&self.partial);
        }
    }

    /// The full filtered content seen so far.
    pub fn content(&self) -> &str {
        &self.text
    }

    fn is_banner(&self, line: &str) -> bool {
        let line = line.strip_suffix('\r').unwrap_or(line);
        self.banner.is_some_and(|banner| line == banner)
    }
}

/// Decodes UTF-8 from arbitrarily split byte chunks, carrying incomplete sequences forward.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.carry.extend_from_slice(bytes);
        let mut decoded = String::new();
        let mut input = self.carry.as_slice();
        loop {
            match str::from_utf8(input) {
                Ok(valid) => {
                    decoded.push_str(valid);
                    input = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = input.split_at(err.valid_up_to());
                    // Prefix is valid by construction.
                    decoded.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(invalid) => {
                            decoded.push(char::REPLACEMENT_CHARACTER);
                            input = &after[invalid..];
                        }
                        None => {
                            input = after;
                            break;
                        }
                    }
                }
            }
        }
        self.carry = input.to_vec();
        decoded
    }

    /// Flushes a dangling incomplete sequence at end of stream.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        rest
    }
}

#[cfg(test)]
#[path = "../tests/unit/output_tests.rs"]
mod tests;
