//! Byte-budgeted output truncation
//!
//! Long streams keep their first and last whole lines and replace the middle
//! with a marker. Whatever the input, the returned text never exceeds the
//! limit in UTF-8 bytes.

pub const TRUNCATED_WARNING: &str = "[WARN]: Text too long, truncated.";
pub const BINARY_WARNING: &str = "[WARN]: Output is not valid UTF-8, showing a lossy decoding.";
pub const TOO_LARGE: &str = "Text is too large to display.";

/// Share of the limit given to each of the head and the tail
const EDGE_FRACTION: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncator {
    pub limit: usize,
    pub head: usize,
    pub tail: usize,
}

impl Truncator {
    pub fn new(limit: usize) -> Self {
        let edge = (limit as f64 * EDGE_FRACTION) as usize;
        Self {
            limit,
            head: edge,
            tail: edge,
        }
    }

    pub fn truncate(&self, text: &str) -> String {
        if text.len() <= self.limit {
            return text.to_string();
        }

        let lines: Vec<&str> = text.lines().collect();
        let line_size = |line: &str| line.len() + 1;

        let mut head_count = 0;
        let mut used = 0;
        for line in &lines {
            if used + line_size(line) > self.head {
                break;
            }
            used += line_size(line);
            head_count += 1;
        }

        let mut tail_count = 0;
        used = 0;
        for line in lines[head_count..].iter().rev() {
            if used + line_size(line) > self.tail {
                break;
            }
            used += line_size(line);
            tail_count += 1;
        }

        let omitted = lines.len() - head_count - tail_count;
        let marker = format!("...(omitted {} lines)...", omitted);
        let mut parts: Vec<&str> = Vec::with_capacity(head_count + tail_count + 2);
        parts.push(TRUNCATED_WARNING);
        parts.extend(&lines[..head_count]);
        if omitted > 0 {
            parts.push(&marker);
        }
        parts.extend(&lines[lines.len() - tail_count..]);

        let truncated = parts.join("\n");
        if truncated.len() <= self.limit {
            truncated
        } else {
            clip(TOO_LARGE, self.limit).to_string()
        }
    }

    /// Like `truncate`, for raw captured bytes
    pub fn truncate_bytes(&self, bytes: &[u8]) -> String {
        match std::str::from_utf8(bytes) {
            Ok(text) => self.truncate(text),
            Err(_) => {
                let prefix = BINARY_WARNING.len() + 1;
                if prefix > self.limit {
                    return clip(BINARY_WARNING, self.limit).to_string();
                }
                let rest = Truncator {
                    limit: self.limit - prefix,
                    ..*self
                };
                let lossy = String::from_utf8_lossy(bytes);
                format!("{}\n{}", BINARY_WARNING, rest.truncate(&lossy))
            }
        }
    }
}

/// Longest prefix of `text` that fits in `limit` bytes
fn clip(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
