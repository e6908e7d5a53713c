use crate::inspection::HTTP_TOKENS;
use ansi_term::Colour;

/// Turns raw payload text into displayable text.
pub trait Renderer: Send + Sync {
    fn render(&self, content: &str) -> String;
}

/// Leaves the text alone apart from control characters.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainRenderer;

impl Renderer for PlainRenderer {
    fn render(&self, content: &str) -> String {
        printable(content)
    }
}

/// ANSI highlighting of HTTP/1.x messages: start line, header names, body.
///
/// Content that does not look like HTTP goes through the same path and simply comes out
/// mostly uncoloured.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpHighlighter;

impl Renderer for HttpHighlighter {
    fn render(&self, content: &str) -> String {
        let text = printable(content);
        let mut out = Vec::new();
        let mut in_headers = true;
        for (idx, line) in text.split('\n').enumerate() {
            let (line, cr) = match line.strip_suffix('\r') {
                Some(stripped) => (stripped, "\r"),
                None => (line, ""),
            };
            let painted = if idx == 0 {
                match start_line(line) {
                    Some(painted) => painted,
                    None => {
                        in_headers = false;
                        line.to_string()
                    }
                }
            } else if in_headers && line.is_empty() {
                in_headers = false;
                String::new()
            } else if in_headers {
                header_line(line)
            } else {
                line.to_string()
            };
            out.push(format!("{}{}", painted, cr));
        }
        out.join("\n")
    }
}

/// Paints an HTTP request or status line. `None` when the first token is not HTTP.
fn start_line(line: &str) -> Option<String> {
    let mut parts = line.splitn(3, ' ');
    let first = parts.next().unwrap_or_default();
    let second = parts.next();
    let third = parts.next();

    if !HTTP_TOKENS.contains(&first.as_bytes()) {
        return None;
    }

    let mut painted = if first.starts_with("HTTP/") {
        Colour::Blue.paint(first).to_string()
    } else {
        Colour::Green.bold().paint(first).to_string()
    };
    if let Some(second) = second {
        painted.push(' ');
        if first.starts_with("HTTP/") {
            painted.push_str(&Colour::Yellow.bold().paint(second).to_string());
        } else {
            painted.push_str(&Colour::Yellow.paint(second).to_string());
        }
    }
    if let Some(third) = third {
        painted.push(' ');
        if third.starts_with("HTTP/") {
            painted.push_str(&Colour::Blue.paint(third).to_string());
        } else {
            painted.push_str(third);
        }
    }
    Some(painted)
}

fn header_line(line: &str) -> String {
    match line.split_once(':') {
        Some((name, value)) if !name.is_empty() && !name.contains(' ') => {
            format!("{}:{}", Colour::Cyan.paint(name), value)
        }
        _ => line.to_string(),
    }
}

/// Replaces control characters other than tab, line feed and carriage return with `.`.
pub fn printable(content: &str) -> String {
    content
        .chars()
        .map(|c| {
            if c.is_control() && !matches!(c, '\t' | '\n' | '\r') {
                '.'
            } else {
                c
            }
        })
        .collect()
}
