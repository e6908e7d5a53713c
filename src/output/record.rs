use super::renderer::Renderer;
use crate::error_handling::types::OutputError;
use crate::inspection::Classification;
use crate::session_management::Session;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;

const RULE_WIDTH: usize = 60;

/// What a session reports once its stream has been classified. Built once, written once.
#[derive(Debug, Clone, Serialize)]
pub struct OutputRecord {
    session_id: u64,
    source: String,
    destination: String,
    classification: Classification,
    payload: String,
    finished_at: DateTime<Utc>,
    #[serde(skip)]
    body: Vec<String>,
}

impl OutputRecord {
    /// Renders `payload` and assembles the record of `session`.
    ///
    /// Anything but HTTP gets a `[!] <classification>` line on top of the rendered content.
    pub fn new(
        session: &Session,
        classification: Classification,
        payload: &[u8],
        renderer: &dyn Renderer,
    ) -> Self {
        let text = String::from_utf8_lossy(payload).into_owned();

        let mut body = Vec::new();
        if !classification.is_http() {
            body.push(format!("[!] {}", classification));
        }
        if !text.is_empty() {
            let rendered = renderer.render(&text);
            let rendered = rendered
                .strip_suffix('\n')
                .map(|r| r.strip_suffix('\r').unwrap_or(r))
                .unwrap_or(&rendered);
            body.extend(
                rendered
                    .split('\n')
                    .map(|l| l.strip_suffix('\r').unwrap_or(l).replace('\r', ".")),
            );
        }

        Self {
            session_id: session.id,
            source: session.source.clone(),
            destination: session.destination.clone(),
            classification,
            payload: text,
            finished_at: Utc::now(),
            body,
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    pub fn body(&self) -> &[String] {
        &self.body
    }

    /// The bordered block written in framed mode, newline terminated.
    pub fn frame(&self) -> String {
        let rule = "─".repeat(RULE_WIDTH);
        let mut out = String::new();
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "│ stream: {}", self.session_id);
        let _ = writeln!(out, "│ source: {}", self.source);
        let _ = writeln!(out, "│ dest:   {}", self.destination);
        let _ = writeln!(out, "{}", rule);
        for line in &self.body {
            let _ = writeln!(out, "│ {}", line);
        }
        let _ = writeln!(out, "{}", rule);
        out
    }

    /// The record as one JSON object followed by a newline.
    pub fn json_line(&self) -> Result<String, OutputError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspection::classify;
    use crate::network::FlowKey;
    use crate::output::renderer::PlainRenderer;

    fn session(id: u64) -> Session {
        let key = FlowKey::new(
            "10.1.1.1:43210".parse().unwrap(),
            "10.2.2.2:80".parse().unwrap(),
        );
        Session::new(id, &key)
    }

    fn record(id: u64, payload: &[u8]) -> OutputRecord {
        OutputRecord::new(&session(id), classify(payload), payload, &PlainRenderer)
    }

    #[test]
    fn test_http_frame() {
        let rec = record(1, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        let rule = "─".repeat(60);
        let expected = format!(
            "{rule}\n│ stream: 1\n│ source: 10.1.1.1:43210\n│ dest:   10.2.2.2:80\n{rule}\n\
             │ GET / HTTP/1.1\n│ Host: x\n│ \n{rule}\n"
        );
        assert_eq!(rec.frame(), expected);
        assert!(rec.classification().is_http());
    }

    #[test]
    fn test_non_http_frame_carries_diagnostic() {
        let rec = record(3, b"FOO BAR");
        assert_eq!(
            rec.body(),
            &["[!] non-HTTP token: FOO".to_string(), "FOO BAR".to_string()]
        );
    }

    #[test]
    fn test_empty_payload_frame() {
        let rec = record(4, b"");
        assert_eq!(rec.body(), &["[!] empty".to_string()]);
        assert_eq!(rec.frame().lines().count(), 7);
    }

    #[test]
    fn test_binary_payload_is_readable() {
        let rec = record(5, b"\x00\x01\x02binarydata");
        assert_eq!(
            rec.body(),
            &["[!] no separator".to_string(), "...binarydata".to_string()]
        );
    }

    #[test]
    fn test_bare_carriage_return_cannot_rewrite_the_frame() {
        let rec = record(6, b"GET / HTTP/1.1\r\nX-Evil: a\rb\r\n");
        assert_eq!(
            rec.body(),
            &["GET / HTTP/1.1".to_string(), "X-Evil: a.b".to_string()]
        );
        assert!(!rec.frame().contains('\r'));
    }

    #[test]
    fn test_json_line() {
        let rec = record(9, b"PUT /x HTTP/1.1\r\n\r\n");
        let line = rec.json_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["session_id"], 9);
        assert_eq!(value["source"], "10.1.1.1:43210");
        assert_eq!(value["destination"], "10.2.2.2:80");
        assert_eq!(value["classification"], "HTTP");
        assert_eq!(value["payload"], "PUT /x HTTP/1.1\r\n\r\n");
        assert!(value.get("body").is_none());
    }
}
