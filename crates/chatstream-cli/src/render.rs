use std::io::{self, Write};

use chatstream_core::{StreamEvent, TurnOutcome};

/// Writes events for a terminal, either as raw text or as JSON lines.
pub struct Renderer<W: Write> {
    out: W,
    json: bool,
    at_line_start: bool,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, json: bool) -> Self {
        Self {
            out,
            json,
            at_line_start: true,
        }
    }

    pub fn render(&mut self, event: &StreamEvent) -> io::Result<()> {
        if self.json {
            serde_json::to_writer(&mut self.out, event)?;
            writeln!(self.out)?;
            return self.out.flush();
        }
        match event {
            StreamEvent::Content { text } if text.is_empty() => return Ok(()),
            StreamEvent::Content { text } => {
                self.out.write_all(text.as_bytes())?;
                self.at_line_start = text.ends_with('\n');
            }
            StreamEvent::WaitQueuing => {
                self.break_line()?;
                writeln!(self.out, "[waiting for the model...]")?;
            }
            StreamEvent::Done => self.break_line()?,
        }
        self.out.flush()
    }

    /// Ends the output; text mode reports outcomes other than completion.
    pub fn finish(&mut self, outcome: &TurnOutcome) -> io::Result<()> {
        if self.json {
            return self.out.flush();
        }
        self.break_line()?;
        match outcome {
            TurnOutcome::Completed | TurnOutcome::StreamClosed => {}
            TurnOutcome::Cancelled => writeln!(self.out, "[cancelled]")?,
            TurnOutcome::TransportFailed(message) => {
                writeln!(self.out, "[stream failed: {message}]")?
            }
        }
        self.out.flush()
    }

    fn break_line(&mut self) -> io::Result<()> {
        if !self.at_line_start {
            writeln!(self.out)?;
            self.at_line_start = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(json: bool, events: &[StreamEvent], outcome: TurnOutcome) -> String {
        let mut buf = Vec::new();
        let mut renderer = Renderer::new(&mut buf, json);
        for event in events {
            renderer.render(event).expect("render");
        }
        renderer.finish(&outcome).expect("finish");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn text_mode_appends_content() {
        let out = rendered(
            false,
            &[
                StreamEvent::WaitQueuing,
                StreamEvent::content("Hel"),
                StreamEvent::content(""),
                StreamEvent::content("lo"),
                StreamEvent::Done,
            ],
            TurnOutcome::Completed,
        );
        assert_eq!(out, "[waiting for the model...]\nHello\n");
    }

    #[test]
    fn text_mode_reports_abnormal_outcomes() {
        let out = rendered(
            false,
            &[StreamEvent::content("partial")],
            TurnOutcome::TransportFailed("reset".into()),
        );
        assert_eq!(out, "partial\n[stream failed: reset]\n");
    }

    #[test]
    fn json_mode_writes_wire_shape() {
        let out = rendered(
            true,
            &[StreamEvent::content("hi"), StreamEvent::Done],
            TurnOutcome::Completed,
        );
        assert_eq!(out, "{\"content\":\"hi\"}\n{\"done\":true}\n");
    }
}
