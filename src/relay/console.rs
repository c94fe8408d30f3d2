//! Terminal sink.

use std::io::Write;

use async_trait::async_trait;
use tracing::warn;

use crate::relay::{Fragment, FragmentSink, FragmentTag, RelayOutcome, RelayStatus};

const RULE_WIDTH: usize = 60;

/// Writes fragments to a terminal as they arrive.
///
/// Prints a section header the first time each channel is seen. Create one
/// per relay session.
pub struct ConsoleSink<W: Write + Send> {
    out: W,
    reasoning_header_shown: bool,
    content_header_shown: bool,
    write_failed: bool,
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            reasoning_header_shown: false,
            content_header_shown: false,
            write_failed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_fragment(&mut self, fragment: Fragment<'_>) -> std::io::Result<()> {
        match fragment.tag {
            FragmentTag::Reasoning if !self.reasoning_header_shown => {
                writeln!(self.out, "🔍 Reasoning:")?;
                writeln!(self.out, "{}", "─".repeat(RULE_WIDTH))?;
                self.reasoning_header_shown = true;
            }
            FragmentTag::Content if !self.content_header_shown => {
                if self.reasoning_header_shown {
                    writeln!(self.out, "\n\n{}", "═".repeat(RULE_WIDTH))?;
                }
                writeln!(self.out, "💡 Answer:")?;
                writeln!(self.out, "{}", "─".repeat(RULE_WIDTH))?;
                self.content_header_shown = true;
            }
            _ => {}
        }
        self.out.write_all(fragment.text.as_bytes())?;
        self.out.flush()
    }

    fn write_summary(&mut self, outcome: &RelayOutcome) -> std::io::Result<()> {
        match &outcome.status {
            RelayStatus::Completed => {
                writeln!(self.out, "\n\n{}", "═".repeat(RULE_WIDTH))?;
                writeln!(self.out, "📊 Statistics:")?;
                writeln!(self.out, "🔍 Reasoning length: {} chars", outcome.reasoning_chars)?;
                writeln!(self.out, "💡 Answer length: {} chars", outcome.content_chars)?;
                writeln!(self.out, "📝 Total length: {} chars", outcome.total_chars())?;
                writeln!(self.out, "✅ Stream completed")?;
            }
            RelayStatus::Failed(e) => {
                if outcome.forwarded_any() {
                    writeln!(self.out)?;
                }
                writeln!(self.out, "❌ Request failed: {e}")?;
                if let Some(status) = e.status() {
                    writeln!(self.out, "HTTP status: {status}")?;
                }
                if let Some(code) = e.code() {
                    writeln!(self.out, "Error code: {code}")?;
                }
                if let Some(kind) = e.kind() {
                    writeln!(self.out, "Error type: {kind}")?;
                }
            }
        }
        self.out.flush()
    }

    fn note_write_error(&mut self, e: std::io::Error) {
        // Log once; the relay keeps draining the upstream regardless.
        if !self.write_failed {
            warn!("Console write failed: {e}");
            self.write_failed = true;
        }
    }
}

#[async_trait]
impl<W: Write + Send> FragmentSink for ConsoleSink<W> {
    async fn emit(&mut self, fragment: Fragment<'_>) {
        if let Err(e) = self.write_fragment(fragment) {
            self.note_write_error(e);
        }
    }

    async fn finish(&mut self, outcome: &RelayOutcome) {
        if let Err(e) = self.write_summary(outcome) {
            self.note_write_error(e);
        }
    }
}
