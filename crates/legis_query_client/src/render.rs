//! Terminal rendering surfaces for session snapshots.

use std::io::Write;

use crate::controller::{Renderer, Snapshot};
use crate::messages::Citation;

/// Human-readable output: a loading line on `status`, the answer and its
/// sources on `out`, failures on `status`.
pub struct TextRenderer<O: Write, S: Write> {
    out: O,
    status: S,
    announced: Option<String>,
}

impl TextRenderer<std::io::Stdout, std::io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdout(), std::io::stderr())
    }
}

impl<O: Write, S: Write> TextRenderer<O, S> {
    pub fn new(out: O, status: S) -> Self {
        Self {
            out,
            status,
            announced: None,
        }
    }

    pub fn into_parts(self) -> (O, S) {
        (self.out, self.status)
    }
}

impl<O: Write, S: Write> Renderer for TextRenderer<O, S> {
    fn render(&mut self, snapshot: &Snapshot) {
        if snapshot.is_loading {
            // One loading line per query, not per transition.
            if self.announced != snapshot.query {
                let _ = writeln!(
                    self.status,
                    "Searching: {}",
                    snapshot.query.as_deref().unwrap_or_default()
                );
                let _ = self.status.flush();
                self.announced = snapshot.query.clone();
            }
            return;
        }
        self.announced = None;

        if let Some(kind) = snapshot.error_kind {
            let detail = snapshot.error_message.as_deref().unwrap_or_default();
            let _ = writeln!(self.status, "Error: {} ({})", kind.summary(), detail);
            return;
        }

        let Some(result) = &snapshot.result else {
            return;
        };
        let out = &mut self.out;
        let _ = writeln!(out, "Your Query");
        let _ = writeln!(out, "{}", snapshot.query.as_deref().unwrap_or_default());
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", result);
        let sources = snapshot.sources.as_deref().unwrap_or_default();
        if !sources.is_empty() {
            let _ = writeln!(out, "\nSources:");
            for (i, source) in sources.iter().enumerate() {
                let Citation { title, url } = source.citation();
                let _ = writeln!(out, "  {}. {}", i + 1, source.text);
                let _ = writeln!(out, "     {}", title);
                if let Some(url) = url {
                    let _ = writeln!(out, "     <{}>", url);
                }
            }
        }
        let _ = out.flush();
    }
}

/// One JSON object per snapshot, newline-delimited.
pub struct JsonRenderer<O: Write> {
    out: O,
}

impl JsonRenderer<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<O: Write> JsonRenderer<O> {
    pub fn new(out: O) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> O {
        self.out
    }
}

impl<O: Write> Renderer for JsonRenderer<O> {
    fn render(&mut self, snapshot: &Snapshot) {
        match serde_json::to_string(snapshot) {
            Ok(line) => {
                let _ = writeln!(self.out, "{}", line);
                let _ = self.out.flush();
            }
            Err(e) => tracing::warn!(error = %e, "could not serialize snapshot"),
        }
    }
}
