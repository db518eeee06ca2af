//! Markup conversion seam
//!
//! The preview never converts markup itself - it hands source text to a
//! `MarkupConverter` on the worker thread. `MarkdownConverter` is the default
//! implementation; anything else (reStructuredText, AsciiDoc, a subprocess)
//! plugs in through the same trait.

use crate::backend::BackendKind;
use crate::error::ConvertError;
use pulldown_cmark::{html, Event, Options, Parser};

// === Core Trait ===

/// Converts source text to an HTML fragment
///
/// Called off the UI thread. May fail; callers decide how to degrade.
pub trait MarkupConverter: Send + Sync {
    /// Append the HTML for `source` to `output`
    ///
    /// `backend` names the surface that will display the result so converters
    /// can avoid markup that surface cannot handle.
    fn execute(
        &self,
        source: &str,
        output: &mut String,
        backend: BackendKind,
    ) -> Result<(), ConvertError>;

    /// Converter name for logging
    fn name(&self) -> &str {
        "converter"
    }
}

/// CommonMark converter backed by pulldown-cmark
#[derive(Debug, Clone)]
pub struct MarkdownConverter {
    options: Options,
}

impl MarkdownConverter {
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_FOOTNOTES);
        Self { options }
    }

    pub fn with_options(options: Options) -> Self {
        Self { options }
    }
}

impl Default for MarkdownConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkupConverter for MarkdownConverter {
    fn execute(
        &self,
        source: &str,
        output: &mut String,
        backend: BackendKind,
    ) -> Result<(), ConvertError> {
        if memchr::memchr(0, source.as_bytes()).is_some() {
            return Err(ConvertError::Unsupported("binary content"));
        }

        let parser = Parser::new_ext(source, self.options);
        match backend {
            BackendKind::Accelerated => html::push_html(output, parser),
            // The software surface has no script engine
            BackendKind::Software => html::push_html(
                output,
                parser.filter(|event| match event {
                    Event::Html(raw) | Event::InlineHtml(raw) => {
                        !raw.to_ascii_lowercase().contains("<script")
                    }
                    _ => true,
                }),
            ),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "markdown"
    }
}

// === Text Helpers ===

/// Escape text for inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escaped preformatted rendering used when conversion fails
pub fn plain_text_fallback(source: &str) -> String {
    format!(
        "<pre class=\"preview-fallback\">{}</pre>",
        escape_html(source)
    )
}

/// Number of lines in `source` (a trailing newline does not start a new line)
pub fn line_count(source: &str) -> usize {
    if source.is_empty() {
        return 0;
    }
    let newlines = bytecount::count(source.as_bytes(), b'\n');
    if source.ends_with('\n') {
        newlines
    } else {
        newlines + 1
    }
}

/// Lines `[start, end)` of `source`, including their line terminators
pub fn slice_lines(source: &str, start: usize, end: usize) -> &str {
    if start >= end {
        return "";
    }
    let bytes = source.as_bytes();
    let mut newlines = memchr::memchr_iter(b'\n', bytes);

    let from = if start == 0 {
        0
    } else {
        match newlines.nth(start - 1) {
            Some(idx) => idx + 1,
            None => return "",
        }
    };
    // Iterator already consumed `start` newlines
    let to = newlines
        .nth(end - start - 1)
        .map(|idx| idx + 1)
        .unwrap_or(bytes.len());

    &source[from..to]
}
