//! Virtual scrolling - render only the window the user can see
//!
//! Small documents are rendered whole. Once a document crosses
//! `min_lines_for_virtual`, only the visible line range plus a buffer is sent
//! to the converter, so render cost stays flat as the document grows.
//!
//! `VirtualScrollPreview` is cheap to clone; clones share configuration and
//! statistics, which lets the render worker and the UI thread hold the same
//! instance.

use crate::backend::BackendKind;
use crate::convert::{line_count, plain_text_fallback, slice_lines, MarkupConverter};
use crate::coordinates::{Viewport, ViewportCalculator, DEFAULT_LINE_HEIGHT};
use crate::error::PreviewError;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Virtual scrolling tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualScrollConfig {
    pub enabled: bool,
    /// Context lines rendered above and below the viewport
    pub buffer_lines: usize,
    /// Documents shorter than this always render in full
    pub min_lines_for_virtual: usize,
    /// Line height (px) used until the editor reports a measured one
    pub estimated_line_height: f32,
    /// Hard cap on lines in a partial render
    pub max_render_lines: usize,
}

impl Default for VirtualScrollConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_lines: 10,
            min_lines_for_virtual: 500,
            estimated_line_height: DEFAULT_LINE_HEIGHT,
            max_render_lines: 500,
        }
    }
}

/// Diagnostics for the most recent render
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderStatistics {
    pub enabled: bool,
    /// Whether the last render was partial
    pub virtual_active: bool,
    pub total_lines: usize,
    pub rendered_lines: usize,
    /// First rendered source line
    pub line_offset: usize,
    /// Percentage of the document rendered (0 - 100)
    pub render_ratio: f64,
    pub actual_line_height: f32,
}

impl RenderStatistics {
    fn empty(config: &VirtualScrollConfig) -> Self {
        Self {
            enabled: config.enabled,
            virtual_active: false,
            total_lines: 0,
            rendered_lines: 0,
            line_offset: 0,
            render_ratio: 100.0,
            actual_line_height: config.estimated_line_height,
        }
    }
}

/// Chooses between full and windowed rendering and performs the render
#[derive(Clone)]
pub struct VirtualScrollPreview {
    converter: Arc<dyn MarkupConverter>,
    backend: BackendKind,
    config: Arc<ArcSwap<VirtualScrollConfig>>,
    statistics: Arc<ArcSwap<RenderStatistics>>,
}

impl VirtualScrollPreview {
    pub fn new(converter: Arc<dyn MarkupConverter>, backend: BackendKind) -> Self {
        Self::with_config(converter, backend, VirtualScrollConfig::default())
    }

    pub fn with_config(
        converter: Arc<dyn MarkupConverter>,
        backend: BackendKind,
        config: VirtualScrollConfig,
    ) -> Self {
        let statistics = RenderStatistics::empty(&config);
        Self {
            converter,
            backend,
            config: Arc::new(ArcSwap::from_pointee(config)),
            statistics: Arc::new(ArcSwap::from_pointee(statistics)),
        }
    }

    pub fn config(&self) -> VirtualScrollConfig {
        self.config.load().as_ref().clone()
    }

    pub fn set_config(&self, config: VirtualScrollConfig) {
        self.config.store(Arc::new(config));
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    // === Runtime Toggles ===

    pub fn enable(&self, enabled: bool) {
        self.config.rcu(|current| {
            let mut next = VirtualScrollConfig::clone(current);
            next.enabled = enabled;
            next
        });
    }

    pub fn is_enabled(&self) -> bool {
        self.config.load().enabled
    }

    /// Update the line height estimate; takes effect on the next render
    ///
    /// Non-positive or non-finite measurements are ignored.
    pub fn update_line_height(&self, line_height: f32) {
        if !(line_height.is_finite() && line_height > 0.0) {
            debug!(line_height, "ignoring invalid line height measurement");
            return;
        }
        self.config.rcu(|current| {
            let mut next = VirtualScrollConfig::clone(current);
            next.estimated_line_height = line_height;
            next
        });
    }

    pub fn estimated_line_height(&self) -> f32 {
        self.config.load().estimated_line_height
    }

    // === Rendering ===

    /// Whether `source` is long enough to render windowed
    pub fn should_use_virtual_scrolling(&self, source: &str) -> bool {
        let config = self.config.load();
        config.enabled && line_count(source) >= config.min_lines_for_virtual
    }

    /// Viewport for `source` using the current line height estimate
    pub fn viewport_for(&self, source: &str, scroll_y: f32, width: f32, height: f32) -> Viewport {
        ViewportCalculator::for_document(
            scroll_y,
            width,
            height,
            line_count(source),
            self.estimated_line_height(),
        )
    }

    /// Render `source` as seen through `viewport`
    ///
    /// Returns the HTML and the first source line it covers. Converter
    /// failures degrade to an escaped `<pre>` block and are never returned.
    pub fn render_viewport(&self, source: &str, viewport: &Viewport) -> (String, usize) {
        let config = self.config.load();
        let total_lines = line_count(source);

        let window = Self::plan(&config, viewport, total_lines);

        let actual_line_height = if viewport.is_degenerate() {
            config.estimated_line_height
        } else {
            viewport.line_height()
        };

        let (html, offset, rendered_lines) = match window {
            Some((start, end)) => {
                let slice = slice_lines(source, start, end);
                let body = self.convert(slice);
                let padding = start as f32 * actual_line_height;
                let html = format!(
                    "<div class=\"virtual-window\" data-first-line=\"{}\" style=\"padding-top: {:.0}px\">\n{}</div>\n",
                    start, padding, body
                );
                (html, start, end - start)
            }
            None => (self.convert(source), 0, total_lines),
        };

        let render_ratio = if total_lines == 0 {
            100.0
        } else {
            rendered_lines as f64 / total_lines as f64 * 100.0
        };

        debug!(
            total_lines,
            rendered_lines,
            offset,
            virtual_active = window.is_some(),
            "render viewport"
        );

        self.statistics.store(Arc::new(RenderStatistics {
            enabled: config.enabled,
            virtual_active: window.is_some(),
            total_lines,
            rendered_lines,
            line_offset: offset,
            render_ratio,
            actual_line_height,
        }));

        (html, offset)
    }

    pub fn get_statistics(&self) -> RenderStatistics {
        self.statistics.load().as_ref().clone()
    }

    /// Source lines `[start, end)` a render of `source` through `viewport`
    /// would cover, `None` for a full render
    pub fn planned_window(&self, source: &str, viewport: &Viewport) -> Option<(usize, usize)> {
        Self::plan(&self.config.load(), viewport, line_count(source))
    }

    fn plan(
        config: &VirtualScrollConfig,
        viewport: &Viewport,
        total_lines: usize,
    ) -> Option<(usize, usize)> {
        if config.enabled && total_lines >= config.min_lines_for_virtual {
            Self::window(config, viewport, total_lines)
        } else {
            None
        }
    }

    /// Line range to render, `None` to render everything
    fn window(
        config: &VirtualScrollConfig,
        viewport: &Viewport,
        total_lines: usize,
    ) -> Option<(usize, usize)> {
        let (start, end) = viewport.get_visible_line_range(config.buffer_lines);
        let max_lines = config.max_render_lines.max(1);

        let span = if start < end {
            end - start
        } else if start > 0 {
            // Scrolled below the last line: keep a full window ending at the tail
            viewport.span_lines(config.buffer_lines)
        } else {
            let err = PreviewError::ViewportDegenerate {
                line_height: viewport.line_height(),
            };
            debug!(error = %err, "forcing full render");
            return None;
        };
        let span = span.min(max_lines);

        // Viewport geometry may be ahead of the text (stale document height)
        let start = start.min(total_lines.saturating_sub(span));
        let end = (start + span).min(total_lines);
        Some((start, end))
    }

    fn convert(&self, source: &str) -> String {
        let mut html = String::with_capacity(source.len() + source.len() / 2);
        match self.converter.execute(source, &mut html, self.backend) {
            Ok(()) => html,
            Err(err) => {
                warn!(
                    converter = self.converter.name(),
                    error = %err,
                    "conversion failed, showing plain text"
                );
                plain_text_fallback(source)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertError;

    /// Wraps every line in a paragraph so tests can count rendered lines
    struct LineConverter;

    impl MarkupConverter for LineConverter {
        fn execute(&self, source: &str, output: &mut String, _: BackendKind) -> Result<(), ConvertError> {
            for line in source.lines() {
                output.push_str("<p>");
                output.push_str(line);
                output.push_str("</p>\n");
            }
            Ok(())
        }
    }

    struct FailingConverter;

    impl MarkupConverter for FailingConverter {
        fn execute(&self, _: &str, _: &mut String, _: BackendKind) -> Result<(), ConvertError> {
            Err(ConvertError::Failed("boom".into()))
        }
    }

    fn document(lines: usize) -> String {
        (0..lines).map(|i| format!("line {}\n", i)).collect()
    }

    fn preview() -> VirtualScrollPreview {
        VirtualScrollPreview::new(Arc::new(LineConverter), BackendKind::Software)
    }

    #[test]
    fn test_small_document_renders_fully() {
        let preview = preview();
        let source = document(100);
        let viewport = preview.viewport_for(&source, 0.0, 800.0, 600.0);

        assert!(!preview.should_use_virtual_scrolling(&source));
        let (html, offset) = preview.render_viewport(&source, &viewport);
        assert_eq!(offset, 0);
        assert_eq!(html.matches("<p>").count(), 100);
        assert_eq!(preview.get_statistics().render_ratio, 100.0);
    }

    #[test]
    fn test_large_document_renders_window() {
        let preview = preview();
        let source = document(1000);
        let viewport = preview.viewport_for(&source, 1000.0, 800.0, 600.0);

        assert!(preview.should_use_virtual_scrolling(&source));
        let (html, offset) = preview.render_viewport(&source, &viewport);
        assert_eq!(offset, 40);
        assert!(html.contains("<p>line 40</p>"));
        assert!(!html.contains("<p>line 39</p>"));
        assert!(html.contains("data-first-line=\"40\""));

        let stats = preview.get_statistics();
        assert!(stats.virtual_active);
        assert_eq!(stats.rendered_lines, 51);
        assert!(stats.rendered_lines < stats.total_lines);
    }

    #[test]
    fn test_max_render_lines_caps_window() {
        let preview = preview();
        preview.set_config(VirtualScrollConfig {
            max_render_lines: 20,
            ..VirtualScrollConfig::default()
        });
        let source = document(2000);
        let viewport = preview.viewport_for(&source, 4000.0, 800.0, 600.0);

        preview.render_viewport(&source, &viewport);
        assert_eq!(preview.get_statistics().rendered_lines, 20);
    }

    #[test]
    fn test_disabled_renders_fully() {
        let preview = preview();
        preview.enable(false);
        let source = document(1000);
        let viewport = preview.viewport_for(&source, 1000.0, 800.0, 600.0);

        assert!(!preview.should_use_virtual_scrolling(&source));
        let (_, offset) = preview.render_viewport(&source, &viewport);
        assert_eq!(offset, 0);
        assert_eq!(preview.get_statistics().rendered_lines, 1000);
    }

    #[test]
    fn test_converter_failure_falls_back() {
        let preview = VirtualScrollPreview::new(Arc::new(FailingConverter), BackendKind::Software);
        let source = document(1000);
        let viewport = preview.viewport_for(&source, 0.0, 800.0, 600.0);

        let (html, _) = preview.render_viewport(&source, &viewport);
        assert!(html.contains("<pre class=\"preview-fallback\">"));
    }

    #[test]
    fn test_degenerate_viewport_forces_full_render() {
        let preview = preview();
        let source = document(1000);
        let viewport = Viewport::new(0.0, 1000.0, 800.0, 600.0, 800.0, 20000.0, 0.0);

        let (_, offset) = preview.render_viewport(&source, &viewport);
        assert_eq!(offset, 0);
        assert_eq!(preview.get_statistics().rendered_lines, 1000);
    }

    #[test]
    fn test_window_past_end_shows_tail() {
        let preview = preview();
        let source = document(600);
        // Document height claims far more lines than the text has
        let viewport = Viewport::new(0.0, 50_000.0, 800.0, 600.0, 800.0, 100_000.0, 20.0);

        let (html, offset) = preview.render_viewport(&source, &viewport);
        assert_eq!(offset, 600 - 51);
        assert!(html.contains("<p>line 599</p>"));
    }

    #[test]
    fn test_scroll_below_document_shows_tail() {
        let preview = preview();
        let source = document(1000);
        let viewport = preview.viewport_for(&source, 60_000.0, 800.0, 600.0);

        let (html, offset) = preview.render_viewport(&source, &viewport);
        assert_eq!(offset, 1000 - 51);
        assert!(html.contains("<p>line 999</p>"));
        assert!(!html.contains("line 1000"));
        assert_eq!(preview.get_statistics().rendered_lines, 51);
    }

    #[test]
    fn test_planned_window_matches_render() {
        let preview = preview();
        let source = document(1000);
        let viewport = preview.viewport_for(&source, 1000.0, 800.0, 600.0);
        assert_eq!(preview.planned_window(&source, &viewport), Some((40, 91)));

        let short = document(20);
        let viewport = preview.viewport_for(&short, 0.0, 800.0, 600.0);
        assert_eq!(preview.planned_window(&short, &viewport), None);
    }

    #[test]
    fn test_update_line_height() {
        let preview = preview();
        preview.update_line_height(16.0);
        assert_eq!(preview.estimated_line_height(), 16.0);

        preview.update_line_height(0.0);
        preview.update_line_height(f32::NAN);
        assert_eq!(preview.estimated_line_height(), 16.0);
    }
}
