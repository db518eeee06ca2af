//! Viewport geometry - scroll position to visible line range
//!
//! A `Viewport` is a snapshot of the editor's scroll state taken when a render
//! is dispatched. All range math happens here and never faults: degenerate
//! geometry (zero line height, negative scroll, stale document height)
//! degrades to a safe range instead.

use std::cell::Cell;
use std::ops::Range;

/// Line height assumed when the caller has not measured one (logical px)
pub const DEFAULT_LINE_HEIGHT: f32 = 20.0;

/// Sentinel range meaning "cannot compute, render everything"
pub const FULL_RENDER_SENTINEL: (usize, usize) = (0, 0);

/// Immutable scroll/size snapshot of the editing surface
#[derive(Debug, Clone)]
pub struct Viewport {
    scroll_x: f32,
    scroll_y: f32,
    width: f32,
    height: f32,
    document_width: f32,
    document_height: f32,
    line_height: f32,
    /// Most recently computed line range (for `is_line_visible`)
    last_range: Cell<Option<(usize, usize)>>,
}

impl Viewport {
    pub fn new(
        scroll_x: f32,
        scroll_y: f32,
        width: f32,
        height: f32,
        document_width: f32,
        document_height: f32,
        line_height: f32,
    ) -> Self {
        Self {
            scroll_x,
            scroll_y,
            width,
            height,
            document_width,
            document_height,
            line_height,
            last_range: Cell::new(None),
        }
    }

    pub fn scroll_x(&self) -> f32 {
        self.scroll_x
    }

    pub fn scroll_y(&self) -> f32 {
        self.scroll_y
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn document_width(&self) -> f32 {
        self.document_width
    }

    pub fn document_height(&self) -> f32 {
        self.document_height
    }

    pub fn line_height(&self) -> f32 {
        self.line_height
    }

    /// True when no line range can be derived from this snapshot
    pub fn is_degenerate(&self) -> bool {
        !(self.line_height.is_finite() && self.line_height > 0.0)
    }

    /// Scroll offset used for range math - never negative, never NaN
    pub fn effective_scroll_y(&self) -> f32 {
        if self.scroll_y.is_finite() {
            self.scroll_y.max(0.0)
        } else {
            0.0
        }
    }

    /// Number of lines the document spans, `ceil(document_height / line_height)`
    pub fn document_lines(&self) -> usize {
        if self.is_degenerate() || !self.document_height.is_finite() {
            return 0;
        }
        (self.document_height.max(0.0) / self.line_height).ceil() as usize
    }

    /// Lines a range covers before clamping: visible lines, one partial line,
    /// and `buffer_lines` on each side
    pub fn span_lines(&self, buffer_lines: usize) -> usize {
        if self.is_degenerate() {
            return 0;
        }
        let height = if self.height.is_finite() { self.height.max(0.0) } else { 0.0 };
        let visible_count = (height / self.line_height).ceil() as usize;
        visible_count
            .saturating_add(1)
            .saturating_add(buffer_lines.saturating_mul(2))
    }

    /// Visible line range `[start, end)` widened by `buffer_lines` on both sides
    ///
    /// `end` never passes the last document line. Returns `(0, 0)` when the
    /// line height is not positive.
    pub fn get_visible_line_range(&self, buffer_lines: usize) -> (usize, usize) {
        if self.is_degenerate() {
            self.last_range.set(Some(FULL_RENDER_SENTINEL));
            return FULL_RENDER_SENTINEL;
        }

        let first_visible = (self.effective_scroll_y() / self.line_height).floor() as usize;
        let start = first_visible.saturating_sub(buffer_lines);
        let end = start.saturating_add(self.span_lines(buffer_lines));

        let end = end.min(self.document_lines());
        let start = start.min(end);

        self.last_range.set(Some((start, end)));
        (start, end)
    }

    /// Same as `get_visible_line_range` as a `Range`
    pub fn visible_lines(&self, buffer_lines: usize) -> Range<usize> {
        let (start, end) = self.get_visible_line_range(buffer_lines);
        start..end
    }

    /// Whether `line` falls in the most recently computed range
    pub fn is_line_visible(&self, line: usize) -> bool {
        let (start, end) = match self.last_range.get() {
            Some(range) => range,
            None => self.get_visible_line_range(0),
        };
        line >= start && line < end
    }
}

/// Builds viewports from raw widget values, filling in what callers omit
pub struct ViewportCalculator;

impl ViewportCalculator {
    /// Build a viewport, defaulting the document size to the widget size and
    /// the line height to `DEFAULT_LINE_HEIGHT`
    pub fn calculate_from_values(
        scroll_x: f32,
        scroll_y: f32,
        width: f32,
        height: f32,
        document_height: Option<f32>,
        line_height: Option<f32>,
    ) -> Viewport {
        Viewport::new(
            scroll_x,
            scroll_y,
            width,
            height,
            width,
            document_height.unwrap_or(height),
            line_height.unwrap_or(DEFAULT_LINE_HEIGHT),
        )
    }

    /// Build a viewport for a document of `total_lines` lines
    pub fn for_document(
        scroll_y: f32,
        width: f32,
        height: f32,
        total_lines: usize,
        line_height: f32,
    ) -> Viewport {
        let document_height = if line_height > 0.0 {
            total_lines as f32 * line_height
        } else {
            height
        };
        Self::calculate_from_values(
            0.0,
            scroll_y,
            width,
            height,
            Some(document_height),
            Some(line_height),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_at_top() {
        let viewport = ViewportCalculator::calculate_from_values(0.0, 0.0, 800.0, 600.0, Some(2000.0), Some(20.0));
        assert_eq!(viewport.get_visible_line_range(0), (0, 31));
        assert_eq!(viewport.get_visible_line_range(10), (0, 51));
    }

    #[test]
    fn test_buffer_shifts_start() {
        let viewport = ViewportCalculator::calculate_from_values(0.0, 1000.0, 800.0, 600.0, Some(20000.0), Some(20.0));
        let (start, end) = viewport.get_visible_line_range(10);
        assert_eq!(start, 40);
        assert_eq!(end, 40 + 30 + 1 + 20);
    }

    #[test]
    fn test_zero_line_height_is_sentinel() {
        let viewport = Viewport::new(0.0, 500.0, 800.0, 600.0, 800.0, 5000.0, 0.0);
        assert_eq!(viewport.get_visible_line_range(10), FULL_RENDER_SENTINEL);
        assert!(viewport.is_degenerate());

        let negative = Viewport::new(0.0, 500.0, 800.0, 600.0, 800.0, 5000.0, -3.0);
        assert_eq!(negative.get_visible_line_range(0), (0, 0));
    }

    #[test]
    fn test_negative_scroll_clamped() {
        let viewport = ViewportCalculator::calculate_from_values(0.0, -100.0, 800.0, 600.0, Some(20000.0), Some(20.0));
        let (start, end) = viewport.get_visible_line_range(5);
        assert_eq!(start, 0);
        assert!(end > 0);
    }

    #[test]
    fn test_end_clamped_to_document() {
        // 10 lines of document, viewport larger than document
        let viewport = ViewportCalculator::calculate_from_values(0.0, 0.0, 800.0, 600.0, Some(200.0), Some(20.0));
        assert_eq!(viewport.get_visible_line_range(10), (0, 10));
        assert!(viewport.is_line_visible(9));
        assert!(!viewport.is_line_visible(10));
    }

    #[test]
    fn test_defaults_for_single_screen_document() {
        let viewport = ViewportCalculator::calculate_from_values(0.0, 0.0, 400.0, 300.0, None, None);
        assert_eq!(viewport.document_height(), 300.0);
        assert_eq!(viewport.line_height(), DEFAULT_LINE_HEIGHT);
        let (start, end) = viewport.get_visible_line_range(0);
        assert_eq!(start, 0);
        assert_eq!(end, 15);
    }

    #[test]
    fn test_scrolled_past_document_is_empty() {
        // Single-screen default height, scrolled well below it
        let viewport = ViewportCalculator::calculate_from_values(0.0, 1000.0, 800.0, 600.0, None, Some(20.0));
        assert_eq!(viewport.get_visible_line_range(10), (30, 30));
        assert!(!viewport.is_line_visible(30));
        assert_eq!(viewport.span_lines(10), 51);
    }

    #[test]
    fn test_is_line_visible_uses_last_range() {
        let viewport = ViewportCalculator::calculate_from_values(0.0, 200.0, 800.0, 100.0, Some(5000.0), Some(20.0));
        assert!(viewport.is_line_visible(10));
        assert!(!viewport.is_line_visible(9));

        viewport.get_visible_line_range(5);
        assert!(viewport.is_line_visible(5));
        assert!(!viewport.is_line_visible(4));
    }
}
