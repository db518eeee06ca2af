//! Preview themes and stylesheet caching
//!
//! A theme is a small palette of RGBA colors turned into a stylesheet. The
//! pipeline asks a `ThemeProvider` for CSS once and caches the result until it
//! is explicitly invalidated (theme or font change), never on a timer.

use crate::convert::escape_html;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Source of the preview stylesheet
pub trait ThemeProvider {
    fn css(&self) -> String;

    /// Whether the active theme is dark (used for the error page)
    fn is_dark(&self) -> bool;
}

/// Built-in theme selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

/// A preview color palette
#[derive(Clone, Debug)]
pub struct Theme {
    pub name: String,
    pub dark: bool,
    /// RGBA colors in `[0, 1]`
    pub background: [f32; 4],
    pub foreground: [f32; 4],
    pub accent: [f32; 4],
    pub code_background: [f32; 4],
    pub border: [f32; 4],
    pub font_family: String,
    pub font_size_px: f32,
}

impl Theme {
    pub fn light() -> Self {
        Self {
            name: "light".into(),
            dark: false,
            background: [1.0, 1.0, 1.0, 1.0],
            foreground: [0.14, 0.16, 0.18, 1.0],
            accent: [0.01, 0.4, 0.84, 1.0],
            code_background: [0.96, 0.97, 0.98, 1.0],
            border: [0.82, 0.84, 0.87, 1.0],
            font_family: default_font_family(),
            font_size_px: 16.0,
        }
    }

    pub fn dark() -> Self {
        Self {
            name: "dark".into(),
            dark: true,
            background: [0.05, 0.07, 0.09, 1.0],
            foreground: [0.79, 0.82, 0.85, 1.0],
            accent: [0.35, 0.65, 1.0, 1.0],
            code_background: [0.09, 0.11, 0.13, 1.0],
            border: [0.19, 0.21, 0.24, 1.0],
            font_family: default_font_family(),
            font_size_px: 16.0,
        }
    }

    pub fn from_mode(mode: ThemeMode) -> Self {
        match mode {
            ThemeMode::Light => Self::light(),
            ThemeMode::Dark => Self::dark(),
        }
    }

    pub fn with_font(mut self, family: impl Into<String>, size_px: f32) -> Self {
        self.font_family = family.into();
        self.font_size_px = size_px;
        self
    }

    /// Generate the stylesheet for this palette
    pub fn to_css(&self) -> String {
        format!(
            "body {{ background: {bg}; color: {fg}; font-family: {font}; font-size: {size}px; \
             line-height: 1.5; margin: 0; padding: 16px 24px; }}\n\
             a {{ color: {accent}; }}\n\
             pre, code {{ background: {code}; border-radius: 4px; }}\n\
             pre {{ padding: 12px; overflow-x: auto; }}\n\
             blockquote {{ border-left: 4px solid {border}; margin-left: 0; padding-left: 12px; }}\n\
             table {{ border-collapse: collapse; }}\n\
             th, td {{ border: 1px solid {border}; padding: 4px 8px; }}\n\
             .preview-fallback {{ white-space: pre-wrap; }}\n",
            bg = css_color(self.background),
            fg = css_color(self.foreground),
            accent = css_color(self.accent),
            code = css_color(self.code_background),
            border = css_color(self.border),
            font = self.font_family,
            size = self.font_size_px,
        )
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::light()
    }
}

impl ThemeProvider for Theme {
    fn css(&self) -> String {
        self.to_css()
    }

    fn is_dark(&self) -> bool {
        self.dark
    }
}

fn default_font_family() -> String {
    "-apple-system, 'Segoe UI', Helvetica, Arial, sans-serif".into()
}

/// RGBA in `[0, 1]` to a CSS `rgba()` value
fn css_color(color: [f32; 4]) -> String {
    let channel = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
    format!(
        "rgba({}, {}, {}, {})",
        channel(color[0]),
        channel(color[1]),
        channel(color[2]),
        color[3].clamp(0.0, 1.0)
    )
}

// === CSS Cache ===

/// Stylesheet cache with an optional user override
#[derive(Debug, Default)]
pub struct CssCache {
    cached: Option<Arc<str>>,
    custom: Option<String>,
    /// Number of provider queries (diagnostics)
    misses: u64,
}

impl CssCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached CSS, querying `provider` only after invalidation
    pub fn get(&mut self, provider: &dyn ThemeProvider) -> Arc<str> {
        if let Some(css) = &self.cached {
            return css.clone();
        }
        let css: Arc<str> = match &self.custom {
            Some(custom) => Arc::from(custom.as_str()),
            None => {
                self.misses += 1;
                Arc::from(provider.css())
            }
        };
        debug!(bytes = css.len(), "stylesheet cached");
        self.cached = Some(css.clone());
        css
    }

    /// Use `css` instead of the provider's stylesheet; `None` restores the provider
    pub fn set_custom_css(&mut self, css: Option<String>) {
        self.custom = css;
        self.invalidate();
    }

    pub fn custom_css(&self) -> Option<&str> {
        self.custom.as_deref()
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }

    pub fn provider_queries(&self) -> u64 {
        self.misses
    }
}

// === Page Assembly ===

/// Full HTML page around a rendered fragment
pub fn wrap_html(css: &str, body: &str) -> String {
    let mut page = String::with_capacity(css.len() + body.len() + 160);
    page.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n");
    page.push_str(css);
    page.push_str("</style>\n</head>\n<body>\n");
    page.push_str(body);
    page.push_str("</body>\n</html>\n");
    page
}

/// Page shown in place of the preview when rendering fails
pub fn error_page(message: &str, dark: bool) -> String {
    let (background, foreground, accent) = if dark {
        ("#1e1e1e", "#d4d4d4", "#f48771")
    } else {
        ("#fff5f5", "#24292e", "#cb2431")
    };
    let css = format!(
        "body {{ background: {background}; color: {foreground}; font-family: sans-serif; padding: 24px; }}\n\
         h2 {{ color: {accent}; }}\n\
         pre {{ white-space: pre-wrap; }}\n"
    );
    let body = format!(
        "<div class=\"preview-error\">\n<h2>Preview failed</h2>\n<pre>{}</pre>\n</div>\n",
        escape_html(message)
    );
    wrap_html(&css, &body)
}
