//! Collaborator doubles shared by the integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tiny_preview::backend::{AcceleratedBackend, HeadlessSurface, SoftwareBackend};
use tiny_preview::{
    BackendKind, ConvertError, EditorView, MarkupConverter, PreviewConfig, PreviewPipeline,
};

/// One `<p>` per source line
pub struct LineConverter;

impl MarkupConverter for LineConverter {
    fn execute(&self, source: &str, output: &mut String, _: BackendKind) -> Result<(), ConvertError> {
        for line in source.lines() {
            output.push_str("<p>");
            output.push_str(line);
            output.push_str("</p>\n");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "lines"
    }
}

/// Always reports a conversion error
pub struct FailingConverter;

impl MarkupConverter for FailingConverter {
    fn execute(&self, _: &str, _: &mut String, _: BackendKind) -> Result<(), ConvertError> {
        Err(ConvertError::Failed("syntax error on line 3".into()))
    }
}

/// Panics whenever the source contains `PANIC`
pub struct PanickingConverter;

impl MarkupConverter for PanickingConverter {
    fn execute(&self, source: &str, output: &mut String, _: BackendKind) -> Result<(), ConvertError> {
        if source.contains("PANIC") {
            panic!("converter crashed");
        }
        output.push_str(source);
        Ok(())
    }
}

/// Takes a fixed time per conversion, then echoes the source
pub struct SlowConverter(pub Duration);

impl MarkupConverter for SlowConverter {
    fn execute(&self, source: &str, output: &mut String, _: BackendKind) -> Result<(), ConvertError> {
        std::thread::sleep(self.0);
        output.push_str(source);
        Ok(())
    }
}

/// Editor whose scroll writes are recorded
#[derive(Debug, Clone)]
pub struct RecordingEditor {
    pub text: String,
    pub scroll: i32,
    pub maximum: i32,
    pub size: (f32, f32),
    pub writes: Vec<i32>,
}

impl RecordingEditor {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            scroll: 0,
            maximum: 2000,
            size: (800.0, 600.0),
            writes: Vec::new(),
        }
    }
}

impl EditorView for RecordingEditor {
    fn text(&self) -> String {
        self.text.clone()
    }

    fn scroll_value(&self) -> i32 {
        self.scroll
    }

    fn set_scroll_value(&mut self, value: i32) {
        self.scroll = value;
        self.writes.push(value);
    }

    fn scroll_maximum(&self) -> i32 {
        self.maximum
    }

    fn viewport_size(&self) -> (f32, f32) {
        self.size
    }
}

/// `lines` numbered lines, each newline terminated
pub fn document(lines: usize) -> String {
    (0..lines).map(|i| format!("line {}\n", i)).collect()
}

pub fn software_pipeline(
    config: PreviewConfig,
    converter: Arc<dyn MarkupConverter>,
) -> (PreviewPipeline, HeadlessSurface) {
    let surface = HeadlessSurface::with_scroll_maximum(1000);
    let backend = Box::new(SoftwareBackend::new(Box::new(surface.clone())));
    let pipeline = PreviewPipeline::new(config, converter, backend).expect("pipeline starts");
    (pipeline, surface)
}

pub fn accelerated_pipeline(
    config: PreviewConfig,
    converter: Arc<dyn MarkupConverter>,
) -> (PreviewPipeline, HeadlessSurface) {
    let surface = HeadlessSurface::new();
    let backend = Box::new(AcceleratedBackend::new(Box::new(surface.clone())));
    let pipeline = PreviewPipeline::new(config, converter, backend).expect("pipeline starts");
    (pipeline, surface)
}
