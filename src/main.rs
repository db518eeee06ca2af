//! Headless preview renderer
//!
//! Runs a markup file through the full preview pipeline (debounce, worker,
//! virtual scrolling, theming) onto an in-memory surface and prints the
//! styled page, or the pipeline statistics as JSON.

use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tiny_preview::backend::{BackendPreference, CapabilityProbe, HeadlessSurface, SoftwareBackend};
use tiny_preview::error::BackendError;
use tiny_preview::{
    select_backend, Capability, EditorView, MarkdownConverter, PreviewConfig, PreviewPipeline,
    RenderBackend, StaticProbe,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tiny-preview", version, about = "Render a markup file through the live preview pipeline")]
struct Cli {
    /// Markup file to render
    file: PathBuf,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Editor scroll offset in pixels
    #[arg(long, default_value_t = 0)]
    scroll: i32,

    /// Editor viewport height in pixels
    #[arg(long, default_value_t = 600.0)]
    height: f32,

    /// Print pipeline statistics as JSON instead of the page
    #[arg(long)]
    stats: bool,

    /// Probe for a hardware adapter and report the backend decision
    #[arg(long)]
    probe_gpu: bool,

    /// Give up waiting for the render after this many milliseconds
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,
}

/// Read-only editor over a file's contents
struct FileEditor {
    text: String,
    scroll: i32,
    height: f32,
    line_height: f32,
}

impl EditorView for FileEditor {
    fn text(&self) -> String {
        self.text.clone()
    }

    fn text_len(&self) -> usize {
        self.text.len()
    }

    fn scroll_value(&self) -> i32 {
        self.scroll
    }

    fn set_scroll_value(&mut self, value: i32) {
        self.scroll = value.clamp(0, self.scroll_maximum());
    }

    fn scroll_maximum(&self) -> i32 {
        let lines = tiny_preview::convert::line_count(&self.text) as f32;
        (lines * self.line_height - self.height).max(0.0) as i32
    }

    fn viewport_size(&self) -> (f32, f32) {
        (800.0, self.height)
    }
}

fn probe(enabled: bool) -> Box<dyn CapabilityProbe> {
    if !enabled {
        return Box::new(StaticProbe(Capability::unavailable("probe disabled")));
    }
    #[cfg(feature = "gpu-probe")]
    return Box::new(tiny_preview::WgpuProbe);
    #[cfg(not(feature = "gpu-probe"))]
    return Box::new(StaticProbe(Capability::unavailable("built without gpu-probe")));
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PreviewConfig::load(path)?,
        None => PreviewConfig::default(),
    };
    let text = fs::read_to_string(&cli.file)?;
    info!(file = %cli.file.display(), bytes = text.len(), "rendering");

    let surface = HeadlessSurface::new();
    let preference = if cli.probe_gpu {
        config.backend
    } else {
        BackendPreference::Software
    };
    let backend = select_backend(
        preference,
        probe(cli.probe_gpu).as_ref(),
        || {
            Err(BackendError::SurfaceCreation(
                "no web engine in headless mode".into(),
            ))
        },
        || Box::new(SoftwareBackend::new(Box::new(surface.clone()))) as Box<dyn RenderBackend>,
    );

    let mut editor = FileEditor {
        text,
        scroll: 0,
        height: cli.height,
        line_height: config.virtual_scroll.estimated_line_height,
    };
    editor.set_scroll_value(cli.scroll);

    let mut pipeline = PreviewPipeline::new(config, Arc::new(MarkdownConverter::new()), backend)?;
    pipeline.start_preview_updates();
    pipeline.update_preview(&editor)?;

    if !pipeline.wait_for_render(Duration::from_millis(cli.timeout_ms))? {
        return Err(format!("render did not finish within {}ms", cli.timeout_ms).into());
    }
    pipeline.sync_editor_to_preview(editor.scroll_value(), editor.scroll_maximum());

    if cli.stats {
        println!("{}", serde_json::to_string_pretty(&pipeline.get_statistics())?);
    } else {
        print!("{}", surface.html());
    }

    Ok(())
}
