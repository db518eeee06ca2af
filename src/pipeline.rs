//! Live preview orchestration
//!
//! `PreviewPipeline` sits between an editor and a render backend:
//!
//! ```text
//! edit -> on_text_changed -> debounce delay -> tick fires -> update_preview
//!      -> worker renders (virtual window or full) -> poll -> CSS wrap -> backend
//! ```
//!
//! Everything here runs on the UI thread. Conversion happens on the render
//! worker and comes back through `poll`; completions are tagged with a
//! generation so a slow, stale result can never overwrite a newer one.

use crate::backend::{BackendKind, RenderBackend};
use crate::config::PreviewConfig;
use crate::convert::MarkupConverter;
use crate::debounce::{AdaptiveDebouncer, DebounceTimer, DebouncerStats};
use crate::error::PreviewError;
use crate::events::{HandlerId, PreviewFailed, PreviewUpdated, Signal};
use crate::sync::{ScrollSync, SyncDirection, SyncOutcome};
use crate::theme::{error_page, wrap_html, CssCache, Theme, ThemeProvider};
use crate::virtual_scroll::{RenderStatistics, VirtualScrollConfig, VirtualScrollPreview};
use crate::worker::{RenderOutput, RenderRequest, RenderResponse, RenderWorker, RequestKind};
use ahash::RandomState;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Resolution used when the backend reports a percentage instead of pixels
const PERCENT_SCALE: i32 = 10_000;

// === Editor Collaborator ===

/// What the pipeline needs from the editing widget
pub trait EditorView {
    fn text(&self) -> String;

    /// Document size in bytes
    fn text_len(&self) -> usize {
        self.text().len()
    }

    /// Vertical scrollbar value (px)
    fn scroll_value(&self) -> i32;

    fn set_scroll_value(&mut self, value: i32);

    fn scroll_maximum(&self) -> i32;

    /// Visible `(width, height)` of the editing area (px)
    fn viewport_size(&self) -> (f32, f32) {
        (800.0, 600.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Debouncing,
    RenderRequested,
    RenderComplete,
}

/// Pipeline diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatistics {
    pub state: PipelineState,
    pub backend: BackendKind,
    pub renders_requested: u64,
    pub renders_applied: u64,
    /// Completions dropped because a newer one was already applied
    pub stale_discarded: u64,
    /// Requests the worker skipped in favor of a newer one
    pub superseded: u64,
    pub speculative_hits: u64,
    pub errors: u64,
    pub scroll_loops_aborted: u64,
    pub last_render_ms: Option<f64>,
    pub debouncer: DebouncerStats,
    pub render: RenderStatistics,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    renders_requested: u64,
    renders_applied: u64,
    stale_discarded: u64,
    superseded: u64,
    speculative_hits: u64,
    errors: u64,
}

/// What a render depends on: the text and the line window it covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RenderKey {
    source_hash: u64,
    window: Option<(usize, usize)>,
}

/// Speculative render kept until the matching authoritative dispatch
struct WarmEntry {
    key: RenderKey,
    output: RenderOutput,
}

/// Debounced, windowed, scroll-synchronised live preview
pub struct PreviewPipeline {
    config: PreviewConfig,
    active: bool,
    state: PipelineState,

    // Scheduling
    debouncer: AdaptiveDebouncer,
    timer: DebounceTimer,
    /// Document size of an edit made while a render was in flight
    deferred_change: Option<usize>,

    // Rendering
    preview: VirtualScrollPreview,
    worker: RenderWorker,
    worker_lost: bool,
    backend: Box<dyn RenderBackend>,
    hasher: RandomState,
    next_generation: u64,
    /// Newest authoritative generation dispatched
    latest_dispatched: u64,
    /// Newest authoritative generation displayed
    last_applied: u64,
    /// Worker-measured conversion time of the completion being applied
    completed_duration: Option<Duration>,
    last_render: Option<Duration>,
    last_statistics: RenderStatistics,
    last_line_offset: usize,
    warm: Option<WarmEntry>,

    // Styling
    theme: Box<dyn ThemeProvider>,
    css: CssCache,

    sync: ScrollSync,

    updated: Signal<PreviewUpdated>,
    failed: Signal<PreviewFailed>,
    counters: Counters,
}

impl PreviewPipeline {
    /// Build a pipeline rendering through `converter` onto `backend`
    ///
    /// Starts the render worker. Updates are inactive until
    /// `start_preview_updates`.
    pub fn new(
        config: PreviewConfig,
        converter: Arc<dyn MarkupConverter>,
        backend: Box<dyn RenderBackend>,
    ) -> Result<Self, PreviewError> {
        let preview =
            VirtualScrollPreview::with_config(converter, backend.kind(), config.virtual_scroll.clone());
        let worker = RenderWorker::spawn(preview.clone())?;
        let theme: Box<dyn ThemeProvider> = Box::new(Theme::from_mode(config.theme));

        info!(
            backend = ?backend.kind(),
            predictive = config.predictive_render,
            "preview pipeline created"
        );

        Ok(Self {
            active: false,
            state: PipelineState::Idle,
            debouncer: AdaptiveDebouncer::new(config.debounce.clone()),
            timer: DebounceTimer::new(),
            deferred_change: None,
            last_statistics: preview.get_statistics(),
            preview,
            worker,
            worker_lost: false,
            backend,
            hasher: RandomState::new(),
            next_generation: 0,
            latest_dispatched: 0,
            last_applied: 0,
            completed_duration: None,
            last_render: None,
            last_line_offset: 0,
            warm: None,
            theme,
            css: CssCache::new(),
            sync: ScrollSync::new(config.sync_scrolling),
            updated: Signal::new(),
            failed: Signal::new(),
            counters: Counters::default(),
            config,
        })
    }

    /// Replace the built-in theme
    pub fn with_theme_provider(mut self, theme: Box<dyn ThemeProvider>) -> Self {
        self.set_theme_provider(theme);
        self
    }

    // === Lifecycle ===

    pub fn start_preview_updates(&mut self) {
        self.active = true;
        info!("preview updates started");
    }

    /// Stop reacting to edits and cancel any pending debounce
    pub fn stop_preview_updates(&mut self) {
        self.active = false;
        self.timer.stop();
        self.deferred_change = None;
        if self.state == PipelineState::Debouncing {
            self.state = PipelineState::Idle;
        }
        info!("preview updates stopped");
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// When the pending debounce fires, if one is armed
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    // === Editing ===

    pub fn on_text_changed(&mut self, editor: &dyn EditorView) {
        self.on_text_changed_at(editor, Instant::now());
    }

    /// Record an edit made at `now` and (re)arm the debounce timer
    pub fn on_text_changed_at(&mut self, editor: &dyn EditorView, now: Instant) {
        if !self.active {
            return;
        }
        self.debouncer.on_text_changed_at(now);
        let document_size = editor.text_len();

        if self.state == PipelineState::RenderRequested {
            // No way to cancel the converter; schedule once the result lands
            debug!(document_size, "edit during render, deferring debounce");
            self.deferred_change = Some(document_size);
            return;
        }

        if self.config.predictive_render && self.worker.is_idle() {
            self.dispatch_speculative(editor);
        }

        self.arm_timer(document_size, now);
    }

    /// Feed a measured line height into the virtual scroll estimate
    pub fn on_cursor_moved(&mut self, line_height: f32) {
        self.preview.update_line_height(line_height);
    }

    /// Drive the cooperative timer; call from the UI loop
    pub fn tick(&mut self, editor: &dyn EditorView) {
        self.tick_at(editor, Instant::now());
    }

    pub fn tick_at(&mut self, editor: &dyn EditorView, now: Instant) {
        self.sync.end_update();
        self.poll_at(now);

        if self.state == PipelineState::RenderComplete {
            self.state = PipelineState::Idle;
        }

        if self.timer.fire_if_due(now) {
            if let Err(err) = self.update_preview(editor) {
                debug!(error = %err, "render dispatch failed");
            }
        }
    }

    // === Rendering ===

    /// Snapshot the editor and dispatch an authoritative render
    ///
    /// Returns the request generation. Never blocks on conversion.
    pub fn update_preview(&mut self, editor: &dyn EditorView) -> Result<u64, PreviewError> {
        self.timer.stop();

        let source: Arc<str> = Arc::from(editor.text());
        let source_hash = self.hasher.hash_one(&*source);
        let request = self.build_request(editor, source, source_hash, RequestKind::Authoritative);
        let generation = request.generation;

        // A matching warm render can be shown now; the authoritative one still follows
        let key = self.render_key(&request);
        if let Some(warm) = self.warm.take() {
            if warm.key == key {
                debug!(generation, "showing warm render");
                self.counters.speculative_hits += 1;
                self.display(&warm.output.html);
            }
        }

        if let Err(err) = self.worker.submit(request) {
            self.worker_lost = true;
            self.handle_preview_error(&err);
            return Err(err);
        }

        self.latest_dispatched = generation;
        self.counters.renders_requested += 1;
        self.state = PipelineState::RenderRequested;
        debug!(generation, bytes = editor.text_len(), "render dispatched");
        Ok(generation)
    }

    /// Apply any completions that have arrived; returns how many were handled
    pub fn poll(&mut self) -> usize {
        self.poll_at(Instant::now())
    }

    fn poll_at(&mut self, now: Instant) -> usize {
        let mut handled = 0;
        loop {
            match self.worker.try_recv() {
                Ok(Some(response)) => {
                    self.handle_response(response, now);
                    handled += 1;
                }
                Ok(None) => break,
                Err(err) => {
                    self.on_worker_lost(err);
                    break;
                }
            }
        }
        handled
    }

    /// Block until the newest dispatched render is displayed or `timeout` passes
    ///
    /// Returns `Ok(false)` on timeout. Not for interactive loops.
    pub fn wait_for_render(&mut self, timeout: Duration) -> Result<bool, PreviewError> {
        let deadline = Instant::now() + timeout;
        while self.state == PipelineState::RenderRequested {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            match self.worker.recv_timeout(remaining) {
                Ok(Some(response)) => self.handle_response(response, Instant::now()),
                Ok(None) => return Ok(false),
                Err(err) => {
                    self.on_worker_lost(err.clone());
                    return Err(err);
                }
            }
        }
        Ok(true)
    }

    /// Display a rendered fragment: time it, style it, show it, announce it
    ///
    /// The debouncer is fed the conversion time measured on the worker, not
    /// the time until this call.
    pub fn handle_preview_complete(&mut self, html: &str) {
        if let Some(duration) = self.completed_duration.take() {
            self.last_render = Some(duration);
            self.debouncer.on_render_complete(duration);
        }

        self.display(html);
        self.counters.renders_applied += 1;

        self.updated.emit(&PreviewUpdated {
            html: html.to_string(),
            generation: self.last_applied,
            line_offset: self.last_line_offset,
        });
    }

    /// Replace the preview with an error page when the error is user visible
    pub fn handle_preview_error(&mut self, err: &PreviewError) {
        self.counters.errors += 1;
        if !err.is_user_visible() {
            warn!(error = %err, "preview error recovered");
            return;
        }

        error!(error = %err, "preview failed");
        let page = error_page(&err.to_string(), self.theme.is_dark());
        self.backend.set_html(&page);
        self.failed.emit(&PreviewFailed {
            message: err.to_string(),
            generation: self.last_applied,
        });
    }

    fn handle_response(&mut self, response: RenderResponse, now: Instant) {
        self.counters.superseded += response.superseded as u64;

        if response.kind == RequestKind::Speculative {
            match response.result {
                Ok(output) => {
                    let key = RenderKey {
                        source_hash: response.source_hash,
                        window: output.statistics.virtual_active.then(|| {
                            (output.line_offset, output.line_offset + output.statistics.rendered_lines)
                        }),
                    };
                    self.warm = Some(WarmEntry { key, output })
                }
                Err(err) => debug!(error = %err, "speculative render failed"),
            }
            return;
        }

        if response.generation <= self.last_applied {
            self.counters.stale_discarded += 1;
            warn!(
                generation = response.generation,
                applied = self.last_applied,
                "discarding stale render"
            );
            return;
        }
        self.last_applied = response.generation;

        match response.result {
            Ok(output) => {
                self.last_statistics = output.statistics;
                self.last_line_offset = output.line_offset;
                self.completed_duration = Some(response.duration);
                self.handle_preview_complete(&output.html);
            }
            Err(err) => self.handle_preview_error(&err),
        }

        if response.generation >= self.latest_dispatched {
            self.state = PipelineState::RenderComplete;
            if let Some(document_size) = self.deferred_change.take() {
                if self.active {
                    self.arm_timer(document_size, now);
                }
            }
        }
    }

    fn on_worker_lost(&mut self, err: PreviewError) {
        if self.worker_lost {
            return;
        }
        self.worker_lost = true;
        self.state = PipelineState::Idle;
        self.handle_preview_error(&err);
    }

    fn arm_timer(&mut self, document_size: usize, now: Instant) {
        let delay = self.debouncer.calculate_delay(document_size);
        self.timer.start(delay, now);
        self.state = PipelineState::Debouncing;
    }

    fn dispatch_speculative(&mut self, editor: &dyn EditorView) {
        let source: Arc<str> = Arc::from(editor.text());
        let source_hash = self.hasher.hash_one(&*source);
        let request = self.build_request(editor, source, source_hash, RequestKind::Speculative);
        let key = self.render_key(&request);
        if matches!(&self.warm, Some(warm) if warm.key == key) {
            return;
        }
        if let Err(err) = self.worker.submit(request) {
            debug!(error = %err, "speculative dispatch failed");
        }
    }

    fn build_request(
        &mut self,
        editor: &dyn EditorView,
        source: Arc<str>,
        source_hash: u64,
        kind: RequestKind,
    ) -> RenderRequest {
        self.next_generation += 1;
        let (width, height) = editor.viewport_size();
        let viewport = self
            .preview
            .viewport_for(&source, editor.scroll_value() as f32, width, height);
        RenderRequest {
            generation: self.next_generation,
            kind,
            source,
            source_hash,
            viewport,
        }
    }

    /// Cache key for the output `request` will produce
    fn render_key(&self, request: &RenderRequest) -> RenderKey {
        RenderKey {
            source_hash: request.source_hash,
            window: self.preview.planned_window(&request.source, &request.viewport),
        }
    }

    fn display(&mut self, html: &str) {
        let css = self.css.get(self.theme.as_ref());
        self.backend.set_html(&wrap_html(&css, html));
    }

    // === Scroll Sync ===

    pub fn enable_sync_scrolling(&mut self, enabled: bool) {
        self.sync.set_enabled(enabled);
    }

    pub fn is_sync_scrolling_enabled(&self) -> bool {
        self.sync.is_enabled()
    }

    /// Editor scrolled to `value` of `maximum`: move the preview
    pub fn sync_editor_to_preview(&mut self, value: i32, maximum: i32) -> SyncOutcome {
        let backend = &mut self.backend;
        self.sync
            .sync(SyncDirection::EditorToPreview, value, maximum, |percentage| {
                backend.scroll_to_percentage(percentage);
                None
            })
    }

    /// Preview scrolled to `value` of `maximum`: move the editor
    pub fn sync_preview_to_editor(
        &mut self,
        value: i32,
        maximum: i32,
        editor: &mut dyn EditorView,
    ) -> SyncOutcome {
        self.sync
            .sync(SyncDirection::PreviewToEditor, value, maximum, |percentage| {
                let target = (percentage * editor.scroll_maximum().max(0) as f64).round() as i32;
                editor.set_scroll_value(target);
                Some(target)
            })
    }

    /// Read the preview position from the backend and move the editor
    ///
    /// The accelerated backend cannot report its position, so this is
    /// `Unsupported` there.
    pub fn sync_backend_to_editor(&mut self, editor: &mut dyn EditorView) -> SyncOutcome {
        match self.backend.get_scroll_percentage() {
            Some(percentage) => {
                let value = (percentage * PERCENT_SCALE as f64).round() as i32;
                self.sync_preview_to_editor(value, PERCENT_SCALE, editor)
            }
            None => SyncOutcome::Unsupported,
        }
    }

    // === Styling ===

    /// Use `css` in place of the theme stylesheet
    pub fn set_custom_css(&mut self, css: impl Into<String>) {
        self.css.set_custom_css(Some(css.into()));
    }

    pub fn clear_custom_css(&mut self) {
        self.css.set_custom_css(None);
    }

    /// Drop the cached stylesheet so the next render re-queries the theme
    pub fn clear_css_cache(&mut self) {
        self.css.invalidate();
    }

    pub fn set_theme_provider(&mut self, theme: Box<dyn ThemeProvider>) {
        self.theme = theme;
        self.css.invalidate();
    }

    // === Settings ===

    pub fn set_debounce_enabled(&mut self, enabled: bool) {
        self.debouncer.set_enabled(enabled);
        self.config.debounce.enabled = enabled;
    }

    pub fn set_virtual_config(&mut self, config: VirtualScrollConfig) {
        self.preview.set_config(config.clone());
        self.config.virtual_scroll = config;
    }

    pub fn set_predictive_render(&mut self, enabled: bool) {
        self.config.predictive_render = enabled;
        if !enabled {
            self.warm = None;
        }
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    // === Observers ===

    /// Called with the raw (unstyled) HTML of every displayed render
    pub fn on_preview_updated<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&PreviewUpdated) + 'static,
    {
        self.updated.connect(handler)
    }

    pub fn on_preview_error<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&PreviewFailed) + 'static,
    {
        self.failed.connect(handler)
    }

    pub fn disconnect(&mut self, id: HandlerId) -> bool {
        self.updated.disconnect(id) || self.failed.disconnect(id)
    }

    // === Diagnostics ===

    pub fn get_debouncer_stats(&self) -> DebouncerStats {
        self.debouncer.stats()
    }

    pub fn get_statistics(&self) -> PipelineStatistics {
        let counters = self.counters;
        PipelineStatistics {
            state: self.state,
            backend: self.backend.kind(),
            renders_requested: counters.renders_requested,
            renders_applied: counters.renders_applied,
            stale_discarded: counters.stale_discarded,
            superseded: counters.superseded,
            speculative_hits: counters.speculative_hits,
            errors: counters.errors,
            scroll_loops_aborted: self.sync.aborted_loops(),
            last_render_ms: self.last_render.map(|d| d.as_secs_f64() * 1000.0),
            debouncer: self.debouncer.stats(),
            render: self.last_statistics.clone(),
        }
    }
}
