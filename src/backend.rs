//! Render backends - where styled HTML turns into pixels
//!
//! Two interchangeable surfaces behind one trait:
//! 1. Accelerated: an embedded web engine driven by injected scripts
//! 2. Software: a document widget with direct scrollbar access
//!
//! The backend is chosen once at startup and never swapped.

use crate::error::{BackendError, PreviewError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Which surface family renders the preview
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Accelerated,
    Software,
}

/// Configured backend choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Accelerated when the capability probe allows it
    #[default]
    Auto,
    Accelerated,
    Software,
}

// === Core Trait ===

/// Uniform contract over both surfaces
pub trait RenderBackend {
    fn kind(&self) -> BackendKind;

    /// Replace the displayed document
    fn set_html(&mut self, html: &str);

    /// Current scroll position in `[0, 1]`, `None` if it cannot be read back
    fn get_scroll_percentage(&self) -> Option<f64>;

    /// Scroll so that `percentage` (`[0, 1]`) of the scrollable range is above the fold
    fn scroll_to_percentage(&mut self, percentage: f64);
}

// === Surfaces ===

/// Web engine surface (GPU composited)
pub trait WebSurface {
    fn load_html(&mut self, html: &str);
    /// Fire-and-forget script execution
    fn run_script(&mut self, script: &str);
}

/// Software document widget
pub trait DocumentSurface {
    fn set_html(&mut self, html: &str);
    fn scroll_value(&self) -> i32;
    fn set_scroll_value(&mut self, value: i32);
    fn scroll_maximum(&self) -> i32;
}

// === Accelerated ===

/// Backend over a web engine
///
/// Scrolling is a script call with no return path, so the preview-to-editor
/// direction cannot read a position back from this backend.
pub struct AcceleratedBackend {
    surface: Box<dyn WebSurface>,
}

impl AcceleratedBackend {
    pub fn new(surface: Box<dyn WebSurface>) -> Self {
        Self { surface }
    }

    fn scroll_script(percentage: f64) -> String {
        format!(
            "window.scrollTo(0, (document.documentElement.scrollHeight - window.innerHeight) * {:.6});",
            percentage
        )
    }
}

impl RenderBackend for AcceleratedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Accelerated
    }

    fn set_html(&mut self, html: &str) {
        self.surface.load_html(html);
    }

    fn get_scroll_percentage(&self) -> Option<f64> {
        None
    }

    fn scroll_to_percentage(&mut self, percentage: f64) {
        let percentage = clamp_percentage(percentage);
        self.surface.run_script(&Self::scroll_script(percentage));
    }
}

// === Software ===

/// Backend over a document widget; both scroll directions are exact
pub struct SoftwareBackend {
    surface: Box<dyn DocumentSurface>,
}

impl SoftwareBackend {
    pub fn new(surface: Box<dyn DocumentSurface>) -> Self {
        Self { surface }
    }
}

impl RenderBackend for SoftwareBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn set_html(&mut self, html: &str) {
        self.surface.set_html(html);
    }

    fn get_scroll_percentage(&self) -> Option<f64> {
        let maximum = self.surface.scroll_maximum();
        if maximum <= 0 {
            return Some(0.0);
        }
        Some(clamp_percentage(
            self.surface.scroll_value() as f64 / maximum as f64,
        ))
    }

    fn scroll_to_percentage(&mut self, percentage: f64) {
        let maximum = self.surface.scroll_maximum().max(0);
        let value = (clamp_percentage(percentage) * maximum as f64).round() as i32;
        self.surface.set_scroll_value(value);
    }
}

fn clamp_percentage(percentage: f64) -> f64 {
    if percentage.is_finite() {
        percentage.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

// === Headless Surface ===

/// What a `HeadlessSurface` has been asked to display
#[derive(Debug, Clone, Default)]
pub struct HeadlessState {
    pub html: String,
    pub loads: usize,
    pub scroll_value: i32,
    pub scroll_maximum: i32,
    pub scripts: Vec<String>,
}

/// In-memory surface implementing both surface traits
///
/// Clones share state, so the owner keeps a handle while a backend owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct HeadlessSurface {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scroll_maximum(maximum: i32) -> Self {
        let surface = Self::default();
        surface.set_scroll_maximum(maximum);
        surface
    }

    pub fn set_scroll_maximum(&self, maximum: i32) {
        let mut state = self.state.lock();
        state.scroll_maximum = maximum.max(0);
        state.scroll_value = state.scroll_value.min(state.scroll_maximum);
    }

    pub fn snapshot(&self) -> HeadlessState {
        self.state.lock().clone()
    }

    pub fn html(&self) -> String {
        self.state.lock().html.clone()
    }
}

impl DocumentSurface for HeadlessSurface {
    fn set_html(&mut self, html: &str) {
        let mut state = self.state.lock();
        state.html.clear();
        state.html.push_str(html);
        state.loads += 1;
    }

    fn scroll_value(&self) -> i32 {
        self.state.lock().scroll_value
    }

    fn set_scroll_value(&mut self, value: i32) {
        let mut state = self.state.lock();
        state.scroll_value = value.clamp(0, state.scroll_maximum);
    }

    fn scroll_maximum(&self) -> i32 {
        self.state.lock().scroll_maximum
    }
}

impl WebSurface for HeadlessSurface {
    fn load_html(&mut self, html: &str) {
        DocumentSurface::set_html(self, html);
    }

    fn run_script(&mut self, script: &str) {
        self.state.lock().scripts.push(script.to_string());
    }
}

// === Capability Detection ===

/// Result of probing for a hardware render surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capability {
    pub hardware_available: bool,
    /// Human readable diagnostic
    pub reason: String,
}

impl Capability {
    pub fn available(reason: impl Into<String>) -> Self {
        Self {
            hardware_available: true,
            reason: reason.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            hardware_available: false,
            reason: reason.into(),
        }
    }

    /// `NoAdapter` unless a hardware surface was found
    pub fn require(&self) -> Result<(), BackendError> {
        if self.hardware_available {
            Ok(())
        } else {
            Err(BackendError::NoAdapter(self.reason.clone()))
        }
    }
}

/// Reports whether the accelerated backend can be used
pub trait CapabilityProbe {
    fn probe(&self) -> Capability;
}

/// Probe with a fixed answer
#[derive(Debug, Clone)]
pub struct StaticProbe(pub Capability);

impl CapabilityProbe for StaticProbe {
    fn probe(&self) -> Capability {
        self.0.clone()
    }
}

/// Asks wgpu for a hardware adapter
#[cfg(feature = "gpu-probe")]
#[derive(Debug, Clone, Copy, Default)]
pub struct WgpuProbe;

#[cfg(feature = "gpu-probe")]
impl CapabilityProbe for WgpuProbe {
    fn probe(&self) -> Capability {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }));

        match adapter {
            Ok(adapter) => {
                let adapter_info = adapter.get_info();
                if adapter_info.device_type == wgpu::DeviceType::Cpu {
                    Capability::unavailable(format!(
                        "only a software adapter is present ({})",
                        adapter_info.name
                    ))
                } else {
                    Capability::available(format!(
                        "{} via {:?}",
                        adapter_info.name, adapter_info.backend
                    ))
                }
            }
            Err(err) => Capability::unavailable(format!("no adapter: {}", err)),
        }
    }
}

/// Pick the backend for this session
///
/// Accelerated construction failures fall back to software once; there is no
/// retry later in the session.
pub fn select_backend<A, S>(
    preference: BackendPreference,
    probe: &dyn CapabilityProbe,
    accelerated: A,
    software: S,
) -> Box<dyn RenderBackend>
where
    A: FnOnce() -> Result<Box<dyn RenderBackend>, BackendError>,
    S: FnOnce() -> Box<dyn RenderBackend>,
{
    let try_accelerated = match preference {
        BackendPreference::Software => {
            info!("software backend forced by configuration");
            false
        }
        BackendPreference::Accelerated => true,
        BackendPreference::Auto => match probe.probe().require() {
            Ok(()) => true,
            Err(err) => {
                info!(error = %err, "hardware surface unavailable, using software backend");
                false
            }
        },
    };

    if try_accelerated {
        match accelerated() {
            Ok(backend) => {
                info!("using accelerated backend");
                return backend;
            }
            Err(err) => {
                let err = PreviewError::BackendUnavailable(err.to_string());
                warn!(error = %err, "falling back to software backend");
            }
        }
    }

    software()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn software_box(surface: &HeadlessSurface) -> Box<dyn RenderBackend> {
        Box::new(SoftwareBackend::new(Box::new(surface.clone())))
    }

    #[test]
    fn test_software_scroll_round_trip() {
        let surface = HeadlessSurface::with_scroll_maximum(1000);
        let mut backend = SoftwareBackend::new(Box::new(surface.clone()));

        backend.scroll_to_percentage(0.25);
        assert_eq!(surface.snapshot().scroll_value, 250);
        assert_eq!(backend.get_scroll_percentage(), Some(0.25));

        backend.scroll_to_percentage(7.0);
        assert_eq!(surface.snapshot().scroll_value, 1000);
    }

    #[test]
    fn test_software_zero_maximum() {
        let surface = HeadlessSurface::new();
        let mut backend = SoftwareBackend::new(Box::new(surface.clone()));
        assert_eq!(backend.get_scroll_percentage(), Some(0.0));
        backend.scroll_to_percentage(0.5);
        assert_eq!(surface.snapshot().scroll_value, 0);
    }

    #[test]
    fn test_accelerated_scrolls_by_script() {
        let surface = HeadlessSurface::new();
        let mut backend = AcceleratedBackend::new(Box::new(surface.clone()));

        backend.set_html("<p>x</p>");
        backend.scroll_to_percentage(0.5);

        let state = surface.snapshot();
        assert_eq!(state.html, "<p>x</p>");
        assert_eq!(state.scripts.len(), 1);
        assert!(state.scripts[0].contains("0.500000"));
        assert_eq!(backend.get_scroll_percentage(), None);
    }

    #[test]
    fn test_select_backend_falls_back() {
        let surface = HeadlessSurface::new();
        let backend = select_backend(
            BackendPreference::Auto,
            &StaticProbe(Capability::available("test gpu")),
            || Err(BackendError::SurfaceCreation("no context".into())),
            || software_box(&surface),
        );
        assert_eq!(backend.kind(), BackendKind::Software);
    }

    #[test]
    fn test_select_backend_respects_probe() {
        let surface = HeadlessSurface::new();
        let mut accelerated_called = false;
        let backend = select_backend(
            BackendPreference::Auto,
            &StaticProbe(Capability::unavailable("headless")),
            || {
                accelerated_called = true;
                Ok(Box::new(AcceleratedBackend::new(Box::new(surface.clone()))) as Box<dyn RenderBackend>)
            },
            || software_box(&surface),
        );
        assert_eq!(backend.kind(), BackendKind::Software);
        assert!(!accelerated_called);
    }

    #[test]
    fn test_capability_require() {
        assert!(Capability::available("test gpu").require().is_ok());
        match Capability::unavailable("headless").require() {
            Err(BackendError::NoAdapter(reason)) => assert_eq!(reason, "headless"),
            other => panic!("expected NoAdapter, got {:?}", other),
        }
    }

    #[test]
    fn test_select_backend_forced_accelerated() {
        let surface = HeadlessSurface::new();
        let backend = select_backend(
            BackendPreference::Accelerated,
            &StaticProbe(Capability::unavailable("headless")),
            || Ok(Box::new(AcceleratedBackend::new(Box::new(surface.clone()))) as Box<dyn RenderBackend>),
            || software_box(&surface),
        );
        assert_eq!(backend.kind(), BackendKind::Accelerated);
    }
}
