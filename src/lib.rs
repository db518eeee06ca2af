#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod backend;
pub mod config;
pub mod convert;
pub mod coordinates; // Scroll geometry
pub mod debounce;
pub mod error;
pub mod events;
pub mod history;
pub mod pipeline;
pub mod sync;
pub mod theme;
pub mod virtual_scroll;
pub mod worker;

// Re-export core types
pub use backend::{
    select_backend, AcceleratedBackend, BackendKind, BackendPreference, Capability,
    CapabilityProbe, HeadlessSurface, RenderBackend, SoftwareBackend, StaticProbe,
};
#[cfg(feature = "gpu-probe")]
pub use backend::WgpuProbe;
pub use config::PreviewConfig;
pub use convert::{MarkdownConverter, MarkupConverter};
pub use coordinates::{Viewport, ViewportCalculator};
pub use debounce::{AdaptiveDebouncer, DebounceConfig, DebouncerStats};
pub use error::{BackendError, ConfigError, ConvertError, PreviewError};
pub use events::{HandlerId, PreviewFailed, PreviewUpdated, Signal};
pub use pipeline::{EditorView, PipelineState, PipelineStatistics, PreviewPipeline};
pub use sync::SyncOutcome;
pub use theme::{Theme, ThemeMode, ThemeProvider};
pub use virtual_scroll::{RenderStatistics, VirtualScrollConfig, VirtualScrollPreview};
