pub mod config;
pub mod detector;
pub mod error;
pub mod model_download;
pub mod pipeline;
pub mod types;

pub use config::OverlayConfig;
pub use error::OverlayError;
pub use pipeline::OverlayPipeline;
