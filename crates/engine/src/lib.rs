pub mod reconciler;
pub mod watermark;

pub use reconciler::{CycleOutcome, Reconciler, WatermarkChange};
pub use watermark::WatermarkStore;
