pub mod flusher;
pub mod window;

pub use flusher::Flusher;
pub use window::WindowScheduler;
