pub mod collector_state;
pub mod window_buffer;

pub use collector_state::CollectorState;
pub use window_buffer::WindowBuffer;
