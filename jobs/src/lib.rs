pub mod window;

pub use window::{compute_window, compute_window_at, RunMode, RunWindow, WindowError};
