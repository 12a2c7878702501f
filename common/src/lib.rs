mod log_setup;

pub use log_setup::setup_logging;

pub const EPSILON: f64 = 1e-10;

pub fn is_debug() -> bool {
    cfg!(debug_assertions)
}
