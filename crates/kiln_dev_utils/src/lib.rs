//! Kiln Dev Utils
//!
//! Test doubles for the device collaborators: a [`MockDevice`] factory with
//! switchable failures, a [`RecordingCommandList`], and a table-driven
//! [`MockReflection`]. Not published.

pub mod command_list;
pub mod mock_device;
pub mod reflection;

pub use command_list::{RecordedCommand, RecordingCommandList};
pub use mock_device::{MockDevice, MockPipelineState, MockResourceLayout, MockResourceSet};
pub use reflection::MockReflection;

/// Installs `env_logger` for tests. Safe to call from every test.
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
