mod logging;
mod shared;
mod workspace;

pub use logging::init_tracing;
pub use shared::SharedDb;
pub use workspace::TestWorkspace;
