pub mod controller_handler;
pub mod shutdown;

pub use controller_handler::Controller;
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
