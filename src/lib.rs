pub mod configuration;
pub use configuration::*;

pub mod controller;
pub use controller::*;

pub mod error_handling;

pub mod inspection;

pub mod network;

pub mod output;

pub mod session_management;
pub use session_management::SessionState;
