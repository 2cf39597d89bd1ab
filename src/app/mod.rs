mod orchestrator;
mod runtime;
mod startup;
mod types;


pub use orchestrator::PowerdownApp;
pub use types::{request_for_signal, Trigger};
