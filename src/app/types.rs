use crate::sequencer::ShutdownRequest;

/// Where a sequence request came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Signal(&'static str),
    Command,
}

/// Request carried by a power signal, if the signal asks for one.
///
/// `SIGPWR` powers off, `SIGUSR1` reboots without a reason.
pub fn request_for_signal(name: &str) -> Option<ShutdownRequest> {
    match name {
        "SIGPWR" => Some(ShutdownRequest::shutdown()),
        "SIGUSR1" => Some(ShutdownRequest::reboot(None::<String>)),
        _ => None,
    }
}
