/// Where a request currently is, for progress reporting.
/// Loosely follows net/base/load_states_list.h.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    /// Queued behind the per-host or global connection limit.
    WaitingForAvailableSocket,
    /// DNS, TCP, proxy tunnel and TLS handshake.
    Connecting,
    SendingRequest,
    /// Request written, no response byte yet.
    WaitingForResponse,
    /// Response head received; the body is being read.
    ReadingResponse,
}
