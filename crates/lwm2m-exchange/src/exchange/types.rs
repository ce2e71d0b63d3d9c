use core::fmt;

/// Where an exchange stands after a call into the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeState {
    /// The message passed in has been filled in; hand it to the transport.
    MsgToSend,
    /// A message was handed to the transport; report the send confirmation.
    WaitingSendConfirmation,
    /// Waiting for the peer; feed inbound messages and ticks.
    WaitingMsg,
    /// No exchange is running.
    Finished,
}

impl ExchangeState {
    pub fn as_str(self) -> &'static str {
        match self {
            ExchangeState::MsgToSend => "msg_to_send",
            ExchangeState::WaitingSendConfirmation => "waiting_send_confirmation",
            ExchangeState::WaitingMsg => "waiting_msg",
            ExchangeState::Finished => "finished",
        }
    }
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to [`Exchange::process`](super::Exchange::process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeEvent {
    /// Timer tick; only deadlines are evaluated.
    None,
    /// The transport finished sending the last message.
    SendConfirmation,
    /// The message passed in was just received.
    NewMessage,
}

/// How an exchange ended, as reported to the completion handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeResult {
    Success,
    /// No response, or the transport did not confirm a send in time.
    Timeout,
    /// The peer answered with an error code or a reset.
    ServerResponse,
    /// A payload handler failed, or the exchange could not be started.
    Request,
    Network,
    Protocol,
    /// Cancelled by the caller.
    Terminated,
}

impl ExchangeResult {
    pub fn is_success(self) -> bool {
        self == ExchangeResult::Success
    }
}

impl fmt::Display for ExchangeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExchangeResult::Success => "success",
            ExchangeResult::Timeout => "timeout",
            ExchangeResult::ServerResponse => "server response error",
            ExchangeResult::Request => "request error",
            ExchangeResult::Network => "network error",
            ExchangeResult::Protocol => "protocol error",
            ExchangeResult::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Why the caller is forcing an exchange to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminateReason {
    Network,
    Protocol,
    Terminated,
}

impl From<TerminateReason> for ExchangeResult {
    fn from(reason: TerminateReason) -> Self {
        match reason {
            TerminateReason::Network => ExchangeResult::Network,
            TerminateReason::Protocol => ExchangeResult::Protocol,
            TerminateReason::Terminated => ExchangeResult::Terminated,
        }
    }
}
