//! LwM2M and CoAP operations carried by a message.

/// The operation a [`CoapMessage`](crate::CoapMessage) represents.
///
/// Variant order is significant: everything from [`Operation::Response`]
/// onwards is a response or a CoAP-level signal rather than a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Operation {
    #[default]
    None,

    // ---- Bootstrap interface ----
    BootstrapRequest,
    BootstrapFinish,
    BootstrapPackRequest,

    // ---- Registration interface ----
    Register,
    Update,
    Deregister,

    // ---- Device management ----
    DmRead,
    DmReadComposite,
    DmDiscover,
    DmWriteReplace,
    DmWritePartialUpdate,
    DmWriteAttributes,
    DmWriteComposite,
    DmExecute,
    DmCreate,
    DmDelete,

    // ---- Information reporting ----
    InfObserve,
    InfObserveComposite,
    InfCancelObserve,
    InfCancelObserveComposite,
    InfInitialNotify,
    InfConNotify,
    InfNonConNotify,
    InfConSend,
    InfNonConSend,

    CoapDownloaderGet,

    Response,

    // ---- CoAP-level messages ----
    CoapReset,
    CoapPingUdp,
    CoapEmptyMsg,
    CoapCsm,
    CoapPing,
    CoapPong,
    CoapRelease,
    CoapAbort,
}

impl Operation {
    /// Responses and CoAP signals; nothing a peer may answer with a new response.
    pub fn is_response_or_signal(self) -> bool {
        self >= Operation::Response
    }

    pub fn is_notify(self) -> bool {
        matches!(self, Operation::InfConNotify | Operation::InfNonConNotify)
    }

    pub fn is_observe(self) -> bool {
        matches!(
            self,
            Operation::InfObserve | Operation::InfObserveComposite
        )
    }

    pub fn is_read(self) -> bool {
        matches!(self, Operation::DmRead | Operation::DmReadComposite)
    }

    /// Operations whose follow-up blocks a peer legitimately requests with a read.
    pub fn accepts_read_continuation(self) -> bool {
        matches!(
            self,
            Operation::InfNonConNotify
                | Operation::InfObserve
                | Operation::InfObserveComposite
                | Operation::InfCancelObserve
                | Operation::InfCancelObserveComposite
        )
    }

    /// Operation of the response to a peer request carrying this operation.
    pub fn response_operation(self) -> Operation {
        if self.is_observe() {
            Operation::InfInitialNotify
        } else {
            Operation::Response
        }
    }
}
