//! CoAP message codes.
//!
//! A code packs a 3-bit class and a 5-bit detail into one byte, written
//! `c.dd` in the RFCs (`4.04` is class 4, detail 4).

use core::fmt;

/// A CoAP request method, response status or signalling code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[must_use]
pub struct Code(u8);

impl Code {
    /// Build a code from its class and detail parts.
    pub const fn new(class: u8, detail: u8) -> Self {
        Self(((class & 0x07) << 5) | (detail & 0x1F))
    }

    /// Wrap a raw code byte as found on the wire.
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn class(self) -> u8 {
        self.0 >> 5
    }

    pub const fn detail(self) -> u8 {
        self.0 & 0x1F
    }

    /// Client and server error classes (`4.xx` and above).
    pub const fn is_error(self) -> bool {
        self.0 >= Self::BAD_REQUEST.0
    }

    /// Request method range (`0.01`..=`0.31`).
    pub const fn is_request(self) -> bool {
        self.0 != 0 && self.class() == 0
    }

    // ---- Empty / methods (RFC 7252, RFC 8132) ----
    pub const EMPTY: Code = Code::new(0, 0);
    pub const GET: Code = Code::new(0, 1);
    pub const POST: Code = Code::new(0, 2);
    pub const PUT: Code = Code::new(0, 3);
    pub const DELETE: Code = Code::new(0, 4);
    pub const FETCH: Code = Code::new(0, 5);
    pub const PATCH: Code = Code::new(0, 6);
    pub const IPATCH: Code = Code::new(0, 7);

    // ---- Success ----
    pub const CREATED: Code = Code::new(2, 1);
    pub const DELETED: Code = Code::new(2, 2);
    pub const VALID: Code = Code::new(2, 3);
    pub const CHANGED: Code = Code::new(2, 4);
    pub const CONTENT: Code = Code::new(2, 5);
    /// Block-wise upload acknowledgement (RFC 7959).
    pub const CONTINUE: Code = Code::new(2, 31);

    // ---- Client error ----
    pub const BAD_REQUEST: Code = Code::new(4, 0);
    pub const UNAUTHORIZED: Code = Code::new(4, 1);
    pub const BAD_OPTION: Code = Code::new(4, 2);
    pub const FORBIDDEN: Code = Code::new(4, 3);
    pub const NOT_FOUND: Code = Code::new(4, 4);
    pub const METHOD_NOT_ALLOWED: Code = Code::new(4, 5);
    pub const NOT_ACCEPTABLE: Code = Code::new(4, 6);
    pub const REQUEST_ENTITY_INCOMPLETE: Code = Code::new(4, 8);
    pub const PRECONDITION_FAILED: Code = Code::new(4, 12);
    pub const REQUEST_ENTITY_TOO_LARGE: Code = Code::new(4, 13);
    pub const UNSUPPORTED_CONTENT_FORMAT: Code = Code::new(4, 15);

    // ---- Server error ----
    pub const INTERNAL_SERVER_ERROR: Code = Code::new(5, 0);
    pub const NOT_IMPLEMENTED: Code = Code::new(5, 1);
    pub const BAD_GATEWAY: Code = Code::new(5, 2);
    pub const SERVICE_UNAVAILABLE: Code = Code::new(5, 3);
    pub const GATEWAY_TIMEOUT: Code = Code::new(5, 4);
    pub const PROXYING_NOT_SUPPORTED: Code = Code::new(5, 5);

    // ---- Signalling (RFC 8323) ----
    pub const CSM: Code = Code::new(7, 1);
    pub const PING: Code = Code::new(7, 2);
    pub const PONG: Code = Code::new(7, 3);
    pub const RELEASE: Code = Code::new(7, 4);
    pub const ABORT: Code = Code::new(7, 5);
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

impl From<u8> for Code {
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

impl From<Code> for u8 {
    fn from(code: Code) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_class_and_detail() {
        assert_eq!(Code::NOT_FOUND.raw(), 0x84);
        assert_eq!(Code::CONTINUE.raw(), 0x5F);
        assert_eq!(Code::SERVICE_UNAVAILABLE.class(), 5);
        assert_eq!(Code::SERVICE_UNAVAILABLE.detail(), 3);
    }

    #[test]
    fn display_uses_dotted_form() {
        assert_eq!(Code::CONTENT.to_string(), "2.05");
        assert_eq!(Code::REQUEST_ENTITY_TOO_LARGE.to_string(), "4.13");
        assert_eq!(Code::EMPTY.to_string(), "0.00");
    }

    #[test]
    fn error_threshold_is_bad_request() {
        assert!(!Code::CONTINUE.is_error());
        assert!(!Code::CONTENT.is_error());
        assert!(Code::BAD_REQUEST.is_error());
        assert!(Code::INTERNAL_SERVER_ERROR.is_error());
    }

    #[test]
    fn request_range() {
        assert!(Code::GET.is_request());
        assert!(Code::IPATCH.is_request());
        assert!(!Code::EMPTY.is_request());
        assert!(!Code::CHANGED.is_request());
        assert!(Code::IPATCH < Code::CREATED);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn class_and_detail_survive_packing(class in 0u8..8, detail in 0u8..32) {
                let code = Code::new(class, detail);
                prop_assert_eq!(code.class(), class);
                prop_assert_eq!(code.detail(), detail);
                prop_assert_eq!(code.to_string(), format!("{class}.{detail:02}"));
            }

            #[test]
            fn error_iff_class_four_or_above(raw in any::<u8>()) {
                let code = Code::from_raw(raw);
                prop_assert_eq!(code.is_error(), code.class() >= 4);
            }
        }
    }
}
