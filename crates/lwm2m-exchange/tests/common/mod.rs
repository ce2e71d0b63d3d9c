//! Shared fixtures for exchange integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use lwm2m_core::{CoapMessage, Code, CreatedPath, ManualClock, MessageType, Operation, Token};
use lwm2m_exchange::{
    Exchange, ExchangeHandlers, ExchangeResult, PayloadChunk, ReadOutcome, TxParams,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

pub type TestExchange = Exchange<ManualClock, StdRng>;

/// Exchange on a manual clock with jitter disabled so deadlines are exact.
pub fn new_exchange(clock: &ManualClock) -> TestExchange {
    let mut exchange = Exchange::new(clock.clone(), StdRng::seed_from_u64(42)).unwrap();
    exchange
        .set_tx_params(TxParams::new(Duration::from_secs(2), 1.0, 4).unwrap())
        .unwrap();
    exchange
}

/// Everything the handlers observed.
#[derive(Debug, Default)]
pub struct Record {
    pub reads: usize,
    pub written: Vec<(Vec<u8>, bool)>,
    pub completions: Vec<(Option<CoapMessage>, ExchangeResult)>,
}

impl Record {
    pub fn written_bytes(&self) -> Vec<u8> {
        self.written.iter().flat_map(|(chunk, _)| chunk.clone()).collect()
    }

    pub fn only_completion(&self) -> &(Option<CoapMessage>, ExchangeResult) {
        assert_eq!(self.completions.len(), 1, "expected exactly one completion");
        &self.completions[0]
    }
}

/// Handlers serving `source` in buffer-sized chunks and recording writes.
pub struct TestHandlers {
    pub record: Rc<RefCell<Record>>,
    source: Vec<u8>,
    offset: usize,
    content_format: Option<u16>,
    created_path: Option<CreatedPath>,
    read_error: Option<Code>,
    write_error: Option<Code>,
}

impl TestHandlers {
    pub fn new(source: &[u8]) -> (Self, Rc<RefCell<Record>>) {
        let record = Rc::new(RefCell::new(Record::default()));
        let handlers = Self {
            record: record.clone(),
            source: source.to_vec(),
            offset: 0,
            content_format: None,
            created_path: None,
            read_error: None,
            write_error: None,
        };
        (handlers, record)
    }

    pub fn content_format(mut self, format: u16) -> Self {
        self.content_format = Some(format);
        self
    }

    pub fn created_path(mut self, path: CreatedPath) -> Self {
        self.created_path = Some(path);
        self
    }

    pub fn failing_read(mut self, code: Code) -> Self {
        self.read_error = Some(code);
        self
    }

    pub fn failing_write(mut self, code: Code) -> Self {
        self.write_error = Some(code);
        self
    }

    pub fn boxed(self) -> Box<dyn ExchangeHandlers> {
        Box::new(self)
    }
}

impl ExchangeHandlers for TestHandlers {
    fn read_payload(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, Code> {
        self.record.borrow_mut().reads += 1;
        if let Some(code) = self.read_error {
            return Err(code);
        }
        let remaining = &self.source[self.offset..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.offset += n;
        let chunk = PayloadChunk {
            len: n,
            content_format: self.content_format,
            created_path: self.created_path,
        };
        if self.offset < self.source.len() {
            Ok(ReadOutcome::NeedMore(chunk))
        } else {
            Ok(ReadOutcome::Complete(chunk))
        }
    }

    fn write_payload(&mut self, payload: &[u8], last_block: bool) -> Result<(), Code> {
        self.record
            .borrow_mut()
            .written
            .push((payload.to_vec(), last_block));
        match self.write_error {
            Some(code) => Err(code),
            None => Ok(()),
        }
    }

    fn on_completion(&mut self, response: Option<&CoapMessage>, result: ExchangeResult) {
        self.record
            .borrow_mut()
            .completions
            .push((response.cloned(), result));
    }
}

/// Piggybacked response to `request`.
pub fn ack_response(request: &CoapMessage, code: Code) -> CoapMessage {
    let mut msg = CoapMessage::new(Operation::Response);
    msg.message_id = request.message_id;
    msg.token = request.token;
    msg.code = code;
    msg
}

/// Peer request as the decoder would hand it over.
pub fn peer_request(operation: Operation, mid: u16, token: &[u8]) -> CoapMessage {
    let mut msg = CoapMessage::new(operation);
    msg.msg_type = MessageType::Confirmable;
    msg.message_id = mid;
    msg.token = Token::try_from(token).unwrap();
    msg.code = Code::GET;
    msg
}

/// Payload of `len` distinct-ish bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
