//! Deterministic simulation of a client upload over a lossy link.
//!
//! [`PeerSimulator`] stands in for an LwM2M server on the far end of a
//! [`MemoryTransport`]: it acknowledges BLOCK1 uploads with 2.31 Continue and
//! a final 2.04 Changed, answers retransmitted requests from its own record
//! and drops datagrams in both directions at a seeded loss rate.
//! [`run_simulation`] wires it to a [`Driver`] on a manual clock.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lwm2m_core::{BlockKind, Clock, CoapMessage, Code, ManualClock, MessageType, Operation};
use lwm2m_exchange::{Exchange, ExchangeHandlers, ExchangeResult, PayloadChunk, ReadOutcome};

use crate::config::NodeConfig;
use crate::driver::{Driver, DriverStats, PollStatus};
use crate::error::NodeError;
use crate::transport::{MemoryTransport, Transport, TransportError};

// ======================================================================== //
// Peer
// ======================================================================== //

/// Counters kept by the simulated peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerStats {
    pub received: u64,
    pub responses: u64,
    pub duplicates: u64,
    pub dropped_inbound: u64,
    pub dropped_outbound: u64,
}

/// Simulated LwM2M server accepting one upload.
#[derive(Debug)]
pub struct PeerSimulator {
    transport: MemoryTransport,
    rng: StdRng,
    loss_rate: f64,
    next_block: u32,
    upload: Vec<u8>,
    complete: bool,
    /// Responses already sent, by request message id.
    answered: HashMap<u16, CoapMessage>,
    stats: PeerStats,
}

impl PeerSimulator {
    pub fn new(transport: MemoryTransport, loss_rate: f64, seed: u64) -> Result<Self, NodeError> {
        if !(0.0..=1.0).contains(&loss_rate) {
            return Err(NodeError::Config(format!(
                "loss_rate must be within [0, 1], got {loss_rate}"
            )));
        }
        Ok(Self {
            transport,
            rng: StdRng::seed_from_u64(seed),
            loss_rate,
            next_block: 0,
            upload: Vec::new(),
            complete: false,
            answered: HashMap::new(),
            stats: PeerStats::default(),
        })
    }

    /// Handle everything the client has sent so far.
    pub fn step(&mut self) -> Result<(), TransportError> {
        while let Some(msg) = self.transport.receive()? {
            if self.lost() {
                self.stats.dropped_inbound += 1;
                tracing::debug!(mid = msg.message_id, "peer: request lost");
                continue;
            }
            self.stats.received += 1;
            if msg.operation.is_response_or_signal() {
                continue;
            }

            if let Some(previous) = self.answered.get(&msg.message_id).cloned() {
                self.stats.duplicates += 1;
                tracing::debug!(mid = msg.message_id, "peer: repeating response");
                self.transmit(&previous)?;
                continue;
            }

            let response = self.accept(&msg);
            if msg.msg_type == MessageType::NonConfirmable {
                continue;
            }
            self.answered.insert(msg.message_id, response.clone());
            self.transmit(&response)?;
        }
        Ok(())
    }

    /// Whether responses are waiting for the client.
    pub fn has_replies(&self) -> bool {
        self.transport.in_flight() > 0
    }

    /// Bytes received so far, in block order.
    pub fn received_payload(&self) -> &[u8] {
        &self.upload
    }

    /// Whether the last block of the upload has arrived.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn stats(&self) -> PeerStats {
        self.stats
    }

    /// Store the request payload and build the response to it.
    fn accept(&mut self, request: &CoapMessage) -> CoapMessage {
        let mut response = CoapMessage::new(Operation::Response);
        response.message_id = request.message_id;
        response.token = request.token;

        match request.block.filter(|block| block.kind == BlockKind::Block1) {
            Some(block) => {
                if block.number == self.next_block {
                    self.upload.extend_from_slice(&request.payload);
                    self.next_block += 1;
                } else {
                    tracing::warn!(
                        expected = self.next_block,
                        got = block.number,
                        "peer: out-of-order block"
                    );
                }
                response.block = Some(block);
                if block.more {
                    response.code = Code::CONTINUE;
                } else {
                    response.code = Code::CHANGED;
                    self.complete = true;
                }
            }
            None => {
                self.upload.extend_from_slice(&request.payload);
                response.code = Code::CHANGED;
                self.complete = true;
            }
        }
        response
    }

    fn transmit(&mut self, msg: &CoapMessage) -> Result<(), TransportError> {
        if self.lost() {
            self.stats.dropped_outbound += 1;
            tracing::debug!(mid = msg.message_id, "peer: response lost");
            return Ok(());
        }
        self.transport.send(msg)?;
        self.stats.responses += 1;
        Ok(())
    }

    fn lost(&mut self) -> bool {
        self.loss_rate > 0.0 && self.rng.gen_bool(self.loss_rate)
    }
}

// ======================================================================== //
// Client side
// ======================================================================== //

/// Serves a fixed payload and records the exchange outcome.
struct PayloadSource {
    data: Vec<u8>,
    offset: usize,
    outcome: Rc<Cell<Option<ExchangeResult>>>,
}

impl ExchangeHandlers for PayloadSource {
    fn read_payload(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, Code> {
        let remaining = &self.data[self.offset..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.offset += n;
        let chunk = PayloadChunk::new(n);
        if self.offset < self.data.len() {
            Ok(ReadOutcome::NeedMore(chunk))
        } else {
            Ok(ReadOutcome::Complete(chunk))
        }
    }

    fn on_completion(&mut self, _response: Option<&CoapMessage>, result: ExchangeResult) {
        self.outcome.set(Some(result));
    }
}

/// Deterministic test payload.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// What happened during a simulation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    /// Completion result; `None` if the exchange never completed.
    pub result: Option<ExchangeResult>,
    /// Simulated time from first send to completion.
    pub elapsed: Duration,
    pub ticks: u64,
    /// The peer received exactly the payload that was sent.
    pub delivered: bool,
    pub driver: DriverStats,
    pub peer: PeerStats,
}

impl SimulationReport {
    pub fn succeeded(&self) -> bool {
        self.result.is_some_and(|r| r.is_success()) && self.delivered
    }
}

/// Run one confirmable send of `simulation.payload_size` bytes to a simulated peer.
pub fn run_simulation(config: &NodeConfig) -> Result<SimulationReport, NodeError> {
    config.validate()?;
    let sim = &config.simulation;
    let clock = ManualClock::new();
    let tick = Duration::from_millis(sim.tick_ms);

    let mut exchange = Exchange::new(clock.clone(), StdRng::seed_from_u64(sim.seed))?;
    config.configure(&mut exchange)?;
    let (client_end, server_end) = MemoryTransport::pair();
    let mut driver = Driver::new(exchange, client_end, config.exchange.buffer_size);
    let mut peer = PeerSimulator::new(server_end, sim.loss_rate, sim.seed.wrapping_add(1))?;

    let payload = pattern(sim.payload_size);
    let outcome = Rc::new(Cell::new(None));
    let source = PayloadSource {
        data: payload.clone(),
        offset: 0,
        outcome: outcome.clone(),
    };

    tracing::info!(
        payload_size = sim.payload_size,
        loss_rate = sim.loss_rate,
        seed = sim.seed,
        "sim: starting upload"
    );
    let start = clock.now();
    driver.start_client(CoapMessage::new(Operation::InfConSend), Box::new(source))?;

    let mut ticks = 0u64;
    loop {
        match driver.poll()? {
            PollStatus::Pending => {}
            PollStatus::Finished | PollStatus::Idle => break,
            PollStatus::Unhandled(msg) => {
                tracing::warn!(mid = msg.message_id, op = ?msg.operation, "sim: unexpected peer request");
            }
        }
        peer.step()?;
        if peer.has_replies() {
            continue;
        }
        clock.advance(tick);
        ticks += 1;
    }

    let report = SimulationReport {
        result: outcome.get(),
        elapsed: clock.now() - start,
        ticks,
        delivered: peer.is_complete() && peer.received_payload() == payload.as_slice(),
        driver: driver.stats(),
        peer: peer.stats(),
    };
    tracing::info!(
        result = ?report.result,
        elapsed_ms = report.elapsed.as_millis() as u64,
        sent = report.driver.sent,
        delivered = report.delivered,
        "sim: upload finished"
    );
    Ok(report)
}
