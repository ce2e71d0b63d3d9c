//! Benchmarks for the exchange engine hot paths.

use std::time::{Duration, Instant};

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use lwm2m_core::{CoapMessage, Code, ManualClock, Operation};
use lwm2m_exchange::timing::compute_timeout_outcome;
use lwm2m_exchange::{
    Exchange, ExchangeCache, ExchangeEvent, ExchangeHandlers, ExchangeState, PayloadChunk,
    ReadOutcome, TxParams,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Serves a fixed payload in buffer-sized chunks.
struct SliceReader {
    data: Vec<u8>,
    offset: usize,
}

impl ExchangeHandlers for SliceReader {
    fn read_payload(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, Code> {
        let n = (self.data.len() - self.offset).min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.offset..self.offset + n]);
        self.offset += n;
        let chunk = PayloadChunk::new(n);
        if self.offset < self.data.len() {
            Ok(ReadOutcome::NeedMore(chunk))
        } else {
            Ok(ReadOutcome::Complete(chunk))
        }
    }
}

/// Upload `len` bytes block-wise against a peer that acknowledges every block.
fn run_upload(len: usize, buffer_len: usize) -> usize {
    let mut exchange =
        Exchange::new(ManualClock::new(), StdRng::seed_from_u64(7)).expect("exchange");
    let handlers = SliceReader {
        data: vec![0x5a; len],
        offset: 0,
    };
    let mut msg = CoapMessage::new(Operation::InfConSend);
    exchange
        .new_client_request(&mut msg, Box::new(handlers), buffer_len)
        .expect("request");

    let mut rounds = 0;
    loop {
        rounds += 1;
        exchange.process(ExchangeEvent::SendConfirmation, &mut msg);
        let mut response = CoapMessage::new(Operation::Response);
        response.message_id = msg.message_id;
        response.token = msg.token;
        response.block = msg.block;
        response.code = if msg.block_more() {
            Code::CONTINUE
        } else {
            Code::CHANGED
        };
        match exchange.process(ExchangeEvent::NewMessage, &mut response) {
            ExchangeState::MsgToSend => msg = response,
            _ => return rounds,
        }
    }
}

fn bench_block_upload(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_upload");

    for len in [512usize, 4096, 65536] {
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(BenchmarkId::new("block_size_64", len), &len, |b, &len| {
            b.iter(|| black_box(run_upload(len, 64)));
        });
        group.bench_with_input(BenchmarkId::new("block_size_1024", len), &len, |b, &len| {
            b.iter(|| black_box(run_upload(len, 1024)));
        });
    }

    group.finish();
}

fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");
    let params = TxParams::default();
    let start = Instant::now();

    for entries in [5usize, 32, 256] {
        group.bench_with_input(BenchmarkId::new("add", entries), &entries, |b, &entries| {
            let mut cache = ExchangeCache::new(entries).expect("cache");
            let mut response = CoapMessage::new(Operation::Response);
            let mut tick = 0u64;
            b.iter(|| {
                tick += 1;
                response.message_id = tick as u16;
                cache.add(&params, start + Duration::from_millis(tick), &response);
            });
        });

        group.bench_with_input(
            BenchmarkId::new("check_miss", entries),
            &entries,
            |b, &entries| {
                let mut cache = ExchangeCache::new(entries).expect("cache");
                let mut response = CoapMessage::new(Operation::Response);
                for mid in 0..entries as u16 {
                    response.message_id = mid;
                    cache.add(&params, start, &response);
                }
                b.iter(|| black_box(cache.check(black_box(u16::MAX), start)));
            },
        );
    }

    group.finish();
}

fn bench_timeouts(c: &mut Criterion) {
    c.bench_function("compute_timeout_outcome", |b| {
        b.iter(|| {
            for retry in 0..8u16 {
                black_box(compute_timeout_outcome(
                    black_box(Duration::from_secs(2)),
                    retry,
                    4,
                ));
            }
        });
    });
}

criterion_group!(benches, bench_block_upload, bench_cache, bench_timeouts);
criterion_main!(benches);
