// ============================================================
// Layer 4 — Streaming Input Pipeline
// ============================================================
// Turns a logical channel into a lazy sequence of batches
// without ever holding the whole dataset in memory.
//
// Topology (one set of threads per `open` call):
//
//   ChannelSource ──► reader thread
//                        │  (pass, bytes)
//                        ▼
//                 [ bounded queue: prefetch ]      ← backpressure on the source
//                        │
//            ┌───────────┼───────────┐
//            ▼           ▼           ▼
//        decoder 0   decoder 1 … decoder N-1       ← record::decode
//            └───────────┼───────────┘
//                        ▼
//                 [ bounded queue: prefetch ]      ← backpressure on decoding
//                        │
//                        ▼
//           BatchStream::next (consumer thread)    ← groups of batch_size
//
// Properties:
//   - The source is opened once per pass, for at most `epochs`
//     passes, then the stream ends.
//   - Decoders race each other, so examples inside a pass come
//     out in arbitrary order. The multiset per pass is exact.
//   - A batch never mixes two passes. The last batch of a pass
//     may be short and is always emitted.
//   - The first error ends the stream. Batches assembled before
//     it are still yielded, then the error.
//   - close() or drop stops the reader, disconnects both queues
//     and joins every thread, so the source handle is released
//     on all exit paths including early stop.
//
// The queues are std sync_channels shared the same way Burn's
// multi-threaded DataLoader shares its batch channel; decoders
// pull jobs through an Arc<Mutex<Receiver>> work queue.
//
// Reference: Rust Book §16 (Message Passing, Shared State)
//            burn-core data/dataloader/multithread.rs

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, SyncSender},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

use serde::{Deserialize, Serialize};

use crate::data::record;
use crate::domain::error::PipelineError;
use crate::domain::example::DecodedExample;
use crate::domain::traits::{Channel, ChannelSource};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Passes over the source before the stream ends
    pub epochs:         usize,
    /// Capacity of each of the two bounded queues
    pub prefetch:       usize,
    /// Concurrent decode workers
    pub decode_workers: usize,
    pub batch_size:     usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            epochs:         20,
            prefetch:       10,
            decode_workers: 10,
            batch_size:     256,
        }
    }
}

/// Between 1 and `batch_size` decoded examples from a single pass.
#[derive(Debug, Clone)]
pub struct Batch {
    pub pass:     usize,
    pub examples: Vec<DecodedExample>,
}

/// Reader → decoder message.
type Job = (usize, Vec<u8>);

/// Decoder/reader → assembler message.
enum Decoded {
    Example { pass: usize, example: DecodedExample },
    /// The reader finished a pass after handing out `records` records.
    PassEnd { pass: usize, records: usize },
    Failed(PipelineError),
}

pub struct InputPipeline {
    source: Arc<dyn ChannelSource>,
    config: PipelineConfig,
}

impl InputPipeline {
    pub fn new(source: Arc<dyn ChannelSource>, config: PipelineConfig) -> Self {
        Self { source, config }
    }

    /// Start an independent stream over `channel`.
    /// Each call spawns its own threads and cursor.
    pub fn open(&self, channel: Channel) -> BatchStream {
        let epochs     = self.config.epochs;
        let capacity   = self.config.prefetch.max(1);
        let workers    = self.config.decode_workers.max(1);
        let batch_size = self.config.batch_size.max(1);

        let (job_tx, job_rx)         = mpsc::sync_channel::<Job>(capacity);
        let (decoded_tx, decoded_rx) = mpsc::sync_channel::<Decoded>(capacity);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let stop   = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(workers + 1);

        for _ in 0..workers {
            let job_rx     = Arc::clone(&job_rx);
            let decoded_tx = decoded_tx.clone();
            handles.push(thread::spawn(move || decode_worker(job_rx, decoded_tx)));
        }

        let source = Arc::clone(&self.source);
        let reader_stop = Arc::clone(&stop);
        handles.push(thread::spawn(move || {
            read_passes(source.as_ref(), channel, epochs, job_tx, decoded_tx, reader_stop)
        }));

        tracing::debug!(
            "Opened '{}' pipeline: {} epochs, prefetch {}, {} decoders, batch {}",
            channel, epochs, capacity, workers, batch_size
        );

        BatchStream {
            receiver: Some(decoded_rx),
            handles,
            stop,
            batch_size,
            passes:   BTreeMap::new(),
            ready:    VecDeque::new(),
            error:    None,
            finished: false,
        }
    }
}

fn read_passes(
    source:     &dyn ChannelSource,
    channel:    Channel,
    epochs:     usize,
    jobs:       SyncSender<Job>,
    decoded:    SyncSender<Decoded>,
    stop:       Arc<AtomicBool>,
) {
    for pass in 0..epochs {
        if stop.load(Ordering::SeqCst) {
            return;
        }

        // Pipe sources may wait here for the platform to create the pass.
        let stream = match source.open_until(channel, pass, &stop) {
            Ok(stream) => stream,
            Err(_) if stop.load(Ordering::SeqCst) => return,
            Err(source) => {
                let err = PipelineError::Open { channel: channel.to_string(), pass, source };
                decoded.send(Decoded::Failed(err)).ok();
                return;
            }
        };

        let mut records = 0usize;
        for item in stream {
            if stop.load(Ordering::SeqCst) {
                return;
            }
            match item {
                Ok(bytes) => {
                    // Blocks while `prefetch` records wait for a decoder.
                    if jobs.send((pass, bytes)).is_err() {
                        return;
                    }
                    records += 1;
                }
                Err(source) => {
                    decoded.send(Decoded::Failed(PipelineError::Record { pass, source })).ok();
                    return;
                }
            }
        }

        tracing::trace!("Channel '{}' pass {} done: {} records", channel, pass, records);
        if decoded.send(Decoded::PassEnd { pass, records }).is_err() {
            return;
        }
    }
}

fn decode_worker(jobs: Arc<Mutex<Receiver<Job>>>, decoded: SyncSender<Decoded>) {
    loop {
        let job = {
            let Ok(rx) = jobs.lock() else { return };
            match rx.recv() {
                Ok(job) => job,
                Err(_) => return,
            }
        };

        let (pass, bytes) = job;
        let message = match record::decode(&bytes) {
            Ok(example) => Decoded::Example { pass, example },
            Err(source) => Decoded::Failed(PipelineError::Decode { pass, source }),
        };
        if decoded.send(message).is_err() {
            return;
        }
    }
}

#[derive(Default)]
struct PassProgress {
    buffer:   Vec<DecodedExample>,
    received: usize,
    expected: Option<usize>,
}

/// Consumer end of a pipeline. Iterates `Result<Batch, PipelineError>`.
pub struct BatchStream {
    receiver:   Option<Receiver<Decoded>>,
    handles:    Vec<JoinHandle<()>>,
    stop:       Arc<AtomicBool>,
    batch_size: usize,
    passes:     BTreeMap<usize, PassProgress>,
    ready:      VecDeque<Batch>,
    /// Returned once `ready` has been drained.
    error:      Option<PipelineError>,
    finished:   bool,
}

impl BatchStream {
    /// Stop all stages and wait for them to exit.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Dropping the receiver fails every pending send.
        self.receiver = None;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("Input pipeline thread panicked");
            }
        }
    }

    fn accept(&mut self, pass: usize, example: DecodedExample) {
        let progress = self.passes.entry(pass).or_default();
        progress.buffer.push(example);
        progress.received += 1;

        if progress.buffer.len() == self.batch_size {
            let examples = std::mem::take(&mut progress.buffer);
            self.ready.push_back(Batch { pass, examples });
        }
        self.complete_if_done(pass);
    }

    fn complete_if_done(&mut self, pass: usize) {
        let done = self
            .passes
            .get(&pass)
            .is_some_and(|p| p.expected == Some(p.received));
        if done {
            if let Some(progress) = self.passes.remove(&pass) {
                if !progress.buffer.is_empty() {
                    self.ready.push_back(Batch { pass, examples: progress.buffer });
                }
            }
        }
    }

    /// Emit whatever is still buffered once every sender is gone.
    fn flush_remaining(&mut self) {
        for (pass, progress) in std::mem::take(&mut self.passes) {
            if !progress.buffer.is_empty() {
                self.ready.push_back(Batch { pass, examples: progress.buffer });
            }
        }
    }
}

impl Iterator for BatchStream {
    type Item = Result<Batch, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(batch) = self.ready.pop_front() {
                return Some(Ok(batch));
            }
            if let Some(err) = self.error.take() {
                return Some(Err(err));
            }
            if self.finished {
                return None;
            }

            let message = match self.receiver.as_ref().map(Receiver::recv) {
                Some(Ok(message)) => message,
                // Every stage has exited: the stream is exhausted.
                _ => {
                    self.finished = true;
                    self.flush_remaining();
                    self.shutdown();
                    continue;
                }
            };

            match message {
                Decoded::Example { pass, example } => self.accept(pass, example),
                Decoded::PassEnd { pass, records } => {
                    self.passes.entry(pass).or_default().expected = Some(records);
                    self.complete_if_done(pass);
                }
                Decoded::Failed(err) => {
                    tracing::error!("Input pipeline failed: {}", err);
                    // Partial buffers are dropped; finished batches stay in `ready`.
                    self.finished = true;
                    self.error    = Some(err);
                    self.passes.clear();
                    self.shutdown();
                }
            }
        }
    }
}

impl Drop for BatchStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}
