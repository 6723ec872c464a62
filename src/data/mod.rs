// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between a logical channel name and a tensor batch.
//
// The pipeline flows in this order:
//
//   channel name ("train" / "eval")
//       │
//       ▼
//   ChannelSource     → file directory, platform FIFO or memory
//       │
//       ▼
//   TfRecordReader    → splits the byte stream into record payloads
//       │
//       ▼
//   record::decode    → payload → 784 floats in [0,1] + label
//       │
//       ▼
//   InputPipeline     → repeat, prefetch, parallel decode, batch
//       │
//       ▼
//   MnistBatcher      → stacks a batch into Burn tensors
//
// idx.rs sits off to the side: it reads the MNIST
// distribution files for the `convert` command.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Rust Book §13 (Iterators), §16 (Concurrency)

/// Length-prefixed, checksummed record framing
pub mod tfrecord;

/// Example schema and the record decoder
pub mod record;

/// File, pipe and in-memory channel sources
pub mod channel;

/// Bounded producer/consumer pipeline with parallel decode
pub mod pipeline;

/// Implements Burn's Batcher trait for decoded examples
pub mod batcher;

/// MNIST IDX file reader
pub mod idx;
