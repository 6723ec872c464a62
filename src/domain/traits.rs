// ============================================================
// Layer 3 — Channels and Record Sources
// ============================================================
// A channel is a logical name ("train" or "eval") that the
// platform maps onto real data. The pipeline only ever sees the
// ChannelSource trait, so it cannot tell a local directory from
// a named pipe or an in-memory fixture:
//
//   FileChannel   → re-reads TFRecord files from a directory
//   PipeChannel   → opens the platform FIFO for each pass
//   MemoryChannel → replays a Vec of records (tests)
//
// Each pass over the data opens a fresh stream. Dropping the
// stream must release whatever handle it holds.
//
// Reference: Rust Book §10 (Traits), §17 (Trait Objects)

use std::{fmt, io, sync::atomic::AtomicBool};

use serde::{Deserialize, Serialize};

use crate::domain::error::RecordError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Train,
    Eval,
}

impl Channel {
    pub fn name(&self) -> &'static str {
        match self {
            Channel::Train => "train",
            Channel::Eval  => "eval",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Serialized records in arrival order for a single pass.
pub type RecordStream = Box<dyn Iterator<Item = Result<Vec<u8>, RecordError>> + Send>;

/// Anything that can resolve a channel into a stream of Raw Records.
pub trait ChannelSource: Send + Sync {
    /// Open the stream for one pass. Passes are numbered from 0.
    fn open(&self, channel: Channel, pass: usize) -> io::Result<RecordStream>;

    /// Like `open`, for sources that may have to wait for a pass to
    /// appear. Gives up with `Interrupted` once `stop` is set.
    fn open_until(&self, channel: Channel, pass: usize, stop: &AtomicBool) -> io::Result<RecordStream> {
        let _ = stop;
        self.open(channel, pass)
    }
}
