//! Transport Layer: one-way, append-only event streams.
//!
//! Wire format: each event is `data: <json>\n\n`; `complete` is followed by
//! `data: [DONE]\n\n`; `error` is followed by closure. The HTTP status is
//! always 200 once a stream is open.

pub mod events;
// Consumer side of the wire format; the server only decodes its own streams
// when testing them.
#[cfg(test)]
pub mod reader;
pub mod sse;

pub use events::{ProgressDetail, ProgressPayload, StreamEvent};
pub use sse::{stream_generation, Emitter};
