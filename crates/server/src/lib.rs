//! Durable Streams Server
//!
//! An implementation of the durable streams protocol: append-only logs as a
//! service over plain HTTP. A stream is identified by its URL; producers
//! append bytes or JSON to it, and consumers read from any position, resume
//! after disconnects, and optionally block for new data via long-poll or
//! Server-Sent Events.
//!
//! # Features
//!
//! - **Append-only streams**: ordered appends with opaque, lexicographically
//!   sortable offsets minted by the server
//! - **Replay support**: read from any offset to catch up on missed messages
//! - **Idempotent producers**: `(producer, epoch, seq)` fencing for
//!   exactly-once appends and zombie writer rejection
//! - **Long-polling**: wait for new messages with a configurable timeout
//! - **Server-Sent Events**: continuous delivery with reconnection offsets
//! - **TTL/Expiration**: automatic stream cleanup based on time
//! - **JSON mode**: array bodies split into per-element messages on append,
//!   responses wrapped back into a single array
//! - **CDN cursors**: time-bucketed cache tokens so identical reads collapse
//!
//! # Example
//!
//! ```rust,no_run
//! use durable_streams_server::{server, types::ServerOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let options = ServerOptions {
//!         port: 4437,
//!         host: "127.0.0.1".to_string(),
//!         ..Default::default()
//!     };
//!
//!     server::start_server(options).await.unwrap();
//! }
//! ```
//!
//! # Protocol
//!
//! ## Creating a stream
//!
//! ```text
//! PUT /stream/my-events HTTP/1.1
//! Content-Type: application/json
//! Stream-TTL: 3600
//!
//! Response: 201 Created
//! Stream-Next-Offset: 0000000000000000_0000000000000000
//! ```
//!
//! ## Appending data
//!
//! ```text
//! POST /stream/my-events HTTP/1.1
//! Content-Type: application/json
//!
//! {"event": "user_created", "id": 123}
//!
//! Response: 200 OK
//! Stream-Next-Offset: 0000000000000001_0000000000000036
//! ```
//!
//! ## Reading data
//!
//! ```text
//! GET /stream/my-events?offset=-1 HTTP/1.1
//!
//! Response: 200 OK
//! Stream-Next-Offset: 0000000000000001_0000000000000036
//! Stream-Up-To-Date: true
//! Content-Type: application/json
//!
//! [{"event": "user_created", "id": 123}]
//! ```
//!
//! ## Long-polling
//!
//! ```text
//! GET /stream/my-events?offset=0000000000000001_0000000000000036&live=long-poll HTTP/1.1
//!
//! (waits up to 30 seconds for new data)
//!
//! Response: 204 No Content (if no new data)
//! Stream-Up-To-Date: true
//! ```
//!
//! ## Server-Sent Events
//!
//! ```text
//! GET /stream/my-events?offset=-1&live=sse HTTP/1.1
//! Accept: text/event-stream
//!
//! event: data
//! data: {"event": "user_created", "id": 123}
//!
//! event: control
//! data: {"offset":"0000000000000001_0000000000000036","upToDate":true,"cursor":"123"}
//! ```

pub mod cursor;
pub mod error;
pub mod json;
pub mod log;
pub mod offset;
pub mod producer;
pub mod registry;
pub mod server;
pub mod sse;
pub mod stream;
pub mod types;

// Re-export commonly used items
pub use error::StreamError;
pub use offset::StartOffset;
pub use producer::{FenceDecision, ProducerClaim};
pub use registry::{CreateOutcome, StreamRegistry};
pub use server::{create_router, start_server, AppState};
pub use stream::StreamEntry;
pub use types::{
    AppendOptions, AppendOutcome, Message, ReadResult, ServerOptions, StreamConfig,
};
