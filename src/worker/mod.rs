//! Out-of-process DAX execution.
//!
//! Remote datasets are queried by a separate worker executable that owns
//! authentication, token refresh and the Power BI REST calls. Praeparo
//! launches it as a child process and exchanges NDJSON lines with it:
//!
//! ```text
//!  praeparo                          praeparo-worker
//!  ────────                          ───────────────
//!  WorkerClient ── stdin  ── {"id", "method": "dax.execute", ...} ──▶
//!       ▲                                                           │
//!       └────── stdout ◀── {"id", "success", "result" | "error"} ───┘
//! ```
//!
//! Responses may arrive in any order; they are matched back by `id`.

mod client;
mod error;
pub mod protocol;

pub use client::{WorkerClient, WorkerCommand};
pub use error::{WorkerError, WorkerResult};
