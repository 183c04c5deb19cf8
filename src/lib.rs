//! # Redirect Logger
//!
//! Captures whatever a process writes to arbitrary file descriptors (standard
//! output, standard error, any pipe-like target) and persists it into a
//! rolling set of on-disk files, without ever blocking the writer on disk I/O.
//!
//! ## Key Features
//!
//! * Descriptor redirection through pipes drained by a single background
//!   reactor thread
//! * Buffered file writes that are flushed and synced on every rotation and on
//!   shutdown
//! * Size-based rotation over a fixed ring of numbered files, resuming the
//!   last partially filled file after a restart
//! * Time-based rotation over hour/day buckets with a retention limit
//! * A stable `{name}.{ext}` symlink that always points at the active file
//! * A coarse clock so log timestamps don't cost a syscall each
//!
//! ## Main Components
//!
//! * `DurableFile`: buffered writer over one open file
//! * `RotatePolicy`: naming and directory housekeeping shared by strategies
//! * `SizeRotate` / `TimeRotate`: the two rotation strategies
//! * `Logger`: couples a strategy with its active file
//! * `Reactor`: the redirection thread and its handler registry
//!
//! ## Quick Start
//!
//! ```no_run
//! use redirect_logger::{Logger, SizeRotate};
//!
//! let rotate = SizeRotate::builder()
//!     .base("/var/log/myapp")
//!     .name("stdout")
//!     .max_files(3)
//!     .size(10 * 1024 * 1024)
//!     .build();
//! redirect_logger::redirect(1, Logger::new(rotate).unwrap()).unwrap();
//!
//! println!("this ends up in /var/log/myapp/stdout.0.log");
//!
//! redirect_logger::shutdown().unwrap();
//! ```

pub mod config;
pub mod durable_file;
pub mod efficient_clock;
pub mod error;
pub mod logger;
pub mod reactor;
pub mod rotate_policy;
pub mod size_rotate;
pub mod template;
pub mod time_rotate;

pub use config::{parse_bytes, parse_duration, Bytes, Seconds};
pub use durable_file::DurableFile;
pub use efficient_clock::current_seconds;
pub use error::{Error, Result};
pub use logger::{LogSink, Logger};
pub use reactor::{redirect, redirect_named, shutdown, Reactor};
pub use rotate_policy::{Metadata, Rotate, RotatePolicy};
pub use size_rotate::SizeRotate;
pub use time_rotate::TimeRotate;
