//! Prometheus exporter for Linux CIFS client statistics.
//!
//! This library supports the `cifs_exporter` binary. It reads the kernel's
//! CIFS statistics report on a fixed period, parses it with [`cifs_stats`]
//! and publishes the result through the [`metrics`] facade, which the binary
//! wires to a Prometheus exposition endpoint.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod observer;
pub mod source;
