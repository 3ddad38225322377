//! Reel - HTTP interaction recorder/replayer
//!
//! A [`Transport`](recorder::Transport) either forwards requests to their real
//! destination and records each exchange onto a cassette, or answers them from
//! a previously recorded cassette without touching the network.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::multiple_crate_versions
)]

pub mod cassette;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod network;
pub mod recorder;
pub mod storage;

pub use cassette::{Cassette, Interaction, RecordedRequest, RecordedResponse};
pub use config::{Mode, RecorderConfig};
pub use error::{ReelError, Result};
pub use recorder::{Recorder, Transport};
