//! Inbound acknowledgement handling

mod demux;

pub use demux::{AckDemux, AckError, CurrentCommand};
