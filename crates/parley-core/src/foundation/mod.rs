//! Foundation layer - the event model.
//!
//! This module contains the data that flows through a worker:
//! - Events with their payload, lifecycle status and wait primitives
//! - Event categories used to key callback chains
//! - Command pipelining
//! - Chopping long replies
//! - Signed remote envelopes

pub mod category;
pub mod event;
pub mod output;
pub mod pipeline;
pub mod remote;

pub use category::EventCategory;
pub use event::{
    DEFAULT_CONTROL_CHARS, DEFAULT_SPEED, Event, EventData, EventFlags, EventStatus, HandOff,
    PIPE_SEPARATOR, command_string, make_response, normalize_control_chars,
};
pub use output::{DEFAULT_OUTPUT_LIMIT, OutputCache, split_text};
pub use pipeline::dopipe;
pub use remote::{RemoteEnvelope, xml_escape, xml_unescape};
