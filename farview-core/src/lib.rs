//! Core pipeline of the farview remote desktop agent.
//!
//! ```text
//! capture ──▶ scaler ──▶ encoder ──▶ keyframe cache ──▶ hub ──▶ viewers
//!                                                        ▲
//! viewers ──▶ control messages ──▶ mapping ──▶ input ────┘  (reverse path)
//! ```
//!
//! The crate is endpoint-free: WebSocket and HTTP handling live in the
//! agent binary. Everything here is driven through
//! [`StreamSupervisor`], [`Hub`], [`CoordinateMapper`],
//! [`InputInjector`] and the clipboard bridge.

pub mod capture;
pub mod clipboard;
pub mod control;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod hub;
pub mod input;
pub mod keyframe;
pub mod keysym;
pub mod mapping;
pub mod nal;
pub mod pacer;
pub mod recorder;
pub mod scaler;
pub mod supervisor;

pub use capture::{CaptureMethod, Grabber};
pub use control::ControlMessage;
pub use encoder::{Codec, EncodedPacket, Encoder, EncoderOptions, H264Options};
pub use error::FarviewError;
pub use frame::Frame;
pub use hub::{Hub, SubscriberGuard, SUBSCRIBER_QUEUE_DEPTH};
pub use input::{InputInjector, MouseButton};
pub use mapping::{CoordinateMapper, ScreenProbe};
pub use pacer::FramePacer;
pub use supervisor::{PipelineState, StreamConfig, StreamSupervisor};
