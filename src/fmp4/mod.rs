//! Fragmented MP4 output
//!
//! - [`Muxer`] builds the init segment and per-sample fragments
//! - [`patch_video_rotate`] / [`patch_video_scale`] rewrite the video
//!   track matrix of an init segment in place

pub mod boxes;
pub mod muxer;
pub mod patch;

pub use muxer::Muxer;
pub use patch::{patch_video_rotate, patch_video_scale};
