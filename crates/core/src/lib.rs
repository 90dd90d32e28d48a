//! Core library for a volumetric LED voxel display.
//!
//! The engine owns four framebuffers (two kernel-backed, two in software),
//! a registry of animators with crossfaded switching, and a fixed-rate
//! scheduler that hands every finished frame to a [`Broadcaster`].
//! Drawing primitives rasterize lines, boxes and spheres onto the cube.

pub mod animation;
pub mod config;
pub mod engine;
pub mod error;
pub mod framebuffer;
pub mod grid;
pub mod raster;
pub mod record;
pub mod timeline;

pub use animation::{
    Animator, AnimatorRegistry, ColourAnimator, Crossfade, FramePlan, ShapeWaveAnimator,
    ShootingStarAnimator,
};
pub use config::{AppConfig, DisplayConfig, SchedulerConfig};
pub use engine::VoxelEngine;
pub use error::{Result, VoxelError};
pub use framebuffer::{
    CombineOptions, CpuFramebuffer, Framebuffer, FramebufferSet, HostKernel, KernelFramebuffer,
    SharedKernel, VoxelKernel, VoxelSnapshot,
};
pub use grid::{BlendMode, Colour, Grid};
pub use record::{Broadcaster, FrameRecorder, JsonFrameWriter, RecordedFrame};
pub use timeline::{RunSummary, Scheduler};
