//! Sinks for finished frames.

use std::{collections::VecDeque, io::Write};

use serde::Serialize;

use crate::{Colour, Result, VoxelSnapshot};

/// Receives every frame the scheduler publishes.
pub trait Broadcaster {
    fn publish(&mut self, frame: &VoxelSnapshot, brightness: f32, frame_index: u64) -> Result<()>;
}

/// One published frame as kept by [`FrameRecorder`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedFrame {
    pub frame: u64,
    pub brightness: f32,
    pub snapshot: VoxelSnapshot,
}

/// Keeps the most recent frames in memory.
#[derive(Debug)]
pub struct FrameRecorder {
    capacity: usize,
    frames: VecDeque<RecordedFrame>,
    total: u64,
}

impl FrameRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            frames: VecDeque::with_capacity(capacity),
            total: 0,
        }
    }

    pub fn frames(&self) -> impl Iterator<Item = &RecordedFrame> {
        self.frames.iter()
    }

    pub fn latest(&self) -> Option<&RecordedFrame> {
        self.frames.back()
    }

    /// Frames published since creation, including evicted ones.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Default for FrameRecorder {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Broadcaster for FrameRecorder {
    fn publish(&mut self, frame: &VoxelSnapshot, brightness: f32, frame_index: u64) -> Result<()> {
        self.total += 1;
        if self.capacity == 0 {
            return Ok(());
        }
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(RecordedFrame {
            frame: frame_index,
            brightness,
            snapshot: frame.clone(),
        });
        Ok(())
    }
}

#[derive(Serialize)]
struct FrameLine<'a> {
    frame: u64,
    brightness: f32,
    size: usize,
    voxels: &'a [Colour],
}

/// Writes each frame as a single JSON line.
#[derive(Debug)]
pub struct JsonFrameWriter<W: Write> {
    out: W,
}

impl<W: Write> JsonFrameWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Broadcaster for JsonFrameWriter<W> {
    fn publish(&mut self, frame: &VoxelSnapshot, brightness: f32, frame_index: u64) -> Result<()> {
        let line = FrameLine {
            frame: frame_index,
            brightness,
            size: frame.size,
            voxels: &frame.voxels,
        };
        serde_json::to_writer(&mut self.out, &line)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }
}
