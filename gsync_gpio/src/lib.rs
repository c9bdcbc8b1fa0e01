//! # gsync GPIO Line Abstraction
//!
//! One object-safe interface over a single GPIO line, with two backends:
//!
//! - [`cdev`] - character-device line requests (`/dev/gpiochipN` ioctls)
//! - [`sysfs`] - legacy `/sys/class/gpio` file protocol
//!
//! The backend is chosen by the [`LineId`] handed to [`open_line`]; the
//! control loops only ever see `Box<dyn GpioLine>` and no backend behavior
//! leaks through the interface.
//!
//! # Adding New Backends
//!
//! 1. Create a new submodule under `src/`
//! 2. Implement the [`GpioLine`] trait
//! 3. Extend [`LineId`] and [`open_line`] with the new constructor form

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod cdev;
pub mod error;
pub mod sysfs;

pub use cdev::CdevLine;
pub use error::{GpioError, GpioResult};
pub use sysfs::SysfsLine;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Line input/output direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Input line.
    Input,
    /// Output line.
    Output,
}

/// Line level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Line is low.
    Low,
    /// Line is high.
    High,
}

impl Level {
    /// The complementary level.
    pub fn flipped(self) -> Level {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

/// Edge-detection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// No edge detection.
    None,
    /// Rising edges only.
    Rising,
    /// Falling edges only.
    Falling,
    /// Both edge kinds.
    Both,
}

/// Outcome of a blocking edge wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeWait {
    /// One qualifying edge event was consumed.
    Edge,
    /// The wait was interrupted by a signal; the caller should re-check
    /// its exit condition and wait again.
    Interrupted,
}

/// A single GPIO line under exclusive control of this process.
///
/// Implementations release the line when dropped (close of the line
/// request for cdev, unexport for sysfs), on every exit path.
pub trait GpioLine {
    /// Configure the line direction.
    ///
    /// Switching to input never clears a previously configured edge mode.
    fn set_direction(&mut self, direction: Direction) -> GpioResult<()>;

    /// The currently configured direction.
    fn direction(&self) -> Direction;

    /// Drive the line to `level`. The line must be configured as output.
    fn set_value(&mut self, level: Level) -> GpioResult<()>;

    /// Read the current line level.
    fn value(&mut self) -> GpioResult<Level>;

    /// Set or clear active-low polarity.
    fn set_active_low(&mut self, active_low: bool) -> GpioResult<()>;

    /// Configure edge detection. Forces the line to input direction.
    fn set_edge_mode(&mut self, edge: Edge) -> GpioResult<()>;

    /// The currently configured edge mode.
    fn edge_mode(&self) -> Edge;

    /// Block until one qualifying edge occurs, consuming exactly one
    /// event. Signal delivery surfaces as [`EdgeWait::Interrupted`],
    /// never as an error.
    fn wait_for_edge(&mut self) -> GpioResult<EdgeWait>;

    /// Write the complement of the current level, forcing the line to
    /// output direction first.
    fn toggle(&mut self) -> GpioResult<()> {
        let next = self.value()?.flipped();
        if self.direction() != Direction::Output {
            self.set_direction(Direction::Output)?;
        }
        self.set_value(next)
    }
}

/// Identifies one physical line, carrying the backend choice with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineId {
    /// Character-device backend: chip path plus line offset.
    Cdev {
        /// GPIO chip device path (e.g. `/dev/gpiochip0`).
        path: PathBuf,
        /// Line offset on that chip.
        offset: u32,
    },
    /// Legacy sysfs backend: kernel-global export number.
    Sysfs(u32),
}

impl FromStr for LineId {
    type Err = GpioError;

    /// `"<chip>:<offset>"` selects the character-device backend; a bare
    /// positive integer selects the legacy sysfs backend.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((path, offset)) = s.rsplit_once(':') {
            if path.is_empty() {
                return Err(GpioError::InvalidLineId(s.to_string()));
            }
            let offset: u32 = offset
                .parse()
                .map_err(|_| GpioError::InvalidLineId(s.to_string()))?;
            return Ok(LineId::Cdev {
                path: PathBuf::from(path),
                offset,
            });
        }

        let number: i64 = s
            .parse()
            .map_err(|_| GpioError::InvalidLineId(s.to_string()))?;
        if number <= 0 || number > u32::MAX as i64 {
            return Err(GpioError::InvalidLineId(s.to_string()));
        }
        Ok(LineId::Sysfs(number as u32))
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineId::Cdev { path, offset } => write!(f, "{}:{}", path.display(), offset),
            LineId::Sysfs(number) => write!(f, "{number}"),
        }
    }
}

/// Open the line named by `id` with the matching backend.
///
/// `consumer` is the label shown to other processes inspecting the line
/// (character-device backend only).
pub fn open_line(id: &LineId, consumer: &str) -> GpioResult<Box<dyn GpioLine>> {
    match id {
        LineId::Cdev { path, offset } => Ok(Box::new(CdevLine::open(path, *offset, consumer)?)),
        LineId::Sysfs(number) => Ok(Box::new(SysfsLine::export(*number)?)),
    }
}
