//! Legacy sysfs GPIO backend.
//!
//! Drives one line through the `/sys/class/gpio` file protocol:
//! `export`/`unexport` at the class root, then `direction`, `value`,
//! `edge`, and `active_low` attribute files under `gpio<N>/`. Edge waits
//! poll the `value` file for `POLLPRI | POLLERR` after a dummy read, the
//! documented sysfs idiom.
//!
//! The class root is overridable so the file protocol can be exercised
//! against a scratch directory in tests.

use crate::error::{GpioError, GpioResult};
use crate::{Direction, Edge, EdgeWait, GpioLine, Level};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Kernel sysfs GPIO class root.
const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// How long to wait for udev to populate the attribute directory after
/// export, in 50 ms steps.
const EXPORT_SETTLE_ATTEMPTS: u32 = 10;

/// A line controlled through the legacy sysfs interface.
///
/// Exported on construction, unexported (best-effort) on drop.
pub struct SysfsLine {
    number: u32,
    root: PathBuf,
    dir: PathBuf,
    /// Cached writer for the `value` file; level writes are on the pulse
    /// path and reopening per write costs more than the write itself.
    value_writer: Option<File>,
    direction: Direction,
    edge: Edge,
}

impl SysfsLine {
    /// Export line `number` under `/sys/class/gpio` and take ownership.
    pub fn export(number: u32) -> GpioResult<Self> {
        Self::with_root(Path::new(SYSFS_GPIO_ROOT), number)
    }

    /// Export line `number` under an alternate class root.
    ///
    /// Exists so the file protocol can be tested against a scratch
    /// directory; production callers use [`SysfsLine::export`].
    pub fn with_root(root: &Path, number: u32) -> GpioResult<Self> {
        let root = root.to_path_buf();
        let dir = root.join(format!("gpio{number}"));

        let export = root.join("export");
        fs::write(&export, number.to_string()).map_err(|source| GpioError::Io {
            op: "write",
            path: export,
            source,
        })?;

        // The attribute directory appears asynchronously after export.
        let mut attempts = 0;
        while !dir.exists() {
            attempts += 1;
            if attempts > EXPORT_SETTLE_ATTEMPTS {
                return Err(GpioError::Io {
                    op: "wait for",
                    path: dir,
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        Ok(SysfsLine {
            number,
            root,
            dir,
            value_writer: None,
            direction: Direction::Input,
            edge: Edge::None,
        })
    }

    /// The kernel-global export number of this line.
    pub fn number(&self) -> u32 {
        self.number
    }

    fn attr(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn write_attr(&self, name: &'static str, contents: &str) -> GpioResult<()> {
        let path = self.attr(name);
        fs::write(&path, contents).map_err(|source| GpioError::Io {
            op: "write",
            path,
            source,
        })
    }

    fn read_attr(&self, name: &'static str) -> GpioResult<String> {
        let path = self.attr(name);
        let raw = fs::read_to_string(&path).map_err(|source| GpioError::Io {
            op: "read",
            path,
            source,
        })?;
        Ok(raw.trim().to_string())
    }
}

impl GpioLine for SysfsLine {
    /// Writes the `direction` attribute only; a previously configured
    /// `edge` attribute is left untouched.
    fn set_direction(&mut self, direction: Direction) -> GpioResult<()> {
        let word = match direction {
            Direction::Input => "in",
            Direction::Output => "out",
        };
        self.write_attr("direction", word)?;
        self.direction = direction;
        Ok(())
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn set_value(&mut self, level: Level) -> GpioResult<()> {
        let path = self.attr("value");
        let mut file = match self.value_writer.take() {
            Some(file) => file,
            None => File::options()
                .write(true)
                .open(&path)
                .map_err(|source| GpioError::Io {
                    op: "open",
                    path: path.clone(),
                    source,
                })?,
        };

        let byte: &[u8] = match level {
            Level::Low => b"0",
            Level::High => b"1",
        };
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(byte))
            .map_err(|source| GpioError::Io {
                op: "write",
                path,
                source,
            })?;

        self.value_writer = Some(file);
        Ok(())
    }

    fn value(&mut self) -> GpioResult<Level> {
        match self.read_attr("value")?.as_str() {
            "0" => Ok(Level::Low),
            "1" => Ok(Level::High),
            other => Err(GpioError::Protocol {
                what: "value",
                got: other.to_string(),
            }),
        }
    }

    fn set_active_low(&mut self, active_low: bool) -> GpioResult<()> {
        self.write_attr("active_low", if active_low { "1" } else { "0" })
    }

    /// Writes `direction=in` first, then the `edge` attribute, so the
    /// final state always has both input direction and the requested edge.
    fn set_edge_mode(&mut self, edge: Edge) -> GpioResult<()> {
        self.set_direction(Direction::Input)?;
        let word = match edge {
            Edge::None => "none",
            Edge::Rising => "rising",
            Edge::Falling => "falling",
            Edge::Both => "both",
        };
        self.write_attr("edge", word)?;
        self.edge = edge;
        Ok(())
    }

    fn edge_mode(&self) -> Edge {
        self.edge
    }

    fn wait_for_edge(&mut self) -> GpioResult<EdgeWait> {
        let path = self.attr("value");
        let mut file = File::open(&path).map_err(|source| GpioError::Io {
            op: "open",
            path: path.clone(),
            source,
        })?;

        // Dummy read: poll on a sysfs attribute reports POLLPRI only for
        // changes after the current contents have been consumed.
        let mut scratch = [0u8; 8];
        let _ = file.read(&mut scratch);

        let mut fds = [PollFd::new(
            file.as_fd(),
            PollFlags::POLLPRI | PollFlags::POLLERR,
        )];
        match poll(&mut fds, PollTimeout::NONE) {
            Err(Errno::EINTR) => return Ok(EdgeWait::Interrupted),
            Err(source) => {
                return Err(GpioError::Io {
                    op: "poll",
                    path,
                    source: std::io::Error::from_raw_os_error(source as i32),
                });
            }
            Ok(_) => {}
        }

        // Consume the event so the next wait blocks for a fresh edge.
        let _ = file.seek(SeekFrom::Start(0));
        let _ = file.read(&mut scratch);
        Ok(EdgeWait::Edge)
    }
}

impl Drop for SysfsLine {
    fn drop(&mut self) {
        // Drop the cached writer before the line disappears.
        self.value_writer = None;

        let unexport = self.root.join("unexport");
        if let Err(e) = fs::write(&unexport, self.number.to_string()) {
            debug!("failed to unexport gpio{}: {e}", self.number);
        }
    }
}
