//! Character-device GPIO backend.
//!
//! Talks the GPIO uapi v1 protocol on `/dev/gpiochipN`: line values go
//! through a line-handle request, edge events through a line-event request
//! whose fd is read one `gpioevent_data` at a time. The kernel ties a
//! request's configuration to its fd, so every reconfiguration (direction,
//! edge mode, polarity) drops the current request and acquires a fresh one;
//! between those two points the line is momentarily unrequested.

use crate::error::{GpioError, GpioResult};
use crate::{Direction, Edge, EdgeWait, GpioLine, Level};
use bitflags::bitflags;
use nix::errno::Errno;
use std::fs::File;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::{Path, PathBuf};

/// Lines per handle request in the v1 uapi.
const GPIOHANDLES_MAX: usize = 64;

/// Consumer label length in the v1 uapi.
const LABEL_LEN: usize = 32;

bitflags! {
    /// `GPIOHANDLE_REQUEST_*` flag word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HandleFlags: u32 {
        /// Request the line as input.
        const INPUT = 1 << 0;
        /// Request the line as output.
        const OUTPUT = 1 << 1;
        /// Invert the line polarity.
        const ACTIVE_LOW = 1 << 2;
    }
}

bitflags! {
    /// `GPIOEVENT_REQUEST_*` flag word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventFlags: u32 {
        /// Report rising edges.
        const RISING_EDGE = 1 << 0;
        /// Report falling edges.
        const FALLING_EDGE = 1 << 1;
        /// Report both edge kinds.
        const BOTH_EDGES = Self::RISING_EDGE.bits() | Self::FALLING_EDGE.bits();
    }
}

/// `struct gpiohandle_request` from `linux/gpio.h`.
#[repr(C)]
#[allow(dead_code)] // Mirrors the kernel struct; the kernel reads the fields.
pub struct GpioHandleRequest {
    lineoffsets: [u32; GPIOHANDLES_MAX],
    flags: u32,
    default_values: [u8; GPIOHANDLES_MAX],
    consumer_label: [u8; LABEL_LEN],
    lines: u32,
    fd: libc::c_int,
}

/// `struct gpiohandle_data` from `linux/gpio.h`.
#[repr(C)]
pub struct GpioHandleData {
    values: [u8; GPIOHANDLES_MAX],
}

/// `struct gpioevent_request` from `linux/gpio.h`.
#[repr(C)]
#[allow(dead_code)] // Mirrors the kernel struct; the kernel reads the fields.
pub struct GpioEventRequest {
    lineoffset: u32,
    handleflags: u32,
    eventflags: u32,
    consumer_label: [u8; LABEL_LEN],
    fd: libc::c_int,
}

/// `struct gpioevent_data` from `linux/gpio.h`.
#[repr(C)]
#[allow(dead_code)] // Consumed by size only; the payload is discarded.
struct GpioEventData {
    timestamp: u64,
    id: u32,
}

mod uapi {
    use super::{GpioEventRequest, GpioHandleData, GpioHandleRequest};

    nix::ioctl_readwrite!(gpio_get_linehandle, 0xB4, 0x03, GpioHandleRequest);
    nix::ioctl_readwrite!(gpio_get_lineevent, 0xB4, 0x04, GpioEventRequest);
    nix::ioctl_readwrite!(gpiohandle_get_line_values, 0xB4, 0x08, GpioHandleData);
    nix::ioctl_readwrite!(gpiohandle_set_line_values, 0xB4, 0x09, GpioHandleData);
}

use uapi::{
    gpio_get_linehandle, gpio_get_lineevent, gpiohandle_get_line_values,
    gpiohandle_set_line_values,
};

fn make_label(consumer: &str) -> [u8; LABEL_LEN] {
    let mut label = [0u8; LABEL_LEN];
    // Leave at least one NUL terminator.
    for (dst, src) in label[..LABEL_LEN - 1].iter_mut().zip(consumer.bytes()) {
        *dst = src;
    }
    label
}

fn handle_flags(direction: Direction, active_low: bool) -> HandleFlags {
    let mut flags = match direction {
        Direction::Input => HandleFlags::INPUT,
        Direction::Output => HandleFlags::OUTPUT,
    };
    if active_low {
        flags |= HandleFlags::ACTIVE_LOW;
    }
    flags
}

fn event_flags(edge: Edge) -> Option<EventFlags> {
    match edge {
        Edge::None => None,
        Edge::Rising => Some(EventFlags::RISING_EDGE),
        Edge::Falling => Some(EventFlags::FALLING_EDGE),
        Edge::Both => Some(EventFlags::BOTH_EDGES),
    }
}

fn build_handle_request(
    offset: u32,
    direction: Direction,
    active_low: bool,
    label: [u8; LABEL_LEN],
) -> GpioHandleRequest {
    let mut req = GpioHandleRequest {
        lineoffsets: [0; GPIOHANDLES_MAX],
        flags: handle_flags(direction, active_low).bits(),
        default_values: [0; GPIOHANDLES_MAX],
        consumer_label: label,
        lines: 1,
        fd: 0,
    };
    req.lineoffsets[0] = offset;
    req
}

fn build_event_request(
    offset: u32,
    edge: EventFlags,
    active_low: bool,
    label: [u8; LABEL_LEN],
) -> GpioEventRequest {
    GpioEventRequest {
        lineoffset: offset,
        handleflags: handle_flags(Direction::Input, active_low).bits(),
        eventflags: edge.bits(),
        consumer_label: label,
        fd: 0,
    }
}

/// What kind of request currently owns the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Handle,
    Event,
}

/// A line controlled through the GPIO character device.
///
/// Dropping the value closes the request fd and the chip fd, releasing the
/// line on all exit paths.
pub struct CdevLine {
    chip_path: PathBuf,
    offset: u32,
    label: [u8; LABEL_LEN],
    chip: File,
    request: Option<(OwnedFd, RequestKind)>,
    direction: Direction,
    edge: Edge,
    active_low: bool,
}

impl CdevLine {
    /// Open `path` and bind to the line at `offset`.
    ///
    /// No line request is made yet; the first direction or edge
    /// configuration call claims the line from the kernel.
    pub fn open(path: &Path, offset: u32, consumer: &str) -> GpioResult<Self> {
        let chip = File::options()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| GpioError::Io {
                op: "open GPIO chip",
                path: path.to_path_buf(),
                source,
            })?;

        Ok(CdevLine {
            chip_path: path.to_path_buf(),
            offset,
            label: make_label(consumer),
            chip,
            request: None,
            direction: Direction::Output,
            edge: Edge::None,
            active_low: false,
        })
    }

    /// The chip path this line belongs to.
    pub fn chip_path(&self) -> &Path {
        &self.chip_path
    }

    /// The line offset on the chip.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    fn ioctl_err(&self, op: &'static str, source: Errno) -> GpioError {
        GpioError::Ioctl {
            op,
            path: self.chip_path.clone(),
            source,
        }
    }

    /// Acquire a plain line handle, releasing any existing request first.
    fn request_handle(&mut self, direction: Direction) -> GpioResult<()> {
        // The kernel refuses a second request while the old fd is open.
        self.request = None;

        let mut req = build_handle_request(self.offset, direction, self.active_low, self.label);
        unsafe { gpio_get_linehandle(self.chip.as_raw_fd(), &mut req) }
            .map_err(|e| self.ioctl_err("line-handle request", e))?;

        let fd = unsafe { OwnedFd::from_raw_fd(req.fd) };
        self.request = Some((fd, RequestKind::Handle));
        self.direction = direction;
        Ok(())
    }

    /// Acquire an event request, releasing any existing request first.
    fn request_event(&mut self, edge: EventFlags) -> GpioResult<()> {
        self.request = None;

        let mut req = build_event_request(self.offset, edge, self.active_low, self.label);
        unsafe { gpio_get_lineevent(self.chip.as_raw_fd(), &mut req) }
            .map_err(|e| self.ioctl_err("line-event request", e))?;

        let fd = unsafe { OwnedFd::from_raw_fd(req.fd) };
        self.request = Some((fd, RequestKind::Event));
        self.direction = Direction::Input;
        Ok(())
    }

    /// Reacquire the current request shape (after a polarity change).
    fn reacquire(&mut self) -> GpioResult<()> {
        let kind = self.request.as_ref().map(|(_, kind)| *kind);
        match kind {
            None => Ok(()),
            Some(RequestKind::Handle) => self.request_handle(self.direction),
            Some(RequestKind::Event) => match event_flags(self.edge) {
                Some(flags) => self.request_event(flags),
                None => self.request_handle(Direction::Input),
            },
        }
    }
}

impl GpioLine for CdevLine {
    fn set_direction(&mut self, direction: Direction) -> GpioResult<()> {
        match direction {
            Direction::Output => self.request_handle(Direction::Output),
            // An input with a configured edge keeps its event request so
            // the direction change does not silently drop edge reporting.
            Direction::Input => match event_flags(self.edge) {
                Some(flags) => self.request_event(flags),
                None => self.request_handle(Direction::Input),
            },
        }
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn set_value(&mut self, level: Level) -> GpioResult<()> {
        let Some((ref fd, RequestKind::Handle)) = self.request else {
            return Err(GpioError::NotRequested { needed: "output" });
        };
        if self.direction != Direction::Output {
            return Err(GpioError::NotRequested { needed: "output" });
        }

        let mut data = GpioHandleData {
            values: [0; GPIOHANDLES_MAX],
        };
        data.values[0] = match level {
            Level::Low => 0,
            Level::High => 1,
        };
        unsafe { gpiohandle_set_line_values(fd.as_raw_fd(), &mut data) }
            .map_err(|e| self.ioctl_err("set-line-values", e))?;
        Ok(())
    }

    fn value(&mut self) -> GpioResult<Level> {
        // GPIOHANDLE_GET_LINE_VALUES is valid on both handle and event fds.
        let Some((ref fd, _)) = self.request else {
            return Err(GpioError::NotRequested {
                needed: "a line request",
            });
        };

        let mut data = GpioHandleData {
            values: [0; GPIOHANDLES_MAX],
        };
        unsafe { gpiohandle_get_line_values(fd.as_raw_fd(), &mut data) }
            .map_err(|e| self.ioctl_err("get-line-values", e))?;

        Ok(if data.values[0] == 0 {
            Level::Low
        } else {
            Level::High
        })
    }

    /// Polarity lives in the request flags, so flipping it releases and
    /// reacquires the current line request.
    fn set_active_low(&mut self, active_low: bool) -> GpioResult<()> {
        self.active_low = active_low;
        self.reacquire()
    }

    fn set_edge_mode(&mut self, edge: Edge) -> GpioResult<()> {
        self.edge = edge;
        match event_flags(edge) {
            Some(flags) => self.request_event(flags),
            None => self.request_handle(Direction::Input),
        }
    }

    fn edge_mode(&self) -> Edge {
        self.edge
    }

    fn wait_for_edge(&mut self) -> GpioResult<EdgeWait> {
        let Some((ref fd, RequestKind::Event)) = self.request else {
            return Err(GpioError::NotRequested {
                needed: "edge events",
            });
        };

        let mut buf = [0u8; core::mem::size_of::<GpioEventData>()];
        let n = unsafe {
            libc::read(
                fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if n < 0 {
            return match Errno::last() {
                Errno::EINTR => Ok(EdgeWait::Interrupted),
                e => Err(self.ioctl_err("event read", e)),
            };
        }
        if (n as usize) < core::mem::size_of::<GpioEventData>() {
            return Err(GpioError::Protocol {
                what: "gpioevent_data length",
                got: n.to_string(),
            });
        }
        Ok(EdgeWait::Edge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_data_matches_kernel_layout() {
        assert_eq!(core::mem::size_of::<GpioEventData>(), 16);
        assert_eq!(core::mem::size_of::<GpioHandleData>(), GPIOHANDLES_MAX);
    }

    #[test]
    fn handle_flags_map_direction_and_polarity() {
        assert_eq!(
            handle_flags(Direction::Input, false),
            HandleFlags::INPUT
        );
        assert_eq!(
            handle_flags(Direction::Output, false),
            HandleFlags::OUTPUT
        );
        assert_eq!(
            handle_flags(Direction::Input, true),
            HandleFlags::INPUT | HandleFlags::ACTIVE_LOW
        );
    }

    #[test]
    fn event_flags_map_edges() {
        assert_eq!(event_flags(Edge::None), None);
        assert_eq!(event_flags(Edge::Rising), Some(EventFlags::RISING_EDGE));
        assert_eq!(event_flags(Edge::Falling), Some(EventFlags::FALLING_EDGE));
        assert_eq!(event_flags(Edge::Both), Some(EventFlags::BOTH_EDGES));
    }

    #[test]
    fn handle_request_targets_one_line() {
        let req = build_handle_request(17, Direction::Output, false, make_label("gsync"));
        assert_eq!(req.lines, 1);
        assert_eq!(req.lineoffsets[0], 17);
        assert_eq!(req.flags, HandleFlags::OUTPUT.bits());
        assert_eq!(&req.consumer_label[..5], b"gsync");
        assert_eq!(req.consumer_label[5], 0);
    }

    #[test]
    fn event_request_forces_input() {
        let req = build_event_request(3, EventFlags::RISING_EDGE, true, make_label("gtimer"));
        assert_eq!(req.lineoffset, 3);
        assert_eq!(
            req.handleflags,
            (HandleFlags::INPUT | HandleFlags::ACTIVE_LOW).bits()
        );
        assert_eq!(req.eventflags, EventFlags::RISING_EDGE.bits());
    }

    #[test]
    fn label_is_truncated_and_terminated() {
        let label = make_label("a-very-long-consumer-label-that-overflows");
        assert_eq!(label[LABEL_LEN - 1], 0);
    }
}
