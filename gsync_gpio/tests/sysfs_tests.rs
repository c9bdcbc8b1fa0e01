//! File-protocol tests for the sysfs backend against a scratch class root.

use gsync_gpio::{Direction, Edge, GpioLine, Level, SysfsLine};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Lay out a fake `/sys/class/gpio` with one pre-populated line directory.
fn fake_gpio_root(number: u32) -> TempDir {
    let root = TempDir::new().expect("tempdir");
    let dir = root.path().join(format!("gpio{number}"));
    fs::create_dir(&dir).expect("gpioN dir");
    fs::write(dir.join("direction"), "in\n").unwrap();
    fs::write(dir.join("value"), "0\n").unwrap();
    fs::write(dir.join("edge"), "none\n").unwrap();
    fs::write(dir.join("active_low"), "0\n").unwrap();
    root
}

fn read_attr(root: &Path, number: u32, name: &str) -> String {
    fs::read_to_string(root.join(format!("gpio{number}")).join(name))
        .unwrap()
        .trim()
        .to_string()
}

#[test]
fn export_writes_line_number() {
    let root = fake_gpio_root(49);
    let _line = SysfsLine::with_root(root.path(), 49).expect("export");

    let exported = fs::read_to_string(root.path().join("export")).unwrap();
    assert_eq!(exported, "49");
}

#[test]
fn export_fails_without_attribute_directory() {
    let root = TempDir::new().expect("tempdir");
    // No gpio7/ directory ever appears.
    assert!(SysfsLine::with_root(root.path(), 7).is_err());
}

#[test]
fn direction_setter_is_idempotent() {
    let root = fake_gpio_root(5);
    let mut line = SysfsLine::with_root(root.path(), 5).expect("export");

    line.set_direction(Direction::Output).unwrap();
    assert_eq!(line.direction(), Direction::Output);
    assert_eq!(read_attr(root.path(), 5, "direction"), "out");

    line.set_direction(Direction::Output).unwrap();
    assert_eq!(line.direction(), Direction::Output);
    assert_eq!(read_attr(root.path(), 5, "direction"), "out");
}

#[test]
fn value_round_trips() {
    let root = fake_gpio_root(5);
    let mut line = SysfsLine::with_root(root.path(), 5).expect("export");
    line.set_direction(Direction::Output).unwrap();

    line.set_value(Level::High).unwrap();
    assert_eq!(line.value().unwrap(), Level::High);
    assert_eq!(read_attr(root.path(), 5, "value"), "1");

    line.set_value(Level::Low).unwrap();
    assert_eq!(line.value().unwrap(), Level::Low);
    assert_eq!(read_attr(root.path(), 5, "value"), "0");
}

#[test]
fn toggle_forces_output_and_flips() {
    let root = fake_gpio_root(5);
    let mut line = SysfsLine::with_root(root.path(), 5).expect("export");
    assert_eq!(line.direction(), Direction::Input);

    line.toggle().unwrap();
    assert_eq!(line.direction(), Direction::Output);
    assert_eq!(read_attr(root.path(), 5, "direction"), "out");
    assert_eq!(read_attr(root.path(), 5, "value"), "1");

    line.toggle().unwrap();
    assert_eq!(read_attr(root.path(), 5, "value"), "0");
}

#[test]
fn edge_mode_forces_input_and_survives_direction_writes() {
    let root = fake_gpio_root(8);
    let mut line = SysfsLine::with_root(root.path(), 8).expect("export");

    line.set_direction(Direction::Output).unwrap();
    line.set_edge_mode(Edge::Rising).unwrap();
    assert_eq!(line.direction(), Direction::Input);
    assert_eq!(line.edge_mode(), Edge::Rising);
    assert_eq!(read_attr(root.path(), 8, "direction"), "in");
    assert_eq!(read_attr(root.path(), 8, "edge"), "rising");

    // A direction write must not clear the configured edge.
    line.set_direction(Direction::Input).unwrap();
    assert_eq!(read_attr(root.path(), 8, "edge"), "rising");
    assert_eq!(line.edge_mode(), Edge::Rising);
}

#[test]
fn active_low_round_trips() {
    let root = fake_gpio_root(8);
    let mut line = SysfsLine::with_root(root.path(), 8).expect("export");

    line.set_active_low(true).unwrap();
    assert_eq!(read_attr(root.path(), 8, "active_low"), "1");

    line.set_active_low(false).unwrap();
    assert_eq!(read_attr(root.path(), 8, "active_low"), "0");
}

#[test]
fn drop_unexports_the_line() {
    let root = fake_gpio_root(12);
    {
        let _line = SysfsLine::with_root(root.path(), 12).expect("export");
    }
    let unexported = fs::read_to_string(root.path().join("unexport")).unwrap();
    assert_eq!(unexported, "12");
}

#[test]
fn bad_value_contents_are_a_protocol_error() {
    let root = fake_gpio_root(3);
    let mut line = SysfsLine::with_root(root.path(), 3).expect("export");

    fs::write(root.path().join("gpio3/value"), "Z\n").unwrap();
    assert!(line.value().is_err());
}
