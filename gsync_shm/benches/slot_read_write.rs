//! Criterion benchmarks for locked slot access.
//!
//! The critical section is a single 16-byte copy; these benches watch for
//! regressions in the lock/copy/unlock path that paces both sync loops.

use criterion::{Criterion, criterion_group, criterion_main};
use gsync_common::time::Stamp;
use gsync_shm::SharedSlot;
use std::hint::black_box;

fn bench_key() -> i32 {
    ((std::process::id() as i32) & 0x000F_FFFF) | 0x0200_0000
}

fn slot_write(c: &mut Criterion) {
    let slot = SharedSlot::open(bench_key()).expect("open");
    let stamp = Stamp::new(1, 500);

    c.bench_function("slot_write", |b| {
        b.iter(|| slot.write(black_box(stamp)).expect("write"))
    });
}

fn slot_read(c: &mut Criterion) {
    let slot = SharedSlot::open(bench_key() + 1).expect("open");
    slot.write(Stamp::new(1, 500)).expect("write");

    c.bench_function("slot_read", |b| {
        b.iter(|| black_box(slot.read().expect("read")))
    });
}

criterion_group!(benches, slot_write, slot_read);
criterion_main!(benches);
