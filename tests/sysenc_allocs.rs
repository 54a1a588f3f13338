//! The zero-copy path of the codec must not touch the heap.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

use kbtf::sysenc::{self, Buffer};

struct CountingAlloc;

thread_local! {
    static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _ = ALLOCATIONS.try_with(|count| count.set(count.get() + 1));
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static GLOBAL: CountingAlloc = CountingAlloc;

fn allocations<F: FnMut()>(mut f: F) -> usize {
    let before = ALLOCATIONS.with(Cell::get);
    for _ in 0..5 {
        f();
    }
    ALLOCATIONS.with(Cell::get) - before
}

kbtf::impl_encode! {
    plain
    #[derive(Debug, Default, Clone, PartialEq)]
    struct Attr {
        pub map_type: u32,
        pub key_size: u32,
        pub value_size: u32,
        pub max_entries: u32,
    }
}

kbtf::impl_encode! {
    #[derive(Debug, Default, Clone, PartialEq)]
    struct Padded {
        pub a: u64,
        pub b: u32,
    }
}

#[test]
fn plain_encode_does_not_allocate() {
    let attr = Attr {
        map_type: 1,
        key_size: 4,
        value_size: 8,
        max_entries: 64,
    };
    let words = vec![1u32, 2, 3];
    let bytes = vec![0u8; 9];
    let count = allocations(|| {
        let buf = sysenc::encode(&attr, 16).expect("encode attr");
        assert!(matches!(buf, Buffer::Borrowed(_)));
        sysenc::encode(words.as_slice(), 12).expect("encode words");
        sysenc::encode(&bytes, 9).expect("encode bytes");
        sysenc::encode(&-1i16, 2).expect("encode scalar");
        sysenc::encode(&[7u64; 1], 8).expect("encode array");
    });
    assert_eq!(count, 0, "zero-copy encode must not allocate");
}

#[test]
fn plain_decode_does_not_allocate() {
    let mut attr = Attr::default();
    let mut words = [0u64; 2];
    let src: [u8; 16] = core::array::from_fn(|i| i as u8);
    let count = allocations(|| {
        sysenc::decode(&mut attr, &src).expect("decode attr");
        sysenc::decode(&mut words, &src).expect("decode words");
    });
    assert_eq!(count, 0, "zero-copy decode must not allocate");
    assert_eq!(words[1].to_ne_bytes(), [8, 9, 10, 11, 12, 13, 14, 15]);
}

#[test]
fn padded_round_trip_restores_the_value() {
    let value = Padded {
        a: u64::MAX,
        b: u32::MAX,
    };
    let buf = sysenc::encode(&value, 12).expect("encode padded");
    assert!(!buf.is_borrowed(), "padding rules out a memory view");

    let mut back = Padded::default();
    sysenc::decode(&mut back, &buf).expect("decode padded");
    assert_eq!(back, value);
}

#[test]
fn plain_round_trip_restores_the_value() {
    let value = Attr {
        map_type: 2,
        key_size: 8,
        value_size: 16,
        max_entries: 1024,
    };
    let buf = sysenc::encode(&value, 16).expect("encode attr");
    let mut back = Attr::default();
    sysenc::decode(&mut back, &buf).expect("decode attr");
    assert_eq!(back, value);
}
