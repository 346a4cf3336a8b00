//! This is a very minimal example to show using the HeapGrower functions, and
//! the heap a RawAlloc lays out on top of one.

use tagalloc::{HeapGrower, RawAlloc, ToyHeap};
#[cfg(feature = "use_libc")]
use tagalloc::MmapHeap;

fn main() {
    env_logger::init();

    // ToyHeap hands out bytes from a fixed buffer
    let mut toy = ToyHeap::with_capacity(64 * 1024);
    let start = toy.grow_heap(8).unwrap();
    println!("ToyHeap returned: ({}, {})", start, toy.memory().len());

    #[cfg(feature = "use_libc")]
    {
        // MmapHeap reserves a range of virtual memory with libc
        println!("Using libc");
        let mut mmap = MmapHeap::reserve(1 << 20).unwrap();
        let start = mmap.grow_heap(8).unwrap();
        println!(
            "MmapHeap returned: ({}, {}) of {} reserved",
            start,
            mmap.memory().len(),
            mmap.reserved()
        );
    }

    let mut allocator = RawAlloc::new(ToyHeap::with_capacity(64 * 1024)).unwrap();
    let small = allocator.allocate(24).unwrap();
    let big = allocator.allocate(6000).unwrap();
    allocator.free(small);
    println!("Allocated {} and {}; heap is {} bytes", small, big, allocator.heap_size());
    println!("{}", allocator.check_consistency(true));
}
