use tagalloc::{AllocError, HeapGrower, RawAlloc, ToyHeap};

use rand::distributions::Distribution;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use test_env_log::test;

// A live allocation: its address, the size asked for, and the byte its
// payload was filled with.
#[derive(Copy, Clone)]
struct Live {
    addr: usize,
    size: usize,
    fill: u8,
}

fn validate(allocator: &RawAlloc<ToyHeap>, live: &[Option<Live>]) {
    let (validity, stats) = allocator.stats();
    log::debug!(
        "heap_size: {}; Validity: {:?}, Stats: {:?}",
        allocator.heap_size(),
        validity,
        stats,
    );
    assert!(validity.is_valid(), "{}", allocator.check_consistency(true));

    let live: Vec<Live> = live.iter().flatten().copied().collect();
    assert_eq!(stats.allocated_blocks, live.len());
    let allocated: usize = live.iter().map(|l| allocator.block_size(l.addr)).sum();
    assert_eq!(stats.allocated_size, allocated);
    assert_eq!(stats.free_blocks, allocator.free_blocks().count());

    // Nothing has scribbled over anyone else's payload
    for l in &live {
        assert_eq!(l.addr % 8, 0);
        let payload = &allocator.payload(l.addr)[..l.size];
        assert!(
            payload.iter().all(|&b| b == l.fill),
            "payload at {} was overwritten",
            l.addr
        );
    }
}

fn fill(allocator: &mut RawAlloc<ToyHeap>, l: Live) {
    for byte in &mut allocator.payload_mut(l.addr)[..l.size] {
        *byte = l.fill;
    }
}

#[test]
fn test_stress() {
    let toy_heap = ToyHeap::with_capacity(1024 * 1024);
    let mut allocator = RawAlloc::new(toy_heap).unwrap();

    let mut slots: [Option<Live>; 128] = [None; 128];

    let seed: u64 = rand::thread_rng().next_u64();
    log::info!("Using seed {}", seed);
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let range = rand::distributions::Uniform::new_inclusive(1usize, 32);

    for step in 0..1024 * 10 {
        let fill_byte = (step % 251) as u8 + 1;
        let chosen = slots.choose_mut(&mut rng).unwrap();
        match *chosen {
            None => {
                // Let's try allocating
                let size = range.sample(&mut rng) * range.sample(&mut rng);
                let addr = allocator.allocate(size).unwrap();
                log::trace!("Allocated {} bytes at {}", size, addr);
                let l = Live {
                    addr,
                    size,
                    fill: fill_byte,
                };
                fill(&mut allocator, l);
                *chosen = Some(l);
            }
            Some(l) if rng.gen_bool(0.25) => {
                // Let's try reallocating
                let new_size = range.sample(&mut rng) * range.sample(&mut rng);
                let addr = allocator.reallocate(l.addr, new_size).unwrap();
                log::trace!("Reallocated {} to {} bytes at {}", l.addr, new_size, addr);
                let kept = core::cmp::min(l.size, new_size);
                assert!(allocator.payload(addr)[..kept].iter().all(|&b| b == l.fill));
                let moved = Live {
                    addr,
                    size: new_size,
                    fill: fill_byte,
                };
                fill(&mut allocator, moved);
                *chosen = Some(moved);
            }
            Some(l) => {
                // Let's try freeing
                log::trace!("Freeing {}", l.addr);
                allocator.free(l.addr);
                *chosen = None;
            }
        }

        // And validate that everything is ok
        validate(&allocator, &slots);
    }

    // Free everything; it should all merge back into one block
    for slot in slots.iter_mut() {
        if let Some(l) = slot.take() {
            allocator.free(l.addr);
        }
    }
    validate(&allocator, &slots);
    let (_, stats) = allocator.stats();
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.free_size, allocator.heap_size() - 16);
}

#[test]
fn test_alloc_free_symmetry() {
    let mut allocator = RawAlloc::new(ToyHeap::default()).unwrap();
    let heap_size = allocator.heap_size();

    let p = allocator.allocate(100).unwrap();
    allocator.free(p);
    let q = allocator.allocate(100).unwrap();

    assert_eq!(p, q);
    assert_eq!(allocator.heap_size(), heap_size);
}

#[test]
fn test_split_then_remerge() {
    let mut allocator = RawAlloc::new(ToyHeap::default()).unwrap();

    let p = allocator.allocate(4000).unwrap();
    let heap_size = allocator.heap_size();
    allocator.free(p);
    let q = allocator.allocate(4000).unwrap();

    assert_eq!(p, q);
    assert_eq!(allocator.heap_size(), heap_size);
}

#[test]
fn test_out_of_memory() {
    let mut allocator = RawAlloc::new(ToyHeap::default()).unwrap();
    let live: Vec<usize> = (0..10).map(|_| allocator.allocate(300).unwrap()).collect();
    for &p in &live {
        allocator.payload_mut(p)[0] = 0xAB;
    }
    allocator.grower_mut().exhaust();
    let before = allocator.grower().memory().to_vec();

    assert_eq!(allocator.allocate(64 * 1024), Err(AllocError::OutOfMemory));
    let p = live[3];
    assert_eq!(
        allocator.reallocate(p, 64 * 1024),
        Err(AllocError::OutOfMemory)
    );

    assert_eq!(allocator.grower().memory(), &before[..]);
    assert!(live.iter().all(|&p| allocator.payload(p)[0] == 0xAB));
    let (validity, _) = allocator.stats();
    assert!(validity.is_valid());
}

#[test]
fn test_fill_heap_to_capacity() {
    let mut allocator = RawAlloc::new(ToyHeap::with_capacity(64 * 1024)).unwrap();
    let mut live = Vec::new();
    loop {
        match allocator.allocate(1000) {
            Ok(p) => live.push(p),
            Err(e) => {
                assert_eq!(e, AllocError::OutOfMemory);
                break;
            }
        }
    }
    assert!(live.len() > 50);
    let (validity, _) = allocator.stats();
    assert!(validity.is_valid());

    // Everything comes back once freed
    let heap_size = allocator.heap_size();
    for p in live.drain(..).rev() {
        allocator.free(p);
    }
    for _ in 0..50 {
        live.push(allocator.allocate(1000).unwrap());
    }
    assert_eq!(allocator.heap_size(), heap_size);
    let (validity, _) = allocator.stats();
    assert!(validity.is_valid());
}
