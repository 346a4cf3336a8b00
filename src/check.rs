//! A read-only walk of the whole heap, for tests and debugging.
//!
//! Nothing here repairs the heap. Problems are counted in [`Validity`] and
//! described, one per line, in the [`HeapReport`].

use core::fmt;

use crate::allocators::RawAlloc;
use crate::heap::HeapGrower;
use crate::tags::{Tag, ALIGNMENT, OVERHEAD};

/// Validity contains a count of every kind of inconsistency found in a heap.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Validity {
    /// The prologue is not an allocated 8-byte block with matching tags.
    pub bad_prologue: usize,
    /// The walk did not end on a zero-size allocated header at the
    /// high-water mark.
    pub bad_epilogue: usize,
    /// Block pointers that are not a multiple of the alignment.
    pub misaligned: usize,
    /// Blocks whose header and footer differ.
    pub tag_mismatches: usize,
    /// Free blocks directly following another free block. Coalescing should
    /// have merged them.
    pub adjacent_free: usize,
    /// Free blocks (by header) that the free list does not reach.
    pub unlisted_free: usize,
    /// Free-list entries that are not free blocks of this heap.
    pub listed_not_free: usize,
    /// Free-list nodes whose predecessor link does not point back to the
    /// node before them, or lists that loop.
    pub broken_links: usize,
    /// 1 if the free list's own count disagrees with its length.
    pub count_mismatch: usize,
}

impl Validity {
    /// Returns a boolean - a simple check if all cases are 0
    pub fn is_valid(&self) -> bool {
        *self == Validity::default()
    }
}

impl From<Validity> for bool {
    fn from(v: Validity) -> bool {
        v.is_valid()
    }
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    /// The heap's high-water mark.
    pub heap_size: usize,
    /// Allocated blocks, not counting the prologue and epilogue.
    pub allocated_blocks: usize,
    pub allocated_size: usize,
    pub free_blocks: usize,
    pub free_size: usize,
}

/// The result of [`RawAlloc::check_consistency`].
#[derive(Debug, Clone)]
pub struct HeapReport {
    pub validity: Validity,
    pub stats: Stats,
    /// Diagnostics, plus a line per block when the check was verbose.
    pub lines: Vec<String>,
}

impl fmt::Display for HeapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        write!(f, "{:?}", self.stats)
    }
}

struct Checker {
    verbose: bool,
    report: HeapReport,
}

impl Checker {
    fn error(&mut self, line: String) {
        log::warn!("{}", line);
        self.report.lines.push(line);
    }

    fn info(&mut self, line: String) {
        if self.verbose {
            log::debug!("{}", line);
            self.report.lines.push(line);
        }
    }
}

fn describe(bp: usize, header: Tag, footer: Tag) -> String {
    format!("{}: header: {:?} footer: {:?}", bp, header, footer)
}

impl<G: HeapGrower> RawAlloc<G> {
    /// Walk the heap and the free list, checking the prologue and epilogue,
    /// that every block is aligned with matching header and footer, that no
    /// two free blocks are adjacent, and that the free list holds exactly the
    /// free blocks.
    ///
    /// With `verbose`, the report also describes every block.
    pub fn check_consistency(&self, verbose: bool) -> HeapReport {
        let heap = &self.heap;
        let end = heap.high_water();
        let start = heap.start();

        let mut check = Checker {
            verbose,
            report: HeapReport {
                validity: Validity::default(),
                stats: Stats {
                    heap_size: end,
                    ..Stats::default()
                },
                lines: Vec::new(),
            },
        };
        check.info(format!("Heap ({}):", start));

        let prologue = (heap.header_tag(start), heap.footer_tag(start));
        if prologue.0.decode() != (OVERHEAD, true) || prologue.0 != prologue.1 {
            check.report.validity.bad_prologue += 1;
            check.error(format!("Bad prologue header: {:?}", prologue.0));
        }
        check.info(describe(start, prologue.0, prologue.1));

        // Free blocks in address order, by header
        let mut free = Vec::new();
        let mut prev_free = false;
        let mut overran = false;
        let mut bp = start + OVERHEAD;
        loop {
            if bp > end {
                overran = true;
                check.report.validity.bad_epilogue += 1;
                check.error(format!("Error: {} runs past the end of the heap ({})", bp, end));
                break;
            }
            let header = heap.header_tag(bp);
            if header.size() == 0 {
                break;
            }
            if bp + header.size() > end {
                overran = true;
                check.report.validity.bad_epilogue += 1;
                check.error(format!(
                    "Error: {} of size {} runs past the end of the heap ({})",
                    bp,
                    header.size(),
                    end
                ));
                break;
            }

            let footer = heap.footer_tag(bp);
            check.info(describe(bp, header, footer));
            if bp % ALIGNMENT != 0 {
                check.report.validity.misaligned += 1;
                check.error(format!("Error: {} is not doubleword aligned", bp));
            }
            if header != footer {
                check.report.validity.tag_mismatches += 1;
                check.error(format!(
                    "Error: {} header {:?} does not match footer {:?}",
                    bp, header, footer
                ));
            }

            if header.is_allocated() {
                check.report.stats.allocated_blocks += 1;
                check.report.stats.allocated_size += header.size();
                prev_free = false;
            } else {
                if prev_free {
                    check.report.validity.adjacent_free += 1;
                    check.error(format!("Error: adjacent free blocks ending at {}", bp));
                }
                check.report.stats.free_blocks += 1;
                check.report.stats.free_size += header.size();
                free.push(bp);
                prev_free = true;
            }

            bp += header.size();
        }

        if !overran {
            check.info(format!("{}: EOL", bp));
            if bp != end || heap.header_tag(bp).decode() != (0, true) {
                check.report.validity.bad_epilogue += 1;
                check.error(format!("Bad epilogue header at {}", bp));
            }
        }

        self.check_free_list(&mut check, &free);
        check.report
    }

    // `free` holds the free blocks found by the header walk, in address order.
    fn check_free_list(&self, check: &mut Checker, free: &[usize]) {
        let mut listed = vec![false; free.len()];
        let mut pred = None;
        let mut walked = 0;

        let mut next = self.free.head();
        while let Some(bp) = next {
            if walked > free.len() {
                check.report.validity.broken_links += 1;
                check.error(format!("Error: free list loops, or runs past {}", bp));
                break;
            }
            walked += 1;

            match free.binary_search(&bp) {
                Ok(i) if !listed[i] => listed[i] = true,
                Ok(_) => {
                    check.report.validity.broken_links += 1;
                    check.error(format!("Error: free list visits {} twice", bp));
                    break;
                }
                Err(_) => {
                    check.report.validity.listed_not_free += 1;
                    check.error(format!("Error: free list entry {} is not a free block", bp));
                    // Its links can't be trusted
                    break;
                }
            }

            if self.heap.pred(bp) != pred {
                check.report.validity.broken_links += 1;
                check.error(format!(
                    "Error: {} links back to {:?}, expected {:?}",
                    bp,
                    self.heap.pred(bp),
                    pred
                ));
            }
            pred = Some(bp);
            next = self.heap.succ(bp);
        }

        for (i, &bp) in free.iter().enumerate() {
            if !listed[i] {
                check.report.validity.unlisted_free += 1;
                check.error(format!("Error: free block {} is not on the free list", bp));
            }
        }

        if self.free.len() != walked {
            check.report.validity.count_mismatch += 1;
            check.error(format!(
                "Error: free list counts {} blocks, but holds {}",
                self.free.len(),
                walked
            ));
        }
    }

    /// Get statistics on this allocator, and verify validity of the heap.
    pub fn stats(&self) -> (Validity, Stats) {
        let report = self.check_consistency(false);
        (report.validity, report.stats)
    }
}
