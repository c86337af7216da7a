use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

use zonemux::dns_message::DnsMessage;

struct LargestAllocation;

static LARGEST: AtomicUsize = AtomicUsize::new(0);

unsafe impl GlobalAlloc for LargestAllocation {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        LARGEST.fetch_max(layout.size(), Ordering::SeqCst);
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static ALLOCATOR: LargestAllocation = LargestAllocation;

#[test]
fn test_header_counts_do_not_size_allocations() {
    // 12-byte header claiming 65535 questions and 65535 answers
    let packet = [0, 1, 1, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0];

    LARGEST.store(0, Ordering::SeqCst);
    let result = DnsMessage::from_bytes(&packet);
    let largest = LARGEST.load(Ordering::SeqCst);

    assert!(result.is_err());
    assert!(largest < 4096, "largest allocation was {largest} bytes");
}
