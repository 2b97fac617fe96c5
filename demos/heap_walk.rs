use std::io::Read;

use segalloc::{Heap, HeapConfig, SbrkArena};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    SbrkArena::program_break(),
  );
}

fn print_heap(heap: &Heap<SbrkArena>) {
  for info in heap.blocks() {
    println!(
      "    {:#08x} | {:>6} bytes | {}",
      info.ptr.offset(),
      info.size,
      if info.allocated { "allocated" } else { "free" }
    );
  }
  heap.dump();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  env_logger::init();

  print_program_break("start");

  let arena = SbrkArena::new().ok_or("sbrk(0) failed")?;
  let mut heap = Heap::new(arena, HeapConfig::from_env())?;

  print_program_break("after init");
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Two small allocations: the first seeds the 24-byte minimum block.
  // --------------------------------------------------------------------
  let first = heap.try_allocate(4)?;
  heap.payload_mut(first)?[..4].copy_from_slice(&0xDEADBEEFu32.to_ne_bytes());
  let second = heap.try_allocate(12)?;
  heap.payload_mut(second)?[..12].fill(0xAB);

  println!("\n[1] Allocated 4 bytes at {:#x}, 12 bytes at {:#x}", first.offset(), second.offset());
  println!("[1] Address of first payload = {:?}", heap.as_mut_ptr(first)?);
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Free the first block and allocate again: the freed block is reused.
  // --------------------------------------------------------------------
  heap.free(first)?;
  let third = heap.try_allocate(2)?;
  println!(
    "\n[2] third == first? {}",
    if third == first {
      "Yes, it reused the freed block"
    } else {
      "No, it allocated somewhere else"
    }
  );
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Grow the second block; it moves or absorbs its free successor.
  // --------------------------------------------------------------------
  let second = heap.resize(Some(second), 300).ok_or("resize failed")?;
  println!("\n[3] Resized second block to 300 bytes, now at {:#x}", second.offset());
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) A large allocation extends the arena and moves the program break.
  // --------------------------------------------------------------------
  print_program_break("before large alloc");
  let big = heap.try_allocate(64 * 1024)?;
  println!("\n[4] Allocated 64 KiB at {:#x}", big.offset());
  print_program_break("after large alloc");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Free everything. The arena never shrinks; the OS reclaims it at exit.
  // --------------------------------------------------------------------
  for ptr in [third, second, big] {
    heap.free(ptr)?;
  }
  println!("\n[5] Freed all blocks, heap consistent: {}", heap.check());
  println!("[5] {:?}", heap.stats());
  print_program_break("end");

  Ok(())
}
