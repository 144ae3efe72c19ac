//! Basic usage of the `chunk_pool` crate:
//!
//! * Choosing a pool for the size of the item.
//! * Creating objects.
//! * Accessing objects through their handles.
//! * Deleting objects and watching the pool reuse their chunks.

use chunk_pool::{IndexedPool, LinkedPool};
use new_zealand::nz;

fn main() {
    // Strings are larger than a pointer, so their free chunks can link to each other by address.
    let mut names = LinkedPool::<String>::new(nz!(2));

    // Creating an object gives you a handle that you later use to reach the object again.
    let alice = names.new_object("Alice".to_string());
    let bob = names.new_object("Bob".to_string());
    let charlie = names.new_object("Charlie".to_string());

    println!(
        "Name pool contains {} objects in {} blocks, with room for {}",
        names.len(),
        names.block_count(),
        names.capacity()
    );

    names.get_mut(&alice).push_str(" Smith");
    println!("Modified object: {}", names.get(&alice));

    // The freed chunk is the first one to be handed out again, so no new block is needed.
    let bob_address = bob.ptr();
    names.delete_object(bob);
    let dave = names.new_object("Dave".to_string());
    println!(
        "Dave reused the chunk of Bob: {}",
        dave.ptr() == bob_address
    );

    names.delete_object(alice);
    names.delete_object(charlie);
    names.delete_object(dave);

    // Single bytes cannot hold a pointer, so their free chunks link to each other by index.
    let mut levels = IndexedPool::<u8>::new(nz!(100));

    let handles = (0..250_u8)
        .map(|level| levels.new_object(level))
        .collect::<Vec<_>>();

    println!(
        "Level pool contains {} objects in {} blocks of {} chunks",
        levels.len(),
        levels.block_count(),
        levels.chunks_per_block()
    );

    for handle in handles {
        levels.delete_object(handle);
    }

    println!(
        "Level pool is empty again but keeps its {} blocks for later use",
        levels.block_count()
    );
}
