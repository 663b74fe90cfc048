// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use noetl_core::clock::FakeClock;

#[test]
fn ids_minted_in_the_same_millisecond_are_strictly_increasing() {
    let clock = FakeClock::new();
    let allocator = SnowflakeAllocator::new(clock, 1);
    let a = allocator.next_id();
    let b = allocator.next_id();
    let c = allocator.next_id();
    assert!(a < b);
    assert!(b < c);
}

#[test]
fn ids_from_a_later_millisecond_sort_after_earlier_ones() {
    let clock = FakeClock::new();
    let allocator = SnowflakeAllocator::new(clock.clone(), 1);
    let a = allocator.next_id();
    clock.advance(std::time::Duration::from_millis(5));
    let b = allocator.next_id();
    assert!(a < b);
}

#[test]
fn distinct_shards_never_collide_within_the_same_millisecond() {
    let clock = FakeClock::new();
    let shard_a = SnowflakeAllocator::new(clock.clone(), 1);
    let shard_b = SnowflakeAllocator::new(clock, 2);
    let a = shard_a.next_id();
    let b = shard_b.next_id();
    assert_ne!(a, b);
}

#[test]
fn minting_up_to_the_sequence_limit_stays_within_one_millisecond() {
    let clock = FakeClock::new();
    let allocator = SnowflakeAllocator::new(clock, 0);
    let mut last = allocator.next_id();
    for _ in 0..MAX_SEQ {
        let next = allocator.next_id();
        assert!(next > last);
        last = next;
    }
}

#[test]
#[should_panic]
fn shard_id_beyond_the_bit_width_panics() {
    let clock = FakeClock::new();
    let _ = SnowflakeAllocator::new(clock, MAX_SHARD + 1);
}
