// core/src/cache.rs

//! Content-addressed memo cache with per-entry TTL and LRU eviction.
//!
//! Keys are SHA-256 digests of a normalized projection of the input, so two
//! requests that differ only in case or whitespace share an entry.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// Field separator for multi-part keys; cannot appear after normalization.
const PART_SEPARATOR: char = '\u{1f}';

/// Lower-cases and collapses every whitespace run to one space.
pub fn normalize(input: &str) -> String {
  input.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub fn key_for(input: &str) -> String {
  hex::encode(Sha256::digest(normalize(input).as_bytes()))
}

pub fn key_for_parts(parts: &[&str]) -> String {
  let joined = parts.iter().map(|p| normalize(p)).collect::<Vec<_>>().join(&PART_SEPARATOR.to_string());
  hex::encode(Sha256::digest(joined.as_bytes()))
}

#[derive(Debug)]
struct Slot<V> {
  value: V,
  expires_at: Instant,
  tick: u64,
}

#[derive(Debug)]
struct State<V> {
  slots: HashMap<String, Slot<V>>,
  /// recency tick -> key; the smallest tick is the least recently used.
  recency: BTreeMap<u64, String>,
  next_tick: u64,
}

impl<V> State<V> {
  fn touch(&mut self, key: &str) {
    let tick = self.next_tick;
    self.next_tick += 1;
    if let Some(slot) = self.slots.get_mut(key) {
      self.recency.remove(&slot.tick);
      slot.tick = tick;
      self.recency.insert(tick, key.to_string());
    }
  }

  fn remove(&mut self, key: &str) {
    if let Some(slot) = self.slots.remove(key) {
      self.recency.remove(&slot.tick);
    }
  }
}

#[derive(Debug)]
pub struct ContentCache<V> {
  state: Mutex<State<V>>,
  max_entries: usize,
}

impl<V: Clone> ContentCache<V> {
  pub fn new(max_entries: usize) -> Self {
    ContentCache {
      state: Mutex::new(State {
        slots: HashMap::new(),
        recency: BTreeMap::new(),
        next_tick: 0,
      }),
      max_entries: max_entries.max(1),
    }
  }

  pub fn get(&self, key: &str) -> Option<V> {
    let mut state = self.state.lock();
    let expired = match state.slots.get(key) {
      None => return None,
      Some(slot) => slot.expires_at <= Instant::now(),
    };
    if expired {
      state.remove(key);
      return None;
    }
    state.touch(key);
    state.slots.get(key).map(|slot| slot.value.clone())
  }

  pub fn put(&self, key: impl Into<String>, value: V, ttl: Duration) {
    let key = key.into();
    let mut state = self.state.lock();
    state.remove(&key);
    while state.slots.len() >= self.max_entries {
      let Some((_, oldest)) = state.recency.pop_first() else { break };
      state.slots.remove(&oldest);
    }
    let tick = state.next_tick;
    state.next_tick += 1;
    state.recency.insert(tick, key.clone());
    state.slots.insert(
      key,
      Slot {
        value,
        expires_at: Instant::now() + ttl,
        tick,
      },
    );
  }

  pub fn invalidate(&self, key: &str) {
    self.state.lock().remove(key);
  }

  pub fn len(&self) -> usize {
    self.state.lock().slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
