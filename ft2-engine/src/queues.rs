//! The two SPSC rings the audio thread publishes through (§5). Both sides
//! live in [`Engine`](crate::Engine) here rather than being handed to a
//! second real thread — a host embedding this façade is expected to give
//! the consumer half to its own scope/MIDI-out thread, but nothing in this
//! crate spawns one.
//!
//! A non-owning [`ft2_song::channel::SampleId`] + generation stands in for
//! the source's `sample_base_ptr`: this codebase already uses that pattern
//! for every other non-owning voice reference (see
//! `ft2_mixer::voice::Voice`), and a raw pointer into sample PCM would be
//! both unsound to hand across the ring and meaningless once the owning
//! instrument edits or frees the sample.

use ft2_song::channel::SampleId;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

pub const SCOPE_QUEUE_CAPACITY: usize = 256;
pub const MIDI_QUEUE_CAPACITY: usize = 256;

/// One voice-update snapshot for a scope renderer (§5 `scope_sync_queue`).
#[derive(Debug, Clone, Copy)]
pub struct ScopeSyncEntry {
    pub channel: usize,
    pub triggered: bool,
    pub volume: f32,
    pub period: i32,
    pub sample_id: Option<SampleId>,
    pub sample_generation: u32,
    pub length: u32,
    pub loop_start: u32,
    pub loop_length: u32,
    pub loop_kind: ft2_sample::LoopKind,
    pub is_16bit: bool,
    pub start_pos: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiOutKind {
    NoteOn,
    NoteOff,
    ProgramChange,
}

/// One outbound MIDI event, tagged with the sample offset inside the
/// current render block it fired at (§5 `midi_out_queue`).
#[derive(Debug, Clone, Copy)]
pub struct MidiOutEvent {
    pub channel: usize,
    pub kind: MidiOutKind,
    pub note: u8,
    pub velocity: u8,
    pub sample_pos_in_buffer: u32,
}

/// Owns both ends of a fixed-capacity SPSC ring. Pushing past capacity
/// drops the newest entry silently (§7 `QueueFull`) rather than blocking or
/// erroring — the audio thread must never stall on a slow consumer.
pub struct Queue<T> {
    producer: HeapProd<T>,
    consumer: HeapCons<T>,
}

impl<T> Queue<T> {
    pub fn new(capacity: usize) -> Self {
        let (producer, consumer) = HeapRb::<T>::new(capacity).split();
        Self { producer, consumer }
    }

    pub fn push(&mut self, item: T) {
        let _ = self.producer.try_push(item);
    }

    /// Drains everything currently queued; the consumer side of the ring
    /// never blocks waiting for more.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(item) = self.consumer.try_pop() {
            out.push(item);
        }
        out
    }
}

pub struct EngineQueues {
    pub scope: Queue<ScopeSyncEntry>,
    pub midi_out: Queue<MidiOutEvent>,
}

impl EngineQueues {
    pub fn new() -> Self {
        Self {
            scope: Queue::new(SCOPE_QUEUE_CAPACITY),
            midi_out: Queue::new(MIDI_QUEUE_CAPACITY),
        }
    }
}

impl Default for EngineQueues {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_drops_newest_entry() {
        let mut q: Queue<u32> = Queue::new(2);
        q.push(1);
        q.push(2);
        q.push(3); // dropped: queue already holds 2 entries
        assert_eq!(q.drain(), vec![1, 2]);
    }

    #[test]
    fn drain_empties_the_queue() {
        let mut q: Queue<u32> = Queue::new(4);
        q.push(7);
        assert_eq!(q.drain(), vec![7]);
        assert!(q.drain().is_empty());
    }
}
