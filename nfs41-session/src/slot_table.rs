//! Session slot table
//!
//! A fixed-capacity pool of slot ids, each carrying its own sequence
//! counter. Acquirers suspend while every active slot is in use and are
//! all woken whenever a slot is released or the table is reset.
//!
//! Free ids are handed out first-fit in ascending order so the highest
//! slot id in use stays as low as possible; the server sizes its reply
//! cache from that value.

use tokio::sync::futures::Notified;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, trace};

/// First sequence number of every slot after (re)initialization
pub const INITIAL_SEQUENCE_ID: u32 = 1;

/// A slot handed to a request issuer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotGrant {
    /// Slot id, always below the table's active limit
    pub slot_id: u32,
    /// Current sequence number of the slot
    pub sequence_id: u32,
    /// Highest slot id in use after this grant
    pub highest_used: u32,
}

/// Point-in-time copy of the table contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTableSnapshot {
    pub max_slots: u32,
    pub num_used: u32,
    pub highest_used: u32,
    pub seq_nums: Vec<u32>,
    pub used: Vec<bool>,
}

/// Table contents, only touched under the table mutex
#[derive(Debug)]
struct SlotState {
    max_slots: u32,
    num_used: u32,
    highest_used: u32,
    seq_nums: Vec<u32>,
    used: Vec<bool>,
}

impl SlotState {
    fn new(capacity: u32) -> Self {
        let mut state = Self {
            max_slots: capacity,
            num_used: 0,
            highest_used: 0,
            seq_nums: vec![INITIAL_SEQUENCE_ID; capacity as usize],
            used: vec![false; capacity as usize],
        };
        state.reset();
        state
    }

    fn capacity(&self) -> u32 {
        self.used.len() as u32
    }

    fn available(&self) -> bool {
        self.num_used < self.max_slots
    }

    fn reset(&mut self) {
        self.max_slots = self.capacity();
        self.seq_nums.fill(INITIAL_SEQUENCE_ID);
        self.used.fill(false);
        self.num_used = 0;
        self.highest_used = 0;
    }

    fn claim(&mut self) -> Option<SlotGrant> {
        if !self.available() {
            return None;
        }

        let index = self.used[..self.max_slots as usize]
            .iter()
            .position(|used| !used)?;
        self.used[index] = true;
        self.num_used += 1;

        let slot_id = index as u32;
        if slot_id > self.highest_used {
            self.highest_used = slot_id;
        }

        Some(SlotGrant {
            slot_id,
            sequence_id: self.seq_nums[index],
            highest_used: self.highest_used,
        })
    }

    /// Returns false when the id was out of range or already free.
    fn release(&mut self, slot_id: u32) -> bool {
        let index = slot_id as usize;
        if !self.used.get(index).copied().unwrap_or(false) {
            return false;
        }

        self.used[index] = false;
        self.num_used -= 1;

        if slot_id == self.highest_used {
            while self.highest_used > 0 && !self.used[self.highest_used as usize] {
                self.highest_used -= 1;
            }
        }
        true
    }

    fn bump(&mut self, slot_id: u32) -> Option<u32> {
        let seq = self.seq_nums.get_mut(slot_id as usize)?;
        *seq = seq.wrapping_add(1);
        Some(*seq)
    }

    /// Returns true if the active limit grew.
    fn set_max_slots(&mut self, max_slots: u32) -> bool {
        let clamped = max_slots.clamp(1, self.capacity());
        let grew = clamped > self.max_slots;
        self.max_slots = clamped;
        grew
    }

    fn snapshot(&self) -> SlotTableSnapshot {
        SlotTableSnapshot {
            max_slots: self.max_slots,
            num_used: self.num_used,
            highest_used: self.highest_used,
            seq_nums: self.seq_nums.clone(),
            used: self.used.clone(),
        }
    }
}

/// Bounded pool of request slots with per-slot sequence numbers
#[derive(Debug)]
pub struct SlotTable {
    capacity: u32,
    state: Mutex<SlotState>,
    available: Notify,
}

impl SlotTable {
    /// Create a table with `capacity` slots (at least one), all free
    pub fn new(capacity: u32) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(SlotState::new(capacity)),
            available: Notify::new(),
        }
    }

    /// Number of slots the table was built with
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Current active limit on concurrently used slots
    pub async fn max_slots(&self) -> u32 {
        self.state.lock().await.max_slots
    }

    /// Reset every sequence number to 1 and mark every slot free
    pub async fn initialize(&self) {
        let mut state = self.state.lock().await;
        state.reset();
        debug!(max_slots = state.max_slots, "Slot table initialized");

        if state.available() {
            self.available.notify_waiters();
        }
    }

    /// Apply the slot count granted by the server, clamped to the capacity
    pub async fn set_max_slots(&self, max_slots: u32) {
        let mut state = self.state.lock().await;
        if state.set_max_slots(max_slots) {
            self.available.notify_waiters();
        }
        debug!(requested = max_slots, max_slots = state.max_slots, "Slot limit updated");
    }

    /// Claim the lowest free slot without waiting
    pub async fn try_acquire(&self) -> Option<SlotGrant> {
        self.state.lock().await.claim()
    }

    /// Claim the lowest free slot, waiting as long as the table is full
    pub async fn acquire(&self) -> SlotGrant {
        loop {
            let notified = self.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(grant) = self.try_acquire().await {
                return grant;
            }

            trace!("Slot table full, waiting for a release");
            notified.await;
        }
    }

    /// Mark a slot free and wake every waiting acquirer.
    ///
    /// Out-of-range and already-free ids are ignored.
    pub async fn release(&self, slot_id: u32) {
        let mut state = self.state.lock().await;
        if !state.release(slot_id) {
            trace!(slot_id, "Ignoring release of unused slot");
            return;
        }

        debug!(
            slot_id,
            used = state.num_used,
            highest = state.highest_used,
            "Freed slot"
        );

        if state.available() {
            self.available.notify_waiters();
        }
    }

    /// Advance a slot's sequence number ahead of a retry on that slot.
    ///
    /// Out-of-range ids are ignored.
    pub async fn bump_sequence(&self, slot_id: u32) {
        if let Some(seq) = self.state.lock().await.bump(slot_id) {
            trace!(slot_id, sequence_id = seq, "Bumped slot sequence");
        }
    }

    /// Copy out the table contents
    pub async fn snapshot(&self) -> SlotTableSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Wakeup future for callers that gate each claim attempt themselves.
    ///
    /// Must be enabled before the claim attempt it guards.
    pub(crate) fn notified(&self) -> Notified<'_> {
        self.available.notified()
    }
}
