//! Call Table (§4.3): the fixed-capacity pool of bridged-call slots.
//!
//! Grounded on the design note in `spec.md` §9 ("Pointer-returning lookups"):
//! rather than handing back a live reference into the table (unsound once
//! another thread can `release` the same slot), `allocate`/`find_by_dialog_id`
//! return an opaque `CallHandle { index, generation }`. All reads and writes
//! go through `with_call`, which re-validates the generation under the same
//! lock used for allocation — there is no second per-call mutex (see
//! `DESIGN.md` for why this collapses the spec's "per-call guard" into the
//! table lock rather than layering a second lock that could be taken out of
//! order with it).

use crate::error::{SipError, SipResult};
use crate::types::{CallState, LegSide, MediaFlags};
use std::sync::Mutex;

pub const MAX_CALLS: usize = 32;

/// Cached header lines for one leg of a dialog, field name included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegHeaders {
    pub from: String,
    pub via: String,
    pub cseq: String,
    pub to: String,
}

/// One bridged call: two dialogs (A-leg, B-leg) under one state machine.
#[derive(Debug, Clone, Default)]
pub struct Call {
    pub index: u32,
    pub is_active: bool,
    pub state: CallState,

    pub a_leg_uuid: String,
    pub b_leg_uuid: String,

    pub a_leg_ip: String,
    pub b_leg_ip: String,
    pub a_leg_port: u16,
    pub b_leg_port: u16,

    pub a_leg_headers: LegHeaders,
    pub b_leg_headers: LegHeaders,

    pub a_leg_contact: String,
    pub b_leg_contact: String,

    pub a_leg_media: MediaFlags,
    pub b_leg_media: MediaFlags,

    pub caller: String,
    pub callee: String,
}

impl Call {
    fn reset(&mut self, index: u32) {
        *self = Call::default();
        self.index = index;
    }
}

/// Opaque reference to a table slot. The generation counter invalidates a
/// handle once its slot has been released and possibly reused, so a stale
/// handle from a finished call can never silently touch a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallHandle {
    index: usize,
    generation: u64,
}

struct Slot {
    call: Call,
    generation: u64,
}

struct Inner {
    slots: Vec<Slot>,
    size: usize,
}

/// Fixed-capacity pool of `MAX_CALLS` call slots.
pub struct CallTable {
    inner: Mutex<Inner>,
}

impl CallTable {
    pub fn new() -> Self {
        let slots = (0..MAX_CALLS)
            .map(|i| {
                let mut call = Call::default();
                call.index = i as u32;
                Slot { call, generation: 0 }
            })
            .collect();
        CallTable { inner: Mutex::new(Inner { slots, size: 0 }) }
    }

    /// Number of currently active calls.
    pub fn active_count(&self) -> usize {
        self.inner.lock().expect("call table poisoned").size
    }

    /// Find the first inactive slot, activate it, and hand back its handle.
    /// Returns `CapacityExhaustion` when all `MAX_CALLS` slots are active.
    pub fn allocate(&self) -> SipResult<CallHandle> {
        let mut inner = self.inner.lock().expect("call table poisoned");
        if inner.size >= MAX_CALLS {
            return Err(SipError::capacity_exhaustion(MAX_CALLS));
        }
        let index = inner
            .slots
            .iter()
            .position(|s| !s.call.is_active)
            .ok_or_else(|| SipError::capacity_exhaustion(MAX_CALLS))?;
        inner.slots[index].call.is_active = true;
        inner.slots[index].call.state = CallState::Idle;
        inner.size += 1;
        Ok(CallHandle { index, generation: inner.slots[index].generation })
    }

    /// Scan active slots for `dialog_id` against `a_leg_uuid` then
    /// `b_leg_uuid`; first hit wins.
    pub fn find_by_dialog_id(&self, dialog_id: &str) -> Option<(CallHandle, LegSide)> {
        let inner = self.inner.lock().expect("call table poisoned");
        for (index, slot) in inner.slots.iter().enumerate() {
            if !slot.call.is_active {
                continue;
            }
            if slot.call.a_leg_uuid == dialog_id {
                return Some((CallHandle { index, generation: slot.generation }, LegSide::ALeg));
            }
            if slot.call.b_leg_uuid == dialog_id {
                return Some((CallHandle { index, generation: slot.generation }, LegSide::BLeg));
            }
        }
        None
    }

    /// Run `f` against the call behind `handle` under the table lock.
    /// Returns `None` if the handle's generation is stale (slot released
    /// and possibly reallocated since the handle was issued).
    pub fn with_call<R>(&self, handle: CallHandle, f: impl FnOnce(&mut Call) -> R) -> Option<R> {
        let mut inner = self.inner.lock().expect("call table poisoned");
        let slot = &mut inner.slots[handle.index];
        if slot.generation != handle.generation || !slot.call.is_active {
            return None;
        }
        Some(f(&mut slot.call))
    }

    /// Reset the slot behind `handle` to its default state and bump its
    /// generation, invalidating every handle issued for this incarnation.
    pub fn release(&self, handle: CallHandle) {
        let mut inner = self.inner.lock().expect("call table poisoned");
        let slot = &mut inner.slots[handle.index];
        if slot.generation != handle.generation || !slot.call.is_active {
            return;
        }
        let index = slot.call.index;
        slot.call.reset(index);
        slot.generation = slot.generation.wrapping_add(1);
        inner.size -= 1;
    }
}

impl Default for CallTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive the B-leg's dialog identifier by overwriting the first five bytes
/// of the A-leg's Call-ID with the literal `b-leg`, per `spec.md` §3.
pub fn derive_b_leg_uuid(a_leg_uuid: &str) -> String {
    if a_leg_uuid.len() < 5 {
        return format!("b-leg{}", a_leg_uuid);
    }
    format!("b-leg{}", &a_leg_uuid[5..])
}
