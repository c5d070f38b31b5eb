//! Listener callbacks and the three dispatch tables.
//!
//! Frames are routed to listeners in a fixed precedence: id listeners
//! (response waiters) first, then type listeners (request handlers),
//! then generic listeners (fallbacks). Each table is a flat slot array
//! sized at engine construction; a `None` slot is free. A high-water
//! mark per table bounds the scan to the highest slot ever in use.

use crate::frame::Message;
use crate::transmit::Transmitter;
use framelink_core::Error;
use tracing::debug;

/// Verdict a listener callback returns to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerResult {
    /// Not handled; keep dispatching as if this listener never matched.
    Next,
    /// Handled; keep the listener as it is.
    Stay,
    /// Handled; keep the listener and reload its timeout.
    ///
    /// Only meaningful for id listeners registered with a timeout.
    Renew,
    /// Handled; remove the listener.
    Close,
}

/// Callback invoked with a dispatched message.
///
/// The first argument is the transmit half of the engine, so the
/// callback can respond from inside dispatch.
pub type FrameCallback<W, L> =
    Box<dyn FnMut(&mut Transmitter<W, L>, &Message) -> ListenerResult>;

/// Callback invoked when an id listener expires without a reply.
pub type TimeoutCallback<W, L> = Box<dyn FnMut(&mut Transmitter<W, L>)>;

/// Slot waiting for a reply to a specific frame id.
pub(crate) struct IdListener<W, L> {
    pub(crate) id: u32,
    pub(crate) on_frame: FrameCallback<W, L>,
    pub(crate) on_timeout: Option<TimeoutCallback<W, L>>,
    /// Ticks left until expiry; meaningless when `initial_ticks` is 0.
    pub(crate) remaining_ticks: u32,
    /// Timeout reloaded by `Renew`; 0 means the listener never expires.
    pub(crate) initial_ticks: u32,
}

/// Slot handling every frame of one type.
pub(crate) struct TypeListener<W, L> {
    pub(crate) frame_type: u32,
    pub(crate) on_frame: FrameCallback<W, L>,
}

/// Fallback slot invoked when nothing more specific handled the frame.
pub(crate) struct GenericListener<W, L> {
    pub(crate) on_frame: FrameCallback<W, L>,
}

pub(crate) struct ListenerTables<W, L> {
    pub(crate) id_slots: Vec<Option<IdListener<W, L>>>,
    pub(crate) type_slots: Vec<Option<TypeListener<W, L>>>,
    pub(crate) generic_slots: Vec<Option<GenericListener<W, L>>>,

    /// Highest id slot in use plus one; shortens table scans.
    pub(crate) id_high_water: usize,
    pub(crate) type_high_water: usize,
    pub(crate) generic_high_water: usize,
}

impl<W, L> ListenerTables<W, L> {
    pub(crate) fn new(id_slots: usize, type_slots: usize, generic_slots: usize) -> Self {
        ListenerTables {
            id_slots: (0..id_slots).map(|_| None).collect(),
            type_slots: (0..type_slots).map(|_| None).collect(),
            generic_slots: (0..generic_slots).map(|_| None).collect(),
            id_high_water: 0,
            type_high_water: 0,
            generic_high_water: 0,
        }
    }

    pub(crate) fn has_free_id_slot(&self) -> bool {
        self.id_slots.iter().any(Option::is_none)
    }

    /// Register an id listener. Fails on a full table or a duplicate id.
    pub(crate) fn add_id(&mut self, entry: IdListener<W, L>) -> bool {
        if self.find_id(entry.id).is_some() {
            let error = Error::DuplicateIdListener { id: entry.id };
            debug!(%error, "registration rejected");
            return false;
        }
        match first_free(&self.id_slots) {
            Some(slot) => {
                self.id_slots[slot] = Some(entry);
                self.id_high_water = self.id_high_water.max(slot + 1);
                true
            }
            None => {
                debug!(error = %Error::ListenerTableFull, "id listener registration rejected");
                false
            }
        }
    }

    pub(crate) fn find_id(&self, id: u32) -> Option<usize> {
        (0..self.id_high_water)
            .find(|&i| matches!(&self.id_slots[i], Some(entry) if entry.id == id))
    }

    /// Remove an id listener without firing its timeout callback.
    pub(crate) fn remove_id(&mut self, id: u32) -> bool {
        match self.find_id(id) {
            Some(slot) => {
                self.id_slots[slot] = None;
                self.recount_id();
                true
            }
            None => false,
        }
    }

    /// Reload the timeout of a registered id listener.
    pub(crate) fn renew_id(&mut self, id: u32) -> bool {
        match self.find_id(id) {
            Some(slot) => {
                if let Some(entry) = self.id_slots[slot].as_mut() {
                    entry.remaining_ticks = entry.initial_ticks;
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn add_type(&mut self, entry: TypeListener<W, L>) -> bool {
        match first_free(&self.type_slots) {
            Some(slot) => {
                self.type_slots[slot] = Some(entry);
                self.type_high_water = self.type_high_water.max(slot + 1);
                true
            }
            None => {
                debug!(error = %Error::ListenerTableFull, "type listener registration rejected");
                false
            }
        }
    }

    /// First active slot registered for `frame_type`, in insertion order.
    pub(crate) fn find_type(&self, frame_type: u32) -> Option<usize> {
        (0..self.type_high_water).find(
            |&i| matches!(&self.type_slots[i], Some(entry) if entry.frame_type == frame_type),
        )
    }

    /// Remove the first listener registered for `frame_type`.
    pub(crate) fn remove_type(&mut self, frame_type: u32) -> bool {
        match self.find_type(frame_type) {
            Some(slot) => {
                self.type_slots[slot] = None;
                self.recount_type();
                true
            }
            None => false,
        }
    }

    /// Register a generic listener, returning its slot for later removal.
    pub(crate) fn add_generic(&mut self, entry: GenericListener<W, L>) -> Option<usize> {
        match first_free(&self.generic_slots) {
            Some(slot) => {
                self.generic_slots[slot] = Some(entry);
                self.generic_high_water = self.generic_high_water.max(slot + 1);
                Some(slot)
            }
            None => {
                debug!(error = %Error::ListenerTableFull, "generic listener registration rejected");
                None
            }
        }
    }

    pub(crate) fn remove_generic(&mut self, slot: usize) -> bool {
        match self.generic_slots.get_mut(slot) {
            Some(entry) if entry.is_some() => {
                *entry = None;
                self.recount_generic();
                true
            }
            _ => false,
        }
    }

    pub(crate) fn recount_id(&mut self) {
        self.id_high_water = high_water(&self.id_slots);
    }

    pub(crate) fn recount_type(&mut self) {
        self.type_high_water = high_water(&self.type_slots);
    }

    pub(crate) fn recount_generic(&mut self) {
        self.generic_high_water = high_water(&self.generic_slots);
    }

    pub(crate) fn active_id(&self) -> usize {
        self.id_slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub(crate) fn active_type(&self) -> usize {
        self.type_slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub(crate) fn active_generic(&self) -> usize {
        self.generic_slots
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }
}

fn first_free<T>(slots: &[Option<T>]) -> Option<usize> {
    slots.iter().position(Option::is_none)
}

fn high_water<T>(slots: &[Option<T>]) -> usize {
    slots.iter().rposition(Option::is_some).map_or(0, |i| i + 1)
}
