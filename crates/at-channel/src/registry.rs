//! Channel registry
//!
//! Fixed-capacity table of the channels open on one modem instance, indexed
//! by channel id.

use std::sync::Arc;

use crate::channel::{Channel, ChannelId};
use crate::error::AtError;

pub(crate) struct ChannelRegistry {
    slots: Vec<Option<Arc<Channel>>>,
}

impl ChannelRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Occupy the channel's slot
    pub fn insert(&mut self, channel: Arc<Channel>) -> Result<(), AtError> {
        let id = channel.id;
        let capacity = self.capacity();
        let slot = self
            .slots
            .get_mut(id.index())
            .ok_or(AtError::InvalidChannel { id, capacity })?;

        if slot.is_some() {
            return Err(AtError::ChannelInUse(id));
        }
        *slot = Some(channel);
        Ok(())
    }

    pub fn get(&self, id: ChannelId) -> Option<Arc<Channel>> {
        self.slots.get(id.index()).and_then(Clone::clone)
    }

    pub fn remove(&mut self, id: ChannelId) -> Option<Arc<Channel>> {
        self.slots.get_mut(id.index()).and_then(Option::take)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Channel>> {
        self.slots.iter().flatten()
    }
}
