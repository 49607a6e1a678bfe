//! Software bus seam
//!
//! The controller asks the bus for messages of one id while logging and
//! publishes playback packets through it. Inbound delivery goes the other way,
//! through [`MsgLog::on_message`](crate::MsgLog::on_message).

use crate::{MsgId, PlaybkPkt, Result};
use std::collections::BTreeSet;

pub trait Transport {
    fn subscribe(&mut self, msg_id: MsgId) -> Result<()>;
    fn unsubscribe(&mut self, msg_id: MsgId) -> Result<()>;
    fn publish(&mut self, pkt: PlaybkPkt) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn subscribe(&mut self, msg_id: MsgId) -> Result<()> {
        (**self).subscribe(msg_id)
    }

    fn unsubscribe(&mut self, msg_id: MsgId) -> Result<()> {
        (**self).unsubscribe(msg_id)
    }

    fn publish(&mut self, pkt: PlaybkPkt) -> Result<()> {
        (**self).publish(pkt)
    }
}

/// In-process bus that records subscriptions and published packets
#[derive(Debug, Default)]
pub struct MemoryTransport {
    subscriptions: BTreeSet<MsgId>,
    published: Vec<PlaybkPkt>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_subscribed(&self, msg_id: MsgId) -> bool {
        self.subscriptions.contains(&msg_id)
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = MsgId> + '_ {
        self.subscriptions.iter().copied()
    }

    pub fn published(&self) -> &[PlaybkPkt] {
        &self.published
    }

    /// Take every packet published so far
    pub fn drain(&mut self) -> Vec<PlaybkPkt> {
        std::mem::take(&mut self.published)
    }
}

impl Transport for MemoryTransport {
    fn subscribe(&mut self, msg_id: MsgId) -> Result<()> {
        self.subscriptions.insert(msg_id);
        Ok(())
    }

    fn unsubscribe(&mut self, msg_id: MsgId) -> Result<()> {
        self.subscriptions.remove(&msg_id);
        Ok(())
    }

    fn publish(&mut self, pkt: PlaybkPkt) -> Result<()> {
        self.published.push(pkt);
        Ok(())
    }
}
