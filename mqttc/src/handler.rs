//! Application callbacks.

use crate::protocol::{ConnAck, PubAck, PubComp, PubRec, PubRel, Publish, SubAck, UnsubAck};
use crate::session::Session;

/// Callbacks invoked by the client after it has done its own bookkeeping
/// for an inbound packet. Every method defaults to a no-op.
#[allow(unused_variables)]
pub trait Handler: Send {
    /// Connection accepted.
    fn connack(&mut self, session: &Session, packet: &ConnAck) {}

    /// Connection closed by [`Client::disconnect`](crate::Client::disconnect) or a reconnect.
    fn disconnect(&mut self, session: &Session) {}

    fn suback(&mut self, session: &Session, packet: &SubAck) {}

    fn unsuback(&mut self, session: &Session, packet: &UnsubAck) {}

    /// Application message from the broker. QoS 2 duplicates are filtered out.
    fn publish(&mut self, session: &Session, packet: &Publish) {}

    fn puback(&mut self, session: &Session, packet: &PubAck) {}

    fn pubrec(&mut self, session: &Session, packet: &PubRec) {}

    fn pubrel(&mut self, session: &Session, packet: &PubRel) {}

    fn pubcomp(&mut self, session: &Session, packet: &PubComp) {}

    fn pingresp(&mut self, session: &Session) {}
}

/// Handler that only cares about inbound messages.
pub struct PublishFn<F>(F);

impl<F> Handler for PublishFn<F>
where
    F: FnMut(&Session, &Publish) + Send,
{
    fn publish(&mut self, session: &Session, packet: &Publish) {
        (self.0)(session, packet)
    }
}

/// Build a [`Handler`] from a message closure.
pub fn on_publish<F>(f: F) -> PublishFn<F>
where
    F: FnMut(&Session, &Publish) + Send,
{
    PublishFn(f)
}
