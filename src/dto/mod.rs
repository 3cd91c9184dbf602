//! Wire-level payloads: inbound command bodies, outbound responses, and the
//! event payloads fanned out to session subscribers.

pub mod events;
pub mod health;
pub mod quiz;
pub mod session;
pub mod validation;
pub mod ws;
