//! Call-setup relay between exactly two parties.
//!
//! The router forwards offer/answer/candidate/hangup to whatever connection
//! the presence registry holds for the target at that instant. It keeps no
//! call state, never inspects SDP or candidate payloads, and drops messages
//! for offline targets without telling the sender — an offer to an offline
//! user simply never rings. Overlapping calls are arbitrated by the clients,
//! not here.

use crate::ws::events::{ClientEvent, ServerEvent};
use crate::ws::registry::PresenceRegistry;
use crate::ws::relay;

/// Relay one client event, stamping it with the sender's identity.
pub fn handle_client_event(registry: &PresenceRegistry, sender_id: &str, event: ClientEvent) {
    match event {
        ClientEvent::CallOffer { to, sdp, from_user } => {
            relay::deliver_to(
                registry,
                &to,
                &ServerEvent::CallIncoming {
                    from: sender_id.to_string(),
                    from_user,
                    sdp,
                },
            );
        }
        ClientEvent::CallAnswer { to, sdp } => {
            relay::deliver_to(
                registry,
                &to,
                &ServerEvent::CallAnswered {
                    from: sender_id.to_string(),
                    sdp,
                },
            );
        }
        ClientEvent::CallCandidate { to, candidate } => {
            relay::deliver_to(
                registry,
                &to,
                &ServerEvent::CallCandidate {
                    from: sender_id.to_string(),
                    candidate,
                },
            );
        }
        ClientEvent::CallHangup { to } => {
            relay::deliver_to(
                registry,
                &to,
                &ServerEvent::CallHangup {
                    from: sender_id.to_string(),
                },
            );
        }
    }
}
