//! Pure routing of rumqttc events
//!
//! The driver task polls the event loop and hands each event here to decide
//! what it means for the session. No I/O happens in this module.

use crate::transport::ConnectResult;
use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet};
use rumqttc::v5::Event;

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => {
                    EventRoute::ConnectionAcknowledged(Self::connect_result(&connack.code))
                }
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.clone(),
                },
                Packet::Disconnect(disconnect) => EventRoute::Disconnected(format!(
                    "broker sent disconnect: {:?}",
                    disconnect.reason_code
                )),
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                    reason_codes: suback
                        .return_codes
                        .iter()
                        .map(|code| format!("{code:?}"))
                        .collect(),
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Map a CONNACK reason code to the handshake result
    pub fn connect_result(code: &ConnectReturnCode) -> ConnectResult {
        if *code == ConnectReturnCode::Success {
            ConnectResult::Accepted
        } else {
            ConnectResult::Refused(format!("{code:?}"))
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// Handshake answered by the broker
    ConnectionAcknowledged(ConnectResult),
    /// Message received on subscribed topic
    MessageReceived { topic: String, payload: Bytes },
    /// Broker closed the session
    Disconnected(String),
    /// Subscription confirmed with per-filter reason codes
    SubscriptionConfirmed {
        packet_id: u16,
        reason_codes: Vec<String>,
    },
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}
