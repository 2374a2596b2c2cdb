//! Templates for the records the stack emits.

use crate::template::EventTemplate;

/// BNEP notifications delivered to application handlers.
pub mod bnep {
    use super::EventTemplate;

    pub const EVENT_CHANNEL_OPENED: u8 = 0xC1;
    pub const EVENT_CHANNEL_CLOSED: u8 = 0xC2;
    pub const EVENT_CHANNEL_TIMEOUT: u8 = 0xC3;
    pub const EVENT_CAN_SEND_NOW: u8 = 0xC4;

    /// status, cid, source uuid, destination uuid, max frame size, remote address, handle
    pub const CHANNEL_OPENED: EventTemplate<'static> =
        EventTemplate::new(EVENT_CHANNEL_OPENED, 0, "12222BH");

    /// cid, source uuid, destination uuid, remote address
    pub const CHANNEL_CLOSED: EventTemplate<'static> =
        EventTemplate::new(EVENT_CHANNEL_CLOSED, 0, "222B");

    /// cid, source uuid, destination uuid, remote address, channel state
    pub const CHANNEL_TIMEOUT: EventTemplate<'static> =
        EventTemplate::new(EVENT_CHANNEL_TIMEOUT, 0, "222B1");

    /// cid
    pub const CAN_SEND_NOW: EventTemplate<'static> = EventTemplate::new(EVENT_CAN_SEND_NOW, 0, "2");
}

/// HCI events synthesized by the host stack.
pub mod hci {
    use super::EventTemplate;

    pub const EVENT_DISCONNECTION_COMPLETE: u8 = 0x05;
    pub const EVENT_COMMAND_COMPLETE: u8 = 0x0E;
    pub const EVENT_HARDWARE_ERROR: u8 = 0x10;
    pub const EVENT_NUMBER_OF_COMPLETED_PACKETS: u8 = 0x13;
    pub const EVENT_LE_META: u8 = 0x3E;
    pub const EVENT_TRANSPORT_PACKET_SENT: u8 = 0x6E;
    pub const SUBEVENT_LE_CONNECTION_COMPLETE: u8 = 0x01;

    /// hardware code
    pub const HARDWARE_ERROR: EventTemplate<'static> =
        EventTemplate::new(EVENT_HARDWARE_ERROR, 0, "1");

    pub const TRANSPORT_PACKET_SENT: EventTemplate<'static> =
        EventTemplate::new(EVENT_TRANSPORT_PACKET_SENT, 0, "");

    /// num packets, opcode, status, return-parameter length (hidden), return parameters
    pub const COMMAND_COMPLETE: EventTemplate<'static> =
        EventTemplate::new(EVENT_COMMAND_COMPLETE, 0, "121KV");

    /// status, handle, reason
    pub const DISCONNECTION_COMPLETE: EventTemplate<'static> =
        EventTemplate::new(EVENT_DISCONNECTION_COMPLETE, 0, "1H1");

    /// number of handles (always 1), handle, completed packets
    pub const NUMBER_OF_COMPLETED_PACKETS: EventTemplate<'static> =
        EventTemplate::new(EVENT_NUMBER_OF_COMPLETED_PACKETS, 0, "1H2");

    /// status, handle, role, peer address type, peer address, interval,
    /// latency, supervision timeout, clock accuracy
    pub const LE_CONNECTION_COMPLETE: EventTemplate<'static> =
        EventTemplate::new(EVENT_LE_META, SUBEVENT_LE_CONNECTION_COMPLETE, "1H11B2221");
}

/// Every catalog template, keyed by a kebab-case name.
pub const ALL: &[(&str, EventTemplate<'static>)] = &[
    ("bnep-channel-opened", bnep::CHANNEL_OPENED),
    ("bnep-channel-closed", bnep::CHANNEL_CLOSED),
    ("bnep-channel-timeout", bnep::CHANNEL_TIMEOUT),
    ("bnep-can-send-now", bnep::CAN_SEND_NOW),
    ("hci-hardware-error", hci::HARDWARE_ERROR),
    ("hci-transport-packet-sent", hci::TRANSPORT_PACKET_SENT),
    ("hci-command-complete", hci::COMMAND_COMPLETE),
    ("hci-disconnection-complete", hci::DISCONNECTION_COMPLETE),
    ("hci-number-of-completed-packets", hci::NUMBER_OF_COMPLETED_PACKETS),
    ("hci-le-connection-complete", hci::LE_CONNECTION_COMPLETE),
];

/// Look up a catalog template by name.
pub fn lookup(name: &str) -> Option<EventTemplate<'static>> {
    ALL.iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, template)| *template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Arg;
    use bnepkit_transport::BdAddr;

    #[test]
    fn command_complete_hides_parameter_length() {
        let params = [0x00, 0x01, 0x02];
        let record = hci::COMMAND_COMPLETE
            .render_to_vec(&[
                Arg::Int(1),
                Arg::Int(0x0C03),
                Arg::Int(0),
                Arg::Int(params.len() as u32),
                Arg::Bytes(&params),
            ])
            .unwrap();
        assert_eq!(&record[..6], &[0x0E, 7, 0x01, 0x03, 0x0C, 0x00]);
        assert_eq!(&record[6..], &params);
    }

    #[test]
    fn bnep_channel_opened_layout() {
        let addr = BdAddr::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        let record = bnep::CHANNEL_OPENED
            .render_to_vec(&[
                Arg::Int(0),
                Arg::Int(0x0041),
                Arg::Int(0x1115),
                Arg::Int(0x1116),
                Arg::Int(1676),
                Arg::Addr(addr),
                Arg::Int(0x000B),
            ])
            .unwrap();
        assert_eq!(record.len(), 2 + 1 + 2 * 4 + 6 + 2);
        assert_eq!(record[0], bnep::EVENT_CHANNEL_OPENED);
        assert_eq!(&record[5..7], &[0x15, 0x11]);
        assert_eq!(&record[11..17], &[0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn le_connection_complete_carries_subevent() {
        let template = lookup("hci-le-connection-complete").unwrap();
        assert_eq!(template.code(), hci::EVENT_LE_META);
        assert_eq!(template.subevent(), hci::SUBEVENT_LE_CONNECTION_COMPLETE);
        assert_eq!(template.arity(), 9);
    }

    #[test]
    fn names_are_unique() {
        for (i, (name, _)) in ALL.iter().enumerate() {
            let rest = &ALL[i + 1..];
            assert!(rest.iter().all(|(other, _)| other != name), "{name}");
        }
        assert!(lookup("no-such-event").is_none());
    }
}
