use proptest::prelude::*;

use crate::{ApplicationType, Header, Message, Payload};

fn arb_header() -> impl Strategy<Value = Header> {
    (
        any::<u64>(),
        any::<u64>(),
        any::<u16>(),
        prop_oneof![Just(ApplicationType::DotBot), Just(ApplicationType::SailBot)],
        any::<u8>(),
    )
        .prop_map(|(destination, source, swarm_id, application, version)| Header {
            destination,
            source,
            swarm_id,
            application,
            version,
        })
}

fn arb_payload() -> impl Strategy<Value = Payload> {
    prop_oneof![
        Just(Payload::Advertisement),
        prop::collection::vec(any::<u8>(), 0..512).prop_map(|b| Payload::EdhocMessage(b.into())),
    ]
}

proptest! {
    #[test]
    fn prop_message_round_trip(header in arb_header(), payload in arb_payload()) {
        let msg = Message::new(header, payload);
        let decoded = Message::from_bytes(&msg.to_bytes())?;
        prop_assert_eq!(decoded.payload_type(), msg.payload_type());
        prop_assert_eq!(decoded, msg);
    }

    #[test]
    fn prop_short_input_never_decodes(
        bytes in prop::collection::vec(any::<u8>(), 0..crate::HEADER_LEN + 1),
    ) {
        prop_assert!(Message::from_bytes(&bytes).is_err());
    }
}
