use molbus_protocol::Schema;

const NAME_OFFSET: usize = 14;
const NAME_LEN: usize = 8;
const APPLICANT_OFFSET: usize = NAME_OFFSET + NAME_LEN;

/// Fixed-offset [`Schema`] shared by demo binaries and integration tests:
/// `applicationId`@0 (u16), `applicationSequenceNumber`@2 (u32),
/// `timestamp`@6 (u64), an 8-byte message name@14, and (for
/// application-definition messages only) the applicant's name in the
/// remaining bytes.
pub struct DemoSchema;

impl Schema for DemoSchema {
    fn application_id_offset(&self) -> usize {
        0
    }

    fn application_seq_num_offset(&self) -> usize {
        2
    }

    fn timestamp_offset(&self) -> usize {
        6
    }

    fn application_definition_name(&self) -> &[u8] {
        b"APPDEF\0\0"
    }

    fn application_discovery_name(&self) -> &[u8] {
        b"APPDISC\0"
    }

    fn message_name<'a>(&self, body: &'a [u8]) -> &'a [u8] {
        &body[NAME_OFFSET..NAME_OFFSET + NAME_LEN]
    }

    fn application_definition_applicant_name<'a>(&self, body: &'a [u8]) -> &'a [u8] {
        &body[APPLICANT_OFFSET..]
    }
}

/// Builds a message body with `name` written at the schema's message-name
/// offset and `payload` following it.
pub fn build_message(name: &[u8; 8], payload: &[u8]) -> Vec<u8> {
    let mut body = vec![0u8; APPLICANT_OFFSET + payload.len()];
    body[NAME_OFFSET..APPLICANT_OFFSET].copy_from_slice(name);
    body[APPLICANT_OFFSET..].copy_from_slice(payload);
    body
}

/// Builds an application-definition message declaring `applicant` as the
/// applicant name.
pub fn build_application_definition(applicant: &[u8]) -> Vec<u8> {
    build_message(b"APPDEF\0\0", applicant)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_name_and_applicant_round_trip() {
        let schema = DemoSchema;
        let body = build_application_definition(b"app");
        assert_eq!(schema.message_name(&body), schema.application_definition_name());
        assert_eq!(schema.application_definition_applicant_name(&body), b"app");
    }
}
