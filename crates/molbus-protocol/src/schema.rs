/// Opaque message-schema descriptor (§1: "the message schema ... is
/// consumed as an opaque descriptor supplied by the host").
///
/// Implementations tell `molbus-bus`/`molbus-commands` where to stamp and
/// read the `applicationId`, `applicationSequenceNumber` and `timestamp`
/// fields inside an event/command body, and how to recognize the
/// application-definition and application-discovery message kinds used for
/// application-id learning (§4.7) and activation announcements.
pub trait Schema: Send + Sync + 'static {
    /// Byte offset of the 2-byte big-endian `applicationId` field.
    fn application_id_offset(&self) -> usize;
    /// Byte offset of the 4-byte big-endian `applicationSequenceNumber` field.
    fn application_seq_num_offset(&self) -> usize;
    /// Byte offset of the 8-byte big-endian `timestamp` field (nanoseconds
    /// since epoch).
    fn timestamp_offset(&self) -> usize;

    /// The message-name bytes identifying an application-definition message.
    fn application_definition_name(&self) -> &[u8];
    /// The message-name bytes identifying an application-discovery message.
    fn application_discovery_name(&self) -> &[u8];

    /// Extracts the message-name bytes from a raw message body, used for
    /// data-driven dispatch (§9: "messages carry their schema-encoded
    /// identity").
    fn message_name<'a>(&self, body: &'a [u8]) -> &'a [u8];

    /// Extracts the applicant's ASCII name from an application-definition
    /// message body, used to recognize a publisher's own identity-bootstrap
    /// echo during `applicationId` learning (§4.7).
    fn application_definition_applicant_name<'a>(&self, body: &'a [u8]) -> &'a [u8];
}

/// Reads a big-endian `u16` at `offset` in `body`.
pub fn read_u16(body: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes(body[offset..offset + 2].try_into().expect("2 bytes"))
}

/// Reads a big-endian `u32` at `offset` in `body`.
pub fn read_u32(body: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes(body[offset..offset + 4].try_into().expect("4 bytes"))
}

/// Reads a big-endian `u64` at `offset` in `body`.
pub fn read_u64(body: &[u8], offset: usize) -> u64 {
    u64::from_be_bytes(body[offset..offset + 8].try_into().expect("8 bytes"))
}

/// Writes a big-endian `u16` at `offset` in `body`.
pub fn write_u16(body: &mut [u8], offset: usize, value: u16) {
    body[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

/// Writes a big-endian `u32` at `offset` in `body`.
pub fn write_u32(body: &mut [u8], offset: usize, value: u32) {
    body[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

/// Writes a big-endian `u64` at `offset` in `body`.
pub fn write_u64(body: &mut [u8], offset: usize, value: u64) {
    body[offset..offset + 8].copy_from_slice(&value.to_be_bytes());
}
