//! Well-known header keys carried on the wire alongside a message's payload.

/// The logical, subscriber-facing type name. Used by the serialization
/// registry to pick a codec/target type on the consume side.
pub const HEADER_TYPE: &str = "$type";

/// The concrete runtime type, when it differs from `$type` (e.g. a base
/// event type with several polymorphic payload shapes).
pub const HEADER_RUNTIME_TYPE: &str = "$runtimeType";

/// Correlation id propagated across a chain of produce/consume hops.
pub const HEADER_CORRELATION_ID: &str = "$correlationId";

/// Set by the outbox writer so a consumer can tell an at-least-once
/// redelivery apart from a genuinely new message, independent of the
/// inbox fingerprint.
pub const HEADER_MESSAGE_ID: &str = "$messageId";
