//! Protocol messages exchanged between host and client, and their framing.
//!
//! The transport carries opaque byte frames. Each frame is a bincode
//! encoded [`Frame`]: the sender's protocol version followed by one
//! [`Message`].

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::math::Vec3Fixed;
use crate::world::{GroupId, InventoryId, WorldObject, WorldObjectId};

/// Wire protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

// ============================================================================
// Messages
// ============================================================================

/// Who initiated a deconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeconstructOrigin {
    /// A client asked for it. The host's reply credits the refund to the client.
    #[default]
    ClientRequest,
    /// The host player did it. The refund was already credited on the host.
    HostAction,
}

/// Deconstruction request (client to host) or result (host to client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDeconstruct {
    /// Target world object.
    pub id: WorldObjectId,
    /// Refund items in creation order. Populated by the host only.
    pub item_ids: Vec<WorldObjectId>,
    /// Initiator of the deconstruction.
    pub origin: DeconstructOrigin,
}

impl MessageDeconstruct {
    /// A client request for the host to deconstruct `id`.
    #[must_use]
    pub fn request(id: WorldObjectId) -> Self {
        Self {
            id,
            item_ids: Vec::new(),
            origin: DeconstructOrigin::ClientRequest,
        }
    }

    /// A host result carrying the refund item identifiers.
    #[must_use]
    pub fn result(
        id: WorldObjectId,
        item_ids: Vec<WorldObjectId>,
        origin: DeconstructOrigin,
    ) -> Self {
        Self {
            id,
            item_ids,
            origin,
        }
    }
}

/// Snapshot of a world object replicated host to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageWorldObject {
    /// Identifier.
    pub id: WorldObjectId,
    /// Group of the object.
    pub group: GroupId,
    /// World position.
    pub position: Vec3Fixed,
    /// Euler rotation.
    pub rotation: Vec3Fixed,
    /// Persistence flag.
    pub dont_save: bool,
    /// Holding inventory, if any.
    pub container: Option<InventoryId>,
}

impl MessageWorldObject {
    /// Copy the replicated fields onto a local record.
    pub fn apply_to(&self, object: &mut WorldObject) {
        object.group = self.group.clone();
        object.position = self.position;
        object.rotation = self.rotation;
        object.dont_save = self.dont_save;
        object.container = self.container;
    }
}

impl From<&WorldObject> for MessageWorldObject {
    fn from(object: &WorldObject) -> Self {
        Self {
            id: object.id,
            group: object.group.clone(),
            position: object.position,
            rotation: object.rotation,
            dont_save: object.dont_save,
            container: object.container,
        }
    }
}

/// All messages of the replication protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Per-object state sync.
    WorldObject(MessageWorldObject),
    /// Deconstruction request or result.
    Deconstruct(MessageDeconstruct),
}

impl Message {
    /// Short name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::WorldObject(_) => "MessageWorldObject",
            Self::Deconstruct(_) => "MessageDeconstruct",
        }
    }
}

impl From<MessageWorldObject> for Message {
    fn from(message: MessageWorldObject) -> Self {
        Self::WorldObject(message)
    }
}

impl From<MessageDeconstruct> for Message {
    fn from(message: MessageDeconstruct) -> Self {
        Self::Deconstruct(message)
    }
}

// ============================================================================
// Framing
// ============================================================================

/// A versioned message as it travels over the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Protocol version of the sender.
    pub version: u32,
    /// Payload.
    pub message: Message,
}

/// Encode a message into a transport frame.
pub fn encode_frame(version: u32, message: &Message) -> Result<Vec<u8>> {
    let frame = FrameRef { version, message };
    bincode::serialize(&frame)
        .map_err(|e| {
            SyncError::MalformedMessage(format!("Failed to encode {}: {}", message.kind(), e))
        })
}

/// Decode a transport frame, checking the protocol version.
pub fn decode_frame(expected_version: u32, bytes: &[u8]) -> Result<Message> {
    let frame: Frame = bincode::deserialize(bytes)
        .map_err(|e| SyncError::MalformedMessage(format!("Failed to decode frame: {}", e)))?;

    if frame.version != expected_version {
        return Err(SyncError::ProtocolVersionMismatch {
            expected: expected_version,
            actual: frame.version,
        });
    }

    Ok(frame.message)
}

/// Borrowing twin of [`Frame`] so encoding does not clone the payload.
#[derive(Serialize)]
struct FrameRef<'a> {
    version: u32,
    message: &'a Message,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_has_no_items() {
        let request = MessageDeconstruct::request(42);
        assert_eq!(request.id, 42);
        assert!(request.item_ids.is_empty());
        assert_eq!(request.origin, DeconstructOrigin::ClientRequest);
    }

    #[test]
    fn test_frame_carries_deconstruct_result() {
        let message: Message =
            MessageDeconstruct::result(
                42,
                vec![100, 101, 102, 103],
                DeconstructOrigin::ClientRequest,
            )
                .into();
        let bytes = encode_frame(PROTOCOL_VERSION, &message).unwrap();
        let decoded = decode_frame(PROTOCOL_VERSION, &bytes).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_frame(PROTOCOL_VERSION, &[0xFF, 0x01]).unwrap_err();
        assert!(matches!(err, SyncError::MalformedMessage(_)));
    }

    #[test]
    fn test_decode_rejects_unknown_variant() {
        // version 1, then a variant index no message uses
        let bytes = [1, 0, 0, 0, 9, 0, 0, 0];
        let err = decode_frame(PROTOCOL_VERSION, &bytes).unwrap_err();
        assert!(matches!(err, SyncError::MalformedMessage(_)));
    }

    #[test]
    fn test_decode_rejects_foreign_version() {
        let message: Message = MessageDeconstruct::request(1).into();
        let bytes = encode_frame(PROTOCOL_VERSION + 1, &message).unwrap();
        let err = decode_frame(PROTOCOL_VERSION, &bytes).unwrap_err();
        assert_eq!(
            err,
            SyncError::ProtocolVersionMismatch {
                expected: PROTOCOL_VERSION,
                actual: PROTOCOL_VERSION + 1,
            }
        );
    }

    #[test]
    fn test_world_object_snapshot_applies() {
        let mut source =
            WorldObject::new(7, GroupId::new("Iron")).at(Vec3Fixed::from_ints(1, 2, 3));
        source.container = Some(4);
        source.dont_save = true;
        let snapshot = MessageWorldObject::from(&source);

        let mut target = WorldObject::new(7, GroupId::new("Iron"));
        snapshot.apply_to(&mut target);
        assert_eq!(target, source);
    }
}
