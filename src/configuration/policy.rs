// ============================================================================
// Replication Policy Encoding
// ============================================================================
//
// Binary layout consumed by the store's configuration reader:
//
//   One          := u32le(3) "One"
//   Across       := u32le(6) "Across" u32le(len(field)) field u32le(count) <subpolicy>
//
// The nested subpolicy is appended without a length prefix.
//
// ============================================================================

/// Version tag written in front of every policy blob.
pub const CONFIGURATION_PROTOCOL_VERSION: [u8; 8] = [0x01, 0x00, 0x04, 0x51, 0xa5, 0x00, 0xdb, 0x0f];

const SINGLETON_TAG: &str = "One";
const ACROSS_TAG: &str = "Across";

/// How many copies of data must exist, and across which locality field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationPolicy {
    /// A single replica.
    Singleton,

    /// `count` replicas, each in a distinct value of `field`, each governed by
    /// `subpolicy`.
    AcrossFaultDomain {
        count: u32,
        field: String,
        subpolicy: Box<ReplicationPolicy>,
    },
}

impl ReplicationPolicy {
    pub fn across(count: u32, field: impl Into<String>, subpolicy: ReplicationPolicy) -> Self {
        ReplicationPolicy::AcrossFaultDomain {
            count,
            field: field.into(),
            subpolicy: Box::new(subpolicy),
        }
    }

    /// Encodes the policy tree.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        self.encode_into(&mut buffer);
        buffer
    }

    pub fn encode_into(&self, buffer: &mut Vec<u8>) {
        match self {
            ReplicationPolicy::Singleton => put_string(buffer, SINGLETON_TAG),
            ReplicationPolicy::AcrossFaultDomain {
                count,
                field,
                subpolicy,
            } => {
                put_string(buffer, ACROSS_TAG);
                put_string(buffer, field);
                buffer.extend_from_slice(&count.to_le_bytes());
                subpolicy.encode_into(buffer);
            }
        }
    }

    /// The value stored in a replication policy key: the protocol version
    /// tag followed by the encoded policy.
    pub fn versioned_bytes(&self) -> Vec<u8> {
        let mut buffer = CONFIGURATION_PROTOCOL_VERSION.to_vec();
        self.encode_into(&mut buffer);
        buffer
    }
}

fn put_string(buffer: &mut Vec<u8>, value: &str) {
    buffer.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buffer.extend_from_slice(value.as_bytes());
}
