use envoy_types::pb::google::protobuf::Any;
use prost::Name;

const TYPE_URL_PREFIX: &str = "type.googleapis.com";

/// The default gRPC message size limit.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Serializes resources into `Any` values, rejecting resources that could not
/// be delivered in a single discovery message.
#[derive(Copy, Clone, Debug)]
pub struct Encoder {
    max_message_bytes: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("{type_url} is {len} bytes, exceeding the {max} byte limit")]
    TooLarge {
        type_url: String,
        len: usize,
        max: usize,
    },

    #[error(transparent)]
    Prost(#[from] prost::EncodeError),
}

// === impl Encoder ===

impl Encoder {
    pub fn new(max_message_bytes: usize) -> Self {
        Self { max_message_bytes }
    }

    pub fn encode<M: Name>(&self, msg: &M) -> Result<Any, EncodeError> {
        let type_url = type_url::<M>();
        let len = msg.encoded_len();
        if len > self.max_message_bytes {
            return Err(EncodeError::TooLarge {
                type_url,
                len,
                max: self.max_message_bytes,
            });
        }

        let mut value = Vec::with_capacity(len);
        msg.encode(&mut value)?;
        Ok(Any { type_url, value })
    }
}

/// The `Any` type URL Envoy expects for `M`.
pub(crate) fn type_url<M: Name>() -> String {
    format!("{TYPE_URL_PREFIX}/{}", M::full_name())
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_BYTES)
    }
}
