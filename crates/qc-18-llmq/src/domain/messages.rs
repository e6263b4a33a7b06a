//! # Quorum Data Messages
//!
//! ```text
//! qgetdata: llmq_type u8 | quorum_hash 32 | data_mask u16 | pro_tx_hash 32
//! qdata:    <qgetdata fields> | error u8 | [vvec] | [encrypted contributions]
//! ```
//!
//! The `qdata` payload is present only when `error == None`; each part is
//! present only if the echoed mask requested it.

use super::data_request::{DataRequestError, QuorumDataRequest};
use super::keys::{read_vvec, write_vvec, VerificationVector};
use super::serialize::{Reader, WireError, Writer};

/// Command string of a data request.
pub const QGETDATA: &str = "qgetdata";
/// Command string of a data reply.
pub const QDATA: &str = "qdata";

/// Reply to a `qgetdata` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumDataReply {
    /// Echo of the request, with `error` set.
    pub request: QuorumDataRequest,
    /// Quorum verification vector, when requested and served.
    pub vvec: Option<VerificationVector>,
    /// Encrypted contributions for the requested member, when requested and served.
    pub contributions: Option<Vec<Vec<u8>>>,
}

impl QuorumDataReply {
    /// Error reply without payload.
    pub fn error(mut request: QuorumDataRequest, error: DataRequestError) -> Self {
        request.error = error;
        Self {
            request,
            vvec: None,
            contributions: None,
        }
    }
}

/// Quorum data protocol messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmqMessage {
    /// `qgetdata`
    GetData(QuorumDataRequest),
    /// `qdata`
    Data(QuorumDataReply),
}

impl LlmqMessage {
    /// Command string.
    pub fn command(&self) -> &'static str {
        match self {
            Self::GetData(_) => QGETDATA,
            Self::Data(_) => QDATA,
        }
    }

    /// Encode the message body.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        match self {
            Self::GetData(request) => request.write(&mut w),
            Self::Data(reply) => {
                reply.request.write(&mut w);
                w.u8(reply.request.error as u8);
                if reply.request.error == DataRequestError::None {
                    if reply.request.wants_vvec() {
                        write_vvec(&mut w, reply.vvec.as_deref().unwrap_or_default());
                    }
                    if reply.request.wants_contributions() {
                        let contributions = reply.contributions.as_deref().unwrap_or_default();
                        w.compact_size(contributions.len() as u64);
                        for blob in contributions {
                            w.var_bytes(blob);
                        }
                    }
                }
            }
        }
        w.finish()
    }

    /// Decode a message body for `command`. `Ok(None)` for commands this
    /// protocol does not handle.
    pub fn decode(command: &str, body: &[u8]) -> Result<Option<Self>, WireError> {
        let mut r = Reader::new(body);
        let message = match command {
            QGETDATA => Self::GetData(QuorumDataRequest::read(&mut r)?),
            QDATA => {
                let mut request = QuorumDataRequest::read(&mut r)?;
                request.error = DataRequestError::from(r.u8()?);
                let mut reply = QuorumDataReply {
                    request,
                    vvec: None,
                    contributions: None,
                };
                if reply.request.error == DataRequestError::None {
                    if reply.request.wants_vvec() {
                        reply.vvec = Some(read_vvec(&mut r)?);
                    }
                    if reply.request.wants_contributions() {
                        let n = r.compact_size()? as usize;
                        let blobs = (0..n)
                            .map(|_| r.var_bytes())
                            .collect::<Result<Vec<_>, _>>()?;
                        reply.contributions = Some(blobs);
                    }
                }
                Self::Data(reply)
            }
            _ => return Ok(None),
        };
        r.finish()?;
        Ok(Some(message))
    }
}
