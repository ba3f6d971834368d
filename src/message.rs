// MIT License - Copyright (c) 2026 craftbot-link contributors

/// How a [`Message`] payload is framed on the wire.
///
/// `Command` payloads are text: the console appends the configured line
/// delimiter before writing. `Data` payloads are raw bytes and go out
/// untouched, which is what the chunked upload path uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Command,
    Data,
}

/// One queued unit of outbound data. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Message {
    payload: Vec<u8>,
    kind: MessageKind,
}

impl Message {
    /// A text command. The line delimiter is added at write time, not here.
    pub fn command(text: impl Into<String>) -> Self {
        Self {
            payload: text.into().into_bytes(),
            kind: MessageKind::Command,
        }
    }

    /// A raw data message (e.g. one upload chunk).
    pub fn data(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            kind: MessageKind::Data,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// The bytes actually written for this message under the given delimiter.
    pub(crate) fn framed(&self, line_delimiter: &str) -> Vec<u8> {
        match self.kind {
            MessageKind::Command => {
                let mut out = Vec::with_capacity(self.payload.len() + line_delimiter.len());
                out.extend_from_slice(&self.payload);
                out.extend_from_slice(line_delimiter.as_bytes());
                out
            }
            MessageKind::Data => self.payload.clone(),
        }
    }
}
