use std::collections::HashSet;

/// Recognizes repeat handshakes from clients that already have a session.
///
/// Matching datagrams are answered like a first contact and never broadcast.
#[derive(Debug, Clone, Default)]
pub struct HandshakeRetry {
    lengths: HashSet<usize>,
}

impl HandshakeRetry {
    pub fn with_lengths(lengths: impl IntoIterator<Item = usize>) -> Self {
        Self {
            lengths: lengths.into_iter().filter(|len| *len > 0).collect(),
        }
    }

    pub fn matches(&self, datagram: &[u8]) -> bool {
        self.lengths.contains(&datagram.len())
    }

    pub fn is_disabled(&self) -> bool {
        self.lengths.is_empty()
    }
}
