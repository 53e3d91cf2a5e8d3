//! # Packet Access
//!
//! What the stamping path needs from a packet: its network protocol, where
//! the network header starts, and exclusive write access to a prefix of
//! the buffer. [`Frame`] implements this over `bytes` buffers; a datapath
//! with its own buffer type implements [`PacketBuffer`] directly.

use bytes::{Bytes, BytesMut};

use crate::error::PacketError;

// ─── Protocol ────────────────────────────────────────────────────────────────

/// Ethertypes the stamping path cares about.
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const IPV6: u16 = 0x86DD;
    /// 802.1Q customer tag.
    pub const VLAN: u16 = 0x8100;
    /// 802.1ad service tag.
    pub const QINQ: u16 = 0x88A8;
}

/// Ethernet II header without tags.
pub const ETHERNET_HEADER_LEN: usize = 14;

/// Size of one 802.1Q / 802.1ad tag.
pub const VLAN_TAG_LEN: usize = 4;

/// Fixed IPv6 header size.
pub const IPV6_HEADER_LEN: usize = 40;

/// Network-layer protocol of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkProtocol {
    Ipv4,
    Ipv6,
    Other(u16),
}

impl From<u16> for NetworkProtocol {
    fn from(value: u16) -> Self {
        match value {
            ethertype::IPV4 => NetworkProtocol::Ipv4,
            ethertype::IPV6 => NetworkProtocol::Ipv6,
            other => NetworkProtocol::Other(other),
        }
    }
}

// ─── Packet Buffer ───────────────────────────────────────────────────────────

/// A packet the stamping path can inspect and modify.
pub trait PacketBuffer {
    /// Ethertype of the network header, VLAN tags already skipped.
    fn protocol(&self) -> u16;

    /// Byte offset of the network header.
    fn network_offset(&self) -> usize;

    /// Bytes currently in the buffer.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exclusive access to the first `len` bytes.
    ///
    /// Shared storage is unshared first. On error the packet is unchanged.
    fn make_writable(&mut self, len: usize) -> Result<&mut [u8], PacketError>;
}

// ─── Frame ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Storage {
    Unique(BytesMut),
    Shared(Bytes),
}

/// A packet held in `bytes` storage.
///
/// Frames built from [`Bytes`] may share their storage with clones (e.g. a
/// retransmit buffer or a mirror port); writing to them unshares first,
/// reusing the allocation when this is the last handle and copying
/// otherwise.
#[derive(Debug)]
pub struct Frame {
    data: Storage,
    protocol: u16,
    network_offset: usize,
    allow_copy: bool,
}

impl Frame {
    /// A frame that owns its buffer exclusively.
    pub fn new(protocol: u16, network_offset: usize, data: BytesMut) -> Self {
        Frame {
            data: Storage::Unique(data),
            protocol,
            network_offset,
            allow_copy: true,
        }
    }

    /// A frame over possibly shared storage.
    pub fn shared(protocol: u16, network_offset: usize, data: Bytes) -> Self {
        Frame {
            data: Storage::Shared(data),
            protocol,
            network_offset,
            allow_copy: true,
        }
    }

    /// Parse an Ethernet II frame, skipping any number of VLAN tags.
    pub fn ethernet(data: Bytes) -> Result<Self, PacketError> {
        let mut offset = ETHERNET_HEADER_LEN - 2;
        loop {
            let needed = offset + 2;
            if data.len() < needed {
                return Err(PacketError::Truncated {
                    needed,
                    available: data.len(),
                });
            }
            let ty = u16::from_be_bytes([data[offset], data[offset + 1]]);
            match ty {
                ethertype::VLAN | ethertype::QINQ => offset += VLAN_TAG_LEN,
                _ => return Ok(Frame::shared(ty, offset + 2, data)),
            }
        }
    }

    /// Refuse to copy shared storage; writes to a shared frame then fail.
    pub fn no_copy(mut self) -> Self {
        self.allow_copy = false;
        self
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.data, Storage::Shared(_))
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.data {
            Storage::Unique(b) => &b[..],
            Storage::Shared(b) => &b[..],
        }
    }

    /// The network header and everything after it.
    pub fn network_slice(&self) -> &[u8] {
        self.as_slice().get(self.network_offset..).unwrap_or_default()
    }

    pub fn freeze(self) -> Bytes {
        match self.data {
            Storage::Unique(b) => b.freeze(),
            Storage::Shared(b) => b,
        }
    }

    fn unshare(&mut self) -> Result<(), PacketError> {
        let bytes = match std::mem::replace(&mut self.data, Storage::Unique(BytesMut::new())) {
            Storage::Shared(bytes) => bytes,
            unique => {
                self.data = unique;
                return Ok(());
            }
        };
        match bytes.try_into_mut() {
            Ok(unique) => {
                self.data = Storage::Unique(unique);
                Ok(())
            }
            Err(bytes) if self.allow_copy => {
                tracing::trace!(len = bytes.len(), "copying shared packet buffer");
                self.data = Storage::Unique(BytesMut::from(&bytes[..]));
                Ok(())
            }
            Err(bytes) => {
                self.data = Storage::Shared(bytes);
                Err(PacketError::NotWritable)
            }
        }
    }
}

impl PacketBuffer for Frame {
    fn protocol(&self) -> u16 {
        self.protocol
    }

    fn network_offset(&self) -> usize {
        self.network_offset
    }

    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn make_writable(&mut self, len: usize) -> Result<&mut [u8], PacketError> {
        let available = self.len();
        if len > available {
            return Err(PacketError::Truncated {
                needed: len,
                available,
            });
        }
        self.unshare()?;
        match &mut self.data {
            Storage::Unique(b) => Ok(&mut b[..len]),
            Storage::Shared(_) => Err(PacketError::NotWritable),
        }
    }
}
