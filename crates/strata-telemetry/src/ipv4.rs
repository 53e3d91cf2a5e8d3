//! # IPv4 Metric Stamping
//!
//! Queue delay and drop count are carried in the 16-bit identification
//! field of the IPv4 header. The header checksum is patched in O(1) so
//! the header stays valid for every hop behind us.
//!
//! ## Identification field (default layout)
//!
//! ```text
//!   15        11 10                    0
//!  +------------+-----------------------+
//!  | drops (5)  |  queue delay (11)     |
//!  | M=2, E=3   |  M=7, E=4, 1024 µs    |
//!  +------------+-----------------------+
//! ```
//!
//! Reusing the identification field breaks fragment reassembly for
//! packets that are fragmented after us; that is accepted for testbed
//! traffic.

use crate::checksum;
use crate::drops::DropMetrics;
use crate::error::{LayoutError, PacketError};
use crate::minifloat::FloatFormat;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Minimum IPv4 header size (no options).
pub const HEADER_LEN: usize = 20;

mod field {
    use std::ops::Range;

    pub const VER_IHL: usize = 0;
    pub const TOS: usize = 1;
    pub const IDENT: Range<usize> = 4..6;
    pub const CHECKSUM: Range<usize> = 10..12;
}

// ─── Metrics Layout ──────────────────────────────────────────────────────────

/// How the two codewords share the identification field: queue delay in
/// the low bits, drops directly above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsLayout {
    qdelay: FloatFormat,
    drops: FloatFormat,
}

impl Default for MetricsLayout {
    fn default() -> Self {
        MetricsLayout {
            qdelay: FloatFormat::QDELAY,
            drops: FloatFormat::DROPS,
        }
    }
}

impl MetricsLayout {
    pub fn new(qdelay: FloatFormat, drops: FloatFormat) -> Result<Self, LayoutError> {
        if qdelay.width() + drops.width() > 16 {
            return Err(LayoutError {
                qdelay: qdelay.width(),
                drops: drops.width(),
            });
        }
        Ok(MetricsLayout { qdelay, drops })
    }

    pub fn qdelay(&self) -> FloatFormat {
        self.qdelay
    }

    pub fn drops(&self) -> FloatFormat {
        self.drops
    }

    /// Combine two codewords into one field value.
    ///
    /// Each codeword is masked to its format width first.
    #[inline]
    pub fn pack(&self, qdelay: u32, drops: u32) -> u16 {
        let qdelay = qdelay & self.qdelay.max_codeword();
        let drops = drops & self.drops.max_codeword();
        (qdelay | (drops << self.qdelay.width())) as u16
    }

    /// Split a field value into `(qdelay, drops)` codewords.
    #[inline]
    pub fn unpack(&self, field: u16) -> (u32, u32) {
        let field = u32::from(field);
        (
            field & self.qdelay.max_codeword(),
            (field >> self.qdelay.width()) & self.drops.max_codeword(),
        )
    }
}

// ─── Header View ─────────────────────────────────────────────────────────────

/// Read/write view over the first bytes of an IPv4 header.
#[derive(Debug)]
pub struct Ipv4Header<T> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Ipv4Header<T> {
    /// Wrap a buffer holding at least [`HEADER_LEN`] bytes.
    pub fn new_checked(buffer: T) -> Result<Self, PacketError> {
        let available = buffer.as_ref().len();
        if available < HEADER_LEN {
            return Err(PacketError::Truncated {
                needed: HEADER_LEN,
                available,
            });
        }
        Ok(Ipv4Header { buffer })
    }

    pub fn into_inner(self) -> T {
        self.buffer
    }

    fn word(&self, range: std::ops::Range<usize>) -> u16 {
        let b = &self.buffer.as_ref()[range];
        u16::from_be_bytes([b[0], b[1]])
    }

    pub fn version(&self) -> u8 {
        self.buffer.as_ref()[field::VER_IHL] >> 4
    }

    /// Header length in bytes from the IHL field, options included.
    pub fn header_len(&self) -> usize {
        usize::from(self.buffer.as_ref()[field::VER_IHL] & 0x0F) * 4
    }

    pub fn tos(&self) -> u8 {
        self.buffer.as_ref()[field::TOS]
    }

    pub fn ident(&self) -> u16 {
        self.word(field::IDENT)
    }

    pub fn checksum(&self) -> u16 {
        self.word(field::CHECKSUM)
    }

    /// Recompute the checksum over the whole header (options included)
    /// and check it.
    pub fn verify_checksum(&self) -> bool {
        let data = self.buffer.as_ref();
        let len = self.header_len().clamp(HEADER_LEN, data.len());
        checksum::verify(&data[..len])
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Ipv4Header<T> {
    fn set_word(&mut self, range: std::ops::Range<usize>, value: u16) {
        self.buffer.as_mut()[range].copy_from_slice(&value.to_be_bytes());
    }

    /// Replace the identification field, patching the checksum.
    pub fn set_ident(&mut self, ident: u16) {
        let check = checksum::update(self.checksum(), self.ident(), ident);
        self.set_word(field::IDENT, ident);
        self.set_word(field::CHECKSUM, check);
    }

    /// Recompute the checksum from scratch.
    pub fn fill_checksum(&mut self) {
        self.set_word(field::CHECKSUM, 0);
        let data = self.buffer.as_ref();
        let len = self.header_len().clamp(HEADER_LEN, data.len());
        let check = checksum::checksum(&data[..len]);
        self.set_word(field::CHECKSUM, check);
    }
}

// ─── Stamp ───────────────────────────────────────────────────────────────────

/// The metrics carried by one stamped packet, as codewords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Stamp {
    /// Identification field as written.
    pub ident: u16,
    /// Queue delay codeword.
    pub qdelay: u32,
    /// Drop count codeword.
    pub drops: u32,
}

impl Ipv4Stamp {
    /// Queue delay in 1024 µs units, rounded down by the encoding.
    pub fn qdelay_units(&self, layout: &MetricsLayout) -> u32 {
        layout.qdelay().decode(self.qdelay)
    }

    /// Drops reported since the previous packet of the same ECN class.
    pub fn drop_count(&self, layout: &MetricsLayout) -> u32 {
        layout.drops().decode(self.drops)
    }
}

/// Write an already quantized queue delay and the pending drop count into
/// `header`.
///
/// Consumes the drop counter matching the header's ECN bits, quantized
/// with `layout.drops()` whatever format `metrics` was built with.
pub fn embed<T>(
    header: &mut Ipv4Header<T>,
    metrics: &mut DropMetrics,
    layout: &MetricsLayout,
    qdelay_codeword: u32,
) -> Ipv4Stamp
where
    T: AsRef<[u8]> + AsMut<[u8]>,
{
    let drops = metrics.take_quantized_with(layout.drops(), header.tos());
    let ident = layout.pack(qdelay_codeword, drops);
    header.set_ident(ident);

    let (qdelay, drops) = layout.unpack(ident);
    Ipv4Stamp {
        ident,
        qdelay,
        drops,
    }
}

/// Read back the stamp of a received header.
pub fn read_stamp(header: &[u8], layout: &MetricsLayout) -> Option<Ipv4Stamp> {
    let header = Ipv4Header::new_checked(header).ok()?;
    if header.version() != 4 {
        return None;
    }
    let ident = header.ident();
    let (qdelay, drops) = layout.unpack(ident);
    Some(Ipv4Stamp {
        ident,
        qdelay,
        drops,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drops::Ecn;
    use proptest::prelude::*;

    fn sample_header(tos: u8, ident: u16) -> [u8; 20] {
        let mut h = [
            0x45, tos, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xC0, 0xA8,
            0x00, 0x01, 0xC0, 0xA8, 0x00, 0xC7,
        ];
        h[4..6].copy_from_slice(&ident.to_be_bytes());
        let mut view = Ipv4Header::new_checked(&mut h[..]).unwrap();
        view.fill_checksum();
        h
    }

    #[test]
    fn new_checked_rejects_short_buffer() {
        let buf = [0x45u8; 19];
        assert_eq!(
            Ipv4Header::new_checked(&buf[..]).unwrap_err(),
            PacketError::Truncated {
                needed: 20,
                available: 19
            }
        );
    }

    #[test]
    fn default_layout_is_11_plus_5() {
        let l = MetricsLayout::default();
        assert_eq!(l.pack(0x7FF, 0), 0x07FF);
        assert_eq!(l.pack(0, 31), 0xF800);
        assert_eq!(l.pack(0x123, 0x15), 0x123 | (0x15 << 11));
        assert_eq!(l.unpack(0xF800 | 0x456), (0x456, 31));
    }

    #[test]
    fn pack_masks_oversized_codewords() {
        let l = MetricsLayout::default();
        assert_eq!(l.pack(0xFFFF, 0), 0x07FF);
        assert_eq!(l.pack(0, 0xFF), 0xF800);
    }

    #[test]
    fn layout_rejects_more_than_16_bits() {
        let wide = FloatFormat::new(8, 4).unwrap();
        assert_eq!(
            MetricsLayout::new(wide, FloatFormat::DROPS),
            Err(LayoutError { qdelay: 12, drops: 5 })
        );
    }

    #[test]
    fn embed_writes_ident_and_keeps_checksum_valid() {
        let mut buf = sample_header(0x00, 0xABCD);
        let mut metrics = DropMetrics::new();
        for _ in 0..6 {
            metrics.record_drop(Ecn::NotEct);
        }
        let layout = MetricsLayout::default();

        let qdelay_cw = FloatFormat::QDELAY.encode(300).codeword;
        assert_eq!(qdelay_cw, (2 << 7) | 22);

        let mut header = Ipv4Header::new_checked(&mut buf[..]).unwrap();
        let stamp = embed(&mut header, &mut metrics, &layout, qdelay_cw);

        assert_eq!(stamp.ident, (qdelay_cw | (6 << 11)) as u16);
        assert_eq!(header.ident(), stamp.ident);
        assert!(header.verify_checksum());
        assert_eq!(metrics.non_ecn(), 0);
    }

    #[test]
    fn embed_selects_counter_from_tos() {
        let mut buf = sample_header(0x01, 0);
        let mut metrics = DropMetrics::new();
        metrics.record_drop(Ecn::Ect1);
        metrics.record_drop(Ecn::NotEct);

        let layout = MetricsLayout::default();
        let mut header = Ipv4Header::new_checked(&mut buf[..]).unwrap();
        let stamp = embed(&mut header, &mut metrics, &layout, 0);

        assert_eq!(stamp.drops, 1);
        assert_eq!(metrics.ecn(), 0);
        assert_eq!(metrics.non_ecn(), 1);
    }

    #[test]
    fn read_stamp_recovers_codewords() {
        let mut buf = sample_header(0x00, 0);
        let mut metrics = DropMetrics::new();
        for _ in 0..200 {
            metrics.record_drop(Ecn::NotEct);
        }
        let layout = MetricsLayout::default();
        let mut header = Ipv4Header::new_checked(&mut buf[..]).unwrap();
        let qdelay_cw = layout.qdelay().encode(5000).codeword;
        let written = embed(&mut header, &mut metrics, &layout, qdelay_cw);

        let read = read_stamp(&buf, &layout).unwrap();
        assert_eq!(read, written);
        assert_eq!(read.qdelay, FloatFormat::QDELAY.encode(5000).codeword);
        assert_eq!(read.drops, FloatFormat::DROPS.encode(200).codeword);
        assert!(read.qdelay_units(&layout) <= 5000);
        assert_eq!(read.drop_count(&layout) + u32::from(metrics.non_ecn()), 200);
    }

    #[test]
    fn read_stamp_rejects_non_ipv4() {
        let mut buf = sample_header(0, 0);
        buf[0] = 0x60;
        assert!(read_stamp(&buf, &MetricsLayout::default()).is_none());
        assert!(read_stamp(&buf[..10], &MetricsLayout::default()).is_none());
    }

    #[test]
    fn verify_covers_options() {
        // IHL = 6: one 4-byte option word.
        let mut buf = [0u8; 24];
        buf[..20].copy_from_slice(&sample_header(0, 0x1111));
        buf[0] = 0x46;
        buf[20..24].copy_from_slice(&[0x94, 0x04, 0x00, 0x00]);
        let mut header = Ipv4Header::new_checked(&mut buf[..]).unwrap();
        header.fill_checksum();
        assert!(header.verify_checksum());

        header.set_ident(0x2222);
        assert!(header.verify_checksum());
        assert_eq!(header.header_len(), 24);
    }

    proptest! {
        #[test]
        fn proptest_embed_keeps_header_valid(
            bytes in any::<[u8; 20]>(),
            drops in 0u16..2000,
            qdelay in any::<u32>(),
        ) {
            let mut buf = bytes;
            buf[0] = 0x45;
            let mut header = Ipv4Header::new_checked(&mut buf[..]).unwrap();
            header.fill_checksum();

            let mut metrics = DropMetrics::new();
            let tos = header.tos();
            for _ in 0..drops {
                metrics.record_drop_tos(tos);
            }
            let layout = MetricsLayout::default();
            let qdelay_cw = layout.qdelay().encode(qdelay).codeword;
            let stamp = embed(&mut header, &mut metrics, &layout, qdelay_cw);

            prop_assert!(header.verify_checksum());
            prop_assert_eq!(stamp.qdelay, qdelay_cw);
            prop_assert_eq!(stamp.drops, layout.drops().encode(u32::from(drops)).codeword);
            prop_assert_eq!(u32::from(header.ident()) & 0x7FF, qdelay_cw);
            prop_assert_eq!(u32::from(header.ident()) >> 11, stamp.drops);
        }
    }
}
