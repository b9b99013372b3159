use crate::error::NalError;

/// Annex B start code emitted in front of every unit written to storage.
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// H.264 `nal_unit_type` (ITU-T H.264 Table 7-1), plus the RTP-only
/// aggregation and fragmentation types of RFC 6184 §5.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NalUnitType {
    NonIdrSlice,
    DataPartitionA,
    DataPartitionB,
    DataPartitionC,
    IdrSlice,
    Sei,
    Sps,
    Pps,
    AccessUnitDelimiter,
    EndOfSequence,
    EndOfStream,
    FillerData,
    SpsExtension,
    Prefix,
    SubsetSps,
    /// Types 16–18 and 22–23.
    Reserved(u8),
    SliceLayerWithoutPartitioning,
    SliceExtension,
    SliceExtensionDepth,
    /// Single-time aggregation packet, type A (RFC 6184 §5.7.1).
    StapA,
    /// Single-time aggregation packet, type B.
    StapB,
    /// Multi-time aggregation packet with 16-bit timestamp offsets.
    Mtap16,
    /// Multi-time aggregation packet with 24-bit timestamp offsets.
    Mtap24,
    /// Fragmentation unit, type A (RFC 6184 §5.8).
    FuA,
    /// Fragmentation unit, type B.
    FuB,
    /// Types 0, 30 and 31.
    Unspecified(u8),
}

impl NalUnitType {
    /// Map the 5-bit type field to a variant. Bits above the low 5 are ignored.
    pub fn from_id(id: u8) -> Self {
        match id & 0x1F {
            1 => Self::NonIdrSlice,
            2 => Self::DataPartitionA,
            3 => Self::DataPartitionB,
            4 => Self::DataPartitionC,
            5 => Self::IdrSlice,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::AccessUnitDelimiter,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::FillerData,
            13 => Self::SpsExtension,
            14 => Self::Prefix,
            15 => Self::SubsetSps,
            n @ (16..=18 | 22..=23) => Self::Reserved(n),
            19 => Self::SliceLayerWithoutPartitioning,
            20 => Self::SliceExtension,
            21 => Self::SliceExtensionDepth,
            24 => Self::StapA,
            25 => Self::StapB,
            26 => Self::Mtap16,
            27 => Self::Mtap24,
            28 => Self::FuA,
            29 => Self::FuB,
            n => Self::Unspecified(n),
        }
    }

    /// The 5-bit type field value.
    pub fn id(self) -> u8 {
        match self {
            Self::NonIdrSlice => 1,
            Self::DataPartitionA => 2,
            Self::DataPartitionB => 3,
            Self::DataPartitionC => 4,
            Self::IdrSlice => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::AccessUnitDelimiter => 9,
            Self::EndOfSequence => 10,
            Self::EndOfStream => 11,
            Self::FillerData => 12,
            Self::SpsExtension => 13,
            Self::Prefix => 14,
            Self::SubsetSps => 15,
            Self::SliceLayerWithoutPartitioning => 19,
            Self::SliceExtension => 20,
            Self::SliceExtensionDepth => 21,
            Self::StapA => 24,
            Self::StapB => 25,
            Self::Mtap16 => 26,
            Self::Mtap24 => 27,
            Self::FuA => 28,
            Self::FuB => 29,
            Self::Reserved(n) | Self::Unspecified(n) => n,
        }
    }

    /// STAP-A/B and MTAP16/24: several NAL units packed in one RTP payload.
    pub fn is_aggregation(self) -> bool {
        matches!(self, Self::StapA | Self::StapB | Self::Mtap16 | Self::Mtap24)
    }

    /// FU-A/B: one NAL unit split across several RTP payloads.
    pub fn is_fragment(self) -> bool {
        matches!(self, Self::FuA | Self::FuB)
    }

    /// Slice data (types 1–5).
    pub fn is_vcl(self) -> bool {
        (1..=5).contains(&self.id())
    }
}

/// The one-byte NAL unit header: `F(7) NRI(6..5) Type(4..0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    /// Must be zero in a well-formed unit.
    pub forbidden_zero_bit: bool,
    /// Reference importance, 0–3.
    pub nal_ref_idc: u8,
    pub nal_unit_type: NalUnitType,
}

impl NalHeader {
    pub fn parse(byte: u8) -> Self {
        Self {
            forbidden_zero_bit: byte & 0x80 != 0,
            nal_ref_idc: (byte >> 5) & 0x03,
            nal_unit_type: NalUnitType::from_id(byte),
        }
    }

    pub fn to_byte(self) -> u8 {
        ((self.forbidden_zero_bit as u8) << 7)
            | ((self.nal_ref_idc & 0x03) << 5)
            | self.nal_unit_type.id()
    }

    pub fn is_well_formed(self) -> bool {
        !self.forbidden_zero_bit
    }
}

/// A NAL unit borrowing its bytes (header byte included, start code excluded).
///
/// The view lives only as long as the buffer it was cut from. A consumer
/// that must keep the unit beyond the call that handed it over copies it
/// with [`to_owned_unit`](Self::to_owned_unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit<'a> {
    header: NalHeader,
    data: &'a [u8],
}

impl<'a> NalUnit<'a> {
    /// Wrap a delimited byte range, decoding its header byte.
    pub fn parse(data: &'a [u8]) -> Result<Self, NalError> {
        let first = *data.first().ok_or(NalError::EmptyUnit)?;
        Ok(Self {
            header: NalHeader::parse(first),
            data,
        })
    }

    pub fn header(&self) -> NalHeader {
        self.header
    }

    pub fn unit_type(&self) -> NalUnitType {
        self.header.nal_unit_type
    }

    /// The whole unit, header byte first.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Bytes after the header byte.
    pub fn body(&self) -> &'a [u8] {
        &self.data[1..]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_owned_unit(&self) -> OwnedNalUnit {
        OwnedNalUnit {
            header: self.header,
            data: self.data.to_vec(),
        }
    }
}

/// A NAL unit that owns its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedNalUnit {
    header: NalHeader,
    data: Vec<u8>,
}

impl OwnedNalUnit {
    pub fn new(data: Vec<u8>) -> Result<Self, NalError> {
        let first = *data.first().ok_or(NalError::EmptyUnit)?;
        Ok(Self {
            header: NalHeader::parse(first),
            data,
        })
    }

    pub fn header(&self) -> NalHeader {
        self.header
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn as_unit(&self) -> NalUnit<'_> {
        NalUnit {
            header: self.header,
            data: &self.data,
        }
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

/// Start-code scanner state, named after the byte being looked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    SeekFirstZero,
    SeekSecondZero,
    SeekThirdZero,
    SeekOne,
}

/// Lazy iterator over the NAL units of an Annex B byte range.
///
/// Created by [`extract`]. Delimiters are a run of two or more `0x00`
/// followed by `0x01`; the whole zero run and the `0x01` are excluded from
/// the units on either side. Only zeros extend a run: any other byte before
/// the `0x01` ends it, so `00 00 00 02 01` is unit data, not a delimiter.
/// Bytes before the first delimiter form a unit of their own, so an RTP
/// payload carrying a single bare NAL unit yields that unit. Empty ranges
/// between adjacent delimiters are skipped. The tail after the last
/// delimiter is yielded even without a closing delimiter; if the input ends
/// right after a delimiter the tail is empty and is reported as
/// [`NalError::EmptyUnit`].
///
/// The iterator walks its input once and cannot be restarted. A unit cut in
/// two by separate calls is not stitched back together here.
#[derive(Debug, Clone)]
pub struct NalUnits<'a> {
    data: &'a [u8],
    pos: usize,
    unit_start: usize,
    zero_run_start: usize,
    state: ScanState,
    finished: bool,
}

/// Split an Annex B byte range into NAL units.
pub fn extract(data: &[u8]) -> NalUnits<'_> {
    NalUnits {
        data,
        pos: 0,
        unit_start: 0,
        zero_run_start: 0,
        state: ScanState::SeekFirstZero,
        finished: false,
    }
}

impl<'a> Iterator for NalUnits<'a> {
    type Item = Result<NalUnit<'a>, NalError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.data.len() {
            let at = self.pos;
            let byte = self.data[at];
            self.pos += 1;

            self.state = match (self.state, byte) {
                (ScanState::SeekFirstZero, 0x00) => {
                    self.zero_run_start = at;
                    ScanState::SeekSecondZero
                }
                (ScanState::SeekSecondZero, 0x00) => ScanState::SeekThirdZero,
                (ScanState::SeekThirdZero | ScanState::SeekOne, 0x00) => ScanState::SeekOne,
                (ScanState::SeekThirdZero | ScanState::SeekOne, 0x01) => {
                    let range = self.unit_start..self.zero_run_start;
                    self.unit_start = self.pos;
                    self.state = ScanState::SeekFirstZero;
                    if !range.is_empty() {
                        return Some(NalUnit::parse(&self.data[range]));
                    }
                    continue;
                }
                _ => ScanState::SeekFirstZero,
            };
        }

        if self.finished {
            return None;
        }
        self.finished = true;

        if self.unit_start < self.data.len() {
            Some(NalUnit::parse(&self.data[self.unit_start..]))
        } else if self.unit_start > 0 {
            Some(Err(NalError::EmptyUnit))
        } else {
            None
        }
    }
}

impl std::iter::FusedIterator for NalUnits<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(data: &[u8]) -> Vec<Vec<u8>> {
        extract(data)
            .filter_map(|unit| unit.ok())
            .map(|unit| unit.data().to_vec())
            .collect()
    }

    #[test]
    fn four_then_three_byte_start_codes() {
        let data = [0x00, 0x00, 0x00, 0x01, 0xAA, 0xBB, 0x00, 0x00, 0x01, 0xCC];
        assert_eq!(units(&data), vec![vec![0xAA, 0xBB], vec![0xCC]]);
    }

    #[test]
    fn long_zero_run_before_one() {
        let data = [0x00, 0x00, 0x00, 0x00, 0x01, 0xAA, 0x00, 0x00, 0x01, 0xBB];
        assert_eq!(units(&data), vec![vec![0xAA], vec![0xBB]]);
    }

    #[test]
    fn trailing_unit_without_delimiter() {
        let data = [0x00, 0x00, 0x00, 0x01, 0xAA, 0xBB];
        assert_eq!(units(&data), vec![vec![0xAA, 0xBB]]);
    }

    #[test]
    fn trailing_zero_bytes_excluded() {
        let data = [0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x00, 0x00, 0x00, 0x01, 0x68];
        assert_eq!(units(&data), vec![vec![0x67, 0x42], vec![0x68]]);
    }

    #[test]
    fn bare_payload_is_one_unit() {
        let data = [0x65, 0x88, 0x84, 0x21];
        assert_eq!(units(&data), vec![data.to_vec()]);
    }

    #[test]
    fn leading_bytes_before_first_delimiter() {
        let data = [0x09, 0xF0, 0x00, 0x00, 0x01, 0x65, 0x11];
        assert_eq!(units(&data), vec![vec![0x09, 0xF0], vec![0x65, 0x11]]);
    }

    #[test]
    fn single_zero_is_data() {
        let data = [0x00, 0x00, 0x01, 0x41, 0x00, 0x9A, 0x01];
        assert_eq!(units(&data), vec![vec![0x41, 0x00, 0x9A, 0x01]]);
    }

    #[test]
    fn non_zero_byte_ends_zero_run() {
        let data = [0x00, 0x00, 0x00, 0x01, 0xAA, 0x00, 0x00, 0x00, 0x02, 0x01, 0xBB];
        assert_eq!(
            units(&data),
            vec![vec![0xAA, 0x00, 0x00, 0x00, 0x02, 0x01, 0xBB]]
        );
    }

    #[test]
    fn adjacent_delimiters_skip_empty_range() {
        let data = [0x00, 0x00, 0x01, 0x00, 0x00, 0x01, 0x06, 0x05];
        assert_eq!(units(&data), vec![vec![0x06, 0x05]]);
    }

    #[test]
    fn ends_on_delimiter_reports_empty_tail() {
        let data = [0x00, 0x00, 0x00, 0x01, 0xAA, 0x00, 0x00, 0x00, 0x01];
        let all: Vec<_> = extract(&data).collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].unwrap().data(), &[0xAA]);
        assert_eq!(all[1], Err(NalError::EmptyUnit));
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert_eq!(extract(&[]).count(), 0);
    }

    #[test]
    fn iterator_is_fused() {
        let data = [0x00, 0x00, 0x01, 0x65];
        let mut iter = extract(&data);
        assert!(iter.next().is_some());
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn header_fields_decoded() {
        let data = [0x00, 0x00, 0x00, 0x01, 0x67, 0x42];
        let unit = extract(&data).next().unwrap().unwrap();
        let header = unit.header();
        assert!(!header.forbidden_zero_bit);
        assert_eq!(header.nal_ref_idc, 3);
        assert_eq!(header.nal_unit_type, NalUnitType::Sps);
        assert_eq!(header.to_byte(), 0x67);
        assert_eq!(unit.body(), &[0x42]);
    }

    #[test]
    fn forbidden_bit_detected() {
        let unit = NalUnit::parse(&[0xE5, 0x00]).unwrap();
        assert!(!unit.header().is_well_formed());
        assert_eq!(unit.unit_type(), NalUnitType::IdrSlice);
    }

    #[test]
    fn empty_unit_rejected() {
        assert_eq!(NalUnit::parse(&[]), Err(NalError::EmptyUnit));
        assert_eq!(OwnedNalUnit::new(Vec::new()), Err(NalError::EmptyUnit));
    }

    #[test]
    fn type_ids_round_trip() {
        for id in 0u8..32 {
            assert_eq!(NalUnitType::from_id(id).id(), id);
        }
    }

    #[test]
    fn rtp_specific_types() {
        assert!(NalUnitType::from_id(24).is_aggregation());
        assert!(NalUnitType::from_id(27).is_aggregation());
        assert!(NalUnitType::from_id(28).is_fragment());
        assert!(NalUnitType::from_id(29).is_fragment());
        assert!(!NalUnitType::IdrSlice.is_fragment());
        assert!(NalUnitType::IdrSlice.is_vcl());
        assert_eq!(NalUnitType::from_id(17), NalUnitType::Reserved(17));
        assert_eq!(NalUnitType::from_id(0), NalUnitType::Unspecified(0));
    }

    #[test]
    fn owned_copy_outlives_buffer() {
        let owned = {
            let buffer = vec![0x00, 0x00, 0x01, 0x68, 0xCE, 0x38];
            let unit = extract(&buffer).next().unwrap().unwrap();
            unit.to_owned_unit()
        };
        assert_eq!(owned.data(), &[0x68, 0xCE, 0x38]);
        assert_eq!(owned.as_unit().unit_type(), NalUnitType::Pps);
        assert_eq!(owned.into_vec(), vec![0x68, 0xCE, 0x38]);
    }
}
