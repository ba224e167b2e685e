//! H.264/AVC decoder configuration
//!
//! FLV carries the AVCDecoderConfigurationRecord in the AVC sequence header
//! tag; the MP4 muxer writes the same record verbatim into `avcC`.
//!
//! ```text
//! configurationVersion (1) | AVCProfileIndication (1) | profile_compatibility (1)
//! | AVCLevelIndication (1) | lengthSizeMinusOne (1, lower 2 bits)
//! | numOfSPS (1, lower 5 bits) | { spsLength (2) | spsNALUnit }*
//! | numOfPPS (1) | { ppsLength (2) | ppsNALUnit }*
//! ```

use bytes::{Buf, Bytes};

use crate::error::MediaError;

/// NAL unit type of a sequence parameter set
pub const NALU_TYPE_SPS: u8 = 7;

/// AVC decoder configuration
#[derive(Debug, Clone)]
pub struct AvcConfig {
    /// AVC profile (66=Baseline, 77=Main, 100=High, etc.)
    pub profile: u8,
    pub compatibility: u8,
    /// AVC level (e.g., 31 = 3.1)
    pub level: u8,
    /// NALU length prefix size in bytes (usually 4)
    pub nalu_length_size: u8,
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
    /// Raw AVCDecoderConfigurationRecord bytes
    pub raw: Bytes,
}

impl AvcConfig {
    /// Parse an AVCDecoderConfigurationRecord
    pub fn parse(data: Bytes) -> Result<Self, MediaError> {
        if data.len() < 7 {
            return Err(MediaError::InvalidAvcPacket);
        }

        let raw = data.clone();
        let mut data = data;

        if data.get_u8() != 1 {
            return Err(MediaError::InvalidAvcPacket);
        }

        let profile = data.get_u8();
        let compatibility = data.get_u8();
        let level = data.get_u8();
        let nalu_length_size = (data.get_u8() & 0x03) + 1;

        let num_sps = (data.get_u8() & 0x1F) as usize;
        let sps = read_parameter_sets(&mut data, num_sps)?;

        if data.is_empty() {
            return Err(MediaError::InvalidAvcPacket);
        }
        let num_pps = data.get_u8() as usize;
        let pps = read_parameter_sets(&mut data, num_pps)?;

        Ok(AvcConfig {
            profile,
            compatibility,
            level,
            nalu_length_size,
            sps,
            pps,
            raw,
        })
    }

    /// Coded picture size from the first SPS, if it parses
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.sps.first().and_then(|sps| sps_dimensions(sps))
    }
}

fn read_parameter_sets(data: &mut Bytes, count: usize) -> Result<Vec<Bytes>, MediaError> {
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        if data.len() < 2 {
            return Err(MediaError::InvalidAvcPacket);
        }
        let len = data.get_u16() as usize;
        if data.len() < len {
            return Err(MediaError::InvalidAvcPacket);
        }
        sets.push(data.copy_to_bytes(len));
    }
    Ok(sets)
}

/// Decode width and height (after cropping) from an SPS NAL unit
pub fn sps_dimensions(nalu: &[u8]) -> Option<(u32, u32)> {
    if nalu.first().map(|b| b & 0x1F) != Some(NALU_TYPE_SPS) {
        return None;
    }

    let rbsp = strip_emulation_prevention(&nalu[1..]);
    let mut r = BitReader::new(&rbsp);

    let profile_idc = r.read_bits(8)?;
    r.skip(16)?; // constraint flags + level_idc
    r.read_ue()?; // seq_parameter_set_id

    let mut chroma_format_idc = 1;
    if matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    ) {
        chroma_format_idc = r.read_ue()?;
        if chroma_format_idc == 3 {
            r.skip(1)?; // separate_colour_plane_flag
        }
        r.read_ue()?; // bit_depth_luma_minus8
        r.read_ue()?; // bit_depth_chroma_minus8
        r.skip(1)?; // qpprime_y_zero_transform_bypass_flag
        if r.read_bit()? {
            let lists = if chroma_format_idc == 3 { 12 } else { 8 };
            for i in 0..lists {
                if r.read_bit()? {
                    skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    r.read_ue()?; // log2_max_frame_num_minus4
    match r.read_ue()? {
        0 => {
            r.read_ue()?; // log2_max_pic_order_cnt_lsb_minus4
        }
        1 => {
            r.skip(1)?;
            r.read_se()?;
            r.read_se()?;
            for _ in 0..r.read_ue()? {
                r.read_se()?;
            }
        }
        _ => {}
    }
    r.read_ue()?; // max_num_ref_frames
    r.skip(1)?; // gaps_in_frame_num_value_allowed_flag

    let width_mbs = r.read_ue()? + 1;
    let height_map_units = r.read_ue()? + 1;
    let frame_mbs_only = r.read_bit()? as u32;
    if frame_mbs_only == 0 {
        r.skip(1)?; // mb_adaptive_frame_field_flag
    }
    r.skip(1)?; // direct_8x8_inference_flag

    let (mut crop_left, mut crop_right, mut crop_top, mut crop_bottom) = (0, 0, 0, 0);
    if r.read_bit()? {
        crop_left = r.read_ue()?;
        crop_right = r.read_ue()?;
        crop_top = r.read_ue()?;
        crop_bottom = r.read_ue()?;
    }

    let (unit_x, unit_y) = match chroma_format_idc {
        0 | 3 => (1, 2 - frame_mbs_only),
        2 => (2, 2 - frame_mbs_only),
        _ => (2, 2 * (2 - frame_mbs_only)),
    };

    let width = (width_mbs * 16).checked_sub((crop_left + crop_right) * unit_x)?;
    let height = ((2 - frame_mbs_only) * height_map_units * 16)
        .checked_sub((crop_top + crop_bottom) * unit_y)?;
    Some((width, height))
}

fn skip_scaling_list(r: &mut BitReader<'_>, size: usize) -> Option<()> {
    let mut last = 8i32;
    let mut next = 8i32;
    for _ in 0..size {
        if next != 0 {
            let delta = r.read_se()?;
            next = (last + delta + 256) % 256;
        }
        if next != 0 {
            last = next;
        }
    }
    Some(())
}

fn strip_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &b in data {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if b == 0 { zeros + 1 } else { 0 };
        out.push(b);
    }
    out
}

/// MSB-first bit reader with Exp-Golomb decoding
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bit(&mut self) -> Option<bool> {
        let byte = *self.data.get(self.pos / 8)?;
        let bit = (byte >> (7 - self.pos % 8)) & 1;
        self.pos += 1;
        Some(bit == 1)
    }

    fn read_bits(&mut self, n: u32) -> Option<u32> {
        let mut v = 0u32;
        for _ in 0..n {
            v = (v << 1) | self.read_bit()? as u32;
        }
        Some(v)
    }

    fn skip(&mut self, n: usize) -> Option<()> {
        if self.pos + n > self.data.len() * 8 {
            return None;
        }
        self.pos += n;
        Some(())
    }

    fn read_ue(&mut self) -> Option<u32> {
        let mut zeros = 0;
        while !self.read_bit()? {
            zeros += 1;
            if zeros > 31 {
                return None;
            }
        }
        Some((1u32 << zeros) - 1 + self.read_bits(zeros)?)
    }

    fn read_se(&mut self) -> Option<i32> {
        let v = self.read_ue()? as i64;
        Some(if v % 2 == 1 {
            ((v + 1) / 2) as i32
        } else {
            -(v / 2) as i32
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Baseline, 20x15 macroblocks
    const SPS_320X240: &[u8] = &[0x67, 0x42, 0xC0, 0x0D, 0xF4, 0x0A, 0x0F, 0xC8];

    // High, 120x68 macroblocks with 8 rows cropped at the bottom
    const SPS_1920X1080: &[u8] = &[
        0x67, 0x64, 0x00, 0x1F, 0xAC, 0xE8, 0x07, 0x80, 0x22, 0x7E, 0x54,
    ];

    fn record(sps: &[u8]) -> Bytes {
        let mut data = vec![0x01, sps[1], sps[2], sps[3], 0xFF, 0xE1];
        data.extend_from_slice(&(sps.len() as u16).to_be_bytes());
        data.extend_from_slice(sps);
        data.extend_from_slice(&[0x01, 0x00, 0x04, 0x68, 0xCE, 0x3C, 0x80]);
        Bytes::from(data)
    }

    #[test]
    fn test_avc_config_parse() {
        let config = AvcConfig::parse(record(SPS_320X240)).unwrap();
        assert_eq!(config.profile, 0x42);
        assert_eq!(config.level, 0x0D);
        assert_eq!(config.nalu_length_size, 4);
        assert_eq!(config.sps.len(), 1);
        assert_eq!(config.pps.len(), 1);
        assert_eq!(&config.pps[0][..], &[0x68, 0xCE, 0x3C, 0x80]);
    }

    #[test]
    fn test_avc_config_dimensions() {
        let config = AvcConfig::parse(record(SPS_320X240)).unwrap();
        assert_eq!(config.dimensions(), Some((320, 240)));
    }

    #[test]
    fn test_high_profile_cropped_dimensions() {
        assert_eq!(sps_dimensions(SPS_1920X1080), Some((1920, 1080)));
    }

    #[test]
    fn test_avc_config_invalid_version() {
        let data = Bytes::from_static(&[0x02, 0x64, 0x00, 0x1F, 0xFF, 0xE0, 0x00]);
        assert_eq!(AvcConfig::parse(data).unwrap_err(), MediaError::InvalidAvcPacket);
    }

    #[test]
    fn test_avc_config_too_short() {
        let data = Bytes::from_static(&[0x01, 0x64, 0x00]);
        assert!(AvcConfig::parse(data).is_err());
    }

    #[test]
    fn test_avc_config_truncated_sps() {
        let data = Bytes::from_static(&[0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x10, 0x67]);
        assert!(AvcConfig::parse(data).is_err());
    }

    #[test]
    fn test_sps_dimensions_rejects_non_sps() {
        assert_eq!(sps_dimensions(&[0x68, 0xCE, 0x3C, 0x80]), None);
        assert_eq!(sps_dimensions(&[]), None);
    }

    #[test]
    fn test_emulation_prevention_removed() {
        assert_eq!(
            strip_emulation_prevention(&[0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03]),
            vec![0x00, 0x00, 0x01, 0x00, 0x00]
        );
    }
}
