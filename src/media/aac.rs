//! AAC configuration parsing
//!
//! FLV carries the AudioSpecificConfig in the AAC sequence header tag
//! (`AACPacketType == 0`). Raw ADTS streams carry the same fields in every
//! frame header, from which an equivalent config is rebuilt.

use bytes::Bytes;

use crate::error::MediaError;

/// samplingFrequencyIndex table, ISO 14496-3
const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// MPEG-4 AudioSpecificConfig
#[derive(Debug, Clone)]
pub struct AudioSpecificConfig {
    /// Audio object type (2 = AAC LC)
    pub audio_object_type: u8,
    pub sampling_frequency_index: u8,
    /// Hz, from the table or the explicit 24-bit field
    pub sampling_frequency: u32,
    pub channel_configuration: u8,
    /// Config bytes as carried, written into `esds`
    pub raw: Bytes,
}

impl AudioSpecificConfig {
    /// Parse a config record, keeping `data` as [`raw`](Self::raw)
    pub fn parse(data: Bytes) -> Result<Self, MediaError> {
        if data.len() < 2 {
            return Err(MediaError::InvalidAacPacket);
        }

        // audioObjectType: 5 bits, samplingFrequencyIndex: 4 bits,
        // [samplingFrequency: 24 bits], channelConfiguration: 4 bits
        let (b0, b1) = (data[0], data[1]);
        let audio_object_type = b0 >> 3;
        let sampling_frequency_index = ((b0 & 0x07) << 1) | (b1 >> 7);

        let (sampling_frequency, channel_configuration) = if sampling_frequency_index == 0x0F {
            if data.len() < 5 {
                return Err(MediaError::InvalidAacPacket);
            }
            let explicit = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);
            ((explicit >> 7) & 0x00FF_FFFF, (data[4] >> 3) & 0x0F)
        } else {
            let frequency = *SAMPLING_FREQUENCIES
                .get(sampling_frequency_index as usize)
                .ok_or(MediaError::InvalidAacPacket)?;
            (frequency, (b1 >> 3) & 0x0F)
        };

        Ok(AudioSpecificConfig {
            audio_object_type,
            sampling_frequency_index,
            sampling_frequency,
            channel_configuration,
            raw: data,
        })
    }

    /// Rebuild a two-byte config from a 7-byte ADTS header
    pub fn from_adts(header: &[u8]) -> Result<Self, MediaError> {
        if header.len() < 7 || header[0] != 0xFF || header[1] & 0xF0 != 0xF0 {
            return Err(MediaError::InvalidAacPacket);
        }

        let object_type = ((header[2] >> 6) & 0x03) + 1;
        let frequency_index = (header[2] >> 2) & 0x0F;
        let channels = ((header[2] & 0x01) << 2) | ((header[3] >> 6) & 0x03);

        let raw = [
            (object_type << 3) | (frequency_index >> 1),
            ((frequency_index & 0x01) << 7) | (channels << 3),
        ];
        Self::parse(Bytes::copy_from_slice(&raw))
    }

    /// Output channels; configuration 7 is 7.1
    pub fn channels(&self) -> u16 {
        match self.channel_configuration {
            1..=6 => self.channel_configuration as u16,
            7 => 8,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_specific_config_parse() {
        // AAC LC, 44100 Hz, stereo
        let config = AudioSpecificConfig::parse(Bytes::from_static(&[0x12, 0x10])).unwrap();
        assert_eq!(config.audio_object_type, 2);
        assert_eq!(config.sampling_frequency_index, 4);
        assert_eq!(config.sampling_frequency, 44100);
        assert_eq!(config.channels(), 2);
    }

    #[test]
    fn test_audio_specific_config_48k_mono() {
        // AAC LC, 48000 Hz, mono
        let config = AudioSpecificConfig::parse(Bytes::from_static(&[0x11, 0x88])).unwrap();
        assert_eq!(config.sampling_frequency, 48000);
        assert_eq!(config.channels(), 1);
    }

    #[test]
    fn test_audio_specific_config_explicit_frequency() {
        // index 15, frequency 0x00AC44 (44100), stereo
        let data = Bytes::from_static(&[0x17, 0x80, 0x56, 0x22, 0x10]);
        let config = AudioSpecificConfig::parse(data).unwrap();
        assert_eq!(config.sampling_frequency, 44100);
        assert_eq!(config.channels(), 2);
    }

    #[test]
    fn test_audio_specific_config_too_short() {
        assert!(AudioSpecificConfig::parse(Bytes::from_static(&[0x12])).is_err());
    }

    #[test]
    fn test_reserved_frequency_index_rejected() {
        // index 13 is reserved
        assert!(AudioSpecificConfig::parse(Bytes::from_static(&[0x16, 0x90])).is_err());
    }

    #[test]
    fn test_from_adts_header() {
        // ADTS: MPEG-4, LC, 44100 Hz (index 4), stereo
        let header = [0xFF, 0xF1, 0x50, 0x80, 0x2E, 0x7F, 0xFC];
        let config = AudioSpecificConfig::from_adts(&header).unwrap();
        assert_eq!(config.audio_object_type, 2);
        assert_eq!(config.sampling_frequency, 44100);
        assert_eq!(config.channels(), 2);
        assert_eq!(&config.raw[..], &[0x12, 0x10]);
    }

    #[test]
    fn test_from_adts_rejects_missing_sync() {
        assert!(AudioSpecificConfig::from_adts(&[0x00, 0xF1, 0x50, 0x80, 0, 0, 0]).is_err());
    }
}
