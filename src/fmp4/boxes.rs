//! ISO BMFF box writers
//!
//! Every box is `size (u32 BE) | type (4 ASCII bytes) | content`. Writers
//! reserve the size field, append content, then patch the size in place.

use bytes::{BufMut, BytesMut};

use crate::media::{Codec, Media, MediaKind};

/// Movie timescale used for `mvhd`; tracks use their own clock rate
pub const MOVIE_TIMESCALE: u32 = 1000;

/// Sample flags for a sync sample (`sample_depends_on = 2`)
pub const SAMPLE_FLAGS_SYNC: u32 = 0x0200_0000;

/// Sample flags for a non-sync sample (`sample_depends_on = 1`, non-sync bit)
pub const SAMPLE_FLAGS_NON_SYNC: u32 = 0x0101_0000;

/// Offset of the transformation matrix inside a version 0 `tkhd`
pub const TKHD_MATRIX_OFFSET: usize = 48;

const IDENTITY_MATRIX: [u32; 9] = [
    0x0001_0000,
    0,
    0,
    0,
    0x0001_0000,
    0,
    0,
    0,
    0x4000_0000,
];

/// Start a box, returning the position of its size field
fn begin(buf: &mut BytesMut, box_type: &[u8; 4]) -> usize {
    let start = buf.len();
    buf.put_u32(0);
    buf.put_slice(box_type);
    start
}

/// Start a full box (version + 24-bit flags)
fn begin_full(buf: &mut BytesMut, box_type: &[u8; 4], version: u8, flags: u32) -> usize {
    let start = begin(buf, box_type);
    buf.put_u32(((version as u32) << 24) | (flags & 0x00FF_FFFF));
    start
}

/// Patch the size field of the box started at `start`
fn end(buf: &mut BytesMut, start: usize) {
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

/// One track of the init segment
#[derive(Debug, Clone)]
pub struct TrackInfo<'a> {
    pub id: u32,
    pub media: &'a Media,
}

pub fn write_ftyp(buf: &mut BytesMut) {
    let start = begin(buf, b"ftyp");
    buf.put_slice(b"iso5");
    buf.put_u32(0x200);
    buf.put_slice(b"iso5");
    buf.put_slice(b"iso6");
    buf.put_slice(b"mp41");
    end(buf, start);
}

pub fn write_moov(buf: &mut BytesMut, tracks: &[TrackInfo<'_>]) {
    let start = begin(buf, b"moov");
    write_mvhd(buf, tracks.len() as u32 + 1);
    for track in tracks {
        write_trak(buf, track);
    }

    let mvex = begin(buf, b"mvex");
    for track in tracks {
        write_trex(buf, track.id);
    }
    end(buf, mvex);

    end(buf, start);
}

fn write_mvhd(buf: &mut BytesMut, next_track_id: u32) {
    let start = begin_full(buf, b"mvhd", 0, 0);
    buf.put_u32(0); // creation_time
    buf.put_u32(0); // modification_time
    buf.put_u32(MOVIE_TIMESCALE);
    buf.put_u32(0); // duration
    buf.put_u32(0x0001_0000); // rate 1.0
    buf.put_u16(0x0100); // volume 1.0
    buf.put_bytes(0, 10);
    for value in IDENTITY_MATRIX {
        buf.put_u32(value);
    }
    buf.put_bytes(0, 24); // pre_defined
    buf.put_u32(next_track_id);
    end(buf, start);
}

fn write_trak(buf: &mut BytesMut, track: &TrackInfo<'_>) {
    let start = begin(buf, b"trak");
    write_tkhd(buf, track);

    let mdia = begin(buf, b"mdia");
    write_mdhd(buf, track.media.clock_rate);
    match track.media.kind() {
        MediaKind::Video => write_hdlr(buf, b"vide", b"VideoHandler"),
        MediaKind::Audio => write_hdlr(buf, b"soun", b"SoundHandler"),
    }

    let minf = begin(buf, b"minf");
    match track.media.kind() {
        MediaKind::Video => write_vmhd(buf),
        MediaKind::Audio => write_smhd(buf),
    }
    write_dinf(buf);
    write_stbl(buf, track.media);
    end(buf, minf);

    end(buf, mdia);
    end(buf, start);
}

fn write_tkhd(buf: &mut BytesMut, track: &TrackInfo<'_>) {
    let is_video = track.media.kind() == MediaKind::Video;

    // enabled | in_movie | in_preview
    let start = begin_full(buf, b"tkhd", 0, 7);
    buf.put_u32(0); // creation_time
    buf.put_u32(0); // modification_time
    buf.put_u32(track.id);
    buf.put_u32(0); // reserved
    buf.put_u32(0); // duration
    buf.put_bytes(0, 8);
    buf.put_u16(0); // layer
    buf.put_u16(0); // alternate_group
    buf.put_u16(if is_video { 0 } else { 0x0100 });
    buf.put_u16(0);
    for value in IDENTITY_MATRIX {
        buf.put_u32(value);
    }
    if is_video {
        buf.put_u32(track.media.width << 16);
        buf.put_u32(track.media.height << 16);
    } else {
        buf.put_u32(0);
        buf.put_u32(0);
    }
    end(buf, start);
}

fn write_mdhd(buf: &mut BytesMut, timescale: u32) {
    let start = begin_full(buf, b"mdhd", 0, 0);
    buf.put_u32(0); // creation_time
    buf.put_u32(0); // modification_time
    buf.put_u32(timescale);
    buf.put_u32(0); // duration
    buf.put_u16(0x55C4); // language "und"
    buf.put_u16(0);
    end(buf, start);
}

fn write_hdlr(buf: &mut BytesMut, handler_type: &[u8; 4], name: &[u8]) {
    let start = begin_full(buf, b"hdlr", 0, 0);
    buf.put_u32(0); // pre_defined
    buf.put_slice(handler_type);
    buf.put_bytes(0, 12);
    buf.put_slice(name);
    buf.put_u8(0);
    end(buf, start);
}

fn write_vmhd(buf: &mut BytesMut) {
    let start = begin_full(buf, b"vmhd", 0, 1);
    buf.put_u16(0); // graphicsmode
    buf.put_bytes(0, 6); // opcolor
    end(buf, start);
}

fn write_smhd(buf: &mut BytesMut) {
    let start = begin_full(buf, b"smhd", 0, 0);
    buf.put_u16(0); // balance
    buf.put_u16(0);
    end(buf, start);
}

fn write_dinf(buf: &mut BytesMut) {
    let dinf = begin(buf, b"dinf");
    let dref = begin_full(buf, b"dref", 0, 0);
    buf.put_u32(1);
    // self-contained
    let url = begin_full(buf, b"url ", 0, 1);
    end(buf, url);
    end(buf, dref);
    end(buf, dinf);
}

fn write_stbl(buf: &mut BytesMut, media: &Media) {
    let start = begin(buf, b"stbl");

    let stsd = begin_full(buf, b"stsd", 0, 0);
    buf.put_u32(1);
    match media.codec {
        Codec::H264 => write_visual_entry(buf, b"avc1", b"avcC", media),
        Codec::H265 => write_visual_entry(buf, b"hvc1", b"hvcC", media),
        Codec::Aac => write_mp4a(buf, media),
        Codec::Jpeg => {}
    }
    end(buf, stsd);

    for box_type in [b"stts", b"stsc", b"stco"] {
        let table = begin_full(buf, box_type, 0, 0);
        buf.put_u32(0); // entry_count
        end(buf, table);
    }

    let stsz = begin_full(buf, b"stsz", 0, 0);
    buf.put_u32(0); // sample_size
    buf.put_u32(0); // sample_count
    end(buf, stsz);

    end(buf, start);
}

fn write_visual_entry(
    buf: &mut BytesMut,
    entry_type: &[u8; 4],
    config_type: &[u8; 4],
    media: &Media,
) {
    let start = begin(buf, entry_type);
    buf.put_bytes(0, 6);
    buf.put_u16(1); // data_reference_index
    buf.put_bytes(0, 16);
    buf.put_u16(media.width as u16);
    buf.put_u16(media.height as u16);
    buf.put_u32(0x0048_0000); // 72 dpi
    buf.put_u32(0x0048_0000);
    buf.put_u32(0);
    buf.put_u16(1); // frame_count
    buf.put_bytes(0, 32); // compressorname
    buf.put_u16(0x0018); // depth
    buf.put_i16(-1);

    if !media.config.is_empty() {
        let config = begin(buf, config_type);
        buf.put_slice(&media.config);
        end(buf, config);
    }
    end(buf, start);
}

fn write_mp4a(buf: &mut BytesMut, media: &Media) {
    let start = begin(buf, b"mp4a");
    buf.put_bytes(0, 6);
    buf.put_u16(1); // data_reference_index
    buf.put_bytes(0, 8);
    buf.put_u16(media.channels);
    buf.put_u16(16); // samplesize
    buf.put_u32(0);
    // 16.16, rates above 65535 do not fit
    buf.put_u32((media.clock_rate.min(0xFFFF)) << 16);
    write_esds(buf, &media.config);
    end(buf, start);
}

/// Elementary stream descriptor wrapping an AudioSpecificConfig
fn write_esds(buf: &mut BytesMut, config: &[u8]) {
    let mut decoder_specific = BytesMut::new();
    put_descriptor(&mut decoder_specific, 0x05, config);

    let mut decoder_config = BytesMut::new();
    decoder_config.put_u8(0x40); // MPEG-4 audio
    decoder_config.put_u8(0x15); // audio stream
    decoder_config.put_bytes(0, 3); // bufferSizeDB
    decoder_config.put_u32(0); // maxBitrate
    decoder_config.put_u32(0); // avgBitrate
    decoder_config.put_slice(&decoder_specific);

    let mut es = BytesMut::new();
    es.put_u16(0); // ES_ID
    es.put_u8(0);
    put_descriptor(&mut es, 0x04, &decoder_config);
    put_descriptor(&mut es, 0x06, &[0x02]);

    let start = begin_full(buf, b"esds", 0, 0);
    put_descriptor(buf, 0x03, &es);
    end(buf, start);
}

fn put_descriptor(buf: &mut BytesMut, tag: u8, body: &[u8]) {
    buf.put_u8(tag);
    let len = body.len() as u32;
    if len < 0x80 {
        buf.put_u8(len as u8);
    } else {
        buf.put_u8(0x80 | ((len >> 21) & 0x7F) as u8);
        buf.put_u8(0x80 | ((len >> 14) & 0x7F) as u8);
        buf.put_u8(0x80 | ((len >> 7) & 0x7F) as u8);
        buf.put_u8((len & 0x7F) as u8);
    }
    buf.put_slice(body);
}

fn write_trex(buf: &mut BytesMut, track_id: u32) {
    let start = begin_full(buf, b"trex", 0, 0);
    buf.put_u32(track_id);
    buf.put_u32(1); // default_sample_description_index
    buf.put_u32(0); // default_sample_duration
    buf.put_u32(0); // default_sample_size
    buf.put_u32(0); // default_sample_flags
    end(buf, start);
}

/// One sample run for a single-sample fragment
#[derive(Debug, Clone, Copy)]
pub struct FragmentSample {
    pub track_id: u32,
    pub sequence: u32,
    pub decode_time: u64,
    pub duration: u32,
    pub keyframe: bool,
}

/// Write `moof` + `mdat` carrying one sample
pub fn write_fragment(buf: &mut BytesMut, sample: FragmentSample, data: &[u8]) {
    let moof = begin(buf, b"moof");

    let mfhd = begin_full(buf, b"mfhd", 0, 0);
    buf.put_u32(sample.sequence);
    end(buf, mfhd);

    let traf = begin(buf, b"traf");

    // default-base-is-moof
    let tfhd = begin_full(buf, b"tfhd", 0, 0x02_0000);
    buf.put_u32(sample.track_id);
    end(buf, tfhd);

    let tfdt = begin_full(buf, b"tfdt", 1, 0);
    buf.put_u64(sample.decode_time);
    end(buf, tfdt);

    // data-offset | sample-duration | sample-size | sample-flags
    let trun = begin_full(buf, b"trun", 0, 0x00_0001 | 0x00_0100 | 0x00_0200 | 0x00_0400);
    buf.put_u32(1); // sample_count
    let data_offset_pos = buf.len();
    buf.put_u32(0);
    buf.put_u32(sample.duration);
    buf.put_u32(data.len() as u32);
    buf.put_u32(if sample.keyframe {
        SAMPLE_FLAGS_SYNC
    } else {
        SAMPLE_FLAGS_NON_SYNC
    });
    end(buf, trun);

    end(buf, traf);
    end(buf, moof);

    // Relative to the start of moof, pointing past the mdat header
    let data_offset = (buf.len() - moof + 8) as u32;
    buf[data_offset_pos..data_offset_pos + 4].copy_from_slice(&data_offset.to_be_bytes());

    buf.put_u32((data.len() + 8) as u32);
    buf.put_slice(b"mdat");
    buf.put_slice(data);
}

/// Find the first child box of `box_type` inside `data`, returning its range
pub fn find_box(data: &[u8], box_type: &[u8; 4]) -> Option<std::ops::Range<usize>> {
    let mut pos = 0;
    while pos + 8 <= data.len() {
        let size = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
            as usize;
        if size < 8 || pos + size > data.len() {
            return None;
        }
        if &data[pos + 4..pos + 8] == box_type {
            return Some(pos..pos + size);
        }
        pos += size;
    }
    None
}
