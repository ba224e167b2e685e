//! In-place geometry patches for an init segment
//!
//! Both patches rewrite the transformation matrix of the video track's
//! `tkhd`. Entries `a b u / c d v / x y w` are 16.16 fixed point except
//! `u`, `v` and `w`, which are 2.30.

use super::boxes::{find_box, TKHD_MATRIX_OFFSET};

const ONE: i32 = 0x0001_0000;
const W_ONE: i32 = 0x4000_0000;

/// Locate the matrix of the first video track's `tkhd`
fn video_matrix_offset(init: &[u8]) -> Option<usize> {
    let moov = find_box(init, b"moov")?;
    let mut pos = moov.start + 8;

    while pos < moov.end {
        let child = find_box(&init[pos..moov.end], b"trak")?;
        let trak = pos + child.start..pos + child.end;
        let body = trak.start + 8;

        let is_video = find_box(&init[body..trak.end], b"mdia")
            .and_then(|mdia| {
                let mdia = body + mdia.start + 8..body + mdia.end;
                find_box(&init[mdia.clone()], b"hdlr").map(|h| mdia.start + h.start)
            })
            .map(|hdlr| init.get(hdlr + 16..hdlr + 20) == Some(b"vide".as_slice()))
            .unwrap_or(false);

        if is_video {
            let tkhd = find_box(&init[body..trak.end], b"tkhd")?;
            let offset = body + tkhd.start + TKHD_MATRIX_OFFSET;
            if offset + 36 <= body + tkhd.end {
                return Some(offset);
            }
            return None;
        }
        pos = trak.end;
    }
    None
}

fn read_matrix(init: &[u8], offset: usize) -> [i32; 9] {
    let mut m = [0i32; 9];
    for (i, v) in m.iter_mut().enumerate() {
        let p = offset + i * 4;
        *v = i32::from_be_bytes([init[p], init[p + 1], init[p + 2], init[p + 3]]);
    }
    m
}

fn write_matrix(init: &mut [u8], offset: usize, m: &[i32; 9]) {
    for (i, v) in m.iter().enumerate() {
        let p = offset + i * 4;
        init[p..p + 4].copy_from_slice(&v.to_be_bytes());
    }
}

/// Set the video track rotation to 90, 180 or 270 degrees clockwise.
///
/// Other angles leave the segment untouched. Returns whether a matrix was
/// written.
pub fn patch_video_rotate(init: &mut [u8], degrees: i32) -> bool {
    let matrix = match degrees {
        90 => [0, ONE, 0, -ONE, 0, 0, 0, 0, W_ONE],
        180 => [-ONE, 0, 0, 0, -ONE, 0, 0, 0, W_ONE],
        270 => [0, -ONE, 0, ONE, 0, 0, 0, 0, W_ONE],
        _ => return false,
    };

    match video_matrix_offset(init) {
        Some(offset) => {
            write_matrix(init, offset, &matrix);
            true
        }
        None => false,
    }
}

/// Scale the video track by `sx` horizontally and `sy` vertically.
///
/// Applied on top of any rotation already in the matrix. Non-positive
/// factors leave the segment untouched.
pub fn patch_video_scale(init: &mut [u8], sx: i32, sy: i32) -> bool {
    if sx <= 0 || sy <= 0 {
        return false;
    }
    let Some(offset) = video_matrix_offset(init) else {
        return false;
    };

    let mut m = read_matrix(init, offset);
    m[0] = m[0].saturating_mul(sx);
    m[1] = m[1].saturating_mul(sx);
    m[3] = m[3].saturating_mul(sy);
    m[4] = m[4].saturating_mul(sy);
    write_matrix(init, offset, &m);
    true
}
