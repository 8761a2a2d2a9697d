//! Run lists (mapping pairs) of non-resident attributes.

use super::attr::NonResident;
use crate::format::locator::{Extent, ExtentMap};
use crate::{Error, Result};

fn signed_le(bytes: &[u8]) -> i64 {
    let mut value = 0i64;
    for (i, &b) in bytes.iter().enumerate() {
        value |= (b as i64) << (8 * i);
    }
    let bits = 8 * bytes.len();
    if bits > 0 && bits < 64 && bytes[bytes.len() - 1] & 0x80 != 0 {
        value -= 1i64 << bits;
    }
    value
}

/// Decodes a run list starting at `start_vcn`.
///
/// Each run is a header byte (low nibble: width of the length, high nibble:
/// width of the signed LCN delta) followed by the two fields. A zero header
/// ends the list; a zero-width delta marks a sparse run.
pub fn decode_runlist(bytes: &[u8], start_vcn: u64) -> Result<Vec<Extent>> {
    let mut runs = Vec::new();
    let mut pos = 0usize;
    let mut vcn = start_vcn;
    let mut lcn = 0i64;
    while let Some(&header) = bytes.get(pos) {
        if header == 0 {
            return Ok(runs);
        }
        let len_size = (header & 0x0F) as usize;
        let off_size = (header >> 4) as usize;
        if len_size == 0 || len_size > 8 || off_size > 8 {
            return Err(Error::corrupt_header(pos as u64, "bad run header"));
        }
        let body = bytes
            .get(pos + 1..pos + 1 + len_size + off_size)
            .ok_or_else(|| Error::corrupt_header(pos as u64, "run list truncated"))?;
        let clusters = signed_le(&body[..len_size]);
        if clusters <= 0 {
            return Err(Error::corrupt_header(pos as u64, "run of non-positive length"));
        }
        let run_lcn = if off_size == 0 {
            None
        } else {
            lcn = lcn
                .checked_add(signed_le(&body[len_size..]))
                .filter(|&l| l >= 0)
                .ok_or_else(|| Error::corrupt_header(pos as u64, "run points before the volume"))?;
            Some(lcn as u64)
        };
        runs.push(Extent {
            vcn,
            lcn: run_lcn,
            clusters: clusters as u64,
        });
        vcn = vcn
            .checked_add(clusters as u64)
            .ok_or_else(|| Error::corrupt_header(pos as u64, "run list length overflow"))?;
        pos += 1 + len_size + off_size;
    }
    Err(Error::corrupt_header(pos as u64, "run list has no terminator"))
}

/// Builds the extent map of one stream from its attribute parts.
///
/// Parts may come from several records; the one starting at VCN 0 carries
/// the sizes. The combined runs must cover the allocated size exactly.
pub fn stream_map(parts: &[&NonResident], cluster_size: u64) -> Result<ExtentMap> {
    let mut parts: Vec<&NonResident> = parts.to_vec();
    parts.sort_by_key(|p| p.lowest_vcn);
    let first = parts
        .first()
        .filter(|p| p.lowest_vcn == 0)
        .ok_or_else(|| Error::corrupt_header(0, "stream has no part at VCN 0"))?;

    let mut extents = Vec::new();
    for part in &parts {
        let runs = decode_runlist(&part.mapping, part.lowest_vcn)?;
        let end = runs.last().map_or(part.lowest_vcn, |r| r.vcn + r.clusters);
        if !runs.is_empty() && end != part.highest_vcn.wrapping_add(1) {
            log::debug!(
                "run list ends at vcn {end}, header says {}",
                part.highest_vcn
            );
        }
        extents.extend(runs);
    }
    let mut map = ExtentMap::new(extents, cluster_size, 0, first.data_size);
    map.initialized_size = first.initialized_size.min(first.data_size);
    map.compression_unit = if first.is_compressed() {
        first.compression_unit
    } else {
        0
    };
    map.check_conservation(first.allocated_size)?;
    Ok(map)
}
