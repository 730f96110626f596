use crate::error::CaptionError;

use super::track::CaptionTrack;

/// Join per-segment tracks into one continuous track.
///
/// Segment `i` is shifted by `i * segment_minutes` and renumbered to follow
/// the last index emitted before it. An empty segment contributes nothing and
/// the running index carries past it unchanged. Tracks must be given in
/// segment order.
pub fn merge_segments<I>(tracks: I, segment_minutes: u32) -> Result<CaptionTrack, CaptionError>
where
    I: IntoIterator<Item = CaptionTrack>,
{
    let mut merged = CaptionTrack::new();
    let mut index_offset = 0;

    for (segment, mut track) in tracks.into_iter().enumerate() {
        if track.is_empty() {
            tracing::warn!(segment, "segment has no captions, carrying index {index_offset}");
            continue;
        }

        let time_offset = u32::try_from(segment)
            .ok()
            .and_then(|n| n.checked_mul(segment_minutes))
            .ok_or(CaptionError::SegmentOffsetOverflow {
                segment,
                segment_minutes,
            })?;
        track.offset(index_offset, time_offset)?;
        if let Some(last) = track.last_index() {
            index_offset = last;
        }
        tracing::debug!(
            segment,
            records = track.len(),
            time_offset,
            "merged segment"
        );
        for record in track {
            merged.push(record);
        }
    }

    Ok(merged)
}
