//! Windowed chunk segmentation.
//!
//! Segments accumulate in a running buffer until adding the next segment
//! would overrun the token budget, or the speaker changes. Closing a
//! buffer emits a chunk; with a non-zero overlap budget, a tail slice of
//! the closed buffer seeds the next one so context survives the boundary.

use tracing::debug;
use ulid::Ulid;

use scribe_core::{Chunk, ChunkingConfig, Segment};

/// Build retrieval chunks from an ordered segment sequence.
///
/// Segments whose text is empty after trimming are skipped. A single
/// segment larger than `max_tokens` still becomes its own chunk;
/// segments are never split. An empty or unchunkable input yields an
/// empty vector, not an error.
pub fn build_chunks(
    segments: &[Segment],
    source_id: Option<&str>,
    config: &ChunkingConfig,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut buf: Vec<Segment> = Vec::new();
    let mut tokens = 0usize;
    let mut current_speaker: Option<String> = None;

    for seg in segments {
        let text = seg.text.trim();
        if text.is_empty() {
            continue;
        }
        let seg_tokens = seg.token_count();

        let overruns = tokens + seg_tokens > config.max_tokens;
        let speaker_changed = current_speaker
            .as_deref()
            .is_some_and(|s| s != seg.speaker);

        if !buf.is_empty() && (overruns || speaker_changed) {
            chunks.push(close_buffer(&buf, source_id));

            if config.overlap_tokens > 0 {
                buf = retain_tail(&buf, config.overlap_tokens);
                tokens = buf.iter().map(Segment::token_count).sum();
            } else {
                buf.clear();
                tokens = 0;
            }
        }

        buf.push(seg.clone());
        tokens += seg_tokens;
        current_speaker = Some(seg.speaker.clone());
    }

    if !buf.is_empty() {
        chunks.push(close_buffer(&buf, source_id));
    }

    debug!(
        chunks = chunks.len(),
        segments = segments.len(),
        "chunked segment sequence"
    );

    chunks
}

/// Emit a chunk from the buffered segments.
fn close_buffer(buf: &[Segment], source_id: Option<&str>) -> Chunk {
    let text = buf
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let confidence =
        buf.iter().map(Segment::confidence).sum::<f32>() / buf.len().max(1) as f32;

    Chunk {
        id: Ulid::new(),
        source_id: source_id.map(String::from),
        start_time: buf[0].start_time,
        end_time: buf[buf.len() - 1].end_time,
        speaker: dominant_speaker(buf),
        text,
        validation_confidence: confidence,
        topic_tags: Vec::new(),
        entities: Vec::new(),
    }
}

/// Most frequent speaker in the buffer; first-seen wins a tie. Overlap
/// seeding can leave a minority of the previous speaker's segments at
/// the head of the buffer, so this is not always `buf.last()`.
fn dominant_speaker(buf: &[Segment]) -> String {
    let mut counts: Vec<(&str, usize)> = Vec::new();

    for seg in buf {
        match counts.iter_mut().find(|(s, _)| *s == seg.speaker) {
            Some((_, n)) => *n += 1,
            None => counts.push((&seg.speaker, 1)),
        }
    }

    counts
        .iter()
        .max_by_key(|(_, n)| *n)
        .map(|(s, _)| s.to_string())
        .unwrap_or_else(|| scribe_core::DEFAULT_SPEAKER.to_string())
}

/// Walk backward from the end of the buffer until the cumulative token
/// count reaches the overlap budget, returning that tail slice.
fn retain_tail(buf: &[Segment], overlap_tokens: usize) -> Vec<Segment> {
    let mut retained: Vec<Segment> = Vec::new();
    let mut tokens = 0usize;

    for seg in buf.iter().rev() {
        tokens += seg.token_count();
        retained.insert(0, seg.clone());
        if tokens >= overlap_tokens {
            break;
        }
    }

    retained
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, speaker: &str, text: &str) -> Segment {
        Segment {
            start_time: start,
            end_time: end,
            speaker: speaker.into(),
            text: text.into(),
            confidence_medical: 0.9,
            confidence_contextual: 0.8,
        }
    }

    fn config(max_tokens: usize, overlap_tokens: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_tokens,
            overlap_tokens,
        }
    }

    #[test]
    fn test_single_speaker_under_budget_is_one_chunk() {
        let segments = vec![
            seg(0.0, 1.0, "clinician", "how are you feeling"),
            seg(1.0, 2.0, "clinician", "any new symptoms today"),
        ];

        let chunks = build_chunks(&segments, Some("visit-1"), &config(100, 0));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_time, 0.0);
        assert_eq!(chunks[0].end_time, 2.0);
        assert_eq!(chunks[0].speaker, "clinician");
        assert_eq!(
            chunks[0].text,
            "how are you feeling any new symptoms today"
        );
        assert_eq!(chunks[0].source_id.as_deref(), Some("visit-1"));
    }

    #[test]
    fn test_validation_confidence_is_mean_of_segment_means() {
        let segments = vec![
            seg(0.0, 1.0, "a", "one"),
            seg(1.0, 2.0, "a", "two"),
        ];

        let chunks = build_chunks(&segments, None, &config(100, 0));

        // Each segment's mean is (0.9 + 0.8) / 2 = 0.85.
        assert!((chunks[0].validation_confidence - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_token_budget_forces_boundary() {
        let segments = vec![
            seg(0.0, 1.0, "a", "one two three"),
            seg(1.0, 2.0, "a", "four five six"),
            seg(2.0, 3.0, "a", "seven eight nine"),
        ];

        let chunks = build_chunks(&segments, None, &config(4, 0));

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "one two three");
        assert_eq!(chunks[1].text, "four five six");
    }

    #[test]
    fn test_speaker_change_forces_boundary() {
        let segments = vec![
            seg(0.0, 1.0, "clinician", "describe the exposure"),
            seg(1.0, 2.0, "patient", "water damage in the basement"),
        ];

        let chunks = build_chunks(&segments, None, &config(1000, 0));

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].speaker, "clinician");
        assert_eq!(chunks[1].speaker, "patient");
    }

    #[test]
    fn test_zero_overlap_shares_no_segments() {
        let segments = vec![
            seg(0.0, 1.0, "a", "alpha beta"),
            seg(1.0, 2.0, "a", "gamma delta"),
            seg(2.0, 3.0, "a", "epsilon zeta"),
        ];

        let chunks = build_chunks(&segments, None, &config(3, 0));

        assert_eq!(chunks.len(), 3);
        for pair in chunks.windows(2) {
            for word in pair[0].text.split_whitespace() {
                assert!(!pair[1].text.contains(word));
            }
        }
    }

    #[test]
    fn test_overlap_reseeds_tail_segments() {
        let segments = vec![
            seg(0.0, 1.0, "a", "alpha beta"),
            seg(1.0, 2.0, "a", "gamma delta"),
            seg(2.0, 3.0, "a", "epsilon zeta"),
        ];

        // Budget of 4 closes after two segments; overlap 2 carries the
        // second segment into the next buffer.
        let chunks = build_chunks(&segments, None, &config(4, 2));

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "alpha beta gamma delta");
        assert_eq!(chunks[1].text, "gamma delta epsilon zeta");
        assert_eq!(chunks[1].start_time, 1.0);
    }

    #[test]
    fn test_oversized_segment_is_never_split() {
        let segments = vec![seg(
            0.0,
            5.0,
            "patient",
            "one two three four five six seven eight nine ten",
        )];

        let chunks = build_chunks(&segments, None, &config(3, 0));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].token_count(), 10);
    }

    #[test]
    fn test_blank_segments_are_skipped() {
        let segments = vec![
            seg(0.0, 1.0, "a", "   "),
            seg(1.0, 2.0, "a", "real content"),
            seg(2.0, 3.0, "a", ""),
        ];

        let chunks = build_chunks(&segments, None, &config(100, 0));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "real content");
        assert_eq!(chunks[0].start_time, 1.0);
        assert_eq!(chunks[0].end_time, 2.0);
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(build_chunks(&[], None, &config(100, 0)).is_empty());

        let all_blank = vec![seg(0.0, 1.0, "a", "  ")];
        assert!(build_chunks(&all_blank, None, &config(100, 0)).is_empty());
    }

    #[test]
    fn test_rechunking_produces_fresh_ids() {
        let segments = vec![seg(0.0, 1.0, "a", "stable content")];

        let first = build_chunks(&segments, None, &config(100, 0));
        let second = build_chunks(&segments, None, &config(100, 0));

        assert_ne!(first[0].id, second[0].id);
        assert_eq!(first[0].text, second[0].text);
    }

    #[test]
    fn test_dominant_speaker_with_overlap_seed() {
        // Overlap carries one "patient" segment into a buffer that then
        // accumulates two "patient" + later closes on budget; dominant
        // speaker must reflect the majority, not just the last segment.
        let segments = vec![
            seg(0.0, 1.0, "patient", "alpha beta"),
            seg(1.0, 2.0, "patient", "gamma delta"),
            seg(2.0, 3.0, "clinician", "epsilon zeta"),
        ];

        let chunks = build_chunks(&segments, None, &config(100, 2));

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].speaker, "patient");
        // Second buffer: ["gamma delta" (patient), "epsilon zeta" (clinician)];
        // first-seen wins the tie.
        assert_eq!(chunks[1].speaker, "patient");
    }
}
