//! HLS playlist generation (§4.H): a pure function over duration and bitrate,
//! no filesystem or process access — the per-segment bytes come from
//! `Transcoder::transcode_hls_segment` instead.

const DEFAULT_SEGMENT_DURATION_SECS: u64 = 10;

/// Build an `#EXTM3U` media playlist referencing on-demand segments under
/// `./hls/<songId>/<index>.<codec>?bitRate=<bitrate>`.
pub fn build_playlist(
    song_id: &str,
    duration_secs: u64,
    bitrate_kbps: Option<u32>,
    codec: &str,
    segment_duration_secs: Option<u64>,
) -> String {
    let segment_duration_secs = match segment_duration_secs {
        Some(0) | None => DEFAULT_SEGMENT_DURATION_SECS,
        Some(secs) => secs,
    };
    let segment_count = duration_secs.div_ceil(segment_duration_secs).max(1);
    let bitrate = bitrate_kbps.unwrap_or(0);

    let mut out = String::new();
    out.push_str("#EXTM3U\n");
    out.push_str("#EXT-X-VERSION:3\n");
    out.push_str(&format!("#EXT-X-TARGETDURATION:{segment_duration_secs}\n"));
    out.push_str("#EXT-X-MEDIA-SEQUENCE:0\n");

    for index in 0..segment_count {
        let elapsed = index * segment_duration_secs;
        let segment_len = duration_secs.saturating_sub(elapsed).min(segment_duration_secs);
        out.push_str(&format!("#EXTINF:{segment_len}.0,\n"));
        out.push_str(&format!("./hls/{song_id}/{index}.{codec}?bitRate={bitrate}\n"));
    }

    out.push_str("#EXT-X-ENDLIST\n");
    out
}
