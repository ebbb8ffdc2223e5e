//! Transcoding pipeline (§4.H): spawns `ffmpeg`, admits concurrent encoders
//! through a semaphore, tees output to a content-addressed cache, and hands
//! callers a byte stream.
//!
//! Grounded on the teacher's `enrichment::fingerprint` module — the async
//! generalization of its find-binary / spawn / check-exit-status shape, via
//! `tokio::process::Command` instead of the teacher's synchronous
//! `std::process::Command`. Concurrency admission is a
//! `tokio::sync::Semaphore`, already pulled in by the teacher's `tokio`
//! "sync" feature.

mod hls;

pub use hls::build_playlist;

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};

/// One transcode request (§4.H contract).
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub source_path: PathBuf,
    pub format: Option<String>,
    pub max_bitrate_kbps: Option<u32>,
    pub time_offset_sec: Option<f64>,
}

/// A byte stream from either the on-disk cache (already complete) or a live
/// encoder process being teed to cache as it runs.
pub enum TranscodeStream {
    Cached(Option<Vec<u8>>),
    Live(mpsc::Receiver<std::io::Result<Vec<u8>>>),
}

impl TranscodeStream {
    fn from_cached(data: Vec<u8>) -> Self {
        Self::Cached(Some(data))
    }

    fn from_channel(rx: mpsc::Receiver<std::io::Result<Vec<u8>>>) -> Self {
        Self::Live(rx)
    }
}

impl Stream for TranscodeStream {
    type Item = std::io::Result<Vec<u8>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut() {
            TranscodeStream::Cached(data) => Poll::Ready(data.take().map(Ok)),
            TranscodeStream::Live(rx) => rx.poll_recv(cx),
        }
    }
}

/// Long-lived transcoder service: one per process, shared across requests.
pub struct Transcoder {
    encoder_path: String,
    cache_dir: Option<PathBuf>,
    semaphore: Arc<Semaphore>,
}

impl Transcoder {
    pub fn new(config: &Config) -> Self {
        let cache_dir = (config.enable_transcoding_cache && !config.cache_path.as_os_str().is_empty())
            .then(|| config.cache_path.join("transcodes"));

        Self {
            encoder_path: config.transcoding.encoder_path.clone(),
            cache_dir,
            semaphore: Arc::new(Semaphore::new(config.transcoding.max_concurrent_encoders.max(1))),
        }
    }

    /// `Transcode(sourcePath, format?, maxBitrateKbps?, timeOffsetSec?, cancellation)` (§4.H).
    pub async fn transcode(
        &self,
        request: TranscodeRequest,
        cancellation: CancellationToken,
    ) -> Result<TranscodeStream> {
        let format = request.format.clone().unwrap_or_else(|| "mp3".to_string());
        let seeking = request.time_offset_sec.unwrap_or(0.0) > 0.0;

        if !seeking {
            if let Some(cache_dir) = &self.cache_dir {
                let key = cache_key(&request.source_path, request.format.as_deref(), request.max_bitrate_kbps);
                let cache_path = cache_dir.join(&key);
                if let Ok(data) = tokio::fs::read(&cache_path).await {
                    tracing::debug!("transcode cache hit for {key}");
                    return Ok(TranscodeStream::from_cached(data));
                }
            }
        }

        let permit = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                return Err(Error::transient("cancelled while waiting for an encoder slot"));
            }
            permit = self.semaphore.clone().acquire_owned() => {
                permit.map_err(|_| Error::transient("encoder semaphore closed"))?
            }
        };

        let (muxer, codec) = codec_for_format(&format);
        let args = build_args(
            &request,
            muxer,
            codec,
            bitrate_args(&format, request.max_bitrate_kbps),
            None,
        );

        let cache_paths = self.cache_dir.as_ref().map(|dir| {
            let key = cache_key(&request.source_path, request.format.as_deref(), request.max_bitrate_kbps);
            (dir.join(format!("{key}.tmp")), dir.join(key))
        });
        if let Some((_, final_path)) = &cache_paths {
            if let Some(parent) = final_path.parent() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
        }

        self.spawn_and_pump(&args, permit, cache_paths, cancellation).await
    }

    /// Same contract as `transcode`, but bounded to one HLS segment and
    /// never cached (§4.H "HLS segment transcoding").
    pub async fn transcode_hls_segment(
        &self,
        request: TranscodeRequest,
        segment_duration_secs: f64,
        cancellation: CancellationToken,
    ) -> Result<TranscodeStream> {
        let format = request.format.clone().unwrap_or_else(|| "mp3".to_string());

        let permit = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                return Err(Error::transient("cancelled while waiting for an encoder slot"));
            }
            permit = self.semaphore.clone().acquire_owned() => {
                permit.map_err(|_| Error::transient("encoder semaphore closed"))?
            }
        };

        let (muxer, codec) = segment_codec_for_format(&format);
        let args = build_args(
            &request,
            muxer,
            codec,
            bitrate_args(&format, request.max_bitrate_kbps),
            Some(segment_duration_secs),
        );

        self.spawn_and_pump(&args, permit, None, cancellation).await
    }

    async fn spawn_and_pump(
        &self,
        args: &[String],
        permit: OwnedSemaphorePermit,
        cache_paths: Option<(PathBuf, PathBuf)>,
        cancellation: CancellationToken,
    ) -> Result<TranscodeStream> {
        let mut child = match tokio::process::Command::new(&self.encoder_path)
            .args(args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                drop(permit);
                return Err(Error::transient(format!("failed to spawn encoder: {e}")));
            }
        };

        let stdout = child.stdout.take().expect("stdout piped at spawn");
        let stderr = child.stderr.take().expect("stderr piped at spawn");

        tokio::spawn(drain_stderr(stderr));

        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(pump(stdout, child, permit, cache_paths, cancellation, tx));

        Ok(TranscodeStream::from_channel(rx))
    }
}

/// `cacheKey = SHA256(sourcePath | format | maxBitrateKbps).hex + "." + (format ?? "mp3")`.
fn cache_key(source_path: &Path, format: Option<&str>, max_bitrate_kbps: Option<u32>) -> String {
    let key = format!(
        "{}|{}|{}",
        source_path.display(),
        format.unwrap_or(""),
        max_bitrate_kbps.map(|b| b.to_string()).unwrap_or_default(),
    );
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{hex}.{}", format.unwrap_or("mp3"))
}

fn codec_for_format(format: &str) -> (&'static str, &'static str) {
    match format {
        "mp3" => ("mp3", "libmp3lame"),
        "opus" => ("opus", "libopus"),
        "ogg" => ("ogg", "libvorbis"),
        "m4a" => ("ipod", "aac"),
        "flac" => ("flac", "flac"),
        _ => ("mp3", "libmp3lame"),
    }
}

/// HLS segments drop the `flac` row the main table has (flac doesn't stream
/// usefully in fixed-length segments) and fall back to a raw ADTS AAC
/// container instead of mp3 for anything unrecognized, matching the five
/// muxers §4.H's "HLS segment transcoding" note names: mp3/opus/ogg/ipod/adts.
fn segment_codec_for_format(format: &str) -> (&'static str, &'static str) {
    match format {
        "mp3" => ("mp3", "libmp3lame"),
        "opus" => ("opus", "libopus"),
        "ogg" => ("ogg", "libvorbis"),
        "m4a" => ("ipod", "aac"),
        _ => ("adts", "aac"),
    }
}

fn bitrate_args(format: &str, max_bitrate_kbps: Option<u32>) -> Vec<String> {
    if let Some(kbps) = max_bitrate_kbps {
        return vec!["-b:a".to_string(), format!("{kbps}k")];
    }
    match format {
        "mp3" => vec!["-q:a".to_string(), "2".to_string()],
        "opus" => vec!["-b:a".to_string(), "128k".to_string()],
        _ => vec![],
    }
}

fn build_args(
    request: &TranscodeRequest,
    muxer: &str,
    codec: &str,
    bitrate_args: Vec<String>,
    segment_duration_secs: Option<f64>,
) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ];

    if let Some(offset) = request.time_offset_sec {
        if offset > 0.0 {
            args.push("-ss".to_string());
            args.push(offset.to_string());
        }
    }

    args.push("-i".to_string());
    args.push(request.source_path.to_string_lossy().into_owned());

    args.push("-vn".to_string());
    args.push("-sn".to_string());
    args.push("-map_metadata".to_string());
    args.push("0".to_string());
    args.push("-map".to_string());
    args.push("0:a:0".to_string());
    args.push("-c:a".to_string());
    args.push(codec.to_string());
    args.extend(bitrate_args);

    if let Some(seconds) = segment_duration_secs {
        args.push("-t".to_string());
        args.push(seconds.to_string());
    }

    args.push("-f".to_string());
    args.push(muxer.to_string());
    args.push("pipe:1".to_string());
    args
}

async fn drain_stderr(mut stderr: tokio::process::ChildStderr) {
    let mut buf = Vec::new();
    if stderr.read_to_end(&mut buf).await.is_ok() && !buf.is_empty() {
        tracing::debug!("encoder stderr: {}", String::from_utf8_lossy(&buf));
    }
}

/// Owns the child process, the cache tee, and the semaphore permit for the
/// lifetime of one transcode. Whichever way this task exits — natural EOF,
/// cancellation, or a read error — it kills the child exactly once, waits
/// on it to avoid a zombie, and either finalizes or discards the cache temp
/// file before returning (§4.H step 5).
async fn pump(
    mut stdout: tokio::process::ChildStdout,
    mut child: Child,
    _permit: OwnedSemaphorePermit,
    cache_paths: Option<(PathBuf, PathBuf)>,
    cancellation: CancellationToken,
    tx: mpsc::Sender<std::io::Result<Vec<u8>>>,
) {
    let mut tmp_file = match &cache_paths {
        Some((tmp_path, _)) => tokio::fs::File::create(tmp_path).await.ok(),
        None => None,
    };

    let mut buf = vec![0u8; 64 * 1024];
    let mut completed = false;

    loop {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                break;
            }
            result = stdout.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        completed = true;
                        break;
                    }
                    Ok(n) => {
                        let chunk = buf[..n].to_vec();
                        if let Some(file) = tmp_file.as_mut() {
                            if let Err(e) = file.write_all(&chunk).await {
                                tracing::debug!("transcode cache tee write failed: {e}");
                                tmp_file = None;
                            }
                        }
                        if tx.send(Ok(chunk)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                }
            }
        }
    }

    drop(tmp_file);

    if let Some((tmp_path, final_path)) = &cache_paths {
        if completed {
            if let Err(e) = tokio::fs::rename(tmp_path, final_path).await {
                tracing::debug!("failed to finalize transcode cache: {e}");
            }
        } else {
            let _ = tokio::fs::remove_file(tmp_path).await;
        }
    }

    let _ = child.start_kill();
    let _ = child.wait().await;
}

/// `GetContentType(format)` (§4.H).
pub fn content_type_for_format(format: &str) -> &'static str {
    match format {
        "mp3" => "audio/mpeg",
        "opus" => "audio/opus",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        _ => "audio/mpeg",
    }
}

/// `EstimateSize(durationSec, bitrateKbps)` (§4.H); `None` when bitrate is
/// unknown.
pub fn estimate_size_bytes(duration_sec: u64, bitrate_kbps: Option<u32>) -> Option<u64> {
    let bitrate_kbps = u64::from(bitrate_kbps?);
    Some(bitrate_kbps * duration_sec * 1024 / 8)
}
