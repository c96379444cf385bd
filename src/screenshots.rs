use log::{error, info, warn};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const FRAME_TIMEOUT: Duration = Duration::from_secs(60);
/// share of the video skipped at both ends to avoid black intro/outro frames
const EDGE_FRACTION: f64 = 0.05;

/// searches `PATH` for an executable named `name`
fn find_in_path(name: &str) -> Option<PathBuf> {
    let file_name = if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    };
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(&file_name))
        .find(|candidate| candidate.is_file())
}

fn resolve_tool(override_path: Option<&Path>, name: &str) -> PathBuf {
    if let Some(path) = override_path {
        return path.to_path_buf();
    }
    find_in_path(name).unwrap_or_else(|| PathBuf::from(name))
}

/// timestamps (seconds) at which frames are grabbed
pub fn screenshot_timestamps(duration: f64, count: usize) -> Vec<f64> {
    if count == 0 || !duration.is_finite() || duration <= 0.0 {
        return Vec::new();
    }

    let start = duration * EDGE_FRACTION;
    let end = duration * (1.0 - EDGE_FRACTION);
    let usable = end - start;

    if usable <= 0.0 {
        return vec![duration / 2.0];
    }

    let interval = usable / (count as f64 + 1.0);
    (1..=count).map(|i| start + interval * i as f64).collect()
}

/// wraps the external ffmpeg / ffprobe binaries
#[derive(Debug, Clone)]
pub struct FrameExtractor {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FrameExtractor {
    pub fn locate(ffmpeg_override: Option<&Path>, ffprobe_override: Option<&Path>) -> Self {
        let extractor = Self {
            ffmpeg: resolve_tool(ffmpeg_override, "ffmpeg"),
            ffprobe: resolve_tool(ffprobe_override, "ffprobe"),
        };
        info!(
            "Using ffmpeg at {} and ffprobe at {}",
            extractor.ffmpeg.display(),
            extractor.ffprobe.display()
        );
        extractor
    }

    pub async fn is_available(&self) -> bool {
        let mut command = Command::new(&self.ffmpeg);
        command
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match timeout(VERSION_CHECK_TIMEOUT, command.status()).await {
            Ok(Ok(status)) if status.success() => true,
            Ok(Ok(status)) => {
                warn!("ffmpeg returned error code: {:?}", status.code());
                false
            }
            Ok(Err(e)) => {
                warn!("ffmpeg not found at {}: {}", self.ffmpeg.display(), e);
                false
            }
            Err(_) => {
                warn!("ffmpeg check timed out at {}", self.ffmpeg.display());
                false
            }
        }
    }

    /// duration in seconds, `None` when ffprobe cannot tell
    pub async fn probe_duration(&self, video: &Path) -> Option<f64> {
        if !video.exists() {
            error!("Video file does not exist: {}", video.display());
            return None;
        }

        let mut command = Command::new(&self.ffprobe);
        command
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(video)
            .kill_on_drop(true);

        let output = match timeout(PROBE_TIMEOUT, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                error!("Failed to run ffprobe: {}", e);
                return None;
            }
            Err(_) => {
                error!("ffprobe timed out for {}", video.display());
                return None;
            }
        };

        if !output.status.success() {
            error!(
                "ffprobe error (return code {:?}): {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            );
            return None;
        }

        let text = String::from_utf8_lossy(&output.stdout);
        match text.trim().parse::<f64>() {
            Ok(duration) => {
                info!("Video duration: {}s", duration);
                Some(duration)
            }
            Err(e) => {
                error!("Error parsing duration '{}': {}", text.trim(), e);
                None
            }
        }
    }

    /// grabs up to `count` frames into `output_dir`; returns only files actually written
    pub async fn extract_screenshots(
        &self,
        video: &Path,
        count: usize,
        output_dir: &Path,
    ) -> Vec<PathBuf> {
        let duration = match self.probe_duration(video).await {
            Some(d) if d > 0.0 => d,
            _ => {
                error!("Could not determine video duration");
                return Vec::new();
            }
        };

        let timestamps = screenshot_timestamps(duration, count);
        info!("Extracting {} screenshots from video", timestamps.len());

        let mut screenshots = Vec::with_capacity(timestamps.len());
        for (i, timestamp) in timestamps.iter().enumerate() {
            let output_path = output_dir.join(format!("screenshot_{}.jpg", i + 1));
            if self.extract_frame(video, *timestamp, &output_path).await {
                info!("Extracted screenshot {} at {:.2}s", i + 1, timestamp);
                screenshots.push(output_path);
            }
        }

        screenshots
    }

    async fn extract_frame(&self, video: &Path, timestamp: f64, output_path: &Path) -> bool {
        let mut command = Command::new(&self.ffmpeg);
        command
            .arg("-ss")
            .arg(format!("{:.3}", timestamp))
            .arg("-i")
            .arg(video)
            .args(["-vframes", "1", "-q:v", "2", "-y"])
            .arg(output_path)
            .kill_on_drop(true);

        match timeout(FRAME_TIMEOUT, command.output()).await {
            Ok(Ok(output)) if output.status.success() && output_path.exists() => true,
            Ok(Ok(output)) => {
                error!(
                    "Failed to extract screenshot at {:.2}s (code {:?}): {}",
                    timestamp,
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr)
                );
                false
            }
            Ok(Err(e)) => {
                error!("Failed to run ffmpeg: {}", e);
                false
            }
            Err(_) => {
                error!("Timeout extracting screenshot at {:.2}s", timestamp);
                false
            }
        }
    }
}
