// Argument vectors for yt-dlp and ffmpeg
//
// Everything here is pure: identical requests produce identical vectors.
// Timestamps and formats are handed to the external tool as given; it is the
// tool's job to reject values it cannot use.

use std::path::{Path, PathBuf};

use super::models::{ConversionRequest, DownloadRequest, GifOptions, MediaKind, NetworkConfig, Quality};

/// Output template: remote title plus original extension
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Formats whose output carries no video stream
const AUDIO_FORMATS: &[&str] = &["mp3", "wav", "flac", "aac", "m4a", "ogg", "opus"];

/// yt-dlp format selector for a resolution ceiling
pub fn format_selector(quality: Quality) -> String {
    match quality.max_height() {
        Some(height) => format!("bestvideo[height<=?{}]+bestaudio/best", height),
        None => "bestvideo+bestaudio/best".to_string(),
    }
}

/// Build proxy arguments for yt-dlp
pub fn proxy_args(config: &NetworkConfig) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(proxy) = &config.proxy {
        args.push("--proxy".to_string());
        args.push(proxy.clone());
    }

    args
}

/// Build timeout arguments for yt-dlp
pub fn timeout_args(config: &NetworkConfig) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(timeout) = config.timeout_secs {
        args.push("--socket-timeout".to_string());
        args.push(timeout.to_string());
    }

    args
}

/// Arguments for one yt-dlp download (the URL is the last element).
pub fn download_args(req: &DownloadRequest, network: &NetworkConfig, retries: u32) -> Vec<String> {
    let template = req.output_dir.join(OUTPUT_TEMPLATE);
    let mut args = vec![
        "--progress".to_string(),
        // one progress report per line instead of carriage-return redraws
        "--newline".to_string(),
        "--ignore-errors".to_string(),
        "--output".to_string(),
        template.to_string_lossy().into_owned(),
        "--retries".to_string(),
        retries.to_string(),
    ];

    args.extend(proxy_args(network));
    args.extend(timeout_args(network));

    if req.audio_only {
        args.push("--extract-audio".to_string());
        let audio_format = req.audio_format.trim();
        if !audio_format.is_empty() {
            args.push("--audio-format".to_string());
            args.push(audio_format.to_ascii_lowercase());
        }
        args.push("--audio-quality".to_string());
        args.push("0".to_string());
    } else {
        args.push("--format".to_string());
        args.push(format_selector(req.quality));
    }

    // a URL starting with '-' must not be read as an option
    args.push("--".to_string());
    args.push(req.url.trim().to_string());
    args
}

/// Target extension: the requested format, else "gif" for GIF requests,
/// else the source's own extension so ffmpeg infers the container.
pub fn effective_format(req: &ConversionRequest) -> String {
    let format = req.format.trim().trim_start_matches('.').to_ascii_lowercase();
    if !format.is_empty() {
        return format;
    }
    if req.gif.is_some() {
        return "gif".to_string();
    }
    req.source
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// `<output_dir>/<source stem>.<format>`
pub fn output_path(req: &ConversionRequest) -> PathBuf {
    let stem = req
        .source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let format = effective_format(req);
    let name = if format.is_empty() {
        stem
    } else {
        format!("{}.{}", stem, format)
    };
    req.output_dir.join(name)
}

fn gif_options(req: &ConversionRequest, format: &str) -> Option<GifOptions> {
    if let Some(gif) = req.gif {
        return Some(gif);
    }
    // Still images become single-frame GIFs without animation settings
    if format == "gif" && MediaKind::of(&req.source) != Some(MediaKind::Image) {
        return Some(GifOptions::default());
    }
    None
}

fn scale_filter(req: &ConversionRequest, keep_aspect: &str) -> Option<String> {
    let resize = req.resize?;
    let side = |v: Option<u32>| v.map(|v| v.to_string()).unwrap_or_else(|| keep_aspect.to_string());
    Some(format!("scale={}:{}", side(resize.width), side(resize.height)))
}

/// Arguments for one ffmpeg transcode (the output path is the last element).
pub fn transcode_args(req: &ConversionRequest) -> Vec<String> {
    let format = effective_format(req);
    let gif = gif_options(req, &format);
    let is_video_source = MediaKind::of(&req.source) == Some(MediaKind::Video);

    let mut args = vec![
        // never prompt before overwriting
        "-y".to_string(),
        "-i".to_string(),
        path_arg(&req.source),
    ];

    if let Some(trim) = &req.trim {
        if let Some(start) = &trim.start {
            args.push("-ss".to_string());
            args.push(start.clone());
        }
        if let Some(end) = &trim.end {
            args.push("-to".to_string());
            args.push(end.clone());
        }
    }

    if AUDIO_FORMATS.contains(&format.as_str()) {
        args.push("-vn".to_string());
    }

    // Video encoders want even dimensions; images and GIFs do not care
    let keep_aspect = if is_video_source && gif.is_none() { "-2" } else { "-1" };
    let mut filters = Vec::new();
    if let Some(gif) = gif {
        filters.push(format!("fps={}", gif.fps));
    }
    if let Some(scale) = scale_filter(req, keep_aspect) {
        if gif.is_some() {
            filters.push(format!("{}:flags=lanczos", scale));
        } else {
            filters.push(scale);
        }
    }
    if !filters.is_empty() {
        args.push("-vf".to_string());
        args.push(filters.join(","));
    }

    if let Some(gif) = gif {
        args.push("-loop".to_string());
        args.push(gif.loop_count.to_string());
    }

    args.push(path_arg(&output_path(req)));
    args
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
