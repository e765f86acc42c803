use crate::models::{CompressorConfig, ImageType, JobRecord, Profile};
use camino::{Utf8Path, Utf8PathBuf};
use regex::{Captures, Regex};
use std::future::Future;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Output is only kept when it is at most this fraction of the original size
const MAX_KEPT_RATIO: f64 = 0.95;

/// Successful compression of one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressOutput {
    pub out_size: u64,
    pub out_path: Utf8PathBuf,
}

/// Classification of a compression failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressErrorKind {
    /// Compressing would not make the file meaningfully smaller
    NotSmaller,
    WontOverwrite,
    UnsupportedFileType,
    FileNotFound,
    Timeout,
    Unknown,
}

/// Error returned by a [`Compressor`]
///
/// Only [`CompressErrorKind::NotSmaller`] is treated specially by the pipeline;
/// every other kind ends the job in `Error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CompressError {
    pub kind: CompressErrorKind,
    pub message: String,
}

impl CompressError {
    pub fn new(kind: CompressErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_smaller(message: impl Into<String>) -> Self {
        Self::new(CompressErrorKind::NotSmaller, message)
    }

    pub fn is_not_smaller(&self) -> bool {
        self.kind == CompressErrorKind::NotSmaller
    }
}

/// The compression backend invoked for each admitted job
pub trait Compressor: Send + Sync + 'static {
    fn compress(
        &self,
        profile: &Profile,
        job: &JobRecord,
    ) -> impl Future<Output = Result<CompressOutput, CompressError>> + Send;
}

/// [`Compressor`] that shells out to an external encoder
///
/// The encoder writes into a hidden temp file next to the destination. The result is
/// only moved into place if it is smaller than [`MAX_KEPT_RATIO`] of the original
/// (conversions are always kept).
///
/// # Argument template
///
/// Each entry of [`CompressorConfig::args`] may contain placeholders:
///
/// - `{input}` / `{output}`: source path and temp output path
/// - `{format}`: target extension (`jpg`, `png`, `webp`, `gif`, `tiff`)
/// - `{quality}`: profile quality for the target format
/// - `{max_width}` / `{max_height}`: resize bounds, `0` when not resizing
/// - `{lossy}`, `{keep_metadata}`, `{strip}`: `true`/`false`
///
/// Unknown placeholders are left untouched.
pub struct CommandCompressor {
    config: CompressorConfig,
    timeout: Duration,

    /// Regex matching `{name}` placeholders in argument templates
    placeholder_pattern: Regex,
}

impl CommandCompressor {
    pub fn new(config: CompressorConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        Self {
            config,
            timeout,
            placeholder_pattern: Regex::new(r"\{([a-z_]+)\}").expect("Invalid placeholder regex"),
        }
    }

    /// Override the per-image timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Destination for a compressed image
    ///
    /// `/photos/cat.png` with postfix `.min` becomes `/photos/cat.min.png`; with
    /// conversion to WebP it becomes `/photos/cat.min.webp`.
    pub fn output_path(profile: &Profile, input: &Utf8Path) -> Utf8PathBuf {
        let extension = if profile.should_convert {
            profile.convert_extension.extension().to_string()
        } else {
            input.extension().unwrap_or_default().to_string()
        };
        let postfix = if profile.add_postfix {
            profile.postfix.as_str()
        } else {
            ""
        };

        let stem = input.file_stem().unwrap_or_default();
        let file_name = if extension.is_empty() {
            format!("{}{}", stem, postfix)
        } else {
            format!("{}{}.{}", stem, postfix, extension)
        };

        match input.parent() {
            Some(parent) => parent.join(file_name),
            None => Utf8PathBuf::from(file_name),
        }
    }

    /// Hidden sibling used while encoding: `/photos/cat.png` -> `/photos/.cat.png`
    pub fn temp_path(output: &Utf8Path) -> Utf8PathBuf {
        let file_name = format!(".{}", output.file_name().unwrap_or_default());
        match output.parent() {
            Some(parent) => parent.join(file_name),
            None => Utf8PathBuf::from(file_name),
        }
    }

    /// Expand the argument template for one encoder run
    pub fn build_args(
        &self,
        profile: &Profile,
        input: &Utf8Path,
        output: &Utf8Path,
        target: ImageType,
    ) -> Vec<String> {
        let (max_width, max_height) = if profile.should_resize {
            (profile.resize_width, profile.resize_height)
        } else {
            (0, 0)
        };

        self.config
            .args
            .iter()
            .map(|arg| {
                self.placeholder_pattern
                    .replace_all(arg, |caps: &Captures| match &caps[1] {
                        "input" => input.to_string(),
                        "output" => output.to_string(),
                        "format" => target.extension().to_string(),
                        "quality" => profile.quality_for(target).to_string(),
                        "max_width" => max_width.to_string(),
                        "max_height" => max_height.to_string(),
                        "lossy" => profile.enable_lossy.to_string(),
                        "keep_metadata" => profile.keep_metadata.to_string(),
                        "strip" => (!profile.keep_metadata).to_string(),
                        _ => caps[0].to_string(),
                    })
                    .into_owned()
            })
            .collect()
    }

    /// Run the encoder with a timeout
    async fn run_encoder(&self, args: &[String]) -> Result<(), CompressError> {
        tracing::debug!("Executing: {} {}", self.config.program, args.join(" "));
        let start = Instant::now();

        let child = Command::new(&self.config.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CompressError::new(
                    CompressErrorKind::Unknown,
                    format!("Failed to start encoder {}: {}", self.config.program, e),
                )
            })?;

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                tracing::warn!("Encoder timed out after {:?}", self.timeout);
                CompressError::new(
                    CompressErrorKind::Timeout,
                    format!("Timeout after {:?}", self.timeout),
                )
            })?
            .map_err(|e| CompressError::new(CompressErrorKind::Unknown, e.to_string()))?;

        tracing::debug!(
            "Encoder finished in {:.2}s with status {}",
            start.elapsed().as_secs_f32(),
            output.status
        );

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            let message = if detail.is_empty() {
                format!("Encoder failed with {}", output.status)
            } else {
                format!("Encoder failed with {}: {}", output.status, detail)
            };
            Err(CompressError::new(CompressErrorKind::Unknown, message))
        }
    }

    /// Move the encoder output into place unless it isn't worth keeping
    ///
    /// Returns the original and output sizes. The temp file is left for the caller
    /// to remove on error.
    async fn keep_output(
        job: &JobRecord,
        temp_path: &Utf8Path,
        out_path: &Utf8Path,
        keep_converted: bool,
    ) -> Result<(u64, u64), CompressError> {
        let temp_size = tokio::fs::metadata(temp_path)
            .await
            .map(|metadata| metadata.len())
            .map_err(|e| CompressError::new(CompressErrorKind::FileNotFound, e.to_string()))?;
        let original_size = Self::original_size(job).await?;

        if !keep_converted && temp_size as f64 > original_size as f64 * MAX_KEPT_RATIO {
            return Err(CompressError::not_smaller("Image cannot be compressed further."));
        }

        tokio::fs::rename(temp_path, out_path)
            .await
            .map_err(|e| CompressError::new(CompressErrorKind::Unknown, e.to_string()))?;
        Ok((original_size, temp_size))
    }

    async fn original_size(job: &JobRecord) -> Result<u64, CompressError> {
        if let Some(size) = job.original_size {
            return Ok(size);
        }
        tokio::fs::metadata(&job.path)
            .await
            .map(|metadata| metadata.len())
            .map_err(|e| CompressError::new(CompressErrorKind::FileNotFound, e.to_string()))
    }
}

impl Compressor for CommandCompressor {
    async fn compress(
        &self,
        profile: &Profile,
        job: &JobRecord,
    ) -> Result<CompressOutput, CompressError> {
        let input = job.path();
        let out_path = Self::output_path(profile, input);

        if out_path == input && !profile.should_overwrite {
            return Err(CompressError::new(
                CompressErrorKind::WontOverwrite,
                "Image would be overwritten. Enable Overwrite in settings to allow this.",
            ));
        }

        let source_type = input
            .extension()
            .and_then(ImageType::from_extension)
            .ok_or_else(|| {
                CompressError::new(
                    CompressErrorKind::UnsupportedFileType,
                    format!("Unsupported image type: {}", input),
                )
            })?;
        let target = if profile.should_convert {
            profile.convert_extension
        } else {
            source_type
        };

        let temp_path = Self::temp_path(&out_path);
        let args = self.build_args(profile, input, &temp_path, target);
        if let Err(e) = self.run_encoder(&args).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }

        let keep_converted = profile.should_convert && target != source_type;
        let (original_size, temp_size) =
            match Self::keep_output(job, &temp_path, &out_path, keep_converted).await {
                Ok(sizes) => sizes,
                Err(e) => {
                    let _ = tokio::fs::remove_file(&temp_path).await;
                    return Err(e);
                }
            };

        tracing::debug!("Wrote {} ({} -> {} bytes)", out_path, original_size, temp_size);
        Ok(CompressOutput {
            out_size: temp_size,
            out_path,
        })
    }
}
