//! Delegation to an external LTC decoder
//!
//! A dedicated decoding tool (`ltcdump` from ltc-tools) is the preferred path when it is
//! installed. The built-in engine runs only when the tool is missing or fails, and both
//! paths return the same [`TimecodeOutput`] so callers need not care which one ran.

use crate::analysis::result::DecodeResult;
use crate::config::DecoderConfig;
use crate::error::DecodeError;
use crate::timecode::TimecodeValue;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Poll interval while waiting for the external process
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A decoder that reads LTC from a mono WAV file on disk
pub trait ExternalDecoder {
    /// Tool name for logs and the [`DecodePath`] marker
    fn name(&self) -> &str;

    /// Decode the first timecode in the file
    fn decode_file(&self, wav_path: &Path) -> Result<TimecodeValue, DecodeError>;
}

/// `ltcdump` runner
#[derive(Debug, Clone)]
pub struct LtcDump {
    program: PathBuf,
    channel: u32,
    timeout: Duration,
}

impl Default for LtcDump {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ltcdump"),
            channel: 1,
            timeout: Duration::from_secs(10),
        }
    }
}

impl LtcDump {
    /// Runner for `ltcdump` on `PATH`, channel 1, 10 s timeout
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific executable instead of `ltcdump` from `PATH`
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Channel passed to `-c` (1-based)
    pub fn with_channel(mut self, channel: u32) -> Self {
        self.channel = channel.max(1);
        self
    }

    /// Kill the process after this long
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// True if the program exists, either as a path or somewhere on `PATH`
    pub fn is_available(&self) -> bool {
        if self.program.components().count() > 1 {
            return self.program.is_file();
        }
        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(&self.program).is_file()))
            .unwrap_or(false)
    }

    fn args(&self, wav_path: &Path) -> Vec<OsString> {
        vec![
            "-c".into(),
            self.channel.to_string().into(),
            "-F".into(),
            wav_path.as_os_str().to_owned(),
        ]
    }

    fn run(&self, wav_path: &Path) -> Result<String, DecodeError> {
        let fail = |msg: String| DecodeError::ExternalDecoder(msg);
        let mut child = Command::new(&self.program)
            .args(self.args(wav_path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| fail(format!("failed to start {}: {}", self.program.display(), e)))?;

        // Drain stdout on its own thread so a long dump cannot fill the pipe and stall
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| fail("stdout not captured".to_string()))?;
        let reader = std::thread::spawn(move || {
            let mut text = String::new();
            stdout.read_to_string(&mut text).map(|_| text)
        });

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(fail(format!(
                        "{} timed out after {:.1} s",
                        self.program.display(),
                        self.timeout.as_secs_f32()
                    )));
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(fail(format!("waiting for {}: {}", self.program.display(), e))),
            }
        };

        let output = reader
            .join()
            .map_err(|_| fail("stdout reader panicked".to_string()))?
            .map_err(|e| fail(format!("reading output: {}", e)))?;

        if !status.success() {
            return Err(fail(format!("{} exited with {}", self.program.display(), status)));
        }
        Ok(output)
    }
}

impl ExternalDecoder for LtcDump {
    fn name(&self) -> &str {
        "ltcdump"
    }

    fn decode_file(&self, wav_path: &Path) -> Result<TimecodeValue, DecodeError> {
        log::debug!("Running {} on {}", self.program.display(), wav_path.display());
        let output = self.run(wav_path)?;
        parse_ltcdump_output(&output)
    }
}

/// Extract the first timecode from `ltcdump` output
///
/// Data lines carry the user bits in the first column and the timecode in the second;
/// lines starting with `#` are headers or discontinuity markers.
pub fn parse_ltcdump_output(output: &str) -> Result<TimecodeValue, DecodeError> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && line.contains(':'))
        .find_map(|line| line.split_whitespace().nth(1)?.parse::<TimecodeValue>().ok())
        .ok_or_else(|| DecodeError::ExternalDecoder("no timecode in ltcdump output".to_string()))
}

/// Which decoder produced a timecode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodePath {
    /// The built-in engine
    Engine,
    /// An external tool
    External {
        /// Tool name
        tool: String,
    },
}

/// Timecode from either decode path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimecodeOutput {
    /// Decoded start timecode
    pub timecode: TimecodeValue,
    /// Which decoder produced it
    pub path: DecodePath,
    /// Full engine diagnostics (engine path only)
    pub details: Option<DecodeResult>,
}

impl TimecodeOutput {
    /// Canonical timecode string
    pub fn timecode_string(&self) -> String {
        self.timecode.to_string()
    }
}

/// Decode with the external tool if possible, else with the engine
///
/// `wav_path` must hold the same mono signal as `samples`. The external decoder is skipped
/// when either it or the path is missing.
///
/// # Errors
///
/// Only engine errors are returned; an external failure is logged and triggers the
/// fallback.
pub fn decode_with_fallback(
    external: Option<&dyn ExternalDecoder>,
    wav_path: Option<&Path>,
    samples: &[f32],
    sample_rate: u32,
    config: DecoderConfig,
) -> Result<TimecodeOutput, DecodeError> {
    if let (Some(decoder), Some(path)) = (external, wav_path) {
        match decoder.decode_file(path) {
            Ok(timecode) => {
                log::info!("Decoded {} with {}", timecode, decoder.name());
                return Ok(TimecodeOutput {
                    timecode,
                    path: DecodePath::External {
                        tool: decoder.name().to_string(),
                    },
                    details: None,
                });
            }
            Err(e) => log::warn!("{} failed ({}), using the built-in decoder", decoder.name(), e),
        }
    }

    let result = crate::decode_ltc(samples, sample_rate, config)?;
    Ok(TimecodeOutput {
        timecode: result.timecode,
        path: DecodePath::Engine,
        details: Some(result),
    })
}
