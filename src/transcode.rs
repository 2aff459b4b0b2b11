//! MP3 transcoding: a decoder process piped into an encoder process.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::{LibraryError, Result};
use crate::media_file_discovery::{collect_files_at_depth, is_supported_audio_file};
use crate::metadata::metadata_tags::copy_tags;
use crate::path_guard;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Tracks live at `Artist/Album/Track`.
const TRACK_DEPTH: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscoderSettings {
    /// Decoder binary, invoked ffmpeg-style.
    pub decoder: PathBuf,
    /// Encoder binary, invoked LAME-style.
    pub encoder: PathBuf,
    /// kbit/s; used only when `vbr_quality` is unset.
    pub constant_bitrate: Option<u32>,
    pub vbr_quality: Option<u8>,
}

impl Default for TranscoderSettings {
    fn default() -> Self {
        Self {
            decoder: PathBuf::from("ffmpeg"),
            encoder: PathBuf::from("lame"),
            constant_bitrate: None,
            vbr_quality: None,
        }
    }
}

impl TranscoderSettings {
    /// Decode `input` to 16-bit WAV on stdout.
    pub fn decoder_args(&self, input: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-i".into(), input.into()];
        args.extend(["-vn", "-acodec", "pcm_s16le", "-f", "wav", "-"].map(OsString::from));
        args
    }

    /// Encode WAV from stdin to `output`.
    pub fn encoder_args(&self, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-m", "s", "--noreplaygain"].map(OsString::from).to_vec();
        if let Some(quality) = self.vbr_quality {
            args.push("-V".into());
            args.push(quality.to_string().into());
        } else if let Some(bitrate) = self.constant_bitrate {
            args.push("-b".into());
            args.push(bitrate.to_string().into());
        }
        args.push("-".into());
        args.push(output.into());
        args
    }
}

struct Stage {
    name: String,
    child: Child,
    finished: bool,
}

impl Stage {
    fn new(program: &Path, child: Child) -> Self {
        Self {
            name: program
                .file_name()
                .unwrap_or(program.as_os_str())
                .to_string_lossy()
                .into_owned(),
            child,
            finished: false,
        }
    }

    /// `Ok(true)` once the process has exited successfully.
    fn poll(&mut self) -> Result<bool> {
        if self.finished {
            return Ok(true);
        }
        match self.child.try_wait()? {
            None => Ok(false),
            Some(status) if status.success() => {
                self.finished = true;
                Ok(true)
            }
            Some(status) => {
                self.finished = true;
                Err(self.failure(status))
            }
        }
    }

    fn failure(&self, status: ExitStatus) -> LibraryError {
        LibraryError::TranscodeFailure {
            process: self.name.clone(),
            code: status.code(),
        }
    }

    fn stop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.child.kill() {
            debug!("Could not stop {}: {}", self.name, err);
        }
        let _ = self.child.wait();
        self.finished = true;
    }
}

/// Runs `decoder | encoder` until both exit. The first abnormal exit stops the
/// other process and is returned as `TranscodeFailure`.
fn run_pipeline(
    decoder: &Path,
    decoder_args: &[OsString],
    encoder: &Path,
    encoder_args: &[OsString],
) -> Result<()> {
    let mut decode = Command::new(decoder)
        .args(decoder_args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .spawn()?;
    let Some(pcm) = decode.stdout.take() else {
        let _ = decode.kill();
        let _ = decode.wait();
        return Err(std::io::Error::other("decoder stdout was not captured").into());
    };
    let mut decode = Stage::new(decoder, decode);

    let encode = match Command::new(encoder)
        .args(encoder_args)
        .stdin(Stdio::from(pcm))
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            decode.stop();
            return Err(err.into());
        }
    };
    let mut encode = Stage::new(encoder, encode);

    loop {
        let polled = decode
            .poll()
            .and_then(|decoded| Ok(encode.poll()? && decoded));
        match polled {
            Ok(true) => return Ok(()),
            Ok(false) => std::thread::sleep(POLL_INTERVAL),
            Err(err) => {
                decode.stop();
                encode.stop();
                return Err(err);
            }
        }
    }
}

/// Transcodes `input` to the MP3 file `output`, then copies its tags across.
///
/// A failed run removes the partial `output`.
pub fn transcode(settings: &TranscoderSettings, input: &Path, output: &Path) -> Result<()> {
    if let Err(err) = run_pipeline(
        &settings.decoder,
        &settings.decoder_args(input),
        &settings.encoder,
        &settings.encoder_args(output),
    ) {
        if output.exists() {
            if let Err(remove_err) = std::fs::remove_file(output) {
                warn!("Could not remove partial {}: {}", output.display(), remove_err);
            }
        }
        return Err(err);
    }
    copy_tags(input, output)?;
    Ok(())
}

/// Non-MP3 tracks at the `Artist/Album/Track` depth with no MP3 sibling, sorted.
/// Tracks whose MP3 would land outside `music_root` are skipped.
pub fn pending_mp3_conversions(music_root: &Path) -> Vec<PathBuf> {
    let mut pending: Vec<PathBuf> = collect_files_at_depth(music_root, TRACK_DEPTH)
        .into_iter()
        .filter(|path| is_supported_audio_file(path))
        .filter(|path| {
            !path
                .extension()
                .is_some_and(|extension| extension.eq_ignore_ascii_case("mp3"))
        })
        .filter(|path| !path.with_extension("mp3").exists())
        .filter(|path| match path_guard::require(music_root, &path.with_extension("mp3")) {
            Ok(_) => true,
            Err(err) => {
                warn!("Not transcoding {}: {}", path.display(), err);
                false
            }
        })
        .collect();
    pending.sort_unstable();
    pending
}

/// Transcodes every pending track in order. Stops at the first failure; MP3s
/// written before it are kept. Returns the MP3 paths written.
pub fn to_mp3(music_root: &Path, settings: &TranscoderSettings) -> Result<Vec<PathBuf>> {
    let pending = pending_mp3_conversions(music_root);
    info!("Transcoding {} track(s) to MP3", pending.len());

    let mut written = Vec::with_capacity(pending.len());
    for input in pending {
        let output = input.with_extension("mp3");
        info!("Transcoding {}", input.display());
        transcode(settings, &input, &output)?;
        debug!("Wrote {}", output.display());
        written.push(output);
    }
    Ok(written)
}
