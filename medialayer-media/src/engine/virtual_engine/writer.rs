//! Sink writer that dumps samples into a simple length-prefixed file
//!
//! Layout: the magic line `MLDUMP1`, one JSON line listing the output media
//! types, then one record per sample: stream (u32 LE), timestamp in
//! microseconds (u64 LE), payload length (u32 LE) and the payload.

use super::{HandleGuard, RecordingLog, VirtualEngineConfig, WrittenSample};
use crate::engine::{MediaSample, NativeResult, SinkWriter, WriterCallback};
use crate::media_type::{ContainerFormat, MediaKind, MediaTypeDescriptor, Subtype};
use medialayer_core::NativeError;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const DUMP_MAGIC: &[u8] = b"MLDUMP1\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Configuring,
    Writing,
    Finalizing,
}

struct Slot {
    output: MediaTypeDescriptor,
    input: Option<MediaTypeDescriptor>,
}

struct WriterState {
    phase: Phase,
    slots: Vec<Slot>,
    file: Option<BufWriter<File>>,
}

pub(super) struct VirtualWriter {
    path: PathBuf,
    container: ContainerFormat,
    state: Arc<Mutex<WriterState>>,
    callback: WriterCallback,
    log: Arc<RecordingLog>,
    finalize_delay: Duration,
    fail_finalize: bool,
    guard: Arc<HandleGuard>,
}

impl VirtualWriter {
    pub(super) fn create(
        path: &Path,
        container: ContainerFormat,
        callback: WriterCallback,
        log: Arc<RecordingLog>,
        config: &VirtualEngineConfig,
        guard: HandleGuard,
    ) -> NativeResult<Self> {
        let file = File::create(path).map_err(|e| {
            NativeError::new(
                NativeError::E_PATH_NOT_FOUND,
                format!("cannot create {}: {e}", path.display()),
            )
        })?;
        info!(path = %path.display(), ?container, "virtual sink writer created");

        Ok(Self {
            path: path.to_path_buf(),
            container,
            state: Arc::new(Mutex::new(WriterState {
                phase: Phase::Configuring,
                slots: Vec::new(),
                file: Some(BufWriter::new(file)),
            })),
            callback,
            log,
            finalize_delay: config.finalize_delay,
            fail_finalize: config.fail_finalize,
            guard: Arc::new(guard),
        })
    }
}

fn io_error(e: std::io::Error) -> NativeError {
    NativeError::fail(format!("write failed: {e}"))
}

/// Peak absolute amplitude of an uncompressed audio payload, normalised to 1.0
fn peak_amplitude(input: &MediaTypeDescriptor, data: &[u8]) -> Option<f32> {
    if input.kind() != MediaKind::Audio {
        return None;
    }
    match input.subtype() {
        Subtype::Float => Some(
            data.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]).abs())
                .fold(0.0, f32::max),
        ),
        Subtype::Pcm => Some(
            data.chunks_exact(2)
                .map(|b| (i16::from_le_bytes([b[0], b[1]]) as f32 / 32_768.0).abs())
                .fold(0.0, f32::max),
        ),
        _ => None,
    }
}

impl SinkWriter for VirtualWriter {
    fn add_stream(&self, output_type: &MediaTypeDescriptor) -> NativeResult<u32> {
        let mut state = self.state.lock();
        if state.phase != Phase::Configuring {
            return Err(NativeError::new(NativeError::E_INVALIDARG, "writing already started"));
        }
        if !self.container.supports(output_type.subtype()) {
            return Err(NativeError::new(
                NativeError::E_INVALID_MEDIA_TYPE,
                format!("{:?} cannot carry {output_type}", self.container),
            ));
        }
        state.slots.push(Slot {
            output: output_type.clone(),
            input: None,
        });
        Ok(state.slots.len() as u32 - 1)
    }

    fn set_input_media_type(
        &self,
        stream: u32,
        input_type: &MediaTypeDescriptor,
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        let slot = state.slots.get_mut(stream as usize).ok_or_else(|| {
            NativeError::new(NativeError::E_INVALIDARG, format!("no sink stream {stream}"))
        })?;
        let compatible = input_type.kind() == slot.output.kind()
            && (!input_type.subtype().is_compressed()
                || input_type.subtype() == slot.output.subtype());
        if !compatible {
            return Err(NativeError::new(
                NativeError::E_INVALID_MEDIA_TYPE,
                format!("no encoder from {input_type} to {}", slot.output),
            ));
        }
        slot.input = Some(input_type.clone());
        Ok(())
    }

    fn begin_writing(&self) -> NativeResult<()> {
        let mut state = self.state.lock();
        if state.phase != Phase::Configuring || state.slots.is_empty() {
            return Err(NativeError::new(
                NativeError::E_INVALIDARG,
                "writer has no streams or already started",
            ));
        }
        if state.slots.iter().any(|s| s.input.is_none()) {
            return Err(NativeError::new(
                NativeError::E_INVALID_MEDIA_TYPE,
                "input media type not set",
            ));
        }

        let outputs: Vec<MediaTypeDescriptor> =
            state.slots.iter().map(|s| s.output.clone()).collect();
        let header = serde_json::to_vec(&outputs)
            .map_err(|e| NativeError::fail(format!("header encoding failed: {e}")))?;
        if let Some(file) = state.file.as_mut() {
            file.write_all(DUMP_MAGIC).map_err(io_error)?;
            file.write_all(&header).map_err(io_error)?;
            file.write_all(b"\n").map_err(io_error)?;
        }
        *self.log.output_types.lock() = outputs;
        state.phase = Phase::Writing;
        debug!(path = %self.path.display(), streams = state.slots.len(), "writing started");
        Ok(())
    }

    fn write_sample(&self, stream: u32, sample: &MediaSample) -> NativeResult<()> {
        let mut state = self.state.lock();
        if state.phase != Phase::Writing {
            return Err(NativeError::new(NativeError::E_INVALIDARG, "writer is not writing"));
        }
        let input = state
            .slots
            .get(stream as usize)
            .and_then(|s| s.input.clone())
            .ok_or_else(|| {
                NativeError::new(NativeError::E_INVALIDARG, format!("no sink stream {stream}"))
            })?;

        if let Some(file) = state.file.as_mut() {
            let micros = sample.timestamp().as_micros() as u64;
            file.write_all(&stream.to_le_bytes()).map_err(io_error)?;
            file.write_all(&micros.to_le_bytes()).map_err(io_error)?;
            file.write_all(&(sample.len() as u32).to_le_bytes())
                .map_err(io_error)?;
            file.write_all(sample.data()).map_err(io_error)?;
        }

        self.log.push(WrittenSample {
            stream,
            timestamp: sample.timestamp(),
            size: sample.len(),
            peak: peak_amplitude(&input, sample.data()),
        });
        Ok(())
    }

    fn finalize(&self) -> NativeResult<()> {
        {
            let mut state = self.state.lock();
            if state.phase == Phase::Finalizing {
                return Err(NativeError::new(NativeError::E_INVALIDARG, "finalize already requested"));
            }
            state.phase = Phase::Finalizing;
        }

        let state = self.state.clone();
        let callback = self.callback.clone();
        let log = self.log.clone();
        let path = self.path.clone();
        let delay = self.finalize_delay;
        let fail = self.fail_finalize;
        let guard = self.guard.clone();

        thread::Builder::new()
            .name("virtual-finalize".to_string())
            .spawn(move || {
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                let flushed = match state.lock().file.take() {
                    Some(mut file) => file.flush().map_err(io_error),
                    None => Ok(()),
                };
                let status = if fail {
                    Err(NativeError::fail("encoder rejected finalize"))
                } else {
                    flushed
                };
                if status.is_ok() {
                    log.finalized.store(true, Ordering::Release);
                }
                info!(path = %path.display(), ok = status.is_ok(), "finalize complete");
                callback.dispatch(|cb| cb.on_finalize(status));
                drop(guard);
            })
            .map_err(|e| NativeError::fail(format!("failed to spawn finalizer: {e}")))?;
        Ok(())
    }
}

impl Drop for VirtualWriter {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.phase == Phase::Finalizing {
            return;
        }
        if let Some(mut file) = state.file.take() {
            if let Err(e) = file.flush() {
                warn!(path = %self.path.display(), error = %e, "flush on release failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_amplitude() {
        let pcm = MediaTypeDescriptor::audio(Subtype::Pcm, 48_000, 1);
        let data: Vec<u8> = [8_192i16, -16_384]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        assert_eq!(peak_amplitude(&pcm, &data), Some(0.5));

        let float = MediaTypeDescriptor::audio(Subtype::Float, 48_000, 1);
        assert_eq!(peak_amplitude(&float, &0.0f32.to_le_bytes()), Some(0.0));

        let video = MediaTypeDescriptor::video(Subtype::Nv12, Default::default(), 30.0);
        assert_eq!(peak_amplitude(&video, &[0, 0]), None);
    }
}
