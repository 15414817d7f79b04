use super::{HandleGuard, VirtualEngineConfig};
use crate::engine::{
    FrameEvent, MediaEvent, MediaSample, MediaSource, NativeResult, ReaderCallback, SourceReader,
    StreamFlags,
};
use crate::media_type::{MediaKind, MediaTypeDescriptor, Subtype, VideoResolution};
use bytes::{BufMut, Bytes, BytesMut};
use medialayer_core::NativeError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

const FALLBACK_FRAME_INTERVAL: Duration = Duration::from_millis(33);
const SQUARE_WAVE_PERIOD: usize = 96;

enum Request {
    Read,
    /// Flush every selected stream, moving its clock back by `rewind`
    Flush { rewind: Duration },
    Event(MediaEvent),
}

/// Reader state reachable from the engine for event injection
pub(super) struct ReaderShared {
    requests: Mutex<Option<mpsc::UnboundedSender<Request>>>,
    stopped: AtomicBool,
}

impl ReaderShared {
    fn post(&self, request: Request) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }
        match self.requests.lock().as_ref() {
            Some(tx) => tx.send(request).is_ok(),
            None => false,
        }
    }

    pub(super) fn post_event(&self, event: MediaEvent) -> bool {
        self.post(Request::Event(event))
    }

    pub(super) fn post_flush(&self, rewind: Duration) -> bool {
        self.post(Request::Flush { rewind })
    }
}

struct StreamState {
    kind: MediaKind,
    native_types: Vec<MediaTypeDescriptor>,
    current: MediaTypeDescriptor,
    selected: bool,
    clock: Duration,
    seq: u64,
    geometry_switched: bool,
}

struct Streams {
    streams: Vec<StreamState>,
    delivered: u64,
    started: Option<Instant>,
}

struct Behaviour {
    realtime: bool,
    audio_chunk: Duration,
    fail_read_after: Option<u64>,
    end_of_stream_after: Option<u64>,
    delivered_resolution: Option<VideoResolution>,
}

pub(super) struct VirtualReader {
    source: Arc<dyn MediaSource>,
    streams: Arc<Mutex<Streams>>,
    shared: Arc<ReaderShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    _guard: HandleGuard,
}

impl VirtualReader {
    pub(super) fn spawn(
        source: Arc<dyn MediaSource>,
        callback: ReaderCallback,
        config: &VirtualEngineConfig,
        guard: HandleGuard,
    ) -> NativeResult<Self> {
        let descriptors = source.streams();
        if descriptors.is_empty() {
            return Err(NativeError::new(
                NativeError::E_INVALIDARG,
                format!("source {} has no streams", source.id()),
            ));
        }

        let mut states = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let current = descriptor.native_types.first().cloned().ok_or_else(|| {
                NativeError::new(NativeError::E_INVALID_MEDIA_TYPE, "stream without media types")
            })?;
            states.push(StreamState {
                kind: descriptor.kind,
                native_types: descriptor.native_types,
                current,
                selected: true,
                clock: Duration::ZERO,
                seq: 0,
                geometry_switched: false,
            });
        }

        let streams = Arc::new(Mutex::new(Streams {
            streams: states,
            delivered: 0,
            started: None,
        }));
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(ReaderShared {
            requests: Mutex::new(Some(tx)),
            stopped: AtomicBool::new(false),
        });
        let behaviour = Behaviour {
            realtime: config.realtime,
            audio_chunk: config.audio_chunk,
            fail_read_after: config.fail_read_after,
            end_of_stream_after: config.end_of_stream_after,
            delivered_resolution: config.delivered_resolution,
        };

        let worker_streams = streams.clone();
        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("virtual-reader".to_string())
            .spawn(move || run_worker(rx, worker_streams, worker_shared, callback, behaviour))
            .map_err(|e| NativeError::fail(format!("failed to spawn reader worker: {e}")))?;
        let worker_id = worker.thread().id();

        debug!(source = %source.id(), "virtual reader created");
        Ok(Self {
            source,
            streams,
            shared,
            worker: Mutex::new(Some(worker)),
            worker_id,
            _guard: guard,
        })
    }

    pub(super) fn shared(&self) -> &Arc<ReaderShared> {
        &self.shared
    }

    fn with_stream<R>(
        &self,
        stream: u32,
        f: impl FnOnce(&mut StreamState) -> NativeResult<R>,
    ) -> NativeResult<R> {
        let mut guard = self.streams.lock();
        let state = guard.streams.get_mut(stream as usize).ok_or_else(|| {
            NativeError::new(NativeError::E_INVALIDARG, format!("no stream {stream}"))
        })?;
        f(state)
    }
}

/// Whether the reader can deliver `requested` from one of `native_types`,
/// inserting a decoder or converter if needed
fn accepts(native_types: &[MediaTypeDescriptor], requested: &MediaTypeDescriptor) -> bool {
    if native_types.contains(requested) {
        return true;
    }
    if requested.subtype().is_compressed() {
        return false;
    }
    native_types.iter().any(|native| {
        native.kind() == requested.kind()
            && match requested.kind() {
                MediaKind::Video => native.resolution() == requested.resolution(),
                MediaKind::Audio => {
                    native.sample_rate() == requested.sample_rate()
                        && native.channels() == requested.channels()
                }
            }
    })
}

impl SourceReader for VirtualReader {
    fn stream_count(&self) -> u32 {
        self.streams.lock().streams.len() as u32
    }

    fn stream_kind(&self, stream: u32) -> Option<MediaKind> {
        self.streams
            .lock()
            .streams
            .get(stream as usize)
            .map(|s| s.kind)
    }

    fn native_media_type(&self, stream: u32, index: u32) -> Option<MediaTypeDescriptor> {
        self.streams
            .lock()
            .streams
            .get(stream as usize)
            .and_then(|s| s.native_types.get(index as usize).cloned())
    }

    fn current_media_type(&self, stream: u32) -> NativeResult<MediaTypeDescriptor> {
        self.with_stream(stream, |s| Ok(s.current.clone()))
    }

    fn set_current_media_type(
        &self,
        stream: u32,
        media_type: &MediaTypeDescriptor,
    ) -> NativeResult<()> {
        self.with_stream(stream, |s| {
            if !accepts(&s.native_types, media_type) {
                return Err(NativeError::new(
                    NativeError::E_INVALID_MEDIA_TYPE,
                    format!("stream {stream} cannot deliver {media_type}"),
                ));
            }
            s.current = media_type.clone();
            Ok(())
        })
    }

    fn set_stream_selection(&self, stream: u32, selected: bool) -> NativeResult<()> {
        self.with_stream(stream, |s| {
            s.selected = selected;
            Ok(())
        })
    }

    fn read_sample(&self) -> NativeResult<()> {
        if self.shared.post(Request::Read) {
            Ok(())
        } else {
            Err(NativeError::new(NativeError::E_SHUTDOWN, "reader stopped"))
        }
    }

    fn flush(&self) -> NativeResult<()> {
        if self.shared.post_flush(Duration::ZERO) {
            Ok(())
        } else {
            Err(NativeError::new(NativeError::E_SHUTDOWN, "reader stopped"))
        }
    }

    fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.requests.lock().take();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if thread::current().id() == self.worker_id {
                trace!("reader stopped from its own worker, not joining");
            } else if worker.join().is_err() {
                warn!(source = %self.source.id(), "reader worker panicked");
            }
        }
        debug!(source = %self.source.id(), "virtual reader stopped");
    }
}

impl Drop for VirtualReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(
    mut rx: mpsc::UnboundedReceiver<Request>,
    streams: Arc<Mutex<Streams>>,
    shared: Arc<ReaderShared>,
    callback: ReaderCallback,
    behaviour: Behaviour,
) {
    while let Some(request) = rx.blocking_recv() {
        if shared.stopped.load(Ordering::Acquire) {
            break;
        }
        match request {
            Request::Read => {
                let (status, event, due) = produce(&streams, &behaviour);
                if let Some(due) = due {
                    let now = Instant::now();
                    if due > now {
                        thread::sleep(due - now);
                    }
                }
                if shared.stopped.load(Ordering::Acquire) {
                    break;
                }
                callback.dispatch(|cb| cb.on_read_sample(status, event));
            }
            Request::Flush { rewind } => {
                let flushed: Vec<u32> = {
                    let mut guard = streams.lock();
                    guard
                        .streams
                        .iter_mut()
                        .enumerate()
                        .filter(|(_, s)| s.selected)
                        .map(|(i, s)| {
                            s.clock = s.clock.saturating_sub(rewind);
                            i as u32
                        })
                        .collect()
                };
                trace!(?rewind, streams = ?flushed, "virtual reader flushed");
                for stream in flushed {
                    callback.dispatch(|cb| cb.on_flush(stream));
                }
            }
            Request::Event(event) => {
                callback.dispatch(|cb| cb.on_event(0, event));
            }
        }
    }
    trace!("virtual reader worker exiting");
}

/// Produce the next delivery. The lock is released before the caller
/// sleeps or dispatches.
fn produce(
    streams: &Mutex<Streams>,
    behaviour: &Behaviour,
) -> (NativeResult<()>, FrameEvent, Option<Instant>) {
    let mut guard = streams.lock();
    let started = *guard.started.get_or_insert_with(Instant::now);

    let next = guard
        .streams
        .iter()
        .enumerate()
        .filter(|(_, s)| s.selected)
        .min_by_key(|(_, s)| s.clock)
        .map(|(i, _)| i);
    let Some(index) = next else {
        let event = FrameEvent {
            stream_index: 0,
            flags: StreamFlags {
                error: true,
                ..Default::default()
            },
            timestamp: Duration::ZERO,
            sample: None,
        };
        return (
            Err(NativeError::new(NativeError::E_INVALIDARG, "no stream selected")),
            event,
            None,
        );
    };

    let ordinal = guard.delivered;
    guard.delivered += 1;
    let stream_index = index as u32;
    let state = &mut guard.streams[index];

    if behaviour.fail_read_after == Some(ordinal) {
        let event = FrameEvent {
            stream_index,
            flags: StreamFlags {
                error: true,
                ..Default::default()
            },
            timestamp: state.clock,
            sample: None,
        };
        return (
            Err(NativeError::new(NativeError::E_HW_DEVICE_LOST, "device stopped responding")),
            event,
            None,
        );
    }

    if behaviour.end_of_stream_after == Some(ordinal) {
        let event = FrameEvent {
            stream_index,
            flags: StreamFlags {
                end_of_stream: true,
                ..Default::default()
            },
            timestamp: state.clock,
            sample: None,
        };
        return (Ok(()), event, None);
    }

    let mut flags = StreamFlags::default();
    if state.seq == 0 {
        flags.new_stream = true;
    }

    let (data, duration) = match state.kind {
        MediaKind::Video => {
            if let Some(resolution) = behaviour.delivered_resolution {
                if !state.geometry_switched {
                    state.geometry_switched = true;
                    if state.current.resolution() != resolution {
                        state.current = state.current.clone().with_resolution(resolution);
                        flags.current_media_type_changed = true;
                    }
                }
            }
            let interval = match state.current.frame_interval() {
                d if d.is_zero() => FALLBACK_FRAME_INTERVAL,
                d => d,
            };
            (video_frame(&state.current, state.seq), interval)
        }
        MediaKind::Audio => {
            let chunk = behaviour.audio_chunk;
            (audio_chunk(&state.current, chunk), chunk)
        }
    };

    let timestamp = state.clock;
    state.clock += duration;
    state.seq += 1;

    let sample = MediaSample::new(data, timestamp, duration);
    let event = FrameEvent {
        stream_index,
        flags,
        timestamp,
        sample: Some(sample),
    };
    let due = behaviour.realtime.then(|| started + timestamp);
    (Ok(()), event, due)
}

fn video_frame(media_type: &MediaTypeDescriptor, seq: u64) -> Bytes {
    let (width, height) = (media_type.width(), media_type.height());
    let size = media_type
        .pixel_format()
        .frame_size(width, height)
        .unwrap_or((width as usize * height as usize) / 4);
    Bytes::from(vec![(seq % 251) as u8; size])
}

fn audio_chunk(media_type: &MediaTypeDescriptor, chunk: Duration) -> Bytes {
    let channels = media_type.channels().max(1) as usize;
    let frames = (media_type.sample_rate() as f64 * chunk.as_secs_f64()).round() as usize;
    let mut buf = BytesMut::with_capacity(frames * media_type.block_align().max(1));

    for frame in 0..frames {
        let high = (frame / (SQUARE_WAVE_PERIOD / 2)) % 2 == 0;
        for _ in 0..channels {
            match media_type.subtype() {
                Subtype::Float => buf.put_f32_le(if high { 0.5 } else { -0.5 }),
                Subtype::Pcm => buf.put_i16_le(if high { 16_384 } else { -16_384 }),
                _ => buf.put_u8(0),
            }
        }
    }
    buf.freeze()
}
