use std::fs::{self, File};
use std::io::BufWriter;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

use super::store::{FrameStore, TempFiles};
use super::{ExportSummary, RecorderError, RecorderSettings, RecordingState};
use crate::capture::{CaptureError, CapturedFrame, Clock, FrameSource, Timestamp};
use crate::frame::RawFrame;
use crate::gif::{gif_delays, GifEncoder};

const NANOS_PER_SECOND: f64 = 1e9;

struct FrameRecord {
    index: usize,
    timestamp: Timestamp,
    location: JoinHandle<Option<PathBuf>>,
}

struct Shared {
    state: RecordingState,
    start_time: Option<Timestamp>,
    stop_time: Timestamp,
    frames: Vec<FrameRecord>,
    // Canvas size, taken from the first kept frame.
    dimensions: Option<(u32, u32)>,
    failure: Option<CaptureError>,
}

struct Inner {
    shared: Mutex<Shared>,
    changed: Condvar,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait_until_stopped<'a>(&self, guard: MutexGuard<'a, Shared>) -> MutexGuard<'a, Shared> {
        self.changed
            .wait_while(guard, |s| s.state != RecordingState::Stopped)
            .unwrap_or_else(|e| e.into_inner())
    }
}

/// Captures on its own thread, parks kept frames in scratch files and
/// exports them in capture order.
pub struct Recorder {
    inner: Arc<Inner>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn FrameStore>,
    runtime: Runtime,
    worker: Option<thread::JoinHandle<()>>,
}

impl Recorder {
    pub fn new<S, F>(source: S, store: F, settings: RecorderSettings) -> Result<Self, RecorderError>
    where
        S: FrameSource,
        F: FrameStore,
    {
        if !settings.fps_limit.is_finite() || settings.fps_limit <= 0.0 {
            return Err(RecorderError::InvalidSettings(format!(
                "fps limit must be positive, got {}",
                settings.fps_limit
            )));
        }

        let temp = TempFiles::new(&settings.temp_dir);
        temp.ensure_dir()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(settings.persist_threads.max(1))
            .thread_name("capgif-persist")
            .build()?;

        let inner = Arc::new(Inner {
            shared: Mutex::new(Shared {
                state: RecordingState::Idle,
                start_time: None,
                stop_time: 0,
                frames: Vec::new(),
                dimensions: None,
                failure: None,
            }),
            changed: Condvar::new(),
        });
        let clock = source.clock();
        let store: Arc<dyn FrameStore> = Arc::new(store);

        let worker = CaptureWorker {
            source,
            inner: Arc::clone(&inner),
            store: Arc::clone(&store),
            temp,
            runtime: runtime.handle().clone(),
            frame_interval: NANOS_PER_SECOND / settings.fps_limit,
        };
        let handle = thread::Builder::new()
            .name("capgif-capture".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            inner,
            clock,
            store,
            runtime,
            worker: Some(handle),
        })
    }

    pub fn state(&self) -> RecordingState {
        self.inner.lock().state
    }

    pub fn frame_count(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn start(&self) -> Result<(), RecorderError> {
        let mut shared = self.inner.lock();
        match shared.state {
            RecordingState::Idle => {
                shared.state = RecordingState::Recording;
                tracing::info!("recording started");
                self.inner.changed.notify_all();
                Ok(())
            }
            RecordingState::Recording => Ok(()),
            RecordingState::Stopped => Err(RecorderError::AlreadyStopped),
        }
    }

    pub fn stop(&self) {
        let mut shared = self.inner.lock();
        if shared.state != RecordingState::Stopped {
            shared.state = RecordingState::Stopped;
            shared.stop_time = self.clock.now();
            tracing::info!("recording stopped with {} frames", shared.frames.len());
        }
        self.inner.changed.notify_all();
    }

    /// Blocks until the recording is stopped, then writes the GIF. Must not
    /// be called from inside a tokio runtime.
    pub fn export<P: AsRef<Path>>(&self, path: P) -> Result<ExportSummary, RecorderError> {
        let path = path.as_ref();

        let (records, dimensions, stop_time, failure) = {
            let shared = self.inner.lock();
            if shared.state == RecordingState::Idle {
                return Err(RecorderError::NotStarted);
            }
            let mut shared = self.inner.wait_until_stopped(shared);
            (
                mem::take(&mut shared.frames),
                shared.dimensions.take(),
                shared.stop_time,
                shared.failure.take(),
            )
        };

        let Some((width, height)) = dimensions.filter(|_| !records.is_empty()) else {
            return Err(failure.map_or(RecorderError::NoFrames, RecorderError::Capture));
        };

        let timestamps: Vec<Timestamp> = records.iter().map(|r| r.timestamp).collect();
        let delays = gif_delays(&timestamps, stop_time);

        let mut summary = ExportSummary {
            captured: records.len(),
            ..Default::default()
        };
        let mut encode_error = None;
        let mut encoder = match GifEncoder::create(path, width, height) {
            Ok(encoder) => Some(encoder),
            Err(e) => {
                encode_error = Some(e);
                None
            }
        };

        for (record, delay) in records.into_iter().zip(delays) {
            let index = record.index;
            let location = match self.runtime.block_on(record.location) {
                Ok(location) => location,
                Err(e) => {
                    tracing::warn!("persistence task for frame {} failed: {}", index, e);
                    None
                }
            };
            let Some(file) = location else {
                summary.skipped += 1;
                continue;
            };

            if delay == 0 {
                tracing::debug!("skipping frame {}: shown for less than one tick", index);
                summary.skipped += 1;
            } else if encode_error.is_some() {
                summary.skipped += 1;
            } else if let Some(gif) = encoder.as_mut() {
                match self.encode_frame(gif, &file, delay) {
                    Ok(true) => summary.written += 1,
                    Ok(false) => summary.skipped += 1,
                    Err(e) => {
                        summary.skipped += 1;
                        encode_error = Some(e);
                    }
                }
            } else {
                summary.skipped += 1;
            }

            if let Err(e) = fs::remove_file(&file) {
                tracing::warn!("failed to remove {}: {}", file.display(), e);
            }
        }

        if let Some(e) = encode_error {
            return Err(e.into());
        }
        if let Some(mut encoder) = encoder {
            encoder.finish()?;
        }

        tracing::info!(
            "exported {} of {} frames to {}",
            summary.written,
            summary.captured,
            path.display()
        );

        match failure {
            Some(e) => Err(RecorderError::Capture(e)),
            None => Ok(summary),
        }
    }

    fn encode_frame(
        &self,
        gif: &mut GifEncoder<BufWriter<File>>,
        file: &Path,
        delay: u16,
    ) -> Result<bool, crate::gif::EncodingError> {
        let frame = match self.store.load(file) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("failed to load {}: {}", file.display(), e);
                return Ok(false);
            }
        };
        gif.add_frame(&frame, delay)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        {
            let mut shared = self.inner.lock();
            if shared.state == RecordingState::Idle {
                shared.state = RecordingState::Stopped;
                shared.stop_time = self.clock.now();
                self.inner.changed.notify_all();
            }
            let shared = self.inner.wait_until_stopped(shared);
            if !shared.frames.is_empty() {
                tracing::warn!("{} recorded frames were never exported", shared.frames.len());
            }
        }

        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("capture thread panicked");
            }
        }
    }
}

struct CaptureWorker<S> {
    source: S,
    inner: Arc<Inner>,
    store: Arc<dyn FrameStore>,
    temp: TempFiles,
    runtime: Handle,
    frame_interval: f64,
}

impl<S: FrameSource> CaptureWorker<S> {
    fn run(mut self) {
        loop {
            {
                let shared = self.inner.lock();
                let shared = self
                    .inner
                    .changed
                    .wait_while(shared, |s| s.state == RecordingState::Idle)
                    .unwrap_or_else(|e| e.into_inner());
                if shared.state == RecordingState::Stopped {
                    return;
                }
            }

            match self.source.grab() {
                Ok(captured) => self.offer(captured),
                Err(CaptureError::EndOfStream) => {
                    tracing::info!("frame source ended");
                    self.halt(None);
                    return;
                }
                Err(e) => {
                    tracing::error!("capture failed: {}", e);
                    self.halt(Some(e));
                    return;
                }
            }
        }
    }

    fn offer(&self, captured: CapturedFrame) {
        let CapturedFrame { frame, timestamp } = captured;
        let mut shared = self.inner.lock();
        if shared.state == RecordingState::Stopped {
            tracing::debug!("discarding frame captured after stop");
            return;
        }

        let index = shared.frames.len();
        let keep = match shared.start_time {
            None => {
                shared.start_time = Some(timestamp);
                true
            }
            Some(start) => timestamp as f64 >= start as f64 + index as f64 * self.frame_interval,
        };
        if !keep {
            return;
        }

        tracing::debug!("keeping frame {} at {} ns", index, timestamp);
        if shared.dimensions.is_none() {
            shared.dimensions = Some(frame.dimensions());
        }
        let path = self.temp.next_path();
        let store = Arc::clone(&self.store);
        let location = self
            .runtime
            .spawn_blocking(move || persist(store.as_ref(), frame, path, index));
        shared.frames.push(FrameRecord {
            index,
            timestamp,
            location,
        });
    }

    fn halt(&self, failure: Option<CaptureError>) {
        let now = self.source.clock().now();
        let mut shared = self.inner.lock();
        if shared.state != RecordingState::Stopped {
            shared.state = RecordingState::Stopped;
            shared.stop_time = now;
        }
        if failure.is_some() {
            shared.failure = failure;
        }
        self.inner.changed.notify_all();
    }
}

fn persist(store: &dyn FrameStore, frame: RawFrame, path: PathBuf, index: usize) -> Option<PathBuf> {
    match store.save(frame, &path) {
        Ok(()) => Some(path),
        Err(e) => {
            tracing::warn!("failed to persist frame {}: {}", index, e);
            let _ = fs::remove_file(&path);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::PersistError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    const MS: u64 = 1_000_000;

    struct ManualClock(AtomicU64);

    impl Clock for ManualClock {
        fn now(&self) -> Timestamp {
            self.0.load(Ordering::SeqCst)
        }
    }

    /// Emits `count` solid frames `step` nanoseconds apart, then ends or fails.
    struct StepSource {
        count: usize,
        next: usize,
        step: u64,
        clock: Arc<ManualClock>,
        backend_error: Option<&'static str>,
    }

    impl StepSource {
        fn new(count: usize, step: u64) -> Self {
            Self {
                count,
                next: 0,
                step,
                clock: Arc::new(ManualClock(AtomicU64::new(0))),
                backend_error: None,
            }
        }

        fn failing(count: usize, step: u64, message: &'static str) -> Self {
            Self {
                backend_error: Some(message),
                ..Self::new(count, step)
            }
        }
    }

    impl FrameSource for StepSource {
        fn grab(&mut self) -> Result<CapturedFrame, CaptureError> {
            let timestamp = self.next as u64 * self.step;
            self.clock.0.store(timestamp, Ordering::SeqCst);
            if self.next == self.count {
                return Err(match self.backend_error {
                    Some(message) => CaptureError::Backend(message.to_string()),
                    None => CaptureError::EndOfStream,
                });
            }
            let mut frame = RawFrame::new(2, 2)?;
            frame.fill([self.next as u8, 0, 0, 255]);
            self.next += 1;
            Ok(CapturedFrame { frame, timestamp })
        }

        fn clock(&self) -> Arc<dyn Clock> {
            self.clock.clone()
        }
    }

    /// Blocks in `grab` until stopped from outside.
    struct IdleSource(Arc<ManualClock>);

    impl FrameSource for IdleSource {
        fn grab(&mut self) -> Result<CapturedFrame, CaptureError> {
            thread::sleep(Duration::from_millis(5));
            let mut frame = RawFrame::new(1, 1)?;
            frame.fill([0, 0, 0, 255]);
            // Identical timestamps are never on the fps grid after the first.
            Ok(CapturedFrame { frame, timestamp: 0 })
        }

        fn clock(&self) -> Arc<dyn Clock> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        frames: Mutex<HashMap<PathBuf, RawFrame>>,
        fail_saves_of: Option<u8>,
    }

    impl FrameStore for MemoryStore {
        fn save(&self, frame: RawFrame, path: &Path) -> Result<(), PersistError> {
            if Some(frame.as_bytes()[0]) == self.fail_saves_of {
                return Err(PersistError::Io(std::io::Error::other("disk full")));
            }
            std::fs::write(path, b"")?;
            self.frames.lock().unwrap().insert(path.to_path_buf(), frame);
            Ok(())
        }

        fn load(&self, path: &Path) -> Result<RawFrame, PersistError> {
            self.frames
                .lock()
                .unwrap()
                .remove(path)
                .ok_or_else(|| PersistError::Io(std::io::ErrorKind::NotFound.into()))
        }
    }

    fn settings(dir: &Path, fps: f64) -> RecorderSettings {
        RecorderSettings {
            fps_limit: fps,
            temp_dir: dir.to_path_buf(),
            persist_threads: 2,
        }
    }

    #[test]
    fn test_invalid_fps_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = Recorder::new(StepSource::new(1, MS), MemoryStore::default(), settings(dir.path(), 0.0));
        assert!(matches!(result, Err(RecorderError::InvalidSettings(_))));
    }

    #[test]
    fn test_throttle_keeps_frames_on_grid() {
        let dir = tempfile::tempdir().unwrap();
        // 20 frames 5ms apart at 50 fps: only 0, 20, 40, 60 and 80ms qualify.
        let recorder =
            Recorder::new(StepSource::new(20, 5 * MS), MemoryStore::default(), settings(dir.path(), 50.0)).unwrap();
        recorder.start().unwrap();
        let summary = recorder.export(dir.path().join("out.gif")).unwrap();
        assert_eq!(summary.captured, 5);
        assert_eq!(summary.written, 5);
    }

    #[test]
    fn test_export_before_start_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let recorder =
            Recorder::new(StepSource::new(3, 100 * MS), MemoryStore::default(), settings(dir.path(), 10.0)).unwrap();
        assert!(matches!(
            recorder.export(dir.path().join("out.gif")),
            Err(RecorderError::NotStarted)
        ));
        assert_eq!(recorder.state(), RecordingState::Idle);
    }

    #[test]
    fn test_stopped_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let recorder =
            Recorder::new(StepSource::new(3, 100 * MS), MemoryStore::default(), settings(dir.path(), 10.0)).unwrap();
        recorder.stop();
        assert_eq!(recorder.state(), RecordingState::Stopped);
        assert!(matches!(recorder.start(), Err(RecorderError::AlreadyStopped)));
        assert!(matches!(
            recorder.export(dir.path().join("out.gif")),
            Err(RecorderError::NoFrames)
        ));
    }

    #[test]
    fn test_drop_idle_recorder_returns() {
        let dir = tempfile::tempdir().unwrap();
        let recorder =
            Recorder::new(StepSource::new(3, 100 * MS), MemoryStore::default(), settings(dir.path(), 10.0)).unwrap();
        drop(recorder);
    }

    #[test]
    fn test_stop_from_caller_ends_capture() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock(AtomicU64::new(0)));
        let recorder =
            Recorder::new(IdleSource(clock.clone()), MemoryStore::default(), settings(dir.path(), 10.0)).unwrap();
        recorder.start().unwrap();
        thread::sleep(Duration::from_millis(30));
        clock.0.store(500 * MS, Ordering::SeqCst);
        recorder.stop();

        let out = dir.path().join("out.gif");
        let summary = recorder.export(&out).unwrap();
        assert_eq!(summary.captured, 1);
        assert_eq!(summary.written, 1);
        assert!(out.exists());
    }

    #[test]
    fn test_failed_persist_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore {
            fail_saves_of: Some(1),
            ..Default::default()
        };
        let recorder = Recorder::new(StepSource::new(3, 100 * MS), store, settings(dir.path(), 10.0)).unwrap();
        recorder.start().unwrap();
        let summary = recorder.export(dir.path().join("out.gif")).unwrap();
        assert_eq!(
            summary,
            ExportSummary {
                captured: 3,
                written: 2,
                skipped: 1
            }
        );
    }

    #[test]
    fn test_scratch_files_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        let recorder =
            Recorder::new(StepSource::new(4, 100 * MS), MemoryStore::default(), settings(&scratch, 10.0)).unwrap();
        recorder.start().unwrap();
        recorder.export(dir.path().join("out.gif")).unwrap();
        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
    }

    fn gif_frame_count(path: &Path) -> usize {
        let mut decoder = ::gif::DecodeOptions::new()
            .read_info(File::open(path).unwrap())
            .unwrap();
        let mut count = 0;
        while decoder.read_next_frame().unwrap().is_some() {
            count += 1;
        }
        count
    }

    #[test]
    fn test_frames_too_short_still_produce_a_gif() {
        let dir = tempfile::tempdir().unwrap();
        // A single frame that ends 5ms later gets a zero delay.
        let recorder =
            Recorder::new(StepSource::new(1, 5 * MS), MemoryStore::default(), settings(dir.path(), 10.0)).unwrap();
        recorder.start().unwrap();

        let out = dir.path().join("out.gif");
        let summary = recorder.export(&out).unwrap();
        assert_eq!(
            summary,
            ExportSummary {
                captured: 1,
                written: 0,
                skipped: 1
            }
        );
        let bytes = std::fs::read(&out).unwrap();
        assert!(bytes.starts_with(b"GIF89a"));
        assert_eq!(bytes.last(), Some(&0x3B));
        assert_eq!(gif_frame_count(&out), 0);
    }

    #[test]
    fn test_all_persists_failing_still_produce_a_gif() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore {
            fail_saves_of: Some(0),
            ..Default::default()
        };
        let recorder = Recorder::new(StepSource::new(1, 100 * MS), store, settings(dir.path(), 10.0)).unwrap();
        recorder.start().unwrap();

        let out = dir.path().join("out.gif");
        let summary = recorder.export(&out).unwrap();
        assert_eq!(summary.written, 0);
        assert_eq!(summary.skipped, 1);
        assert_eq!(gif_frame_count(&out), 0);
    }

    #[test]
    fn test_capture_failure_keeps_frames_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        let recorder = Recorder::new(
            StepSource::failing(3, 100 * MS, "device lost"),
            MemoryStore::default(),
            settings(&scratch, 10.0),
        )
        .unwrap();
        recorder.start().unwrap();

        let out = dir.path().join("out.gif");
        let result = recorder.export(&out);
        assert!(
            matches!(result, Err(RecorderError::Capture(CaptureError::Backend(ref m))) if m == "device lost"),
            "{:?}",
            result
        );
        assert_eq!(recorder.state(), RecordingState::Stopped);
        assert_eq!(gif_frame_count(&out), 3);
        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[test]
    fn test_capture_failure_before_any_frame() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::new(
            StepSource::failing(0, 100 * MS, "no display"),
            MemoryStore::default(),
            settings(dir.path(), 10.0),
        )
        .unwrap();
        recorder.start().unwrap();

        let out = dir.path().join("out.gif");
        assert!(matches!(
            recorder.export(&out),
            Err(RecorderError::Capture(CaptureError::Backend(_)))
        ));
        assert!(!out.exists());
    }
}
