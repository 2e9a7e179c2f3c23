use crate::audio_data::AudioFormat;
use crate::device::{AudioDevice, GainRange, Line, LineControls};
use crate::error::{Result, SoundError};
use crate::sync::lock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

/// Configuration for a [`HeadlessDevice`]
#[derive(Debug, Clone)]
pub struct HeadlessDeviceDesc {
    /// Buffer capacity of each line, in samples
    pub buffer_size: usize,
    pub gain_range: GainRange,
    /// Sleep for the playback time of every write, as a real device would
    pub realtime: bool,
}

impl Default for HeadlessDeviceDesc {
    fn default() -> Self {
        Self {
            buffer_size: 4096,
            gain_range: GainRange::default(),
            realtime: false,
        }
    }
}

/// An audio device that discards everything written to it.
///
/// Lines behave like real ones as far as their state goes: writes and drains block while
/// a line is stopped and fail once it is closed. Every opened line stays inspectable
/// through [`HeadlessDevice::lines`].
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    desc: HeadlessDeviceDesc,
    unavailable: AtomicBool,
    fail_writes: Arc<AtomicBool>,
    hold_drains: Arc<AtomicBool>,
    lines: Mutex<Vec<HeadlessLine>>,
}

impl HeadlessDevice {
    pub fn new(desc: HeadlessDeviceDesc) -> Self {
        Self {
            desc,
            ..Default::default()
        }
    }

    /// Makes every following `open_line` fail with `ResourceUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    /// Makes writes on all lines fail with a device error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    /// While held, `drain` blocks on every line until released or the line is closed.
    pub fn set_hold_drains(&self, hold: bool) {
        self.hold_drains.store(hold, Ordering::Release);
        if !hold {
            for line in self.lines() {
                let _state = line.state();
                line.inner.changed.notify_all();
            }
        }
    }

    /// Every line opened so far, in opening order.
    pub fn lines(&self) -> Vec<HeadlessLine> {
        lock(&self.lines).clone()
    }

    pub fn open_line_count(&self) -> usize {
        lock(&self.lines).iter().filter(|line| line.is_open()).count()
    }
}

impl AudioDevice for HeadlessDevice {
    fn open_line(&self, format: &AudioFormat) -> Result<Box<dyn Line>> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(SoundError::ResourceUnavailable(
                "Headless device has no free lines".to_string(),
            ));
        }
        format.validate()?;

        let line = HeadlessLine {
            inner: Arc::new(HeadlessLineInner {
                format: *format,
                buffer_size: self.desc.buffer_size.max(format.frame_size()),
                realtime: self.desc.realtime,
                fail_writes: self.fail_writes.clone(),
                hold_drains: self.hold_drains.clone(),
                state: Mutex::new(LineState {
                    open: true,
                    active: true,
                    ..Default::default()
                }),
                changed: Condvar::new(),
                controls: LineControls::new(self.desc.gain_range),
            }),
        };
        lock(&self.lines).push(line.clone());
        log::debug!("Opened headless line {:?}", format);
        Ok(Box::new(line))
    }
}

/// Inspectable handle to a line opened by a [`HeadlessDevice`].
#[derive(Debug, Clone)]
pub struct HeadlessLine {
    inner: Arc<HeadlessLineInner>,
}

#[derive(Debug)]
struct HeadlessLineInner {
    format: AudioFormat,
    buffer_size: usize,
    realtime: bool,
    fail_writes: Arc<AtomicBool>,
    hold_drains: Arc<AtomicBool>,
    state: Mutex<LineState>,
    changed: Condvar,
    controls: LineControls,
}

#[derive(Debug, Default)]
struct LineState {
    open: bool,
    active: bool,
    samples_written: usize,
    writes: usize,
    drains: usize,
    flushes: usize,
    closes: usize,
}

impl HeadlessLine {
    pub fn samples_written(&self) -> usize {
        self.state().samples_written
    }

    pub fn write_count(&self) -> usize {
        self.state().writes
    }

    /// Number of `drain` calls entered so far, including ones still blocked.
    pub fn drain_count(&self) -> usize {
        self.state().drains
    }

    pub fn flush_count(&self) -> usize {
        self.state().flushes
    }

    /// How many times the line went from open to closed; never more than one.
    pub fn close_count(&self) -> usize {
        self.state().closes
    }

    fn state(&self) -> MutexGuard<'_, LineState> {
        lock(&self.inner.state)
    }

    /// Waits until the line is open and active. Returns `false` if it got closed.
    fn wait_until_active<'a>(
        &'a self,
        mut state: MutexGuard<'a, LineState>,
    ) -> (MutexGuard<'a, LineState>, bool) {
        while state.open && !state.active {
            state = self
                .inner
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        let open = state.open;
        (state, open)
    }
}

impl Line for HeadlessLine {
    fn format(&self) -> AudioFormat {
        self.inner.format
    }

    fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    fn write(&self, samples: &[f32]) -> Result<usize> {
        let (mut state, open) = self.wait_until_active(self.state());
        if !open {
            return Err(SoundError::LineClosed);
        }
        if self.inner.fail_writes.load(Ordering::Acquire) {
            return Err(SoundError::Device("Injected write failure".to_string()));
        }

        let frame = self.inner.format.frame_size();
        let accepted = samples.len().min(self.inner.buffer_size) / frame * frame;
        state.samples_written += accepted;
        state.writes += 1;
        drop(state);

        if self.inner.realtime {
            thread::sleep(self.inner.format.duration_of(accepted));
        }
        Ok(accepted)
    }

    fn drain(&self) {
        let mut state = self.state();
        state.drains += 1;
        while state.open && (!state.active || self.inner.hold_drains.load(Ordering::Acquire)) {
            state = self
                .inner
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn flush(&self) {
        self.state().flushes += 1;
    }

    fn start(&self) {
        let mut state = self.state();
        if state.open {
            state.active = true;
            self.inner.changed.notify_all();
        }
    }

    fn stop(&self) {
        self.state().active = false;
    }

    fn close(&self) {
        let mut state = self.state();
        if state.open {
            state.open = false;
            state.active = false;
            state.closes += 1;
            self.inner.changed.notify_all();
            log::debug!("Closed headless line {:?}", self.inner.format);
        }
    }

    fn is_open(&self) -> bool {
        self.state().open
    }

    fn is_active(&self) -> bool {
        let state = self.state();
        state.open && state.active
    }

    fn gain_range(&self) -> GainRange {
        self.inner.controls.range()
    }

    fn set_gain_db(&self, db: f32) {
        self.inner.controls.set_gain_db(db);
    }

    fn gain_db(&self) -> f32 {
        self.inner.controls.gain_db()
    }

    fn set_muted(&self, muted: bool) {
        self.inner.controls.set_muted(muted);
    }

    fn is_muted(&self) -> bool {
        self.inner.controls.is_muted()
    }

    fn set_balance(&self, balance: f32) {
        self.inner.controls.set_balance(balance);
    }

    fn balance(&self) -> f32 {
        self.inner.controls.balance()
    }
}
