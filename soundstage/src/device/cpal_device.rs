use crate::audio_data::AudioFormat;
use crate::device::{AudioDevice, GainRange, Line, LineControls};
use crate::error::{Result, SoundError};
use crate::sync::lock;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::{Receiver, Sender, bounded};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Longest a blocked writer waits for a space signal before re-checking the line,
/// covering a stream that stopped calling back
const WAKE_TIMEOUT: Duration = Duration::from_millis(50);

/// Configuration for a [`CpalDevice`]
#[derive(Debug, Clone)]
pub struct CpalDeviceDesc {
    /// Amount of audio each line buffers ahead of the output stream
    pub buffer_duration: Duration,
    /// Range of the software gain applied to each line
    pub gain_range: GainRange,
    /// Output device to use; `None` selects the host's default device
    pub device_name: Option<String>,
}

impl Default for CpalDeviceDesc {
    fn default() -> Self {
        Self {
            buffer_duration: Duration::from_millis(100),
            gain_range: GainRange::default(),
            device_name: None,
        }
    }
}

impl CpalDeviceDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer_duration(mut self, duration: Duration) -> Self {
        self.buffer_duration = duration;
        self
    }

    pub fn gain_range(mut self, range: GainRange) -> Self {
        self.gain_range = range;
        self
    }

    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }
}

/// Audio device backed by cpal. Every line is a separate output stream.
#[derive(Debug)]
pub struct CpalDevice {
    desc: CpalDeviceDesc,
}

impl CpalDevice {
    /// Creates the device, checking that the configured output device exists.
    pub fn new(desc: CpalDeviceDesc) -> Result<Self> {
        let device = find_device(desc.device_name.as_deref())?;
        log::info!(
            "Using audio output device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );
        Ok(Self { desc })
    }

    /// Preferred sample rate of the output device. Sounds at this rate need no
    /// conversion by the host audio system.
    pub fn default_sample_rate(&self) -> Result<u32> {
        let device = find_device(self.desc.device_name.as_deref())?;
        let config = device.default_output_config().map_err(|e| {
            SoundError::Device(format!("Failed to get default config: {}", e))
        })?;
        Ok(config.sample_rate().0)
    }
}

impl AudioDevice for CpalDevice {
    fn open_line(&self, format: &AudioFormat) -> Result<Box<dyn Line>> {
        format.validate()?;
        let line = CpalLine::open(&self.desc, *format)?;
        Ok(Box::new(line))
    }
}

fn find_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    let device = match name {
        None => host.default_output_device(),
        Some(name) => host
            .output_devices()
            .map_err(|e| SoundError::Device(format!("Failed to list output devices: {}", e)))?
            .find(|device| device.name().ok().as_deref() == Some(name)),
    };
    device.ok_or_else(|| {
        SoundError::ResourceUnavailable(match name {
            None => "No default output device available".to_string(),
            Some(name) => format!("Output device '{}' not found", name),
        })
    })
}

/// State shared between a line handle and its stream callback
#[derive(Debug)]
struct LineShared {
    controls: LineControls,
    open: AtomicBool,
    active: AtomicBool,
    flush_requested: AtomicBool,
}

impl LineShared {
    fn new(range: GainRange) -> Self {
        Self {
            controls: LineControls::new(range),
            open: AtomicBool::new(true),
            active: AtomicBool::new(true),
            flush_requested: AtomicBool::new(false),
        }
    }
}

/// Writer side of a line's ring buffer. Writers block on `space` until the stream
/// callback frees room or the line closes.
struct LineBuffer {
    producer: Mutex<HeapProd<f32>>,
    space: Receiver<()>,
    wake: Sender<()>,
}

impl LineBuffer {
    fn new(capacity: usize, channels: u16) -> (Self, LineRenderer) {
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        // One pending token is enough: a writer re-checks the buffer on every wake
        let (wake, space) = bounded::<()>(1);
        let renderer = LineRenderer {
            consumer,
            space: wake.clone(),
            frame: vec![0.0; channels as usize],
        };
        let buffer = Self {
            producer: Mutex::new(producer),
            space,
            wake,
        };
        (buffer, renderer)
    }

    /// Push whole frames, blocking while the buffer is full.
    fn write(&self, samples: &[f32], frame: usize, open: &AtomicBool) -> Result<usize> {
        let wanted = samples.len() / frame * frame;
        if wanted == 0 {
            return Ok(0);
        }

        loop {
            if !open.load(Ordering::Acquire) {
                return Err(SoundError::LineClosed);
            }

            {
                let mut producer = lock(&self.producer);
                let vacant = producer.vacant_len() / frame * frame;
                if vacant > 0 {
                    return Ok(producer.push_slice(&samples[..wanted.min(vacant)]));
                }
            }
            let _ = self.space.recv_timeout(WAKE_TIMEOUT);
        }
    }

    fn drain(&self, open: &AtomicBool) {
        while open.load(Ordering::Acquire) && lock(&self.producer).occupied_len() > 0 {
            let _ = self.space.recv_timeout(WAKE_TIMEOUT);
        }
    }

    fn wake(&self) {
        let _ = self.wake.try_send(());
    }
}

/// Stream side of a line's ring buffer
struct LineRenderer {
    consumer: HeapCons<f32>,
    space: Sender<()>,
    frame: Vec<f32>,
}

impl LineRenderer {
    /// Fill one output callback buffer, mapping mono and stereo input onto the
    /// first two output channels with the line's gain and balance.
    fn render<T>(&mut self, data: &mut [T], output_channels: usize, shared: &LineShared)
    where
        T: SizedSample + FromSample<f32>,
    {
        let mut consumed = false;
        if shared.flush_requested.swap(false, Ordering::AcqRel) {
            self.consumer.clear();
            consumed = true;
        }

        if !shared.active.load(Ordering::Acquire) {
            for sample in data.iter_mut() {
                *sample = T::from_sample(0.0f32);
            }
            if consumed {
                self.signal_space();
            }
            return;
        }

        let input_channels = self.frame.len();
        let gain = shared.controls.linear_gain();
        let (left, right) = shared.controls.balance_gains();

        for out in data.chunks_mut(output_channels) {
            if self.consumer.occupied_len() < input_channels {
                self.frame.fill(0.0);
            } else {
                self.consumer.pop_slice(&mut self.frame);
                consumed = true;
            }

            let frame = &self.frame;
            match input_channels {
                1 => {
                    out[0] = T::from_sample(frame[0] * gain * left);
                    out[1] = T::from_sample(frame[0] * gain * right);
                }
                2 => {
                    out[0] = T::from_sample(frame[0] * gain * left);
                    out[1] = T::from_sample(frame[1] * gain * right);
                }
                _ => {
                    for (sample, value) in out.iter_mut().zip(frame.iter()) {
                        *sample = T::from_sample(value * gain);
                    }
                }
            }
        }

        if consumed {
            self.signal_space();
        }
    }

    fn signal_space(&self) {
        // A full channel already holds a wake for the writer
        let _ = self.space.try_send(());
    }
}

struct CpalLine {
    format: AudioFormat,
    buffer_size: usize,
    shared: Arc<LineShared>,
    buffer: LineBuffer,
    /// Dropping the sender tells the stream thread to tear the stream down
    shutdown: Mutex<Option<Sender<()>>>,
    stream_thread: Mutex<Option<JoinHandle<()>>>,
}

impl CpalLine {
    fn open(desc: &CpalDeviceDesc, format: AudioFormat) -> Result<Self> {
        let buffer_size = format
            .samples_for(desc.buffer_duration)
            .max(format.frame_size());
        let (buffer, renderer) = LineBuffer::new(buffer_size, format.channels);
        let shared = Arc::new(LineShared::new(desc.gain_range));

        // cpal streams are not Send, so each one lives on a thread of its own
        let (ready_sender, ready_receiver) = bounded::<Result<()>>(1);
        let (shutdown_sender, shutdown_receiver) = bounded::<()>(0);
        let device_name = desc.device_name.clone();
        let stream_shared = shared.clone();
        let stream_thread = thread::Builder::new()
            .name("sound-line-stream".to_string())
            .spawn(move || {
                let stream =
                    match build_stream(device_name.as_deref(), format, renderer, stream_shared) {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_sender.send(Err(e));
                            return;
                        }
                    };
                let _ = ready_sender.send(Ok(()));
                // Blocks until the line is closed and the sender dropped
                let _ = shutdown_receiver.recv();
                drop(stream);
            })
            .map_err(|e| SoundError::Device(format!("Failed to spawn stream thread: {}", e)))?;

        let ready = ready_receiver.recv().unwrap_or_else(|_| {
            Err(SoundError::Device("Stream thread exited unexpectedly".to_string()))
        });
        if let Err(e) = ready {
            let _ = stream_thread.join();
            return Err(e);
        }

        log::debug!("Opened cpal line {:?} ({} samples buffered)", format, buffer_size);
        Ok(Self {
            format,
            buffer_size,
            shared,
            buffer,
            shutdown: Mutex::new(Some(shutdown_sender)),
            stream_thread: Mutex::new(Some(stream_thread)),
        })
    }
}

fn build_stream(
    device_name: Option<&str>,
    format: AudioFormat,
    renderer: LineRenderer,
    shared: Arc<LineShared>,
) -> Result<cpal::Stream> {
    let device = find_device(device_name)?;
    let default_config = device.default_output_config().map_err(|e| {
        SoundError::ResourceUnavailable(format!("Failed to get default config: {}", e))
    })?;

    // Mono and stereo sources both play through a stereo stream so balance applies
    let output_channels = format.channels.max(2);
    let config = cpal::StreamConfig {
        channels: output_channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match default_config.sample_format() {
        cpal::SampleFormat::F32 => create_stream::<f32>(&device, &config, renderer, shared)?,
        cpal::SampleFormat::I16 => create_stream::<i16>(&device, &config, renderer, shared)?,
        cpal::SampleFormat::U16 => create_stream::<u16>(&device, &config, renderer, shared)?,
        _ => {
            return Err(SoundError::ResourceUnavailable(
                "Unsupported sample format".to_string(),
            ));
        }
    };

    stream
        .play()
        .map_err(|e| SoundError::ResourceUnavailable(format!("Failed to start stream: {}", e)))?;
    Ok(stream)
}

/// Create a typed output stream that renders one line's ring buffer
fn create_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: LineRenderer,
    shared: Arc<LineShared>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let output_channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                renderer.render(data, output_channels, &shared);
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| SoundError::ResourceUnavailable(format!("Failed to build stream: {}", e)))
}

impl Line for CpalLine {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn write(&self, samples: &[f32]) -> Result<usize> {
        self.buffer
            .write(samples, self.format.frame_size(), &self.shared.open)
    }

    fn drain(&self) {
        self.buffer.drain(&self.shared.open);
    }

    fn flush(&self) {
        self.shared.flush_requested.store(true, Ordering::Release);
    }

    fn start(&self) {
        if self.is_open() {
            self.shared.active.store(true, Ordering::Release);
        }
    }

    fn stop(&self) {
        self.shared.active.store(false, Ordering::Release);
    }

    fn close(&self) {
        if !self.shared.open.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shared.active.store(false, Ordering::Release);
        self.buffer.wake();
        lock(&self.shutdown).take();
        if let Some(handle) = lock(&self.stream_thread).take() {
            if handle.join().is_err() {
                log::warn!("Stream thread panicked while closing line");
            }
        }
        log::debug!("Closed cpal line {:?}", self.format);
    }

    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    fn is_active(&self) -> bool {
        self.is_open() && self.shared.active.load(Ordering::Acquire)
    }

    fn gain_range(&self) -> GainRange {
        self.shared.controls.range()
    }

    fn set_gain_db(&self, db: f32) {
        self.shared.controls.set_gain_db(db);
    }

    fn gain_db(&self) -> f32 {
        self.shared.controls.gain_db()
    }

    fn set_muted(&self, muted: bool) {
        self.shared.controls.set_muted(muted);
    }

    fn is_muted(&self) -> bool {
        self.shared.controls.is_muted()
    }

    fn set_balance(&self, balance: f32) {
        self.shared.controls.set_balance(balance);
    }

    fn balance(&self) -> f32 {
        self.shared.controls.balance()
    }
}

impl Drop for CpalLine {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_writer(
        buffer: &Arc<LineBuffer>,
        open: &Arc<AtomicBool>,
        samples: Vec<f32>,
    ) -> JoinHandle<Result<usize>> {
        let buffer = buffer.clone();
        let open = open.clone();
        thread::spawn(move || buffer.write(&samples, 2, &open))
    }

    #[test]
    fn test_blocked_write_resumes_when_stream_consumes() {
        let (buffer, mut renderer) = LineBuffer::new(4, 2);
        let buffer = Arc::new(buffer);
        let open = Arc::new(AtomicBool::new(true));
        let shared = LineShared::new(GainRange::default());

        assert_eq!(buffer.write(&[0.5; 4], 2, &open).unwrap(), 4);
        let writer = spawn_writer(&buffer, &open, vec![0.25; 4]);
        thread::sleep(Duration::from_millis(10));
        assert!(!writer.is_finished());

        // One stereo output frame frees exactly one input frame
        let mut output = [0.0f32; 2];
        renderer.render(&mut output, 2, &shared);
        assert_eq!(output, [0.5, 0.5]);

        assert_eq!(writer.join().unwrap().unwrap(), 2);
        assert_eq!(lock(&buffer.producer).occupied_len(), 4);
    }

    #[test]
    fn test_close_wakes_blocked_writer() {
        let (buffer, _renderer) = LineBuffer::new(2, 2);
        let buffer = Arc::new(buffer);
        let open = Arc::new(AtomicBool::new(true));

        assert_eq!(buffer.write(&[0.5; 2], 2, &open).unwrap(), 2);
        let writer = spawn_writer(&buffer, &open, vec![0.25; 2]);
        thread::sleep(Duration::from_millis(10));

        open.store(false, Ordering::Release);
        buffer.wake();
        assert!(matches!(writer.join().unwrap(), Err(SoundError::LineClosed)));
    }

    #[test]
    fn test_drain_returns_once_stream_empties_buffer() {
        let (buffer, mut renderer) = LineBuffer::new(4, 2);
        let buffer = Arc::new(buffer);
        let open = Arc::new(AtomicBool::new(true));
        let shared = LineShared::new(GainRange::default());
        buffer.write(&[0.5; 4], 2, &open).unwrap();

        let drain = {
            let buffer = buffer.clone();
            let open = open.clone();
            thread::spawn(move || buffer.drain(&open))
        };
        thread::sleep(Duration::from_millis(10));
        assert!(!drain.is_finished());

        let mut output = [0.0f32; 4];
        renderer.render(&mut output, 2, &shared);
        drain.join().unwrap();
    }

    #[test]
    fn test_render_pans_mono_and_pads_underrun_with_silence() {
        let (buffer, mut renderer) = LineBuffer::new(4, 1);
        let open = AtomicBool::new(true);
        let shared = LineShared::new(GainRange::default());
        shared.controls.set_balance(0.5);
        buffer.write(&[0.8], 1, &open).unwrap();

        let mut output = [1.0f32; 4];
        renderer.render(&mut output, 2, &shared);
        assert_eq!(output, [0.4, 0.8, 0.0, 0.0]);
    }

    #[test]
    fn test_render_outputs_silence_when_stopped_and_applies_flush() {
        let (buffer, mut renderer) = LineBuffer::new(4, 2);
        let open = AtomicBool::new(true);
        let shared = LineShared::new(GainRange::default());
        buffer.write(&[0.5; 4], 2, &open).unwrap();

        shared.active.store(false, Ordering::Release);
        let mut output = [1.0f32; 2];
        renderer.render(&mut output, 2, &shared);
        assert_eq!(output, [0.0, 0.0]);
        assert_eq!(lock(&buffer.producer).occupied_len(), 4);

        shared.flush_requested.store(true, Ordering::Release);
        renderer.render(&mut output, 2, &shared);
        assert_eq!(lock(&buffer.producer).occupied_len(), 0);
        // The flush leaves a space wake for the next writer
        assert!(buffer.space.try_recv().is_ok());
    }
}
