// Microphone capture via cpal
//
// cpal streams are not `Send`, so each acquisition owns a dedicated thread
// that opens the device, builds the stream and then waits for start/stop
// commands. The handle only ever talks to that thread over a channel.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig, StreamError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::backend::{AudioFormat, CaptureError, CaptureHandle, CaptureProvider, CaptureSink};

/// Microphone provider backed by the default cpal host
pub struct MicrophoneProvider {
    device_name: String,
}

impl MicrophoneProvider {
    /// `device_name` is a device name, a numeric index, or "default"
    pub fn new(device_name: String) -> Self {
        Self { device_name }
    }
}

#[async_trait::async_trait]
impl CaptureProvider for MicrophoneProvider {
    async fn acquire(&self, sink: CaptureSink) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (command_tx, command_rx) = std_mpsc::channel();
        let active = Arc::new(AtomicBool::new(false));

        let device_name = self.device_name.clone();
        let thread_active = Arc::clone(&active);
        let lost_tx = command_tx.clone();
        thread::Builder::new()
            .name("parley-microphone".to_string())
            .spawn(move || {
                run_stream_thread(device_name, sink, thread_active, ready_tx, command_rx, lost_tx)
            })
            .map_err(|e| CaptureError::Unavailable(format!("failed to spawn capture thread: {e}")))?;

        let format = ready_rx
            .await
            .map_err(|_| CaptureError::Unavailable("capture thread exited during setup".to_string()))??;

        Ok(Box::new(MicrophoneHandle {
            commands: command_tx,
            format,
            active,
            started: false,
            stopped: false,
        }))
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

enum StreamCommand {
    Start(std_mpsc::Sender<Result<(), CaptureError>>),
    Stop,
    /// Raised by the stream's error callback when the device disappears
    DeviceLost,
}

/// Handle over a microphone stream living on its own thread
pub struct MicrophoneHandle {
    commands: std_mpsc::Sender<StreamCommand>,
    format: AudioFormat,
    active: Arc<AtomicBool>,
    started: bool,
    stopped: bool,
}

impl CaptureHandle for MicrophoneHandle {
    fn start(&mut self) -> Result<(), CaptureError> {
        assert!(!self.started, "capture handle started twice");
        self.started = true;

        let (reply_tx, reply_rx) = std_mpsc::channel();
        self.commands
            .send(StreamCommand::Start(reply_tx))
            .map_err(|_| CaptureError::Device("capture thread is gone".to_string()))?;

        // The thread answers as soon as `play()` returns
        wait_for_reply(&reply_rx)
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        if self.commands.send(StreamCommand::Stop).is_err() {
            debug!("Microphone thread already exited");
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn format(&self) -> AudioFormat {
        self.format
    }
}

impl Drop for MicrophoneHandle {
    fn drop(&mut self) {
        // The stream's error callback holds a sender too, so the channel
        // never disconnects on its own
        self.stop();
    }
}

/// Wait for the capture thread's answer to a start command without stalling
/// other tasks on a multi-threaded runtime
fn wait_for_reply(reply_rx: &std_mpsc::Receiver<Result<(), CaptureError>>) -> Result<(), CaptureError> {
    let recv = || -> Result<(), CaptureError> {
        reply_rx
            .recv()
            .map_err(|_| CaptureError::Device("capture thread is gone".to_string()))?
    };

    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(recv),
        _ => recv(),
    }
}

fn run_stream_thread(
    device_name: String,
    sink: CaptureSink,
    active: Arc<AtomicBool>,
    ready_tx: oneshot::Sender<Result<AudioFormat, CaptureError>>,
    commands: std_mpsc::Receiver<StreamCommand>,
    lost_tx: std_mpsc::Sender<StreamCommand>,
) {
    let (stream, format) = match open_stream(&device_name, &sink, lost_tx) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if ready_tx.send(Ok(format)).is_err() {
        return;
    }

    serve_commands(&commands, &active, || {
        stream
            .play()
            .map_err(|e| CaptureError::Device(e.to_string()))
    });

    drop(stream);
    info!("Microphone capture stopped");
    sink.on_stop();
}

/// Apply start commands until the handle stops, the device is lost or the
/// handle goes away. Leaves `active` cleared.
fn serve_commands(
    commands: &std_mpsc::Receiver<StreamCommand>,
    active: &AtomicBool,
    mut play: impl FnMut() -> Result<(), CaptureError>,
) {
    while let Ok(command) = commands.recv() {
        match command {
            StreamCommand::Start(reply) => {
                let result = play();
                if result.is_ok() {
                    active.store(true, Ordering::SeqCst);
                    info!("Microphone capture started");
                }
                let _ = reply.send(result);
            }
            StreamCommand::Stop => break,
            StreamCommand::DeviceLost => {
                warn!("Input device went away, ending capture");
                break;
            }
        }
    }

    active.store(false, Ordering::SeqCst);
}

fn open_stream(
    device_name: &str,
    sink: &CaptureSink,
    lost_tx: std_mpsc::Sender<StreamCommand>,
) -> Result<(Stream, AudioFormat), CaptureError> {
    let host = cpal::default_host();
    let device = find_device(&host, device_name)?;

    let name = device.name().unwrap_or_else(|_| "Unknown device".to_string());
    info!("Recording device: {}", name);

    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::Unavailable(format!("no usable input config: {e}")))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let channels = config.channels as usize;
    let format = AudioFormat::new(config.sample_rate.0, 1);

    debug!(
        "Device configuration: {}Hz, {} channels, {:?}",
        config.sample_rate.0, channels, sample_format
    );

    let stream = match sample_format {
        SampleFormat::I16 => build_stream::<i16>(&device, &config, sink.clone(), lost_tx),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, sink.clone(), lost_tx),
        SampleFormat::F32 => build_stream::<f32>(&device, &config, sink.clone(), lost_tx),
        other => {
            return Err(CaptureError::Unavailable(format!(
                "unsupported sample format {other:?}"
            )))
        }
    }?;

    // Some hosts start streams on creation; hold off until `start()`
    if let Err(e) = stream.pause() {
        debug!("Could not pause fresh stream: {}", e);
    }

    Ok((stream, format))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    sink: CaptureSink,
    lost_tx: std_mpsc::Sender<StreamCommand>,
) -> Result<Stream, CaptureError>
where
    T: cpal::Sample + cpal::SizedSample,
    i16: cpal::FromSample<T>,
{
    let channels = config.channels as usize;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                sink.on_chunk(to_mono_pcm16(data, channels));
            },
            move |err| {
                error!("Audio stream error: {}", err);
                if is_device_lost(&err) {
                    let _ = lost_tx.send(StreamCommand::DeviceLost);
                }
            },
            None,
        )
        .map_err(|e| CaptureError::Unavailable(format!("failed to open input stream: {e}")))
}

fn is_device_lost(err: &StreamError) -> bool {
    matches!(err, StreamError::DeviceNotAvailable)
}

/// Mix interleaved frames down to mono and encode as PCM16 LE
fn to_mono_pcm16<T>(data: &[T], channels: usize) -> Vec<u8>
where
    T: cpal::Sample,
    i16: cpal::FromSample<T>,
{
    let channels = channels.max(1);
    let mut bytes = Vec::with_capacity(data.len() / channels * 2);

    for frame in data.chunks_exact(channels) {
        let sum: i32 = frame
            .iter()
            .map(|&s| <i16 as cpal::Sample>::from_sample(s) as i32)
            .sum();
        let mono = (sum / channels as i32) as i16;
        bytes.extend_from_slice(&mono.to_le_bytes());
    }

    bytes
}

/// Finds an input device by name or numeric index
fn find_device(host: &cpal::Host, device_spec: &str) -> Result<Device, CaptureError> {
    if device_spec == "default" {
        return host
            .default_input_device()
            .ok_or_else(|| CaptureError::Unavailable("no audio input device available".to_string()));
    }

    let devices: Vec<Device> = host
        .input_devices()
        .map_err(|e| CaptureError::Unavailable(format!("failed to enumerate devices: {e}")))?
        .collect();

    if let Ok(index) = device_spec.parse::<usize>() {
        let count = devices.len();
        return devices.into_iter().nth(index).ok_or_else(|| {
            CaptureError::Unavailable(format!(
                "device index {} is out of range ({} devices)",
                index, count
            ))
        });
    }

    for device in devices {
        if device.name().map(|n| n == device_spec).unwrap_or(false) {
            return Ok(device);
        }
    }

    warn!("Input device '{}' not found", device_spec);
    Err(CaptureError::Unavailable(format!(
        "audio input device '{device_spec}' not found"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_mono_averages_stereo() {
        let data: [i16; 4] = [100, 300, -200, -400];
        let bytes = to_mono_pcm16(&data, 2);

        assert_eq!(bytes.len(), 4);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 200);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), -300);
    }

    #[test]
    fn test_only_disconnect_counts_as_device_lost() {
        assert!(is_device_lost(&StreamError::DeviceNotAvailable));
        assert!(!is_device_lost(&StreamError::BackendSpecific {
            err: cpal::BackendSpecificError {
                description: "xrun".to_string(),
            },
        }));
    }

    #[test]
    fn test_device_lost_ends_running_capture() {
        let (tx, rx) = std_mpsc::channel();
        let active = AtomicBool::new(false);
        let (reply_tx, reply_rx) = std_mpsc::channel();

        tx.send(StreamCommand::Start(reply_tx)).unwrap();
        tx.send(StreamCommand::DeviceLost).unwrap();
        // Still connected: only the lost device can end the loop here
        serve_commands(&rx, &active, || Ok(()));

        assert!(reply_rx.recv().unwrap().is_ok());
        assert!(!active.load(Ordering::SeqCst));
    }

    #[test]
    fn test_failed_play_is_reported_to_start() {
        let (tx, rx) = std_mpsc::channel();
        let active = AtomicBool::new(false);
        let (reply_tx, reply_rx) = std_mpsc::channel();

        tx.send(StreamCommand::Start(reply_tx)).unwrap();
        tx.send(StreamCommand::Stop).unwrap();
        serve_commands(&rx, &active, || {
            Err(CaptureError::Device("device busy".to_string()))
        });

        assert!(matches!(reply_rx.recv().unwrap(), Err(CaptureError::Device(_))));
        assert!(!active.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_reply_wait_on_multi_thread_runtime() {
        let (reply_tx, reply_rx) = std_mpsc::channel();
        let responder = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(20));
            let _ = reply_tx.send(Ok(()));
        });

        // Other tasks keep running while the reply is pending
        let ticker = tokio::spawn(async { 7 });
        assert!(wait_for_reply(&reply_rx).is_ok());
        assert_eq!(ticker.await.unwrap(), 7);
        responder.join().unwrap();
    }

    #[tokio::test]
    async fn test_start_reply_wait_on_current_thread_runtime() {
        let (reply_tx, reply_rx) = std_mpsc::channel();
        reply_tx.send(Ok(())).unwrap();

        assert!(wait_for_reply(&reply_rx).is_ok());
    }

    #[test]
    fn test_start_reply_reports_vanished_thread() {
        let (reply_tx, reply_rx) = std_mpsc::channel::<Result<(), CaptureError>>();
        drop(reply_tx);

        assert!(matches!(wait_for_reply(&reply_rx), Err(CaptureError::Device(_))));
    }
}
