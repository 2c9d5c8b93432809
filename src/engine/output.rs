// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The cpal output stream feeding from a [`Mixer`].
//!
//! cpal streams are not Send, so the stream lives on a dedicated thread for
//! its whole lifetime; startup status and shutdown travel over channels, the
//! audio data itself is pulled straight from the mixer inside the callback.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{error, info, warn};

use super::mixer::Mixer;

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("no audio output device available")]
    NoDevice,

    #[error("output stream error: {0}")]
    Stream(String),
}

/// Returns true when the host exposes a default output device. Safe to call
/// before any stream exists.
pub fn probe() -> bool {
    cpal::default_host().default_output_device().is_some()
}

/// A running output stream. Dropping it shuts the stream thread down.
pub struct AudioOutput {
    shutdown_tx: Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl AudioOutput {
    /// Starts an output stream pulling frames from the given mixer. Blocks
    /// until the stream is playing or failed to start.
    pub fn start(mixer: Arc<Mixer>) -> Result<AudioOutput, OutputError> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let (status_tx, status_rx) = bounded::<Result<(), OutputError>>(1);

        let join = thread::spawn(move || {
            AudioOutput::run_stream(mixer, shutdown_rx, status_tx);
        });

        match status_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => Ok(AudioOutput {
                shutdown_tx,
                join: Some(join),
            }),
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => Err(OutputError::Stream(
                "timed out waiting for the output stream to start".to_string(),
            )),
        }
    }

    /// Stream thread body: owns the cpal stream until shutdown.
    fn run_stream(
        mixer: Arc<Mixer>,
        shutdown_rx: Receiver<()>,
        status_tx: Sender<Result<(), OutputError>>,
    ) {
        let device = match cpal::default_host().default_output_device() {
            Some(device) => device,
            None => {
                let _ = status_tx.send(Err(OutputError::NoDevice));
                return;
            }
        };

        let config = cpal::StreamConfig {
            channels: mixer.channels(),
            sample_rate: mixer.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let callback_mixer = mixer.clone();
        let channels = mixer.channels() as usize;
        let stream_result = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                callback_mixer.process_into(data, frames);
            },
            |err| error!(err = %err, "Output stream error"),
            None,
        );

        let stream = match stream_result {
            Ok(stream) => stream,
            Err(e) => {
                let _ = status_tx.send(Err(OutputError::Stream(e.to_string())));
                return;
            }
        };

        if let Err(e) = stream.play() {
            let _ = status_tx.send(Err(OutputError::Stream(e.to_string())));
            return;
        }

        info!(
            sample_rate = mixer.sample_rate(),
            channels = mixer.channels(),
            "Output stream started"
        );
        let _ = status_tx.send(Ok(()));

        // Keep the stream alive until shutdown. A closed channel counts as
        // shutdown too.
        let _ = shutdown_rx.recv();
        drop(stream);
        info!("Output stream stopped");
    }

    /// Stops the stream thread. Safe to call more than once.
    pub fn stop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("Output stream thread panicked during shutdown");
            }
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
