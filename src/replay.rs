// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Capture replay controller.
//!
//! An open capture is owned by a dedicated playback thread. Every control
//! call is sent to that thread as a [`Command`] over a `kanal` channel and
//! the caller blocks until the thread replies, so once a call returns the
//! playback state already reflects it.
//!
//! ```text
//!            open()                      resume()
//!  Closed ─────────────► Open{paused} ─────────────► Open{running}
//!    ▲                     │    ▲                        │
//!    │       close()       │    └────── pause() ─────────┤
//!    └─────────────────────┘          end without loop ──┘
//! ```
//!
//! Packets are handed to the [`SensorFeed`] from the playback thread.
//! Feed listeners must not call back into the controller.

use crate::{feed::SensorFeed, lidar::Error, pcap_source::Capture};
use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
    thread::JoinHandle,
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};

/// Longest the playback thread sleeps before re-checking its schedule.
const MAX_WAIT: Duration = Duration::from_secs(1);

/// Snapshot of the replay state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReplayState {
    pub is_open: bool,
    /// Seconds from the start of the capture.
    pub position_sec: f32,
    pub length_sec: f32,
    pub loop_enabled: bool,
    pub speed: f32,
    pub is_running: bool,
    /// Every packet has been replayed.
    pub is_end: bool,
    /// Capture time of the first packet in microseconds.
    pub start_time: u64,
}

impl Default for ReplayState {
    fn default() -> Self {
        Self {
            is_open: false,
            position_sec: 0.0,
            length_sec: 0.0,
            loop_enabled: false,
            speed: 1.0,
            is_running: false,
            is_end: false,
            start_time: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Command {
    State,
    Resume,
    Pause,
    ResumeBlockingOnce,
    ResumeBlocking(f32),
    Seek(f32),
    Rewind,
    SetLoop(bool),
    SetSpeed(f32),
    Close,
}

struct Request {
    command: Command,
    reply: kanal::Sender<Result<ReplayState, Error>>,
}

struct Player {
    requests: kanal::Sender<Request>,
    thread: JoinHandle<()>,
}

/// Controls replay of one capture at a time into a [`SensorFeed`].
pub struct CaptureReplay {
    feed: Arc<SensorFeed>,
    player: Mutex<Option<Player>>,
}

impl CaptureReplay {
    pub fn new(feed: Arc<SensorFeed>) -> Self {
        Self {
            feed,
            player: Mutex::new(None),
        }
    }

    fn player(&self) -> MutexGuard<'_, Option<Player>> {
        self.player.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a capture file, paused at its start.
    ///
    /// On failure the controller stays closed.
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let mut player = self.player();
        if player.is_some() {
            return Err(Error::AlreadyOpen);
        }

        let capture = Capture::from_file(path.as_ref(), None)?;
        info!(
            path = %path.as_ref().display(),
            packets = capture.len(),
            length_sec = capture.length_sec(),
            "opened capture"
        );
        *player = Some(self.spawn(capture)?);
        Ok(())
    }

    /// Open an in-memory capture, paused at its start.
    pub fn open_capture(&self, capture: Capture) -> Result<(), Error> {
        let mut player = self.player();
        if player.is_some() {
            return Err(Error::AlreadyOpen);
        }
        *player = Some(self.spawn(capture)?);
        Ok(())
    }

    fn spawn(&self, capture: Capture) -> Result<Player, Error> {
        let (requests, rx) = kanal::bounded(1);
        let playback = Playback::new(capture, self.feed.clone());
        let thread = std::thread::Builder::new()
            .name("capture-replay".to_string())
            .spawn(move || playback.run(rx))?;
        Ok(Player { requests, thread })
    }

    /// Stop playback and release the capture. Every sensor seen in the
    /// capture is detached before this returns.
    pub fn close(&self) -> Result<(), Error> {
        let player = self.player().take().ok_or(Error::NotOpen)?;
        let result = Self::send(&player, Command::Close);
        if player.thread.join().is_err() {
            warn!("capture replay thread panicked");
        }
        info!("closed capture");
        result.map(|_| ())
    }

    fn request(&self, command: Command) -> Result<ReplayState, Error> {
        let player = self.player();
        let player = player.as_ref().ok_or(Error::NotOpen)?;
        Self::send(player, command)
    }

    fn send(player: &Player, command: Command) -> Result<ReplayState, Error> {
        let (reply, response) = kanal::bounded(1);
        player
            .requests
            .send(Request { command, reply })
            .map_err(|_| Error::NotInitialized)?;
        response.recv().map_err(|_| Error::NotInitialized)?
    }

    /// Current state; a default closed state when no capture is open.
    pub fn state(&self) -> Result<ReplayState, Error> {
        match self.request(Command::State) {
            Err(Error::NotOpen) => Ok(ReplayState::default()),
            result => result,
        }
    }

    /// Start real-time playback scaled by the speed.
    pub fn resume(&self) -> Result<(), Error> {
        self.request(Command::Resume).map(|_| ())
    }

    pub fn pause(&self) -> Result<(), Error> {
        self.request(Command::Pause).map(|_| ())
    }

    /// Pause, then replay exactly one packet.
    ///
    /// Returns [`Error::Eof`] at the end of a capture that does not loop.
    pub fn resume_blocking_once(&self) -> Result<(), Error> {
        self.request(Command::ResumeBlockingOnce).map(|_| ())
    }

    /// Pause, then replay every packet within the next `sec` seconds of
    /// capture time without sleeping.
    pub fn resume_blocking(&self, sec: f32) -> Result<(), Error> {
        if !sec.is_finite() || sec < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "replay duration must be non-negative, got {}",
                sec
            )));
        }
        self.request(Command::ResumeBlocking(sec)).map(|_| ())
    }

    /// Move to `sec` seconds into the capture, `0 <= sec < length`.
    pub fn seek(&self, sec: f32) -> Result<(), Error> {
        self.request(Command::Seek(sec)).map(|_| ())
    }

    pub fn rewind(&self) -> Result<(), Error> {
        self.request(Command::Rewind).map(|_| ())
    }

    pub fn set_enable_loop(&self, enable: bool) -> Result<(), Error> {
        self.request(Command::SetLoop(enable)).map(|_| ())
    }

    /// Set the playback speed multiplier; must be positive and finite.
    pub fn set_speed(&self, speed: f32) -> Result<(), Error> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "speed must be positive, got {}",
                speed
            )));
        }
        self.request(Command::SetSpeed(speed)).map(|_| ())
    }

    pub fn is_open(&self) -> bool {
        self.player().is_some()
    }

    pub fn position(&self) -> f32 {
        self.state().map(|s| s.position_sec).unwrap_or_default()
    }

    pub fn length(&self) -> f32 {
        self.state().map(|s| s.length_sec).unwrap_or_default()
    }

    pub fn is_end(&self) -> bool {
        self.state().map(|s| s.is_end).unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        self.state().map(|s| s.is_running).unwrap_or_default()
    }

    pub fn enable_loop(&self) -> bool {
        self.state().map(|s| s.loop_enabled).unwrap_or_default()
    }

    pub fn speed(&self) -> f32 {
        self.state().map(|s| s.speed).unwrap_or(1.0)
    }

    pub fn start_time(&self) -> u64 {
        self.state().map(|s| s.start_time).unwrap_or_default()
    }
}

impl Drop for CaptureReplay {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(err) = self.close() {
                warn!("failed to close capture: {}", err);
            }
        }
    }
}

/// Playback state owned by the playback thread.
struct Playback {
    capture: Capture,
    feed: Arc<SensorFeed>,
    /// Index of the next packet to replay.
    cursor: usize,
    position: f32,
    loop_enabled: bool,
    speed: f32,
    /// Wall clock instant matching a capture position while running.
    anchor: Option<(Instant, f32)>,
}

impl Playback {
    fn new(capture: Capture, feed: Arc<SensorFeed>) -> Self {
        Self {
            capture,
            feed,
            cursor: 0,
            position: 0.0,
            loop_enabled: false,
            speed: 1.0,
            anchor: None,
        }
    }

    fn run(mut self, requests: kanal::Receiver<Request>) {
        loop {
            let request = if self.anchor.is_some() {
                let wait = self.until_next_packet();
                let received = if wait.is_zero() {
                    requests.try_recv().map_err(|_| ())
                } else {
                    match requests.recv_timeout(wait) {
                        Ok(request) => Ok(Some(request)),
                        Err(kanal::ReceiveErrorTimeout::Timeout) => Ok(None),
                        Err(_) => Err(()),
                    }
                };

                match received {
                    Ok(Some(request)) => request,
                    Ok(None) => {
                        if self.until_next_packet().is_zero() {
                            self.play_due();
                        }
                        continue;
                    }
                    Err(()) => break,
                }
            } else {
                match requests.recv() {
                    Ok(request) => request,
                    Err(_) => break,
                }
            };

            let close = request.command == Command::Close;
            let reply = self.handle(request.command).map(|_| self.state());
            if request.reply.send(reply).is_err() {
                debug!("replay caller went away");
            }
            if close {
                break;
            }
        }
    }

    fn handle(&mut self, command: Command) -> Result<(), Error> {
        debug!(?command, "replay command");
        match command {
            Command::State => {}
            Command::Resume => {
                if self.anchor.is_none() {
                    self.anchor = Some((Instant::now(), self.position));
                }
            }
            Command::Pause => self.anchor = None,
            Command::ResumeBlockingOnce => {
                self.anchor = None;
                if self.is_end() {
                    if !self.can_loop() {
                        return Err(Error::Eof);
                    }
                    self.rewind();
                }
                self.play_next();
            }
            Command::ResumeBlocking(sec) => {
                self.anchor = None;
                self.play_for(sec);
            }
            Command::Seek(sec) => {
                let length = self.capture.length_sec();
                if !(0.0..length).contains(&sec) {
                    return Err(Error::InvalidArgument(format!(
                        "seek position {} outside [0, {})",
                        sec, length
                    )));
                }
                self.cursor = self.capture.index_at(sec);
                self.position = sec;
                self.reanchor();
            }
            Command::Rewind => {
                self.rewind();
                self.reanchor();
            }
            Command::SetLoop(enable) => self.loop_enabled = enable,
            Command::SetSpeed(speed) => {
                self.speed = speed;
                self.reanchor();
            }
            Command::Close => {
                self.anchor = None;
                let detached = self.feed.detach_all();
                debug!(detached, "detached replayed sensors");
            }
        }
        Ok(())
    }

    fn state(&self) -> ReplayState {
        ReplayState {
            is_open: true,
            position_sec: self.position,
            length_sec: self.capture.length_sec(),
            loop_enabled: self.loop_enabled,
            speed: self.speed,
            is_running: self.anchor.is_some(),
            is_end: self.is_end(),
            start_time: self.capture.start_time(),
        }
    }

    fn is_end(&self) -> bool {
        self.cursor >= self.capture.len()
    }

    fn can_loop(&self) -> bool {
        self.loop_enabled && self.capture.length_sec() > 0.0
    }

    fn rewind(&mut self) {
        self.cursor = 0;
        self.position = 0.0;
    }

    fn reanchor(&mut self) {
        if self.anchor.is_some() {
            self.anchor = Some((Instant::now(), self.position));
        }
    }

    /// Replay the packet under the cursor and advance past it.
    #[instrument(skip_all, level = "trace")]
    fn play_next(&mut self) {
        if let Some(packet) = self.capture.get(self.cursor) {
            self.feed.receive(packet.handle, &packet.payload);
            self.position = self.position.max(self.capture.offset_sec(self.cursor));
            self.cursor += 1;
        }
    }

    /// Replay packets before `position + sec`, wrapping when looping.
    ///
    /// A target at or past the end replays the last packet too, so the
    /// position never rests on `length` with packets left to play.
    fn play_for(&mut self, sec: f32) {
        let length = self.capture.length_sec();
        let mut target = self.position + sec;

        loop {
            let through_end = target >= length;
            while !self.is_end() {
                let offset = self.capture.offset_sec(self.cursor);
                if offset < target || (through_end && offset <= target) {
                    self.play_next();
                } else {
                    break;
                }
            }

            if !self.is_end() {
                self.position = target;
                return;
            }

            if self.can_loop() && through_end {
                target -= length;
                self.rewind();
            } else {
                self.position = length;
                return;
            }
        }
    }

    /// Real-time step: replay the next packet or handle the end.
    fn play_due(&mut self) {
        if !self.is_end() {
            self.play_next();
            return;
        }

        if self.can_loop() {
            debug!("capture looped");
            self.rewind();
            self.anchor = Some((Instant::now(), 0.0));
        } else {
            info!("end of capture");
            self.position = self.capture.length_sec();
            self.anchor = None;
        }
    }

    /// Time until the next packet is due, zero at the end of the capture.
    fn until_next_packet(&self) -> Duration {
        let Some((instant, position)) = self.anchor else {
            return Duration::ZERO;
        };
        if self.is_end() {
            return Duration::ZERO;
        }

        let ahead = (self.capture.offset_sec(self.cursor) - position).max(0.0) / self.speed;
        match Duration::try_from_secs_f32(ahead)
            .ok()
            .and_then(|ahead| instant.checked_add(ahead))
        {
            Some(due) => due.saturating_duration_since(Instant::now()).min(MAX_WAIT),
            None => MAX_WAIT,
        }
    }
}
