// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Playback engine.
//!
//! Holds a time-sorted message list and a read cursor driven by an
//! external scheduler calling [`PlaybackEngine::tick`].
//!
//! ```text
//!            load                 play
//!  Idle ◄──────────── Loading   Idle/Stopped ───────► Playing
//!                                                      │  ▲
//!                                               pause  │  │ resume / seek
//!                                                      ▼  │
//!                                                     Paused
//!  Playing ── end of recording / stop ──► Stopped
//! ```
//!
//! The cursor is in milliseconds since the first message. Only selected
//! topics are materialized in the snapshot.

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use crate::codec::SharedMessage;
use crate::filter::TopicFilter;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Playback status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Idle,
    Loading,
    Playing,
    Paused,
    Stopped,
}

/// Playback errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// Command rejected; engine state is unchanged.
    #[error("Invalid command `{command}`: {reason}")]
    InvalidCommand {
        command: &'static str,
        reason: String,
    },
}

fn invalid(command: &'static str, reason: impl Into<String>) -> PlaybackError {
    PlaybackError::InvalidCommand {
        command,
        reason: reason.into(),
    }
}

/// Playback configuration.
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Speed multiplier (finite, > 0).
    pub speed: f64,

    /// Wrap to the start instead of stopping at the end.
    pub loop_playback: bool,

    /// Topics selected on load when nothing is selected yet.
    pub initial_topics: Option<TopicFilter>,
}

impl PlaybackConfig {
    pub fn new() -> Self {
        Self {
            speed: 1.0,
            loop_playback: false,
            initial_topics: None,
        }
    }

    /// Set speed multiplier.
    pub fn speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Enable loop playback.
    pub fn loop_playback(mut self, enable: bool) -> Self {
        self.loop_playback = enable;
        self
    }

    /// Select matching topics on load.
    pub fn initial_topics(mut self, filter: TopicFilter) -> Self {
        self.initial_topics = Some(filter);
        self
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain-data view of the engine.
#[derive(Debug, Clone)]
pub struct PlaybackSnapshot {
    pub status: PlaybackStatus,
    pub cursor_ms: f64,
    pub duration_ms: f64,
    pub speed: f64,
    pub loop_playback: bool,
    pub selected_topics: BTreeSet<String>,
    pub read_index: usize,
    pub message_count: usize,

    /// Latest message per selected topic as of the cursor.
    pub latest: BTreeMap<String, SharedMessage>,
}

/// Handle returned by [`PlaybackEngine::subscribe`].
pub type SubscriptionId = u64;

type Observer = Box<dyn FnMut(&PlaybackSnapshot) + Send>;

/// Deterministic playback cursor over decoded messages.
pub struct PlaybackEngine<C: Clock = SystemClock> {
    clock: C,
    messages: Vec<SharedMessage>,
    origin_ms: f64,
    duration_ms: f64,
    status: PlaybackStatus,
    cursor_ms: f64,
    speed: f64,
    loop_playback: bool,
    initial_topics: Option<TopicFilter>,
    // (wall ms, cursor ms) at the last (re)anchor
    anchor: Option<(f64, f64)>,
    selected: BTreeSet<String>,
    read_index: usize,
    latest: BTreeMap<String, SharedMessage>,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: SubscriptionId,
}

impl PlaybackEngine<SystemClock> {
    /// Engine driven by the system clock.
    pub fn new(config: PlaybackConfig) -> Self {
        Self::with_clock(config, SystemClock::new())
    }
}

impl<C: Clock> PlaybackEngine<C> {
    /// Engine driven by `clock`.
    pub fn with_clock(config: PlaybackConfig, clock: C) -> Self {
        let speed = if config.speed.is_finite() && config.speed > 0.0 {
            config.speed
        } else {
            tracing::warn!("Ignoring invalid playback speed {}, using 1.0", config.speed);
            1.0
        };

        Self {
            clock,
            messages: Vec::new(),
            origin_ms: 0.0,
            duration_ms: 0.0,
            status: PlaybackStatus::Idle,
            cursor_ms: 0.0,
            speed,
            loop_playback: config.loop_playback,
            initial_topics: config.initial_topics,
            anchor: None,
            selected: BTreeSet::new(),
            read_index: 0,
            latest: BTreeMap::new(),
            observers: Vec::new(),
            next_subscription: 1,
        }
    }

    /// Replace the message list.
    ///
    /// Resets the cursor; keeps the selection for topics still present.
    pub fn load(&mut self, mut messages: Vec<SharedMessage>) {
        self.status = PlaybackStatus::Loading;
        self.anchor = None;
        self.notify();

        messages.sort_by(|a, b| a.timestamp_ms.total_cmp(&b.timestamp_ms));
        self.origin_ms = messages.first().map_or(0.0, |m| m.timestamp_ms);
        self.duration_ms = messages
            .last()
            .map_or(0.0, |m| m.timestamp_ms - self.origin_ms);
        self.messages = messages;

        let present: BTreeSet<String> = self.messages.iter().map(|m| m.topic.clone()).collect();
        self.selected.retain(|t| present.contains(t));
        if self.selected.is_empty() {
            if let Some(filter) = &self.initial_topics {
                self.selected = present.iter().filter(|t| filter.matches(t)).cloned().collect();
            }
        }

        self.cursor_ms = 0.0;
        self.read_index = 0;
        self.latest.clear();
        self.status = PlaybackStatus::Idle;

        tracing::info!(
            "Loaded {} messages on {} topics ({:.1}s)",
            self.messages.len(),
            present.len(),
            self.duration_ms / 1000.0
        );
        self.notify();
    }

    /// Start or restart playback.
    pub fn play(&mut self) -> Result<(), PlaybackError> {
        match self.status {
            PlaybackStatus::Playing => return Ok(()),
            PlaybackStatus::Loading => return Err(invalid("play", "recording is loading")),
            _ => {}
        }
        if self.messages.is_empty() {
            return Err(invalid("play", "no messages loaded"));
        }
        if self.selected.is_empty() {
            return Err(invalid("play", "no topics selected"));
        }

        if self.status == PlaybackStatus::Stopped && self.cursor_ms >= self.duration_ms {
            self.rewind();
        }

        let cursor = self.cursor_ms;
        self.advance_to(cursor);
        self.anchor = Some((self.clock.now_ms(), cursor));
        self.status = PlaybackStatus::Playing;
        self.notify();
        Ok(())
    }

    /// Pause playback.
    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        if self.status != PlaybackStatus::Playing {
            return Err(invalid("pause", "not playing"));
        }
        self.fold_elapsed();
        self.anchor = None;
        self.status = PlaybackStatus::Paused;
        self.notify();
        Ok(())
    }

    /// Resume paused playback.
    pub fn resume(&mut self) -> Result<(), PlaybackError> {
        if self.status != PlaybackStatus::Paused {
            return Err(invalid("resume", "not paused"));
        }
        self.play()
    }

    /// Stop playback, keeping the cursor.
    pub fn stop(&mut self) -> Result<(), PlaybackError> {
        match self.status {
            PlaybackStatus::Playing => self.fold_elapsed(),
            PlaybackStatus::Paused => {}
            _ => return Err(invalid("stop", "not playing or paused")),
        }
        self.anchor = None;
        self.status = PlaybackStatus::Stopped;
        self.notify();
        Ok(())
    }

    /// Move the cursor to `ms` (milliseconds since the first message).
    ///
    /// While playing or paused, playback continues from the new position.
    pub fn seek(&mut self, ms: f64) -> Result<(), PlaybackError> {
        if self.messages.is_empty() {
            return Err(invalid("seek", "no messages loaded"));
        }
        if self.status == PlaybackStatus::Loading {
            return Err(invalid("seek", "recording is loading"));
        }
        if !ms.is_finite() || ms < 0.0 || ms > self.duration_ms {
            return Err(invalid(
                "seek",
                format!("{} outside [0, {}]", ms, self.duration_ms),
            ));
        }

        if ms < self.cursor_ms {
            self.read_index = 0;
            self.latest.clear();
        }
        self.cursor_ms = ms;
        self.advance_to(ms);

        if matches!(self.status, PlaybackStatus::Playing | PlaybackStatus::Paused) {
            self.anchor = Some((self.clock.now_ms(), ms));
            self.status = PlaybackStatus::Playing;
        }
        tracing::debug!("Seek to {:.1} ms (read index {})", ms, self.read_index);
        self.notify();
        Ok(())
    }

    /// Advance playback by elapsed wall time. No-op unless playing.
    pub fn tick(&mut self) {
        if self.status != PlaybackStatus::Playing {
            return;
        }
        let Some(target) = self.current_cursor() else {
            tracing::error!("Playback clock produced an invalid cursor, stopping");
            self.anchor = None;
            self.status = PlaybackStatus::Stopped;
            self.notify();
            return;
        };

        if target >= self.duration_ms {
            self.cursor_ms = self.duration_ms;
            self.advance_to(self.duration_ms);

            if self.loop_playback && self.duration_ms > 0.0 {
                // Time past the end carries into the next pass
                let carried = target % self.duration_ms;
                tracing::debug!("End of recording, looping at {:.1} ms", carried);
                self.rewind();
                self.cursor_ms = carried;
                self.advance_to(carried);
                self.anchor = Some((self.clock.now_ms(), carried));
            } else {
                tracing::info!("End of recording reached");
                self.anchor = None;
                self.status = PlaybackStatus::Stopped;
            }
        } else {
            self.cursor_ms = target;
            self.advance_to(target);
        }
        self.notify();
    }

    /// Change the speed multiplier. Only time after the change uses it.
    pub fn set_speed(&mut self, speed: f64) -> Result<(), PlaybackError> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(invalid("set_speed", format!("speed {} must be finite and > 0", speed)));
        }
        if self.status == PlaybackStatus::Playing {
            self.fold_elapsed();
            self.anchor = Some((self.clock.now_ms(), self.cursor_ms));
        }
        self.speed = speed;
        self.notify();
        Ok(())
    }

    /// Enable or disable looping.
    pub fn set_loop(&mut self, enable: bool) {
        self.loop_playback = enable;
        self.notify();
    }

    /// Toggle a topic; returns whether it is now selected.
    ///
    /// A newly selected topic shows its latest message as of the cursor.
    pub fn toggle_topic(&mut self, topic: &str) -> Result<bool, PlaybackError> {
        if !self.messages.iter().any(|m| m.topic == topic) {
            return Err(invalid("toggle_topic", format!("unknown topic {}", topic)));
        }

        let selected = if self.selected.remove(topic) {
            self.latest.remove(topic);
            false
        } else {
            self.selected.insert(topic.to_string());
            self.backfill(topic);
            true
        };
        self.notify();
        Ok(selected)
    }

    /// Replace the selection with every loaded topic matching `filter`.
    pub fn select_topics(&mut self, filter: &TopicFilter) {
        self.selected = self
            .topics()
            .into_iter()
            .filter(|t| filter.matches(t))
            .collect();
        self.latest.retain(|t, _| self.selected.contains(t));

        let missing: Vec<String> = self
            .selected
            .iter()
            .filter(|t| !self.latest.contains_key(*t))
            .cloned()
            .collect();
        for topic in &missing {
            self.backfill(topic);
        }
        self.notify();
    }

    /// Distinct topics of the loaded messages, sorted.
    pub fn topics(&self) -> BTreeSet<String> {
        self.messages.iter().map(|m| m.topic.clone()).collect()
    }

    /// Plain-data state.
    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            status: self.status,
            cursor_ms: self.cursor_ms,
            duration_ms: self.duration_ms,
            speed: self.speed,
            loop_playback: self.loop_playback,
            selected_topics: self.selected.clone(),
            read_index: self.read_index,
            message_count: self.messages.len(),
            latest: self.latest.clone(),
        }
    }

    /// Register an observer called after every state change.
    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&PlaybackSnapshot) + Send + 'static,
    {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Remove an observer; returns false for unknown ids.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sid, _)| *sid != id);
        self.observers.len() != before
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn cursor_ms(&self) -> f64 {
        self.cursor_ms
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn read_index(&self) -> usize {
        self.read_index
    }

    /// Latest message of a selected topic.
    pub fn latest(&self, topic: &str) -> Option<&SharedMessage> {
        self.latest.get(topic)
    }

    /// Loaded messages, sorted by timestamp.
    pub fn messages(&self) -> &[SharedMessage] {
        &self.messages
    }

    /// Timestamp (ms) of the first message; cursor 0 maps to it.
    pub fn origin_ms(&self) -> f64 {
        self.origin_ms
    }

    fn current_cursor(&self) -> Option<f64> {
        let (wall, cursor) = self.anchor?;
        let elapsed = (self.clock.now_ms() - wall).max(0.0);
        let target = cursor + elapsed * self.speed;
        target.is_finite().then_some(target)
    }

    fn fold_elapsed(&mut self) {
        if let Some(cursor) = self.current_cursor() {
            let cursor = cursor.min(self.duration_ms);
            self.cursor_ms = cursor;
            self.advance_to(cursor);
        }
    }

    fn rewind(&mut self) {
        self.cursor_ms = 0.0;
        self.read_index = 0;
        self.latest.clear();
    }

    fn advance_to(&mut self, cursor_ms: f64) {
        while let Some(msg) = self.messages.get(self.read_index) {
            if msg.timestamp_ms - self.origin_ms > cursor_ms {
                break;
            }
            if self.selected.contains(&msg.topic) {
                self.latest.insert(msg.topic.clone(), msg.clone());
            }
            self.read_index += 1;
        }
    }

    fn backfill(&mut self, topic: &str) {
        let found = self.messages[..self.read_index]
            .iter()
            .rev()
            .find(|m| m.topic == topic)
            .cloned();
        if let Some(msg) = found {
            self.latest.insert(topic.to_string(), msg);
        }
    }

    fn notify(&mut self) {
        if self.observers.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for (_, observer) in &mut self.observers {
            observer(&snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{DecodedMessage, Value};
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};

    // Topic /a every 100 ms from 0 to 1000, /b every 250 ms.
    fn messages() -> Vec<SharedMessage> {
        let mut out = Vec::new();
        for i in 0..=10 {
            let t = 5_000.0 + f64::from(i) * 100.0;
            out.push(Arc::new(DecodedMessage::structured("/a", "demo/A", t, Value::Int(i.into()))));
        }
        for i in 0..4 {
            let t = 5_000.0 + f64::from(i) * 250.0 + 10.0;
            out.push(Arc::new(DecodedMessage::structured("/b", "demo/B", t, Value::Int(i.into()))));
        }
        out
    }

    fn engine() -> (PlaybackEngine<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let mut engine = PlaybackEngine::with_clock(PlaybackConfig::new(), clock.clone());
        engine.load(messages());
        (engine, clock)
    }

    fn latest_value(engine: &PlaybackEngine<ManualClock>, topic: &str) -> Option<Value> {
        engine.latest(topic).and_then(|m| m.value().cloned())
    }

    #[test]
    fn test_load_sorts_and_resets() {
        let (engine, _) = engine();
        assert_eq!(engine.status(), PlaybackStatus::Idle);
        assert_eq!(engine.duration_ms(), 1000.0);
        assert_eq!(engine.origin_ms(), 5000.0);
        let times: Vec<f64> = engine.messages().iter().map(|m| m.timestamp_ms).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_play_requires_topics_and_messages() {
        let (mut engine, _) = engine();
        let err = engine.play().expect_err("no topics");
        assert!(matches!(err, PlaybackError::InvalidCommand { command: "play", .. }));
        assert_eq!(engine.status(), PlaybackStatus::Idle);

        let mut empty = PlaybackEngine::with_clock(PlaybackConfig::new(), ManualClock::new());
        empty.load(Vec::new());
        assert!(empty.play().is_err());
    }

    #[test]
    fn test_tick_materializes_selected_topics_only() {
        let (mut engine, clock) = engine();
        engine.toggle_topic("/a").expect("toggle");
        engine.play().expect("play");
        assert_eq!(latest_value(&engine, "/a"), Some(Value::Int(0)));

        clock.advance(320.0);
        engine.tick();

        assert_eq!(engine.cursor_ms(), 320.0);
        assert_eq!(latest_value(&engine, "/a"), Some(Value::Int(3)));
        assert!(engine.latest("/b").is_none());
    }

    #[test]
    fn test_tick_is_noop_unless_playing() {
        let (mut engine, clock) = engine();
        engine.toggle_topic("/a").expect("toggle");
        clock.advance(500.0);
        engine.tick();
        assert_eq!(engine.cursor_ms(), 0.0);
        assert_eq!(engine.read_index(), 0);
    }

    #[test]
    fn test_speed_change_reanchors() {
        let (mut engine, clock) = engine();
        engine.toggle_topic("/a").expect("toggle");
        engine.play().expect("play");

        clock.advance(100.0);
        engine.set_speed(2.0).expect("speed");
        assert_eq!(engine.cursor_ms(), 100.0);

        clock.advance(100.0);
        engine.tick();
        assert_eq!(engine.cursor_ms(), 300.0);

        assert!(engine.set_speed(0.0).is_err());
        assert!(engine.set_speed(f64::INFINITY).is_err());
        assert_eq!(engine.speed(), 2.0);
    }

    #[test]
    fn test_pause_and_resume() {
        let (mut engine, clock) = engine();
        engine.toggle_topic("/a").expect("toggle");
        engine.play().expect("play");

        clock.advance(200.0);
        engine.pause().expect("pause");
        assert_eq!(engine.cursor_ms(), 200.0);

        clock.advance(1000.0);
        engine.tick();
        assert_eq!(engine.cursor_ms(), 200.0);

        engine.resume().expect("resume");
        clock.advance(50.0);
        engine.tick();
        assert_eq!(engine.cursor_ms(), 250.0);
        assert!(engine.resume().is_err());
    }

    #[test]
    fn test_end_of_recording_stops_and_restarts() {
        let (mut engine, clock) = engine();
        engine.toggle_topic("/b").expect("toggle");
        engine.play().expect("play");

        clock.advance(5000.0);
        engine.tick();
        assert_eq!(engine.status(), PlaybackStatus::Stopped);
        assert_eq!(engine.cursor_ms(), 1000.0);
        assert_eq!(latest_value(&engine, "/b"), Some(Value::Int(3)));
        assert_eq!(engine.read_index(), engine.messages().len());

        engine.play().expect("restart");
        assert_eq!(engine.status(), PlaybackStatus::Playing);
        assert_eq!(engine.cursor_ms(), 0.0);
        assert!(engine.latest("/b").is_none());
    }

    #[test]
    fn test_loop_wraps_to_start() {
        let clock = ManualClock::new();
        let mut engine =
            PlaybackEngine::with_clock(PlaybackConfig::new().loop_playback(true), clock.clone());
        engine.load(messages());
        engine.toggle_topic("/a").expect("toggle");
        engine.play().expect("play");

        clock.advance(1500.0);
        engine.tick();
        assert_eq!(engine.status(), PlaybackStatus::Playing);
        assert_eq!(engine.cursor_ms(), 500.0);
        assert_eq!(latest_value(&engine, "/a"), Some(Value::Int(5)));

        clock.advance(150.0);
        engine.tick();
        assert_eq!(engine.cursor_ms(), 650.0);
    }

    #[test]
    fn test_loop_carry_matches_single_tick() {
        let run = |steps: &[f64]| {
            let clock = ManualClock::new();
            let config = PlaybackConfig::new().loop_playback(true);
            let mut engine = PlaybackEngine::with_clock(config, clock.clone());
            engine.load(messages());
            engine.toggle_topic("/a").expect("toggle");
            engine.play().expect("play");
            for step in steps {
                clock.advance(*step);
                engine.tick();
            }
            (engine.cursor_ms(), latest_value(&engine, "/a"))
        };

        assert_eq!(run(&[2300.0]), (300.0, Some(Value::Int(3))));
        assert_eq!(run(&[700.0, 1600.0]), run(&[2300.0]));
    }

    #[test]
    fn test_invalid_clock_stops_playback() {
        let (mut engine, clock) = engine();
        engine.toggle_topic("/a").expect("toggle");
        engine.play().expect("play");
        clock.advance(200.0);
        engine.tick();

        clock.set(f64::INFINITY);
        engine.tick();
        assert_eq!(engine.status(), PlaybackStatus::Stopped);
        assert!(engine.cursor_ms().is_finite());
        assert_eq!(engine.cursor_ms(), 200.0);

        // Stopped engines ignore further ticks
        engine.tick();
        assert_eq!(engine.status(), PlaybackStatus::Stopped);
    }

    #[test]
    fn test_seek_is_deterministic() {
        let (mut direct, _) = engine();
        direct.select_topics(&TopicFilter::all());
        direct.seek(620.0).expect("seek");

        let (mut revisited, _) = engine();
        revisited.select_topics(&TopicFilter::all());
        revisited.seek(1000.0).expect("seek end");
        revisited.seek(100.0).expect("seek back");
        revisited.seek(620.0).expect("seek forward");

        let a = direct.snapshot();
        let b = revisited.snapshot();
        assert_eq!(a.read_index, b.read_index);
        assert_eq!(a.latest.len(), 2);
        for (topic, msg) in &a.latest {
            assert_eq!(msg, &b.latest[topic]);
        }
        assert_eq!(latest_value(&direct, "/a"), Some(Value::Int(6)));
        assert_eq!(latest_value(&direct, "/b"), Some(Value::Int(2)));
    }

    #[test]
    fn test_seek_rejects_out_of_range() {
        let (mut engine, _) = engine();
        for bad in [-1.0, 1000.5, f64::NAN, f64::INFINITY] {
            assert!(engine.seek(bad).is_err());
        }
        assert_eq!(engine.cursor_ms(), 0.0);
        assert!(engine.seek(1000.0).is_ok());
    }

    #[test]
    fn test_seek_while_paused_resumes() {
        let (mut engine, clock) = engine();
        engine.toggle_topic("/a").expect("toggle");
        engine.play().expect("play");
        clock.advance(100.0);
        engine.pause().expect("pause");

        engine.seek(500.0).expect("seek");
        assert_eq!(engine.status(), PlaybackStatus::Playing);

        clock.advance(100.0);
        engine.tick();
        assert_eq!(engine.cursor_ms(), 600.0);
    }

    #[test]
    fn test_seek_while_idle_stays_idle() {
        let (mut engine, _) = engine();
        engine.seek(300.0).expect("seek");
        assert_eq!(engine.status(), PlaybackStatus::Idle);
        assert_eq!(engine.cursor_ms(), 300.0);
    }

    #[test]
    fn test_toggle_backfills_latest() {
        let (mut engine, _) = engine();
        engine.toggle_topic("/a").expect("toggle a");
        engine.seek(800.0).expect("seek");
        assert!(engine.latest("/b").is_none());

        assert!(engine.toggle_topic("/b").expect("toggle b"));
        assert_eq!(latest_value(&engine, "/b"), Some(Value::Int(3)));

        assert!(!engine.toggle_topic("/b").expect("untoggle b"));
        assert!(engine.latest("/b").is_none());
        assert!(engine.toggle_topic("/nope").is_err());
    }

    #[test]
    fn test_load_keeps_present_selection() {
        let (mut engine, _) = engine();
        engine.select_topics(&TopicFilter::all());

        let only_a: Vec<SharedMessage> =
            messages().into_iter().filter(|m| m.topic == "/a").collect();
        engine.load(only_a);
        assert_eq!(engine.snapshot().selected_topics, BTreeSet::from(["/a".to_string()]));
    }

    #[test]
    fn test_initial_topics_selected_on_load() {
        let mut engine = PlaybackEngine::with_clock(
            PlaybackConfig::new().initial_topics(TopicFilter::include(["/b"])),
            ManualClock::new(),
        );
        engine.load(messages());
        assert_eq!(engine.snapshot().selected_topics.len(), 1);
        assert!(engine.play().is_ok());
    }

    #[test]
    fn test_observers_notified() {
        let (mut engine, clock) = engine();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = engine.subscribe(move |s| {
            if let Ok(mut v) = sink.lock() {
                v.push(s.status);
            }
        });

        engine.toggle_topic("/a").expect("toggle");
        engine.play().expect("play");
        clock.advance(10.0);
        engine.tick();
        engine.stop().expect("stop");

        assert!(engine.unsubscribe(id));
        assert!(!engine.unsubscribe(id));
        engine.set_loop(true);

        let statuses = seen.lock().expect("lock").clone();
        assert_eq!(
            statuses,
            [
                PlaybackStatus::Idle,
                PlaybackStatus::Playing,
                PlaybackStatus::Playing,
                PlaybackStatus::Stopped,
            ]
        );
    }

    proptest! {
        #[test]
        fn prop_read_index_monotonic(
            speed in 0.1f64..8.0,
            steps in prop::collection::vec(0.0f64..200.0, 1..60),
        ) {
            let clock = ManualClock::new();
            let config = PlaybackConfig::new().speed(speed);
            let mut engine = PlaybackEngine::with_clock(config, clock.clone());
            engine.load(messages());
            engine.select_topics(&TopicFilter::all());
            engine.play().expect("play");

            let mut last_index = engine.read_index();
            let mut last_cursor = engine.cursor_ms();
            for step in steps {
                clock.advance(step);
                engine.tick();
                prop_assert!(engine.read_index() >= last_index);
                prop_assert!(engine.cursor_ms() >= last_cursor);
                prop_assert!(engine.cursor_ms() <= engine.duration_ms());
                last_index = engine.read_index();
                last_cursor = engine.cursor_ms();
            }
        }
    }
}
