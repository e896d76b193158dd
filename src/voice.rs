//! Voice receive handling for one call.
//!
//! Songbird reports decoded audio per RTP SSRC. The SSRC of each user is
//! learnt from speaking-state updates; packets are then attributed to that
//! user and queued in the call's [`CaptureBuffer`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime};

use async_trait::async_trait;
use log::{debug, error, info};
use serenity::cache::Cache;
use serenity::model::id::UserId;
use songbird::model::payload::{ClientDisconnect, Speaking};
use songbird::{Event, EventContext, EventHandler as VoiceEventHandler};
use tokio::sync::mpsc::UnboundedSender;

use crate::capture::{CaptureBuffer, Speaker, Utterance};

/// Maps SSRCs to the users speaking on them.
#[derive(Debug, Default)]
pub struct SsrcMap {
    speakers: HashMap<u32, Speaker>,
}

impl SsrcMap {
    pub fn insert(&mut self, ssrc: u32, speaker: Speaker) {
        self.speakers.insert(ssrc, speaker);
    }

    pub fn get(&self, ssrc: u32) -> Option<&Speaker> {
        self.speakers.get(&ssrc)
    }

    /// Forgets every SSRC of `user_id`.
    pub fn remove_user(&mut self, user_id: u64) {
        self.speakers.retain(|_, s| s.id != user_id);
    }
}

/// Routes decoded voice packets of a tick into `buffer`.
///
/// Returns the number of packets that could be attributed to a speaker.
pub fn route_tick<'a>(
    ssrcs: &SsrcMap,
    buffer: &CaptureBuffer,
    packets: impl IntoIterator<Item = (u32, &'a [i16])>,
    now: Instant,
    wall: SystemTime,
) -> usize {
    let mut routed = 0;
    for (ssrc, pcm) in packets {
        match ssrcs.get(ssrc) {
            Some(speaker) => {
                buffer.push(speaker, pcm, now, wall);
                routed += 1;
            }
            None => debug!("Voice packet from unknown SSRC {ssrc}"),
        }
    }
    routed
}

/// Global event handler attached to a songbird call.
#[derive(Clone)]
pub struct Receiver {
    inner: Arc<ReceiverInner>,
}

struct ReceiverInner {
    buffer: Arc<CaptureBuffer>,
    ssrcs: Mutex<SsrcMap>,
    cache: Arc<Cache>,
    tx: UnboundedSender<Utterance>,
}

impl Receiver {
    pub fn new(
        buffer: Arc<CaptureBuffer>,
        cache: Arc<Cache>,
        tx: UnboundedSender<Utterance>,
    ) -> Self {
        Self {
            inner: Arc::new(ReceiverInner {
                buffer,
                ssrcs: Mutex::new(SsrcMap::default()),
                cache,
                tx,
            }),
        }
    }

    fn speaker(&self, user_id: u64) -> Speaker {
        match self.inner.cache.user(UserId::new(user_id)) {
            Some(user) => Speaker {
                id: user_id,
                name: user.name.clone(),
            },
            None => Speaker::unnamed(user_id),
        }
    }

    fn on_speaking(&self, speaking: &Speaking) {
        let Some(user_id) = speaking.user_id else {
            return;
        };
        let speaker = self.speaker(user_id.0);
        debug!("SSRC {} is {}", speaking.ssrc, speaker.name);
        match self.inner.ssrcs.lock() {
            Ok(mut ssrcs) => ssrcs.insert(speaking.ssrc, speaker),
            Err(e) => error!("SSRC map lock poisoned: {e}"),
        }
    }

    fn on_tick<'a>(&self, packets: impl IntoIterator<Item = (u32, &'a [i16])>) {
        let Ok(ssrcs) = self.inner.ssrcs.lock() else {
            error!("SSRC map lock poisoned, dropping tick");
            return;
        };
        route_tick(
            &ssrcs,
            &self.inner.buffer,
            packets,
            Instant::now(),
            SystemTime::now(),
        );
    }

    fn on_client_disconnect(&self, disconnect: &ClientDisconnect) {
        debug!("User {} left the call", disconnect.user_id.0);
        if let Ok(mut ssrcs) = self.inner.ssrcs.lock() {
            ssrcs.remove_user(disconnect.user_id.0);
        }
    }

    /// Sends everything still pending to the worker.
    pub fn flush(&self) {
        for utterance in self.inner.buffer.drain_all() {
            if self.inner.tx.send(utterance).is_err() {
                error!("Utterance worker is gone, dropping audio");
            }
        }
    }
}

#[async_trait]
impl VoiceEventHandler for Receiver {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        match ctx {
            EventContext::SpeakingStateUpdate(speaking) => self.on_speaking(speaking),
            EventContext::VoiceTick(tick) => {
                self.on_tick(tick.speaking.iter().filter_map(|(ssrc, data)| {
                    data.decoded_voice.as_deref().map(|pcm| (*ssrc, pcm))
                }))
            }
            EventContext::ClientDisconnect(disconnect) => self.on_client_disconnect(disconnect),
            EventContext::DriverDisconnect(_) => {
                info!("Voice driver disconnected, flushing pending audio");
                self.flush();
            }
            _ => {}
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FlushDelay;
    use std::time::Duration;

    fn speaker(id: u64, name: &str) -> Speaker {
        Speaker {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_route_tick_attributes_known_ssrcs() {
        let mut ssrcs = SsrcMap::default();
        ssrcs.insert(111, speaker(1, "alice"));
        let buffer = CaptureBuffer::new(0, 0, FlushDelay::new(Duration::ZERO));
        let now = Instant::now();

        let a: &[i16] = &[1, 2];
        let b: &[i16] = &[3, 4];
        let routed = route_tick(&ssrcs, &buffer, [(111, a), (222, b)], now, SystemTime::now());
        assert_eq!(routed, 1);

        let out = buffer.drain_expired(now + Duration::from_millis(1));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].speaker.name, "alice");
        assert_eq!(out[0].samples, vec![1, 2]);
    }

    #[test]
    fn test_ssrc_map_remove_user() {
        let mut ssrcs = SsrcMap::default();
        ssrcs.insert(1, speaker(7, "dave"));
        ssrcs.insert(2, speaker(7, "dave"));
        ssrcs.insert(3, speaker(8, "erin"));
        ssrcs.remove_user(7);
        assert!(ssrcs.get(1).is_none());
        assert!(ssrcs.get(2).is_none());
        assert_eq!(ssrcs.get(3).unwrap().name, "erin");
    }

    #[test]
    fn test_ssrc_reassignment() {
        let mut ssrcs = SsrcMap::default();
        ssrcs.insert(1, speaker(7, "dave"));
        ssrcs.insert(1, speaker(8, "erin"));
        assert_eq!(ssrcs.get(1).unwrap().id, 8);
    }
}
