//! Gateway event handling.
//!
//! Reacts to guild chat commands by joining or leaving voice channels and
//! wiring a [`Receiver`] and a capture flusher to every joined call.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use serenity::client::{Context, EventHandler};
use serenity::model::channel::{ChannelType, Message};
use serenity::model::gateway::Ready;
use serenity::model::id::{ChannelId, GuildId, UserId};
use songbird::{CoreEvent, Songbird};
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::capture::{CaptureBuffer, FlushDelay, Utterance, spawn_flusher};
use crate::channels::{self, VoiceChannel};
use crate::commands::{self, Command};
use crate::config::Config;
use crate::error::Error;
use crate::voice::Receiver;

/// Capture state of one joined call.
struct Session {
    receiver: Receiver,
    flusher: JoinHandle<()>,
}

impl Session {
    /// Stops sweeping and hands any pending audio to the worker.
    fn close(self) {
        self.flusher.abort();
        self.receiver.flush();
    }
}

/// Open capture sessions, one per guild.
#[derive(Default)]
struct Sessions {
    by_guild: Mutex<HashMap<u64, Session>>,
}

impl Sessions {
    /// Stores `session` for `guild_id`, closing the one it replaces.
    async fn replace(&self, guild_id: u64, session: Session) {
        if let Some(old) = self.by_guild.lock().await.insert(guild_id, session) {
            debug!("Replacing capture session of guild {guild_id}");
            old.close();
        }
    }

    /// Closes the session of `guild_id`; returns whether there was one.
    async fn close(&self, guild_id: u64) -> bool {
        let session = self.by_guild.lock().await.remove(&guild_id);
        session.map(Session::close).is_some()
    }

    /// Closes every session and returns the guilds they belonged to.
    async fn close_all(&self) -> Vec<u64> {
        let sessions: Vec<_> = self.by_guild.lock().await.drain().collect();
        sessions
            .into_iter()
            .map(|(guild_id, session)| {
                session.close();
                guild_id
            })
            .collect()
    }
}

pub struct Handler {
    config: Arc<Config>,
    delay: Arc<FlushDelay>,
    tx: UnboundedSender<Utterance>,
    sessions: Sessions,
    voice: Arc<Songbird>,
}

impl Handler {
    pub fn new(
        config: Arc<Config>,
        delay: Arc<FlushDelay>,
        tx: UnboundedSender<Utterance>,
        voice: Arc<Songbird>,
    ) -> Self {
        Self {
            config,
            delay,
            tx,
            sessions: Sessions::default(),
            voice,
        }
    }

    /// Leaves every call and hands all pending audio to the worker.
    pub async fn shutdown(&self) {
        for guild_id in self.sessions.close_all().await {
            if let Err(err) = self.voice.remove(GuildId::new(guild_id)).await {
                debug!("Leaving guild {guild_id} on shutdown: {err}");
            }
        }
        info!("Capture sessions closed");
    }

    async fn reply(&self, ctx: &Context, msg: &Message, content: &str) {
        if let Err(err) = msg.channel_id.say(&ctx.http, content).await {
            error!("Cannot reply in channel {}: {err}", msg.channel_id);
        }
    }

    async fn handle_command(
        &self,
        ctx: &Context,
        msg: &Message,
        guild_id: GuildId,
        command: Command,
    ) -> Result<(), Error> {
        match command {
            Command::JoinAuthor => match author_voice_channel(ctx, guild_id, msg.author.id) {
                Some(channel) => self.join(ctx, msg, guild_id, channel).await,
                None => {
                    self.reply(ctx, msg, &channels::unknown_channel_reply("your voice channel"))
                        .await;
                    Ok(())
                }
            },
            Command::Join(query) => {
                let candidates = voice_channels(ctx, guild_id);
                match channels::resolve(&query, &candidates) {
                    Some(channel) => self.join(ctx, msg, guild_id, channel.clone()).await,
                    None => {
                        self.reply(ctx, msg, &channels::unknown_channel_reply(&query.0))
                            .await;
                        Ok(())
                    }
                }
            }
            Command::SetDelay(delay) => {
                self.delay.set(delay);
                info!("Flush delay set to {}ms", delay.as_millis());
                self.reply(ctx, msg, &format!("Flush delay set to {}ms", delay.as_millis()))
                    .await;
                Ok(())
            }
            Command::Leave => self.leave(ctx, msg, guild_id).await,
        }
    }

    async fn join(
        &self,
        ctx: &Context,
        msg: &Message,
        guild_id: GuildId,
        channel: VoiceChannel,
    ) -> Result<(), Error> {
        self.reply(ctx, msg, &channels::connecting_reply(&channel)).await;
        self.connect_to(ctx, guild_id, &channel, msg.channel_id).await
    }

    /// Joins `channel` and starts capturing every speaker in it.
    async fn connect_to(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel: &VoiceChannel,
        text_channel: ChannelId,
    ) -> Result<(), Error> {
        let buffer = CaptureBuffer::new(guild_id.get(), text_channel.get(), self.delay.clone());
        let receiver = Receiver::new(buffer.clone(), ctx.cache.clone(), self.tx.clone());

        let call = self.voice.join(guild_id, ChannelId::new(channel.id)).await?;
        {
            let mut call = call.lock().await;
            call.remove_all_global_events();
            for event in [
                CoreEvent::SpeakingStateUpdate,
                CoreEvent::VoiceTick,
                CoreEvent::ClientDisconnect,
                CoreEvent::DriverDisconnect,
            ] {
                call.add_global_event(event.into(), receiver.clone());
            }
        }

        // Joining again (or elsewhere) starts a fresh capture session.
        let flusher = spawn_flusher(buffer, self.tx.clone(), self.config.capture.poll_interval());
        self.sessions
            .replace(guild_id.get(), Session { receiver, flusher })
            .await;
        info!("Capturing voice in {} ({})", channel.name, channel.id);
        Ok(())
    }

    async fn leave(&self, ctx: &Context, msg: &Message, guild_id: GuildId) -> Result<(), Error> {
        let had_session = self.sessions.close(guild_id.get()).await;
        if self.voice.get(guild_id).is_none() && !had_session {
            self.reply(ctx, msg, "Not in a voice channel").await;
            return Ok(());
        }
        self.voice.remove(guild_id).await?;
        self.reply(ctx, msg, "Left voice channel").await;
        Ok(())
    }
}

/// Voice and stage channels of a guild, in display order.
fn voice_channels(ctx: &Context, guild_id: GuildId) -> Vec<VoiceChannel> {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        warn!("Guild {guild_id} is not cached");
        return Vec::new();
    };
    let channels = guild
        .channels
        .values()
        .filter(|c| matches!(c.kind, ChannelType::Voice | ChannelType::Stage))
        .map(|c| (c.position, c.id.get(), c.name.clone()))
        .collect();
    in_display_order(channels)
}

/// Sorts `(position, id, name)` entries by position, then id.
fn in_display_order(mut channels: Vec<(u16, u64, String)>) -> Vec<VoiceChannel> {
    channels.sort();
    channels
        .into_iter()
        .map(|(_, id, name)| VoiceChannel { id, name })
        .collect()
}

/// The voice channel `user_id` is currently connected to.
fn author_voice_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
) -> Option<VoiceChannel> {
    let guild = ctx.cache.guild(guild_id)?;
    let channel_id = guild.voice_states.get(&user_id)?.channel_id?;
    let name = guild
        .channels
        .get(&channel_id)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| channel_id.to_string());
    Some(VoiceChannel {
        id: channel_id.get(),
        name,
    })
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("{} is connected", ready.user.name);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };

        let command = match commands::parse(&self.config.discord.command_prefix, &msg.content) {
            Ok(Some(command)) => command,
            Ok(None) => return,
            Err(err) => {
                self.reply(&ctx, &msg, &err.to_string()).await;
                return;
            }
        };
        debug!("{} issued {command:?}", msg.author.name);

        if let Err(err) = self.handle_command(&ctx, &msg, guild_id, command).await {
            error!("Command failed: {err}");
            self.reply(&ctx, &msg, &format!("Something went wrong: {err}")).await;
        }
    }
}
