//! Voice channel lookup and the replies sent about it.

use crate::commands::ChannelQuery;

/// A voice channel of a guild, detached from the gateway cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceChannel {
    pub id: u64,
    pub name: String,
}

/// Finds the channel a query refers to.
///
/// Numeric queries are looked up by id first; when that fails (or the query
/// isn't numeric) the first channel whose name matches ignoring case wins.
pub fn resolve<'a>(
    query: &ChannelQuery,
    channels: &'a [VoiceChannel],
) -> Option<&'a VoiceChannel> {
    query
        .as_id()
        .and_then(|id| channels.iter().find(|c| c.id == id))
        .or_else(|| {
            let wanted = query.0.to_lowercase();
            channels.iter().find(|c| c.name.to_lowercase() == wanted)
        })
}

pub fn connecting_reply(channel: &VoiceChannel) -> String {
    format!("Connecting to {}", channel.name)
}

pub fn unknown_channel_reply(comment: &str) -> String {
    format!("Unable to connect to ``{comment}``, no such channel!")
}
