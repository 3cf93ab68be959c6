use serenity::model::id::{ChannelId, UserId};
use std::fmt;
use std::time::Duration;

use crate::sources::ResolvedTrack;

/// Una petición de pista, pendiente en la cola de su guild o activa en la
/// ranura "current". Pertenece en exclusiva a la cola hasta que el worker
/// la saca.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub requester: UserId,
    pub requester_name: String,
    /// Canal de texto donde se pidió; ahí van los anuncios de esta pista.
    pub channel_id: ChannelId,
    pub title: String,
    pub uploader: Option<String>,
    pub duration: Option<Duration>,
    pub url: String,
}

impl QueueEntry {
    pub fn new(
        track: ResolvedTrack,
        requester: UserId,
        requester_name: String,
        channel_id: ChannelId,
    ) -> Self {
        Self {
            requester,
            requester_name,
            channel_id,
            title: track.title,
            uploader: track.uploader,
            duration: track.duration,
            url: track.url,
        }
    }
}

impl fmt::Display for QueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "*{}* uploaded by {} and requested by {}",
            self.title,
            self.uploader.as_deref().unwrap_or("unknown"),
            self.requester_name,
        )?;
        if let Some(duration) = self.duration {
            // redondeo a segundos para no imprimir fracciones
            let secs = Duration::from_secs(duration.as_secs());
            write!(f, " [length: {}]", humantime::format_duration(secs))?;
        }
        Ok(())
    }
}
