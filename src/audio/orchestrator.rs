use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    http::Http,
    model::id::{ChannelId, GuildId},
};
use songbird::Songbird;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{
    audio::{
        guild::GuildState,
        player::{SongbirdDriver, VoiceSlot},
    },
    config::Config,
    sources::TrackResolver,
};

/// Colección de estados de reproducción, uno por guild. Crea cada estado
/// (con su worker) de forma perezosa y concentra el ciclo de vida de la
/// conexión de voz; las guilds no comparten nada entre sí.
pub struct Orchestrator {
    guilds: DashMap<GuildId, Arc<GuildState>>,
    config: Arc<Config>,
    resolver: Arc<TrackResolver>,
    songbird: Arc<Songbird>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        resolver: Arc<TrackResolver>,
        songbird: Arc<Songbird>,
    ) -> Self {
        Self {
            guilds: DashMap::new(),
            config,
            resolver,
            songbird,
        }
    }

    /// Estado de la guild, creándolo la primera vez que se toca.
    pub fn state(&self, guild_id: GuildId, http: &Arc<Http>) -> Arc<GuildState> {
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| self.create_state(http.clone()))
            .clone()
    }

    fn create_state(&self, http: Arc<Http>) -> Arc<GuildState> {
        let queue = mpsc::channel(self.config.max_queue_size);
        let (end_tx, end_rx) = mpsc::channel(1);
        let voice: VoiceSlot = Arc::new(tokio::sync::Mutex::new(None));

        let driver = Arc::new(SongbirdDriver::new(
            http,
            voice.clone(),
            self.resolver.clone(),
            end_tx,
            self.config.default_volume,
        ));

        GuildState::spawn(
            driver,
            voice,
            queue,
            end_rx,
            self.config.max_queue_size,
            self.config.skip_threshold,
        )
    }

    pub async fn is_connected(&self, guild_id: GuildId) -> bool {
        match self.guilds.get(&guild_id) {
            Some(state) => state.voice.lock().await.is_some(),
            None => false,
        }
    }

    /// Une (o mueve) la conexión de voz de la guild al canal dado y deja la
    /// `Call` en la ranura del estado.
    pub async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        http: &Arc<Http>,
    ) -> Result<Arc<GuildState>> {
        let state = self.state(guild_id, http);
        let call = self.songbird.join(guild_id, channel_id).await?;
        *state.voice.lock().await = Some(call);
        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(state)
    }

    /// Desmonta la guild entera como una sola unidad lógica: pista activa,
    /// pista de fondo, worker, conexión de voz y el propio estado.
    pub async fn teardown(&self, guild_id: GuildId) {
        let Some((_, state)) = self.guilds.remove(&guild_id) else {
            return;
        };

        state.shutdown();
        state.voice.lock().await.take();
        if let Err(e) = self.songbird.remove(guild_id).await {
            warn!("Error al desconectar la voz de {}: {:?}", guild_id, e);
        }
        info!("👋 Estado de reproducción de {} desmontado", guild_id);
    }

    /// Teardown de todas las guilds; se usa en el apagado del proceso. El
    /// fallo de una guild no afecta a las demás.
    pub async fn shutdown_all(&self) {
        let guild_ids: Vec<GuildId> = self.guilds.iter().map(|entry| *entry.key()).collect();
        futures::future::join_all(guild_ids.into_iter().map(|id| self.teardown(id))).await;
    }
}
