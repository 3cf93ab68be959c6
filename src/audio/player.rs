use anyhow::Result;
use async_trait::async_trait;
use serenity::{http::Http, model::id::ChannelId};
use songbird::{
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::{audio::entry::QueueEntry, error::PlaybackError, sources::TrackResolver};

/// Ranura con la conexión de voz de una guild. La posee su `GuildState`;
/// el driver comparte el mismo `Arc` para arrancar pistas sobre ella.
pub type VoiceSlot = Arc<Mutex<Option<Arc<Mutex<Call>>>>>;

/// Emisor de la señal de fin de pista. El canal tiene capacidad uno: cada
/// callback deja como mucho una señal pendiente y el worker la consume
/// exactamente una vez por iteración.
pub type EndSignal = mpsc::Sender<()>;

/// Controlador opaco de una pista en reproducción. El núcleo nunca mira
/// dentro del pipeline de audio: manda órdenes y observa si terminó.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Player: Send + Sync {
    fn pause(&self) -> Result<()>;
    fn resume(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    fn set_volume(&self, volume: f32) -> Result<()>;
    async fn is_finished(&self) -> bool;
}

/// Lo que el worker de una guild necesita del mundo exterior: saber si hay
/// conexión, anunciar en un canal y arrancar pistas. En producción lo
/// implementa songbird; en tests, un driver falso.
#[async_trait]
pub trait PlaybackDriver: Send + Sync {
    async fn connected(&self) -> bool;

    /// Aviso al canal de origen; mejor esfuerzo, los fallos sólo se loguean.
    async fn announce(&self, channel_id: ChannelId, text: String);

    /// Arranca una pista de la cola y conecta su evento de fin a la señal
    /// del worker.
    async fn play_request(&self, entry: &QueueEntry) -> Result<Arc<dyn Player>>;

    /// Arranca una pista de fondo: sin evento de fin y sin semántica de
    /// cola.
    async fn play_background(&self, url: &str) -> Result<Arc<dyn Player>>;
}

/// Player de producción sobre un `TrackHandle` de songbird.
pub struct SongbirdPlayer {
    handle: TrackHandle,
}

#[async_trait]
impl Player for SongbirdPlayer {
    fn pause(&self) -> Result<()> {
        self.handle.pause().map_err(Into::into)
    }

    fn resume(&self) -> Result<()> {
        self.handle.play().map_err(Into::into)
    }

    fn stop(&self) -> Result<()> {
        self.handle.stop().map_err(Into::into)
    }

    fn set_volume(&self, volume: f32) -> Result<()> {
        self.handle.set_volume(volume).map_err(Into::into)
    }

    async fn is_finished(&self) -> bool {
        match self.handle.get_info().await {
            // una pista pausada no ha terminado
            Ok(state) => !matches!(state.playing, PlayMode::Play | PlayMode::Pause),
            // el driver ya descartó el handle
            Err(_) => true,
        }
    }
}

/// Callback de fin de pista. Un `try_send` sobre el canal lleno se descarta
/// a propósito: ya hay una señal pendiente sin consumir.
struct TrackEndNotifier {
    signal: EndSignal,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        debug!("Pista terminada, avisando al worker");
        let _ = self.signal.try_send(());
        None
    }
}

/// Driver de producción: anuncia por el Http de serenity y reproduce sobre
/// la `Call` de songbird de la guild.
pub struct SongbirdDriver {
    http: Arc<Http>,
    voice: VoiceSlot,
    resolver: Arc<TrackResolver>,
    end_signal: EndSignal,
    default_volume: f32,
}

impl SongbirdDriver {
    pub fn new(
        http: Arc<Http>,
        voice: VoiceSlot,
        resolver: Arc<TrackResolver>,
        end_signal: EndSignal,
        default_volume: f32,
    ) -> Self {
        Self {
            http,
            voice,
            resolver,
            end_signal,
            default_volume,
        }
    }

    async fn call(&self) -> Result<Arc<Mutex<Call>>, PlaybackError> {
        self.voice
            .lock()
            .await
            .clone()
            .ok_or(PlaybackError::NotConnected)
    }
}

#[async_trait]
impl PlaybackDriver for SongbirdDriver {
    async fn connected(&self) -> bool {
        self.voice.lock().await.is_some()
    }

    async fn announce(&self, channel_id: ChannelId, text: String) {
        if let Err(e) = channel_id.say(&self.http, text).await {
            warn!("No se pudo anunciar en {}: {:?}", channel_id, e);
        }
    }

    async fn play_request(&self, entry: &QueueEntry) -> Result<Arc<dyn Player>> {
        let call = self.call().await?;
        let input = self.resolver.stream_input(&entry.url);

        let mut call = call.lock().await;
        let handle = call.play_input(input);
        let _ = handle.set_volume(self.default_volume);

        handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndNotifier {
                    signal: self.end_signal.clone(),
                },
            )
            .map_err(|e| anyhow::anyhow!("Error al registrar el evento de fin: {}", e))?;

        Ok(Arc::new(SongbirdPlayer { handle }))
    }

    async fn play_background(&self, url: &str) -> Result<Arc<dyn Player>> {
        let call = self.call().await?;
        let input = self.resolver.stream_input(url);

        let mut call = call.lock().await;
        let handle = call.play_input(input);

        Ok(Arc::new(SongbirdPlayer { handle }))
    }
}
