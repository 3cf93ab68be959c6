//! # Bot Module
//!
//! Main Discord event handling for leitmotif.
//!
//! Every inbound message runs through the same pipeline, in order:
//!
//! 1. Direct mentions of the bot (admin mute/speak toggle).
//! 2. The global silent flag: when set, nothing below runs.
//! 3. Prefixed commands, gated by the ban list and resolved through the
//!    dispatch table in [`handlers`].
//! 4. For everything else: keyword text replies, keyword image replies and
//!    finally the theme-music interrupt in [`interrupt`].
//!
//! Playback commands call into the [`Orchestrator`], which owns one
//! playback state per guild; moderation commands mutate the shared
//! [`ModerationStore`] and persist it table by table.

use serenity::{
    all::{Context, EventHandler, Mentionable, Message, Ready, TypingStartEvent, UserId},
    async_trait,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, error, info};

pub mod handlers;
pub mod interrupt;
pub mod moderation;
pub mod replies;

use crate::{
    audio::orchestrator::Orchestrator, config::Config, sources::TrackResolver,
    storage::ModerationStore,
};

pub type SharedStore = Arc<tokio::sync::Mutex<ModerationStore>>;

pub struct LeitmotifBot {
    pub config: Arc<Config>,
    pub store: SharedStore,
    pub orchestrator: Arc<Orchestrator>,
    pub resolver: Arc<TrackResolver>,
    /// Modo silencioso global: suprime respuestas, temas, avisos y comandos.
    silent: AtomicBool,
    /// Usuarios vistos tecleando desde el último mensaje.
    typing: parking_lot::Mutex<Vec<UserId>>,
}

impl LeitmotifBot {
    pub fn new(
        config: Arc<Config>,
        store: SharedStore,
        orchestrator: Arc<Orchestrator>,
        resolver: Arc<TrackResolver>,
    ) -> Self {
        Self {
            config,
            store,
            orchestrator,
            resolver,
            silent: AtomicBool::new(false),
            typing: parking_lot::Mutex::new(Vec::new()),
        }
    }

    fn is_silent(&self) -> bool {
        self.silent.load(Ordering::Relaxed)
    }

    /// Mención directa al bot: los admins lo silencian ("mute") o lo
    /// reactivan ("speak"); cualquier otra mención recibe un encogimiento.
    async fn handle_mention(&self, ctx: &Context, msg: &Message) {
        let is_admin = { self.store.lock().await.is_admin(msg.author.id) };

        let reply = if is_admin && msg.content.contains("mute") {
            self.silent.store(true, Ordering::Relaxed);
            "🤐"
        } else if is_admin && msg.content.contains("speak") {
            self.silent.store(false, Ordering::Relaxed);
            ">_>"
        } else {
            r"¯\_(ツ)_/¯"
        };

        if let Err(e) = msg.channel_id.say(&ctx.http, reply).await {
            debug!("No se pudo responder a la mención: {:?}", e);
        }
    }
}

#[async_trait]
impl EventHandler for LeitmotifBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        // ni bots ni mensajes directos
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };

        self.typing.lock().clear();

        let bot_id = ctx.cache.current_user().id;
        let mention = format!("<@{bot_id}>");
        let mention_nick = format!("<@!{bot_id}>");
        if msg.content.starts_with(&mention) || msg.content.starts_with(&mention_nick) {
            self.handle_mention(&ctx, &msg).await;
            return;
        }

        if self.is_silent() {
            return;
        }

        if let Some(rest) = msg.content.strip_prefix(&self.config.command_prefix) {
            let banned = { self.store.lock().await.is_banned(msg.author.id) };
            if banned {
                let notice = format!("{} you are banned from using commands here.", msg.author.mention());
                if let Err(e) = msg.channel_id.say(&ctx.http, notice).await {
                    error!("No se pudo avisar al usuario baneado: {:?}", e);
                }
                return;
            }

            let rest = rest.trim_start();
            let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            if name.is_empty() {
                return;
            }

            if let Err(e) = handlers::dispatch(&ctx, &msg, name, args, self).await {
                error!("Error manejando el comando {}: {:?}", name, e);
                let notice = format!("❌ An error occurred while processing this request: {e}");
                let _ = msg.channel_id.say(&ctx.http, notice).await;
            }
            return;
        }

        // mensajes normales: respuestas automáticas y luego el disparador
        // de temas
        match replies::try_auto_reply(&ctx, &msg, self).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                error!("Error en la respuesta automática: {:?}", e);
                return;
            }
        }

        if let Err(e) = interrupt::try_theme_trigger(&ctx, &msg, guild_id, self).await {
            error!("Error en el disparador de tema: {:?}", e);
            let notice = format!("❌ Could not start the theme: {e}");
            let _ = msg.channel_id.say(&ctx.http, notice).await;
        }
    }

    /// A la tercera vez que alguien aparece tecleando sin llegar a enviar
    /// nada, se le anima a decirlo.
    async fn typing_start(&self, ctx: Context, event: TypingStartEvent) {
        if self.is_silent() {
            return;
        }
        if event.user_id == ctx.cache.current_user().id {
            return;
        }

        let nag = {
            let mut typing = self.typing.lock();
            let seen = typing.iter().filter(|id| **id == event.user_id).count();
            if seen == 3 {
                typing.clear();
                true
            } else {
                typing.push(event.user_id);
                false
            }
        };

        if nag {
            let text = format!("{} go ahead, say it", event.user_id.mention());
            if let Err(e) = event.channel_id.say(&ctx.http, text).await {
                debug!("No se pudo animar al que teclea: {:?}", e);
            }
        }
    }
}
