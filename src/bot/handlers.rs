use anyhow::Result;
use serenity::all::{
    ChannelId, ChannelType, Context, GuildId, Mentionable, Message, UserId,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    audio::{entry::QueueEntry, guild::GuildState, votes::VoteOutcome},
    bot::{moderation, LeitmotifBot},
    error::PlaybackError,
};

/// Tabla explícita comando → handler. El dispatcher resuelve el nombre y
/// delega; los handlers hacen el trabajo y responden al usuario.
pub async fn dispatch(
    ctx: &Context,
    msg: &Message,
    name: &str,
    args: &str,
    bot: &LeitmotifBot,
) -> Result<()> {
    info!(
        "📝 Comando {}{} de {} en guild {:?}",
        bot.config.command_prefix, name, msg.author.name, msg.guild_id
    );

    match name {
        // reproducción
        "join" => join(ctx, msg, args, bot).await,
        "summon" => summon(ctx, msg, bot).await.map(|_| ()),
        "play" => play(ctx, msg, args, bot).await,
        "volume" => volume(ctx, msg, args, bot).await,
        "pause" => pause(ctx, msg, bot).await,
        "resume" => resume(ctx, msg, bot).await,
        "stop" => stop(ctx, msg, bot).await,
        "skip" => skip(ctx, msg, bot).await,
        "playing" => playing(ctx, msg, bot).await,

        // moderación y tablas de respuestas
        "ban" => moderation::ban(ctx, msg, args, bot).await,
        "unban" => moderation::unban(ctx, msg, args, bot).await,
        "admin" => moderation::admin(ctx, msg, args, bot).await,
        "unadmin" => moderation::unadmin(ctx, msg, args, bot).await,
        "add_reply" => moderation::add_reply(ctx, msg, args, bot).await,
        "del_reply" => moderation::del_reply(ctx, msg, args, bot).await,
        "add_picrep" => moderation::add_picrep(ctx, msg, args, bot).await,
        "del_picrep" => moderation::del_picrep(ctx, msg, args, bot).await,
        "add_bgm" => moderation::add_bgm(ctx, msg, args, bot).await,
        "del_bgm" => moderation::del_bgm(ctx, msg, args, bot).await,

        _ => {
            debug!("Comando desconocido: {}", name);
            Ok(())
        }
    }
}

/// `!join <canal>`: se une a un canal de voz concreto, por mención, id o
/// nombre.
async fn join(ctx: &Context, msg: &Message, args: &str, bot: &LeitmotifBot) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };

    if bot.orchestrator.is_connected(guild_id).await {
        msg.channel_id
            .say(&ctx.http, PlaybackError::AlreadyConnected.to_string())
            .await?;
        return Ok(());
    }

    let Some(channel_id) = resolve_voice_channel(ctx, guild_id, args.trim()) else {
        msg.channel_id
            .say(&ctx.http, "This is not a voice channel...")
            .await?;
        return Ok(());
    };

    match bot.orchestrator.connect(guild_id, channel_id, &ctx.http).await {
        Ok(_) => {
            msg.channel_id
                .say(
                    &ctx.http,
                    format!("Ready to play audio in {}", channel_id.mention()),
                )
                .await?;
        }
        Err(e) => {
            msg.channel_id
                .say(&ctx.http, format!("❌ Could not join the channel: {e}"))
                .await?;
        }
    }

    Ok(())
}

/// `!summon`: une al bot al canal de voz del autor (o lo mueve allí). Lo
/// reutiliza `play` cuando todavía no hay conexión.
async fn summon(
    ctx: &Context,
    msg: &Message,
    bot: &LeitmotifBot,
) -> Result<Option<Arc<GuildState>>> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(None);
    };

    let Some(channel_id) = user_voice_channel(ctx, guild_id, msg.author.id) else {
        msg.channel_id
            .say(&ctx.http, "You are not in a voice channel.")
            .await?;
        return Ok(None);
    };

    match bot.orchestrator.connect(guild_id, channel_id, &ctx.http).await {
        Ok(state) => Ok(Some(state)),
        Err(e) => {
            msg.channel_id
                .say(&ctx.http, format!("❌ Could not join the channel: {e}"))
                .await?;
            Ok(None)
        }
    }
}

/// `!play [consulta]`: resuelve la consulta (URL o búsqueda) y la encola.
/// Sin argumento suena la pista de respaldo configurada.
async fn play(ctx: &Context, msg: &Message, args: &str, bot: &LeitmotifBot) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };

    // sin conexión de voz, primero invocar a summon como haría el usuario
    let state = if bot.orchestrator.is_connected(guild_id).await {
        bot.orchestrator.state(guild_id, &ctx.http)
    } else {
        match summon(ctx, msg, bot).await? {
            Some(state) => state,
            None => return Ok(()),
        }
    };

    let query = args.trim();
    let query = if query.is_empty() {
        bot.config.fallback_track.as_str()
    } else {
        query
    };

    let track = match bot.resolver.resolve(query).await {
        Ok(track) => track,
        Err(e) => {
            msg.channel_id
                .say(
                    &ctx.http,
                    format!("❌ An error occurred while processing this request: {e}"),
                )
                .await?;
            return Ok(());
        }
    };

    let entry = QueueEntry::new(
        track,
        msg.author.id,
        msg.author.display_name().to_string(),
        msg.channel_id,
    );
    let announcement = format!("➕ Enqueued {entry}");

    match state.enqueue(entry) {
        Ok(()) => {
            msg.channel_id.say(&ctx.http, announcement).await?;
        }
        Err(e) => {
            msg.channel_id.say(&ctx.http, format!("❌ {e}")).await?;
        }
    }

    Ok(())
}

/// `!volume <0-200>`: volumen de la pista activa, en porcentaje.
async fn volume(ctx: &Context, msg: &Message, args: &str, bot: &LeitmotifBot) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };

    let Ok(percent) = args.trim().parse::<u32>() else {
        msg.channel_id
            .say(&ctx.http, "Usage: volume <0-200>")
            .await?;
        return Ok(());
    };

    let state = bot.orchestrator.state(guild_id, &ctx.http);
    if let Ok(applied) = state.set_volume(percent).await {
        msg.channel_id
            .say(&ctx.http, format!("🔊 Set the volume to {applied}%"))
            .await?;
    }

    Ok(())
}

async fn pause(ctx: &Context, msg: &Message, bot: &LeitmotifBot) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };

    let state = bot.orchestrator.state(guild_id, &ctx.http);
    if state.pause().await.is_ok() {
        msg.channel_id.say(&ctx.http, "⏸️ Paused").await?;
    }

    Ok(())
}

async fn resume(ctx: &Context, msg: &Message, bot: &LeitmotifBot) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };

    let state = bot.orchestrator.state(guild_id, &ctx.http);
    if state.resume().await.is_ok() {
        msg.channel_id.say(&ctx.http, "▶️ Resumed").await?;
    }

    Ok(())
}

/// `!stop`: sólo admins; desmonta el estado completo de la guild (pista,
/// cola, worker y conexión de voz).
async fn stop(ctx: &Context, msg: &Message, bot: &LeitmotifBot) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };

    let authorized = { bot.store.lock().await.is_admin(msg.author.id) };
    if !authorized {
        msg.channel_id
            .say(
                &ctx.http,
                format!("Sorry, {} can't stop playing.", msg.author.display_name()),
            )
            .await?;
        return Ok(());
    }

    bot.orchestrator.teardown(guild_id).await;
    msg.channel_id
        .say(&ctx.http, "⏹️ Playback stopped and queue cleared")
        .await?;

    Ok(())
}

/// `!skip`: el solicitante o un admin saltan directamente; el resto vota.
async fn skip(ctx: &Context, msg: &Message, bot: &LeitmotifBot) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };

    let state = bot.orchestrator.state(guild_id, &ctx.http);
    if !state.is_playing().await {
        msg.channel_id
            .say(&ctx.http, PlaybackError::NotPlaying.to_string())
            .await?;
        return Ok(());
    }

    let is_admin = { bot.store.lock().await.is_admin(msg.author.id) };
    let reply = match state.vote_skip(msg.author.id, is_admin).await {
        VoteOutcome::RequesterBypass => "Requester requested skipping song...".to_string(),
        VoteOutcome::AdminBypass => "Skipping song...".to_string(),
        VoteOutcome::Passed(_) => "Skip vote passed, skipping song...".to_string(),
        VoteOutcome::Recorded(total, required) => {
            format!("Skip vote added, currently at [{total}/{required}]")
        }
        VoteOutcome::AlreadyVoted => "You have already voted to skip this song.".to_string(),
    };
    msg.channel_id.say(&ctx.http, reply).await?;

    Ok(())
}

/// `!playing`: pista actual y recuento de votos de salto.
async fn playing(ctx: &Context, msg: &Message, bot: &LeitmotifBot) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };

    let state = bot.orchestrator.state(guild_id, &ctx.http);
    let reply = match state.now_playing() {
        Some((entry, votes, required)) => {
            format!("Now playing {entry} [skips: {votes}/{required}]")
        }
        None => "Not playing anything.".to_string(),
    };
    msg.channel_id.say(&ctx.http, reply).await?;

    Ok(())
}

/// Canal de voz en el que está un usuario, según la caché del gateway.
pub(crate) fn user_voice_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

/// Resuelve el argumento de `join` a un canal de voz de la guild: mención
/// `<#id>`, id numérico o nombre exacto.
fn resolve_voice_channel(ctx: &Context, guild_id: GuildId, arg: &str) -> Option<ChannelId> {
    if arg.is_empty() {
        return None;
    }
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    let by_id = arg
        .trim_start_matches("<#")
        .trim_end_matches('>')
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .map(ChannelId::new);

    guild
        .channels
        .values()
        .find(|channel| {
            channel.kind == ChannelType::Voice
                && (Some(channel.id) == by_id || channel.name == arg)
        })
        .map(|channel| channel.id)
}
