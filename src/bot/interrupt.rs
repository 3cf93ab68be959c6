use anyhow::Result;
use serenity::all::{Context, GuildId, Mentionable, Message};
use tracing::info;

use crate::bot::{handlers, moderation, LeitmotifBot};

/// Controlador de interrupciones de tema: se evalúa sobre cada mensaje que
/// no es comando, después de las respuestas automáticas.
///
/// Las claves de la tabla de temas identifican al usuario objetivo; el
/// disparo es una comprobación de subcadena cruda sobre el contenido (una
/// mención contiene el id del usuario en texto). Los falsos positivos con
/// texto arbitrario son posibles y están asumidos.
///
/// Al dispararse: el bot se une (o mueve) al canal de voz del objetivo, la
/// pista normal queda pausada —no detenida, para poder reanudarla— y el
/// tema anterior de la guild se corta exactamente una vez antes de arrancar
/// el nuevo. El tema nunca entra en la cola normal: no se vota ni se salta.
pub async fn try_theme_trigger(
    ctx: &Context,
    msg: &Message,
    guild_id: GuildId,
    bot: &LeitmotifBot,
) -> Result<bool> {
    let (trigger, banned) = {
        let store = bot.store.lock().await;
        (
            store.find_theme_trigger(&msg.content),
            store.is_banned(msg.author.id),
        )
    };
    let Some((target, url)) = trigger else {
        return Ok(false);
    };

    if banned {
        msg.channel_id
            .say(&ctx.http, format!("{} not for you.", msg.author.mention()))
            .await?;
        return Ok(true);
    }

    // sin presencia en voz no hay tema ni cambio de estado
    let Some(channel_id) = handlers::user_voice_channel(ctx, guild_id, target) else {
        let name = moderation::member_name(ctx, guild_id, target).await;
        msg.channel_id
            .say(&ctx.http, format!("{name} is not in a voice channel."))
            .await?;
        return Ok(true);
    };

    info!("🎺 Tema disparado para {} en guild {}", target, guild_id);

    let state = bot
        .orchestrator
        .connect(guild_id, channel_id, &ctx.http)
        .await?;
    state.begin_background(&url).await?;

    Ok(true)
}
