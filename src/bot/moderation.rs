use anyhow::Result;
use regex::Regex;
use serenity::all::{Context, GuildId, Message, UserId};
use std::sync::LazyLock;

use crate::{
    bot::LeitmotifBot,
    storage::TableChange,
};

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<@!?(\d+)>$").expect("regex de mención inválida"));

/// Primer argumento como usuario: mención `<@id>` o id numérico.
fn parse_user_arg(arg: &str) -> Option<UserId> {
    let raw = MENTION_RE
        .captures(arg)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
        .unwrap_or(arg);
    raw.parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .map(UserId::new)
}

/// Nombre visible de un miembro, con el id como último recurso.
pub(crate) async fn member_name(ctx: &Context, guild_id: GuildId, user: UserId) -> String {
    match guild_id.member(&ctx.http, user).await {
        Ok(member) => member.display_name().to_string(),
        Err(_) => user.to_string(),
    }
}

/// Autorización contra el conjunto privilegiado que toque; avisa al usuario
/// cuando falla. Plantilla común de todos los comandos de moderación.
async fn authorize(
    ctx: &Context,
    msg: &Message,
    bot: &LeitmotifBot,
    need_super: bool,
    denial: &str,
) -> Result<bool> {
    let allowed = {
        let store = bot.store.lock().await;
        if need_super {
            store.is_superadmin(msg.author.id)
        } else {
            store.is_admin(msg.author.id)
        }
    };

    if !allowed {
        msg.channel_id
            .say(
                &ctx.http,
                format!("Sorry, {} {}.", msg.author.display_name(), denial),
            )
            .await?;
    }
    Ok(allowed)
}

/// Divide los argumentos en (primero, resto).
fn split_pair(args: &str) -> Option<(&str, &str)> {
    let args = args.trim();
    let (first, rest) = args.split_once(char::is_whitespace)?;
    let rest = rest.trim();
    if rest.is_empty() {
        return None;
    }
    Some((first, rest))
}

/// `!ban <usuario>`: requiere admin.
pub async fn ban(ctx: &Context, msg: &Message, args: &str, bot: &LeitmotifBot) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };
    if !authorize(ctx, msg, bot, false, "can't ban users").await? {
        return Ok(());
    }

    let Some(target) = parse_user_arg(args.trim()) else {
        msg.channel_id.say(&ctx.http, "Usage: ban <user>").await?;
        return Ok(());
    };

    let name = member_name(ctx, guild_id, target).await;
    let banned = { bot.store.lock().await.ban(target).await? };
    let reply = if banned {
        format!("{name} has been banned!")
    } else {
        format!("{name} is already banned!")
    };
    msg.channel_id.say(&ctx.http, reply).await?;

    Ok(())
}

/// `!unban <usuario>`: requiere admin.
pub async fn unban(ctx: &Context, msg: &Message, args: &str, bot: &LeitmotifBot) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };
    if !authorize(ctx, msg, bot, false, "can't unban users").await? {
        return Ok(());
    }

    let Some(target) = parse_user_arg(args.trim()) else {
        msg.channel_id.say(&ctx.http, "Usage: unban <user>").await?;
        return Ok(());
    };

    let name = member_name(ctx, guild_id, target).await;
    let removed = { bot.store.lock().await.unban(target).await? };
    let reply = if removed {
        format!("{name} has been unbanned!")
    } else {
        format!("{name} isn't banned!")
    };
    msg.channel_id.say(&ctx.http, reply).await?;

    Ok(())
}

/// `!admin <usuario>`: requiere superadmin.
pub async fn admin(ctx: &Context, msg: &Message, args: &str, bot: &LeitmotifBot) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };
    if !authorize(ctx, msg, bot, true, "can't make users admin").await? {
        return Ok(());
    }

    let Some(target) = parse_user_arg(args.trim()) else {
        msg.channel_id.say(&ctx.http, "Usage: admin <user>").await?;
        return Ok(());
    };

    let name = member_name(ctx, guild_id, target).await;
    let granted = { bot.store.lock().await.grant_admin(target).await? };
    let reply = if granted {
        format!("{name} is an admin now!")
    } else {
        format!("{name} is already an admin!")
    };
    msg.channel_id.say(&ctx.http, reply).await?;

    Ok(())
}

/// `!unadmin <usuario>`: requiere superadmin.
pub async fn unadmin(ctx: &Context, msg: &Message, args: &str, bot: &LeitmotifBot) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };
    if !authorize(ctx, msg, bot, true, "can't revoke admins").await? {
        return Ok(());
    }

    let Some(target) = parse_user_arg(args.trim()) else {
        msg.channel_id
            .say(&ctx.http, "Usage: unadmin <user>")
            .await?;
        return Ok(());
    };

    let name = member_name(ctx, guild_id, target).await;
    let revoked = { bot.store.lock().await.revoke_admin(target).await? };
    let reply = if revoked {
        format!("{name} isn't an admin now!")
    } else {
        format!("{name} is already not an admin!")
    };
    msg.channel_id.say(&ctx.http, reply).await?;

    Ok(())
}

/// `!add_reply <palabra> <respuesta>`: regla de respuesta automática.
pub async fn add_reply(ctx: &Context, msg: &Message, args: &str, bot: &LeitmotifBot) -> Result<()> {
    let Some((keyword, reply)) = split_pair(args) else {
        msg.channel_id
            .say(&ctx.http, "Usage: add_reply <keyword> <reply>")
            .await?;
        return Ok(());
    };

    let change = {
        bot.store
            .lock()
            .await
            .set_reply(keyword.to_string(), reply.to_string())
            .await?
    };
    let reply = match change {
        TableChange::Added => format!("Keyword {keyword} is added"),
        TableChange::Replaced => format!("Keyword {keyword} is changed"),
    };
    msg.channel_id.say(&ctx.http, reply).await?;

    Ok(())
}

/// `!del_reply <palabra>`
pub async fn del_reply(ctx: &Context, msg: &Message, args: &str, bot: &LeitmotifBot) -> Result<()> {
    let keyword = args.trim();
    if keyword.is_empty() {
        msg.channel_id
            .say(&ctx.http, "Usage: del_reply <keyword>")
            .await?;
        return Ok(());
    }

    let removed = { bot.store.lock().await.remove_reply(keyword).await? };
    let reply = if removed {
        format!("Keyword {keyword} is deleted")
    } else {
        format!("No keyword is named {keyword}")
    };
    msg.channel_id.say(&ctx.http, reply).await?;

    Ok(())
}

/// `!add_picrep <palabra> <archivo>`: respuesta con imagen del directorio
/// `pic/` del data dir.
pub async fn add_picrep(
    ctx: &Context,
    msg: &Message,
    args: &str,
    bot: &LeitmotifBot,
) -> Result<()> {
    let Some((keyword, file)) = split_pair(args) else {
        msg.channel_id
            .say(&ctx.http, "Usage: add_picrep <keyword> <file>")
            .await?;
        return Ok(());
    };

    let change = {
        bot.store
            .lock()
            .await
            .set_pic_reply(keyword.to_string(), file.to_string())
            .await?
    };
    let reply = match change {
        TableChange::Added => format!("Keyword {keyword} is added"),
        TableChange::Replaced => format!("Keyword {keyword} is changed"),
    };
    msg.channel_id.say(&ctx.http, reply).await?;

    Ok(())
}

/// `!del_picrep <palabra>`
pub async fn del_picrep(
    ctx: &Context,
    msg: &Message,
    args: &str,
    bot: &LeitmotifBot,
) -> Result<()> {
    let keyword = args.trim();
    if keyword.is_empty() {
        msg.channel_id
            .say(&ctx.http, "Usage: del_picrep <keyword>")
            .await?;
        return Ok(());
    }

    let removed = { bot.store.lock().await.remove_pic_reply(keyword).await? };
    let reply = if removed {
        format!("Keyword {keyword} is deleted")
    } else {
        format!("No keyword is named {keyword}")
    };
    msg.channel_id.say(&ctx.http, reply).await?;

    Ok(())
}

/// `!add_bgm <usuario> <url>`: requiere admin; asigna el tema que sonará
/// cuando se mencione al usuario estando en voz.
pub async fn add_bgm(ctx: &Context, msg: &Message, args: &str, bot: &LeitmotifBot) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };
    if !authorize(ctx, msg, bot, false, "can't add themes").await? {
        return Ok(());
    }

    let parsed = split_pair(args).and_then(|(user, url)| Some((parse_user_arg(user)?, url)));
    let Some((target, url)) = parsed else {
        msg.channel_id
            .say(&ctx.http, "Usage: add_bgm <user> <url>")
            .await?;
        return Ok(());
    };

    let name = member_name(ctx, guild_id, target).await;
    let change = {
        bot.store
            .lock()
            .await
            .set_theme(target, url.to_string())
            .await?
    };
    let reply = match change {
        TableChange::Added => format!("{name}'s theme is added"),
        TableChange::Replaced => format!("{name}'s theme is changed"),
    };
    msg.channel_id.say(&ctx.http, reply).await?;

    Ok(())
}

/// `!del_bgm <usuario>`: requiere admin.
pub async fn del_bgm(ctx: &Context, msg: &Message, args: &str, bot: &LeitmotifBot) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };
    if !authorize(ctx, msg, bot, false, "can't delete themes").await? {
        return Ok(());
    }

    let Some(target) = parse_user_arg(args.trim()) else {
        msg.channel_id
            .say(&ctx.http, "Usage: del_bgm <user>")
            .await?;
        return Ok(());
    };

    let name = member_name(ctx, guild_id, target).await;
    let removed = { bot.store.lock().await.remove_theme(target).await? };
    let reply = if removed {
        format!("{name}'s theme is deleted")
    } else {
        format!("No theme is set for {name}")
    };
    msg.channel_id.say(&ctx.http, reply).await?;

    Ok(())
}
