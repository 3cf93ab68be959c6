use anyhow::Result;
use serenity::all::{Context, CreateAttachment, CreateMessage, Mentionable, Message};
use tracing::warn;

use crate::bot::LeitmotifBot;

/// Revisa las tablas de respuestas automáticas contra el contenido del
/// mensaje (subcadena, primera coincidencia). Devuelve true si el mensaje
/// quedó atendido y el pipeline no debe seguir.
pub async fn try_auto_reply(ctx: &Context, msg: &Message, bot: &LeitmotifBot) -> Result<bool> {
    let (text_reply, pic_reply) = {
        let store = bot.store.lock().await;
        (
            store.find_reply(&msg.content),
            store.find_pic_reply(&msg.content),
        )
    };

    if let Some(reply) = text_reply {
        msg.channel_id
            .say(&ctx.http, format!("{} {}", msg.author.mention(), reply))
            .await?;
        return Ok(true);
    }

    if let Some(file_name) = pic_reply {
        let path = bot.config.pics_dir().join(&file_name);
        match CreateAttachment::path(&path).await {
            Ok(attachment) => {
                msg.channel_id
                    .send_message(&ctx.http, CreateMessage::new().add_file(attachment))
                    .await?;
            }
            Err(e) => {
                // la tabla apunta a un archivo que ya no está
                warn!("No se pudo leer la imagen {}: {:?}", path.display(), e);
                msg.channel_id
                    .say(
                        &ctx.http,
                        format!("❌ The picture for this keyword is missing ({file_name})"),
                    )
                    .await?;
            }
        }
        return Ok(true);
    }

    Ok(false)
}
