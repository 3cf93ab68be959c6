use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};
use serenity::model::id::UserId;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::config::Config;

const BANNED_FILE: &str = "banned.json";
const ADMINS_FILE: &str = "admins.json";
const SUPERADMINS_FILE: &str = "superadmins.json";
const REPLIES_FILE: &str = "replies.json";
const PIC_REPLIES_FILE: &str = "pic_replies.json";
const THEMES_FILE: &str = "themes.json";

/// Resultado de una mutación de tabla con clave (alta o reemplazo).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableChange {
    Added,
    Replaced,
}

/// Tablas de moderación respaldadas por archivos JSON, un archivo por
/// tabla. Se cargan una vez al arrancar y cada mutación reescribe el
/// archivo completo de su tabla, así el archivo siempre refleja la última
/// mutación exitosa.
pub struct ModerationStore {
    data_dir: PathBuf,
    banned: HashSet<UserId>,
    admins: HashSet<UserId>,
    superadmins: HashSet<UserId>,
    replies: HashMap<String, String>,
    pic_replies: HashMap<String, String>,
    // id de usuario (en texto) -> URL de su tema
    themes: HashMap<String, String>,
}

impl ModerationStore {
    pub async fn load(config: &Config) -> Result<Self> {
        Self::load_from(config.data_dir.clone(), config.owner_id).await
    }

    /// Carga todas las tablas con `load_or_default`: un archivo ausente o
    /// corrupto se sustituye por la tabla vacía, nunca impide arrancar.
    pub async fn load_from(data_dir: PathBuf, owner_id: Option<u64>) -> Result<Self> {
        fs::create_dir_all(&data_dir).await?;

        let banned: HashSet<UserId> = load_or_default(&data_dir.join(BANNED_FILE)).await;
        let admins: HashSet<UserId> = load_or_default(&data_dir.join(ADMINS_FILE)).await;
        let mut superadmins: HashSet<UserId> =
            load_or_default(&data_dir.join(SUPERADMINS_FILE)).await;
        let replies: HashMap<String, String> = load_or_default(&data_dir.join(REPLIES_FILE)).await;
        let pic_replies: HashMap<String, String> =
            load_or_default(&data_dir.join(PIC_REPLIES_FILE)).await;
        let themes: HashMap<String, String> = load_or_default(&data_dir.join(THEMES_FILE)).await;

        if let Some(owner) = owner_id.filter(|id| *id != 0) {
            superadmins.insert(UserId::new(owner));
        }

        info!(
            "📂 Tablas de moderación cargadas: {} baneados, {} admins, {} respuestas, {} temas",
            banned.len(),
            admins.len(),
            replies.len() + pic_replies.len(),
            themes.len(),
        );

        Ok(Self {
            data_dir,
            banned,
            admins,
            superadmins,
            replies,
            pic_replies,
            themes,
        })
    }

    // Consultas de pertenencia

    pub fn is_banned(&self, user: UserId) -> bool {
        self.banned.contains(&user)
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        self.admins.contains(&user)
    }

    pub fn is_superadmin(&self, user: UserId) -> bool {
        self.superadmins.contains(&user)
    }

    // Mutaciones; devuelven si hubo cambio para el mensaje al usuario y
    // persisten la tabla entera sólo cuando lo hubo.

    pub async fn ban(&mut self, user: UserId) -> Result<bool> {
        if !self.banned.insert(user) {
            return Ok(false);
        }
        self.persist(BANNED_FILE, &self.banned).await?;
        Ok(true)
    }

    pub async fn unban(&mut self, user: UserId) -> Result<bool> {
        if !self.banned.remove(&user) {
            return Ok(false);
        }
        self.persist(BANNED_FILE, &self.banned).await?;
        Ok(true)
    }

    pub async fn grant_admin(&mut self, user: UserId) -> Result<bool> {
        if !self.admins.insert(user) {
            return Ok(false);
        }
        self.persist(ADMINS_FILE, &self.admins).await?;
        Ok(true)
    }

    pub async fn revoke_admin(&mut self, user: UserId) -> Result<bool> {
        if !self.admins.remove(&user) {
            return Ok(false);
        }
        self.persist(ADMINS_FILE, &self.admins).await?;
        Ok(true)
    }

    pub async fn set_reply(&mut self, keyword: String, reply: String) -> Result<TableChange> {
        let change = match self.replies.insert(keyword, reply) {
            Some(_) => TableChange::Replaced,
            None => TableChange::Added,
        };
        self.persist(REPLIES_FILE, &self.replies).await?;
        Ok(change)
    }

    pub async fn remove_reply(&mut self, keyword: &str) -> Result<bool> {
        if self.replies.remove(keyword).is_none() {
            return Ok(false);
        }
        self.persist(REPLIES_FILE, &self.replies).await?;
        Ok(true)
    }

    pub async fn set_pic_reply(&mut self, keyword: String, file: String) -> Result<TableChange> {
        let change = match self.pic_replies.insert(keyword, file) {
            Some(_) => TableChange::Replaced,
            None => TableChange::Added,
        };
        self.persist(PIC_REPLIES_FILE, &self.pic_replies).await?;
        Ok(change)
    }

    pub async fn remove_pic_reply(&mut self, keyword: &str) -> Result<bool> {
        if self.pic_replies.remove(keyword).is_none() {
            return Ok(false);
        }
        self.persist(PIC_REPLIES_FILE, &self.pic_replies).await?;
        Ok(true)
    }

    pub async fn set_theme(&mut self, user: UserId, url: String) -> Result<TableChange> {
        let change = match self.themes.insert(user.to_string(), url) {
            Some(_) => TableChange::Replaced,
            None => TableChange::Added,
        };
        self.persist(THEMES_FILE, &self.themes).await?;
        Ok(change)
    }

    pub async fn remove_theme(&mut self, user: UserId) -> Result<bool> {
        if self.themes.remove(&user.to_string()).is_none() {
            return Ok(false);
        }
        self.persist(THEMES_FILE, &self.themes).await?;
        Ok(true)
    }

    // Búsquedas por subcadena sobre el contenido de un mensaje

    pub fn find_reply(&self, content: &str) -> Option<String> {
        self.replies
            .iter()
            .find(|(keyword, _)| content.contains(keyword.as_str()))
            .map(|(_, reply)| reply.clone())
    }

    pub fn find_pic_reply(&self, content: &str) -> Option<String> {
        self.pic_replies
            .iter()
            .find(|(keyword, _)| content.contains(keyword.as_str()))
            .map(|(_, file)| file.clone())
    }

    /// Busca una clave de tema contenida en el mensaje. La clave es el id
    /// del usuario objetivo en texto, así que una mención lo dispara.
    pub fn find_theme_trigger(&self, content: &str) -> Option<(UserId, String)> {
        self.themes.iter().find_map(|(key, url)| {
            if !content.contains(key.as_str()) {
                return None;
            }
            key.parse::<u64>()
                .ok()
                .filter(|id| *id != 0)
                .map(|id| (UserId::new(id), url.clone()))
        })
    }

    async fn persist<T: Serialize + ?Sized>(&self, file: &str, table: &T) -> Result<()> {
        let path = self.data_dir.join(file);
        let content = serde_json::to_string_pretty(table)?;
        fs::write(&path, content).await?;
        Ok(())
    }
}

async fn load_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    match fs::read_to_string(path).await {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(table) => table,
            Err(e) => {
                warn!(
                    "⚠️ Archivo {} corrupto, usando tabla vacía: {}",
                    path.display(),
                    e
                );
                T::default()
            }
        },
        Err(_) => T::default(),
    }
}
