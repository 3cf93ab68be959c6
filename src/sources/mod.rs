use anyhow::{Context as _, Result};
use async_process::Command;
use serde::Deserialize;
use songbird::input::{Input, YoutubeDl};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Metadatos de una pista resuelta por yt-dlp.
#[derive(Debug, Clone)]
pub struct ResolvedTrack {
    pub title: String,
    pub uploader: Option<String>,
    pub duration: Option<Duration>,
    pub url: String,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: String,
    uploader: Option<String>,
    duration: Option<f64>,
    webpage_url: Option<String>,
}

/// Resuelve consultas de los usuarios a pistas reproducibles vía yt-dlp.
pub struct TrackResolver {
    client: reqwest::Client,
    rate_limiter: tokio::sync::Semaphore,
}

impl TrackResolver {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            // Limitar ejecuciones concurrentes de yt-dlp para evitar rate limiting
            rate_limiter: tokio::sync::Semaphore::new(3),
        })
    }

    /// Resuelve una consulta (URL directa o términos de búsqueda) a una
    /// pista con título, autor y duración.
    pub async fn resolve(&self, query: &str) -> Result<ResolvedTrack> {
        let _permit = self.rate_limiter.acquire().await?;

        let target = if is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{query}")
        };
        debug!("📊 Resolviendo: {}", target);

        let output = Command::new("yt-dlp")
            .args(["--no-playlist", "--dump-json", "--no-warnings", &target])
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .next()
            .context("yt-dlp no devolvió resultados")?;
        let parsed: YtDlpInfo =
            serde_json::from_str(line).context("Error al parsear respuesta de yt-dlp")?;

        let url = match parsed.webpage_url {
            Some(url) => url,
            None if is_url(query) => query.to_string(),
            None => anyhow::bail!("yt-dlp no devolvió la URL de la pista"),
        };

        info!("🎼 Pista resuelta: {}", parsed.title);
        Ok(ResolvedTrack {
            title: parsed.title,
            uploader: parsed.uploader,
            duration: parsed
                .duration
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .map(Duration::from_secs_f64),
            url,
        })
    }

    /// Input de streaming para songbird; la descarga la gestiona yt-dlp.
    pub fn stream_input(&self, url: &str) -> Input {
        YoutubeDl::new(self.client.clone(), url.to_string()).into()
    }
}

fn is_url(query: &str) -> bool {
    Url::parse(query)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_detection() {
        assert!(is_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_url("http://example.com/stream.mp3"));
        assert!(!is_url("lofi hip hop radio"));
        assert!(!is_url("ftp://example.com/file"));
        assert!(!is_url(""));
    }
}
