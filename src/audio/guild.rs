use anyhow::Result;
use parking_lot::Mutex;
use serenity::model::id::UserId;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        entry::QueueEntry,
        player::{PlaybackDriver, Player, VoiceSlot},
        votes::{SkipVotes, VoteOutcome},
    },
    error::PlaybackError,
};

/// La pista activa: entrada + player. El worker es el único escritor de la
/// ranura; el resto del código sólo la lee.
struct CurrentTrack {
    entry: QueueEntry,
    player: Arc<dyn Player>,
}

/// Estado de reproducción de una guild: cola FIFO acotada, pista actual,
/// votación de salto, ranura de pista de fondo y un worker que serializa
/// la reproducción. Como mucho hay un player de cola activo por guild.
pub struct GuildState {
    /// Conexión de voz; propiedad exclusiva de este estado.
    pub(crate) voice: VoiceSlot,
    queue_tx: mpsc::Sender<QueueEntry>,
    current: Arc<Mutex<Option<CurrentTrack>>>,
    skip_votes: Arc<Mutex<SkipVotes>>,
    background: Mutex<Option<Arc<dyn Player>>>,
    driver: Arc<dyn PlaybackDriver>,
    worker: Mutex<Option<JoinHandle<()>>>,
    capacity: usize,
}

impl GuildState {
    /// Crea el estado y lanza su worker. Los canales llegan construidos
    /// desde fuera porque el driver necesita el emisor de la señal de fin
    /// antes de existir el estado.
    pub fn spawn(
        driver: Arc<dyn PlaybackDriver>,
        voice: VoiceSlot,
        queue: (mpsc::Sender<QueueEntry>, mpsc::Receiver<QueueEntry>),
        finished_rx: mpsc::Receiver<()>,
        capacity: usize,
        skip_threshold: usize,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = queue;
        let current = Arc::new(Mutex::new(None));
        let skip_votes = Arc::new(Mutex::new(SkipVotes::new(skip_threshold)));

        let worker = tokio::spawn(run_worker(
            queue_rx,
            finished_rx,
            current.clone(),
            skip_votes.clone(),
            driver.clone(),
        ));

        Arc::new(Self {
            voice,
            queue_tx,
            current,
            skip_votes,
            background: Mutex::new(None),
            driver,
            worker: Mutex::new(Some(worker)),
            capacity,
        })
    }

    /// Encola sin bloquear al llamante; el worker despierta solo. La cola
    /// llena es un error lógico, no una espera.
    pub fn enqueue(&self, entry: QueueEntry) -> Result<(), PlaybackError> {
        self.queue_tx
            .try_send(entry)
            .map_err(|_| PlaybackError::QueueFull(self.capacity))
    }

    /// Hay conexión de voz, hay entrada actual y su player no ha terminado.
    /// Una pista pausada cuenta como sonando (es reanudable).
    pub async fn is_playing(&self) -> bool {
        if !self.driver.connected().await {
            return false;
        }
        match self.current_player() {
            Some(player) => !player.is_finished().await,
            None => false,
        }
    }

    /// Entrada activa con el recuento de votos, para el comando de estado.
    pub fn now_playing(&self) -> Option<(QueueEntry, usize, usize)> {
        let current = self.current.lock();
        let votes = self.skip_votes.lock();
        current
            .as_ref()
            .map(|c| (c.entry.clone(), votes.count(), votes.required()))
    }

    /// Limpia los votos y detiene la pista activa; su evento de fin hace
    /// avanzar al worker. Inocuo si no hay nada sonando.
    pub async fn skip(&self) {
        self.skip_votes.lock().clear();
        if self.is_playing().await {
            if let Some(player) = self.current_player() {
                if let Err(e) = player.stop() {
                    warn!("Error al detener la pista saltada: {:?}", e);
                }
            }
        }
    }

    /// Registra un voto de salto sobre la pista actual y ejecuta el salto
    /// si procede.
    pub async fn vote_skip(&self, voter: UserId, is_admin: bool) -> VoteOutcome {
        let requester = self.current.lock().as_ref().map(|c| c.entry.requester);
        let outcome =
            self.skip_votes
                .lock()
                .register(voter, requester == Some(voter), is_admin);
        if outcome.skips() {
            self.skip().await;
        }
        outcome
    }

    pub async fn pause(&self) -> Result<(), PlaybackError> {
        let player = self.active_player().await?;
        if let Err(e) = player.pause() {
            warn!("Error al pausar: {:?}", e);
        }
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), PlaybackError> {
        let player = self.active_player().await?;
        if let Err(e) = player.resume() {
            warn!("Error al reanudar: {:?}", e);
        }
        Ok(())
    }

    /// Ajusta el volumen de la pista activa, saturando el rango a 0–200%.
    pub async fn set_volume(&self, percent: u32) -> Result<u32, PlaybackError> {
        let player = self.active_player().await?;
        let clamped = percent.min(200);
        if let Err(e) = player.set_volume(clamped as f32 / 100.0) {
            warn!("Error al ajustar el volumen: {:?}", e);
        }
        Ok(clamped)
    }

    /// Arranca una pista de fondo: pausa (no detiene) la pista normal,
    /// corta la pista de fondo anterior exactamente una vez y ocupa la
    /// ranura con la nueva. La cola normal no se toca.
    pub async fn begin_background(&self, url: &str) -> Result<()> {
        if self.is_playing().await {
            if let Some(player) = self.current_player() {
                if let Err(e) = player.pause() {
                    warn!("Error al pausar la cola para la pista de fondo: {:?}", e);
                }
            }
        }

        if let Some(previous) = self.background.lock().take() {
            if let Err(e) = previous.stop() {
                debug!("La pista de fondo anterior ya había terminado: {:?}", e);
            }
        }

        let player = self.driver.play_background(url).await?;
        *self.background.lock() = Some(player);
        Ok(())
    }

    /// Teardown de mejor esfuerzo: la pista en curso primero para no dejar
    /// un player huérfano sosteniendo la conexión, después el worker para
    /// que nada vuelva a arrancar, y al final la pista de fondo. Los fallos
    /// se loguean y no se propagan.
    pub fn shutdown(&self) {
        if let Some(player) = self.current_player() {
            if let Err(e) = player.stop() {
                warn!("Error al detener la pista activa en el teardown: {:?}", e);
            }
        }
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
        self.current.lock().take();
        if let Some(background) = self.background.lock().take() {
            if let Err(e) = background.stop() {
                warn!("Error al detener la pista de fondo en el teardown: {:?}", e);
            }
        }
        self.skip_votes.lock().clear();
    }

    fn current_player(&self) -> Option<Arc<dyn Player>> {
        self.current.lock().as_ref().map(|c| c.player.clone())
    }

    async fn active_player(&self) -> Result<Arc<dyn Player>, PlaybackError> {
        if !self.is_playing().await {
            return Err(PlaybackError::NotPlaying);
        }
        self.current_player().ok_or(PlaybackError::NotPlaying)
    }
}

impl Drop for GuildState {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
    }
}

/// Bucle de reproducción de una guild: recibe en orden FIFO, anuncia,
/// arranca y espera la señal de fin antes de mirar la siguiente entrada.
/// La señal se procesa siempre antes del siguiente recv, así nunca hay dos
/// pistas de cola activas a la vez.
async fn run_worker(
    mut queue_rx: mpsc::Receiver<QueueEntry>,
    mut finished_rx: mpsc::Receiver<()>,
    current: Arc<Mutex<Option<CurrentTrack>>>,
    skip_votes: Arc<Mutex<SkipVotes>>,
    driver: Arc<dyn PlaybackDriver>,
) {
    while let Some(entry) = queue_rx.recv().await {
        // descartar señales rezagadas antes de armar la espera de esta
        // iteración
        while finished_rx.try_recv().is_ok() {}

        driver
            .announce(entry.channel_id, format!("🎶 Now playing {entry}"))
            .await;

        let player = match driver.play_request(&entry).await {
            Ok(player) => player,
            Err(e) => {
                warn!("No se pudo arrancar {}: {:?}", entry.title, e);
                driver
                    .announce(
                        entry.channel_id,
                        format!("❌ An error occurred while playing *{}*: {e}", entry.title),
                    )
                    .await;
                continue;
            }
        };

        info!("▶️ Reproduciendo: {}", entry.title);
        *current.lock() = Some(CurrentTrack { entry, player });

        // bloqueo hasta el fin de pista, natural o por skip/stop
        if finished_rx.recv().await.is_none() {
            break;
        }

        *current.lock() = None;
        skip_votes.lock().clear();
    }

    debug!("Worker de reproducción terminado");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::player::{EndSignal, MockPlayer};
    use crate::sources::ResolvedTrack;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serenity::model::id::ChannelId;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakePlayer {
        finished: AtomicBool,
        pauses: AtomicUsize,
        resumes: AtomicUsize,
        stops: AtomicUsize,
        signal: Option<EndSignal>,
    }

    impl FakePlayer {
        fn new(signal: Option<EndSignal>) -> Arc<Self> {
            Arc::new(Self {
                finished: AtomicBool::new(false),
                pauses: AtomicUsize::new(0),
                resumes: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
                signal,
            })
        }

        /// Simula el fin natural de la pista: marca terminado y dispara la
        /// señal igual que haría el pipeline de audio.
        fn finish(&self) {
            self.finished.store(true, Ordering::SeqCst);
            if let Some(signal) = &self.signal {
                let _ = signal.try_send(());
            }
        }

        fn stops(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }

        fn pauses(&self) -> usize {
            self.pauses.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Player for FakePlayer {
        fn pause(&self) -> Result<()> {
            self.pauses.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn resume(&self) -> Result<()> {
            self.resumes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.finish();
            Ok(())
        }

        fn set_volume(&self, _volume: f32) -> Result<()> {
            Ok(())
        }

        async fn is_finished(&self) -> bool {
            self.finished.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct DriverLog {
        started: Vec<Arc<FakePlayer>>,
        titles: Vec<String>,
        background: Vec<Arc<FakePlayer>>,
        announcements: Vec<String>,
    }

    struct FakeDriver {
        end_signal: EndSignal,
        log: parking_lot::Mutex<DriverLog>,
    }

    #[async_trait]
    impl PlaybackDriver for FakeDriver {
        async fn connected(&self) -> bool {
            true
        }

        async fn announce(&self, _channel_id: ChannelId, text: String) {
            self.log.lock().announcements.push(text);
        }

        async fn play_request(&self, entry: &QueueEntry) -> Result<Arc<dyn Player>> {
            let player = FakePlayer::new(Some(self.end_signal.clone()));
            let mut log = self.log.lock();
            log.started.push(player.clone());
            log.titles.push(entry.title.clone());
            Ok(player)
        }

        async fn play_background(&self, url: &str) -> Result<Arc<dyn Player>> {
            // una pista de fondo no lleva evento de fin conectado al worker
            let player = FakePlayer::new(None);
            let mut log = self.log.lock();
            log.background.push(player.clone());
            log.titles.push(format!("bgm:{url}"));
            Ok(player)
        }
    }

    fn test_state(capacity: usize) -> (Arc<GuildState>, Arc<FakeDriver>) {
        let (queue_tx, queue_rx) = mpsc::channel(capacity);
        let (end_tx, end_rx) = mpsc::channel(1);
        let driver = Arc::new(FakeDriver {
            end_signal: end_tx,
            log: parking_lot::Mutex::new(DriverLog::default()),
        });
        let voice: VoiceSlot = Arc::new(tokio::sync::Mutex::new(None));
        let state = GuildState::spawn(
            driver.clone(),
            voice,
            (queue_tx, queue_rx),
            end_rx,
            capacity,
            3,
        );
        (state, driver)
    }

    fn entry(title: &str, requester: u64) -> QueueEntry {
        QueueEntry::new(
            ResolvedTrack {
                title: title.to_string(),
                uploader: None,
                duration: Some(Duration::from_secs(180)),
                url: format!("https://example.com/{title}"),
            },
            UserId::new(requester),
            format!("user-{requester}"),
            ChannelId::new(100),
        )
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn tracks_start_in_fifo_order_and_advance_on_completion() {
        let (state, driver) = test_state(8);

        state.enqueue(entry("alpha", 1)).unwrap();
        state.enqueue(entry("beta", 2)).unwrap();

        wait_until(|| driver.log.lock().started.len() == 1).await;
        wait_until(|| state.now_playing().is_some()).await;
        assert_eq!(driver.log.lock().titles, vec!["alpha"]);
        assert!(state.is_playing().await);

        // la segunda no arranca mientras la primera sigue activa
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(driver.log.lock().started.len(), 1);

        // el fin de la primera avanza la cola sin más llamadas a enqueue
        let first = driver.log.lock().started[0].clone();
        first.finish();

        wait_until(|| driver.log.lock().started.len() == 2).await;
        assert_eq!(driver.log.lock().titles, vec!["alpha", "beta"]);
        wait_until(|| {
            state
                .now_playing()
                .map(|(e, _, _)| e.title == "beta")
                .unwrap_or(false)
        })
        .await;

        let second = driver.log.lock().started[1].clone();
        second.finish();
        wait_until(|| state.now_playing().is_none()).await;
    }

    #[tokio::test]
    async fn enqueue_reports_full_queue_without_blocking() {
        let (state, driver) = test_state(1);

        state.enqueue(entry("first", 1)).unwrap();
        wait_until(|| driver.log.lock().started.len() == 1).await;

        // una en el buffer y una sonando; la tercera no cabe
        state.enqueue(entry("second", 1)).unwrap();
        let overflow = state.enqueue(entry("third", 1));
        assert!(matches!(overflow, Err(PlaybackError::QueueFull(1))));
    }

    #[tokio::test]
    async fn skip_stops_the_active_track_and_advances() {
        let (state, driver) = test_state(8);

        state.enqueue(entry("alpha", 1)).unwrap();
        state.enqueue(entry("beta", 1)).unwrap();
        wait_until(|| state.now_playing().is_some()).await;

        state.skip().await;

        let first = driver.log.lock().started[0].clone();
        assert_eq!(first.stops(), 1);
        wait_until(|| driver.log.lock().started.len() == 2).await;
        assert_eq!(driver.log.lock().titles, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn skip_is_idempotent_when_nothing_plays() {
        let (state, _driver) = test_state(8);
        // sin pista activa no hay nada que detener ni que falle
        state.skip().await;
        assert!(state.now_playing().is_none());
    }

    #[tokio::test]
    async fn vote_skip_counts_rejects_duplicates_and_passes_at_threshold() {
        let (state, driver) = test_state(8);

        state.enqueue(entry("alpha", 1)).unwrap();
        wait_until(|| state.now_playing().is_some()).await;

        assert_eq!(
            state.vote_skip(UserId::new(2), false).await,
            VoteOutcome::Recorded(1, 3)
        );
        assert_eq!(
            state.vote_skip(UserId::new(2), false).await,
            VoteOutcome::AlreadyVoted
        );
        assert_eq!(
            state.vote_skip(UserId::new(3), false).await,
            VoteOutcome::Recorded(2, 3)
        );
        assert_eq!(
            state.vote_skip(UserId::new(4), false).await,
            VoteOutcome::Passed(3)
        );

        let first = driver.log.lock().started[0].clone();
        assert_eq!(first.stops(), 1);
    }

    #[tokio::test]
    async fn requester_and_admin_bypass_the_vote_count() {
        let (state, driver) = test_state(8);

        state.enqueue(entry("alpha", 7)).unwrap();
        wait_until(|| state.now_playing().is_some()).await;

        // el solicitante salta con el recuento a cero
        assert_eq!(
            state.vote_skip(UserId::new(7), false).await,
            VoteOutcome::RequesterBypass
        );
        wait_until(|| state.now_playing().is_none()).await;

        state.enqueue(entry("beta", 7)).unwrap();
        wait_until(|| {
            state
                .now_playing()
                .map(|(e, _, _)| e.title == "beta")
                .unwrap_or(false)
        })
        .await;

        assert_eq!(
            state.vote_skip(UserId::new(8), true).await,
            VoteOutcome::AdminBypass
        );
        let second = driver.log.lock().started[1].clone();
        assert_eq!(second.stops(), 1);
    }

    #[tokio::test]
    async fn background_track_pauses_the_queue_without_stopping_it() {
        let (state, driver) = test_state(8);

        state.enqueue(entry("alpha", 1)).unwrap();
        wait_until(|| state.now_playing().is_some()).await;
        let before = state.now_playing().expect("track activo").0;

        state
            .begin_background("https://example.com/theme")
            .await
            .unwrap();

        let normal = driver.log.lock().started[0].clone();
        assert_eq!(normal.pauses(), 1, "la pista normal se pausa");
        assert_eq!(normal.stops(), 0, "la pista normal no se detiene");

        // la entrada actual sigue intacta y es reanudable
        let after = state.now_playing().expect("track sigue activo").0;
        assert_eq!(after.title, before.title);
        assert_eq!(after.duration, before.duration);

        state.resume().await.unwrap();
        assert_eq!(normal.resumes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_background_track_stops_the_first_exactly_once() {
        let (state, driver) = test_state(8);

        state.enqueue(entry("alpha", 1)).unwrap();
        wait_until(|| state.now_playing().is_some()).await;

        state
            .begin_background("https://example.com/theme-1")
            .await
            .unwrap();
        state
            .begin_background("https://example.com/theme-2")
            .await
            .unwrap();

        let log = driver.log.lock();
        assert_eq!(log.background.len(), 2);
        assert_eq!(log.background[0].stops(), 1, "el primer tema se corta una vez");
        assert_eq!(log.background[1].stops(), 0);
        drop(log);

        // el intercambio de temas no hace avanzar la cola normal
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(driver.log.lock().started.len(), 1);
        assert_eq!(
            state.now_playing().expect("track sigue activo").0.title,
            "alpha"
        );
    }

    #[tokio::test]
    async fn worker_continues_after_a_failed_start() {
        struct FailingOnce {
            inner: FakeDriver,
            failed: AtomicBool,
        }

        #[async_trait]
        impl PlaybackDriver for FailingOnce {
            async fn connected(&self) -> bool {
                true
            }

            async fn announce(&self, channel_id: ChannelId, text: String) {
                self.inner.announce(channel_id, text).await;
            }

            async fn play_request(&self, entry: &QueueEntry) -> Result<Arc<dyn Player>> {
                if !self.failed.swap(true, Ordering::SeqCst) {
                    anyhow::bail!("stream unavailable");
                }
                self.inner.play_request(entry).await
            }

            async fn play_background(&self, url: &str) -> Result<Arc<dyn Player>> {
                self.inner.play_background(url).await
            }
        }

        let (queue_tx, queue_rx) = mpsc::channel(8);
        let (end_tx, end_rx) = mpsc::channel(1);
        let driver = Arc::new(FailingOnce {
            inner: FakeDriver {
                end_signal: end_tx,
                log: parking_lot::Mutex::new(DriverLog::default()),
            },
            failed: AtomicBool::new(false),
        });
        let voice: VoiceSlot = Arc::new(tokio::sync::Mutex::new(None));
        let state = GuildState::spawn(
            driver.clone(),
            voice,
            (queue_tx, queue_rx),
            end_rx,
            8,
            3,
        );

        state.enqueue(entry("broken", 1)).unwrap();
        state.enqueue(entry("fine", 1)).unwrap();

        // la primera falla, se anuncia el error y la segunda arranca igual
        wait_until(|| driver.inner.log.lock().started.len() == 1).await;
        let log = driver.inner.log.lock();
        assert_eq!(log.titles, vec!["fine"]);
        assert!(log
            .announcements
            .iter()
            .any(|text| text.contains("An error occurred")));
    }

    #[tokio::test]
    async fn volume_is_clamped_before_reaching_the_player() {
        let (state, _driver) = test_state(8);

        let mut mock = MockPlayer::new();
        mock.expect_is_finished().returning(|| false);
        mock.expect_set_volume()
            .with(mockall::predicate::eq(2.0f32))
            .times(1)
            .returning(|_| Ok(()));

        *state.current.lock() = Some(CurrentTrack {
            entry: entry("mocked", 1),
            player: Arc::new(mock),
        });

        let applied = state.set_volume(350).await.unwrap();
        assert_eq!(applied, 200);
    }

    #[tokio::test]
    async fn pause_and_volume_require_an_active_track() {
        let (state, _driver) = test_state(8);

        assert!(matches!(
            state.pause().await,
            Err(PlaybackError::NotPlaying)
        ));
        assert!(matches!(
            state.set_volume(50).await,
            Err(PlaybackError::NotPlaying)
        ));
    }

    #[tokio::test]
    async fn shutdown_stops_players_and_worker() {
        let (state, driver) = test_state(8);

        state.enqueue(entry("alpha", 1)).unwrap();
        wait_until(|| state.now_playing().is_some()).await;
        state
            .begin_background("https://example.com/theme")
            .await
            .unwrap();

        state.shutdown();

        let log = driver.log.lock();
        assert_eq!(log.started[0].stops(), 1);
        assert_eq!(log.background[0].stops(), 1);
        drop(log);
        assert!(state.now_playing().is_none());

        // el worker ya no arranca nada más
        let _ = state.enqueue(entry("beta", 1));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(driver.log.lock().started.len(), 1);
    }
}
