use thiserror::Error;

/// Fallos lógicos de las operaciones de reproducción. Cada variante se
/// traduce tal cual en un mensaje visible para el usuario; ninguna es fatal
/// para el proceso ni para el worker de la guild.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Not in a voice channel...")]
    NotConnected,

    #[error("Already in a voice channel...")]
    AlreadyConnected,

    #[error("Not playing any music right now...")]
    NotPlaying,

    #[error("The queue is full ({0} tracks waiting)")]
    QueueFull(usize),
}
