use crossbeam_channel::{bounded, Receiver, Sender};

use super::{PipelineMessage, Progress};

const MAX_MESSAGES: usize = 30;

/// Output side of a stage. Every sent message is cloned to all subscribed
/// listeners and mirrored as a progress tick, `End` as the completion tick.
pub struct Channel {
    progress_tx: Sender<Progress>,
    listeners: Vec<Sender<PipelineMessage>>,
}

impl Channel {
    pub fn new(progress_tx: Sender<Progress>) -> Self {
        Self {
            progress_tx,
            listeners: vec![],
        }
    }

    pub fn send(&self, message: PipelineMessage) {
        match &message {
            PipelineMessage::End => self.progress_tx.send(Progress::Completed),
            _ => self.progress_tx.send(Progress::Incr),
        }
        .expect("Should be able to send progress");

        for listener in &self.listeners {
            listener
                .send(message.clone())
                .expect("Should be able to send a message through the channel");
        }
    }

    /// Adds a listener. Listeners lag at most [`MAX_MESSAGES`] behind, after
    /// which the sending stage blocks.
    pub fn subscribe(&mut self) -> Receiver<PipelineMessage> {
        let (tx, rx) = bounded(MAX_MESSAGES);
        self.listeners.push(tx);
        rx
    }
}
