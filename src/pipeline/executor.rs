use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver};

use super::stages::Stage;
use super::{Channel, PipelineMessage, Progress};

/// Runs one stage on its own thread, draining the upstream receiver in
/// batches and handing them to the stage together with the output channel.
pub struct Executor {
    name: &'static str,
    input: Option<Receiver<PipelineMessage>>,
    channel: Channel,
    handler: Box<dyn Stage>,
}

impl Executor {
    pub fn new(name: &'static str, handler: Box<dyn Stage>) -> (Self, Receiver<Progress>) {
        let (progress_tx, progress_rx) = unbounded();
        let executor = Self {
            name,
            input: None,
            channel: Channel::new(progress_tx),
            handler,
        };
        (executor, progress_rx)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Feeds this executor from `upstream`'s output.
    pub fn attach_to(&mut self, upstream: &mut Executor) {
        self.input = Some(upstream.channel.subscribe());
    }

    /// Adds an external listener on this executor's output.
    pub fn subscribe(&mut self) -> Receiver<PipelineMessage> {
        self.channel.subscribe()
    }

    pub fn run(self) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name(format!("pipeline-{}", self.name))
            .spawn(move || self.start())
            .expect("Should be able to spawn a pipeline thread")
    }

    fn start(mut self) {
        let input = match self.input.take() {
            Some(input) => input,
            None => {
                // A stage without an upstream is a source: it produces its
                // whole output from one closing batch.
                self.handler
                    .handle(vec![PipelineMessage::End], &self.channel);
                return;
            }
        };

        while let Ok(first) = input.recv() {
            let mut messages = vec![first];
            while let Ok(message) = input.try_recv() {
                messages.push(message);
            }
            let closing = messages
                .iter()
                .any(|message| matches!(message, PipelineMessage::End));
            self.handler.handle(messages, &self.channel);
            if closing {
                break;
            }
        }
    }
}
