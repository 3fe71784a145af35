//! Local input: stdin lines fed into a channel for the send loop.

use std::io::{stdin, stdout, BufRead, IsTerminal, Write};
use std::thread;

use tokio::sync::mpsc;

/// Lines waiting to be sent. Small on purpose, typing is slow.
const INPUT_BACKLOG: usize = 16;

/// Read stdin on a plain OS thread and forward each line.
///
/// When stdin is a terminal `prompt` is printed before every line.
///
/// The thread ends at end of input or once the receiver is gone, but a
/// read that is already waiting on the terminal can't be interrupted. It is
/// left behind and goes away with the process.
pub fn spawn_stdin_reader(prompt: Option<String>) -> mpsc::Receiver<String> {
    let (sender, receiver) = mpsc::channel(INPUT_BACKLOG);
    let prompt = prompt.filter(|_| stdin().is_terminal());

    thread::spawn(move || {
        let stdin = stdin();
        let mut lines = stdin.lock().lines();
        loop {
            if let Some(prompt) = &prompt {
                print!("{prompt}");
                if let Err(e) = stdout().flush() {
                    tracing::debug!("failed to flush the prompt: {e}");
                }
            }

            let line = match lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    tracing::warn!("failed to read from stdin: {e}");
                    break;
                }
                None => break,
            };

            if sender.blocking_send(line).is_err() {
                break;
            }
        }
        tracing::debug!("stdin reader finished");
    });

    receiver
}
