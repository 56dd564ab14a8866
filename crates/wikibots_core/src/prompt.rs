use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::signal::StopSignal;

const STOP_POLL: Duration = Duration::from_millis(100);

/// Line-oriented operator input.
pub trait Prompter {
    /// Print `prompt` and read one line without its terminator. `None` means
    /// the input is closed or the run was interrupted.
    fn read_line(&mut self, prompt: &str) -> Option<String>;
}

/// Reads stdin on a background thread so a waiting prompt still notices
/// Ctrl-C and gives up instead of blocking until Enter.
#[derive(Debug)]
pub struct StdinPrompter {
    lines: Option<Receiver<String>>,
    stop: StopSignal,
}

impl StdinPrompter {
    pub fn new(stop: StopSignal) -> Self {
        Self { lines: None, stop }
    }
}

impl Prompter for StdinPrompter {
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        let mut stdout = io::stdout();
        let _ = write!(stdout, "{prompt}");
        let _ = stdout.flush();

        let lines = self.lines.get_or_insert_with(spawn_stdin_reader);
        let line = next_line(lines, &self.stop);
        if line.is_none() {
            println!();
        }
        line
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if sender.send(line).is_err() {
                break;
            }
        }
    });
    receiver
}

/// Wait for the next line until the input closes or `stop` is raised.
fn next_line(lines: &Receiver<String>, stop: &StopSignal) -> Option<String> {
    loop {
        if stop.is_raised() {
            return None;
        }
        match lines.recv_timeout(STOP_POLL) {
            Ok(line) => return Some(line),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    }
}

/// Replays canned answers, then reports end of input.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ScriptedPrompter {
    answers: std::collections::VecDeque<String>,
    pub prompts: Vec<String>,
}

#[cfg(test)]
impl ScriptedPrompter {
    pub(crate) fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|answer| answer.to_string()).collect(),
            prompts: Vec::new(),
        }
    }
}

#[cfg(test)]
impl Prompter for ScriptedPrompter {
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        self.prompts.push(prompt.to_string());
        self.answers.pop_front()
    }
}
