//! Scripted replay transport.
//!
//! Plays back a canned device dialogue: immediate output plus
//! trigger/response rules matched against everything the session writes.
//! This is how expect/send logic is exercised without hardware, both in
//! this crate's tests and in downstream suites.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::Transport;

struct Rule {
    trigger: Vec<u8>,
    response: Vec<u8>,
}

/// Shared view of everything written to a [`ScriptedTransport`].
///
/// Clone one out with [`ScriptedTransport::write_log`] before handing the
/// transport to a session; assertions can then inspect the writes after
/// the transport has been moved.
#[derive(Clone, Default)]
pub struct WriteLog(Arc<Mutex<Vec<u8>>>);

impl WriteLog {
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }

    pub fn as_text(&self) -> String {
        String::from_utf8_lossy(&self.to_vec()).into_owned()
    }

    pub fn contains(&self, needle: &str) -> bool {
        let bytes = self.0.lock().unwrap();
        find(&bytes, needle.as_bytes()).is_some()
    }
}

/// A transport that replays a scripted dialogue.
///
/// Rules fire in order: each rule waits for its trigger bytes to appear
/// in the written stream (at or after the point the previous rule
/// fired), then queues its response for reading.
pub struct ScriptedTransport {
    pending: VecDeque<u8>,
    rules: VecDeque<Rule>,
    written: WriteLog,
    scan_from: usize,
    eof_when_done: bool,
    closed: bool,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            rules: VecDeque::new(),
            written: WriteLog::default(),
            scan_from: 0,
            eof_when_done: false,
            closed: false,
        }
    }

    /// Queue output available immediately (e.g. a boot banner).
    pub fn say(mut self, text: &str) -> Self {
        self.pending.extend(text.as_bytes());
        self
    }

    /// When `trigger` is written by the session, reply with `response`.
    pub fn on(mut self, trigger: &str, response: &str) -> Self {
        self.rules.push_back(Rule {
            trigger: trigger.as_bytes().to_vec(),
            response: response.as_bytes().to_vec(),
        });
        self
    }

    /// Like [`Self::on`], but with raw byte triggers (control characters).
    pub fn on_bytes(mut self, trigger: &[u8], response: &str) -> Self {
        self.rules.push_back(Rule {
            trigger: trigger.to_vec(),
            response: response.as_bytes().to_vec(),
        });
        self
    }

    /// Report EOF once all queued output is read and all rules have fired.
    pub fn eof_when_done(mut self) -> Self {
        self.eof_when_done = true;
        self
    }

    /// Everything the session has written so far.
    pub fn written(&self) -> Vec<u8> {
        self.written.to_vec()
    }

    /// A handle to the write log that survives moving the transport.
    pub fn write_log(&self) -> WriteLog {
        self.written.clone()
    }

    fn fire_ready_rules(&mut self) {
        while let Some(rule) = self.rules.front() {
            let written = self.written.0.lock().unwrap();
            let window = &written[self.scan_from..];
            match find(window, &rule.trigger) {
                Some(pos) => {
                    self.scan_from += pos + rule.trigger.len();
                    drop(written);
                    let rule = self.rules.pop_front().unwrap();
                    self.pending.extend(rule.response);
                }
                None => break,
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    // An empty trigger never fires; memmem would report position 0.
    if needle.is_empty() {
        return None;
    }
    memchr::memmem::find(haystack, needle)
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            if self.closed || (self.eof_when_done && self.rules.is_empty()) {
                return Ok(0);
            }
            // Nothing scripted to say; block until the caller's timeout.
            std::future::pending::<()>().await;
            unreachable!();
        }
        let n = buf.len().min(self.pending.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.pending.pop_front().unwrap();
        }
        Ok(n)
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        }
        self.written.0.lock().unwrap().extend_from_slice(data);
        self.fire_ready_rules();
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_say_then_read() {
        let mut t = ScriptedTransport::new().say("banner\n");
        let mut buf = [0u8; 16];
        let n = t.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"banner\n");
    }

    #[tokio::test]
    async fn test_rules_fire_in_order() {
        let mut t = ScriptedTransport::new()
            .on("first", "one\n")
            .on("second", "two\n");

        // Out-of-order trigger does not fire rule 2 early.
        t.write_all(b"second\n").await.unwrap();
        assert!(t.pending.is_empty());

        t.write_all(b"first\n").await.unwrap();
        assert_eq!(t.pending.iter().copied().collect::<Vec<_>>(), b"one\n");

        t.write_all(b"second\n").await.unwrap();
        let got: Vec<u8> = t.pending.iter().copied().collect();
        assert_eq!(got, b"one\ntwo\n");
    }

    #[tokio::test]
    async fn test_write_log_survives_move() {
        let t = ScriptedTransport::new();
        let log = t.write_log();
        let mut boxed: Box<dyn Transport> = Box::new(t);
        boxed.write_all(b"power outlets 3 cycle /y\r\n").await.unwrap();
        assert!(log.contains("outlets 3 cycle"));
    }

    #[tokio::test]
    async fn test_eof_when_done() {
        let mut t = ScriptedTransport::new().say("x").eof_when_done();
        let mut buf = [0u8; 4];
        assert_eq!(t.read(&mut buf).await.unwrap(), 1);
        assert_eq!(t.read(&mut buf).await.unwrap(), 0);
    }
}
