//! Interactive expect/send sessions.
//!
//! A [`Session`] wraps a transport with buffered output, an ordered
//! expect matcher, timeouts, per-write pacing, a caller-annotated
//! transcript and post-expect error detectors. Sends and expects are
//! strictly serialized: every operation takes `&mut self`, so a session
//! has at most one outstanding expect and a later expect never sees
//! bytes consumed by an earlier one.

mod buffer;
mod detectors;
mod patterns;
mod transcript;

pub use buffer::MatchBuffer;
pub use detectors::{CrashdumpDetector, Detector, KernelPanicDetector, Verdict, default_detectors};
pub use patterns::ExpectPattern;
pub use transcript::{Caller, Direction, Transcript, TranscriptEntry};

use std::future::Future;
use std::time::{Duration, Instant};

use log::{debug, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::config::{DebugLevel, RunOptions};
use crate::error::{Error, FaultKind, Result};
use crate::transport::Transport;
use patterns::Compiled;

/// Fixed window for the command-echo step of [`Session::check_output`].
pub const ECHO_TIMEOUT: Duration = Duration::from_secs(5);

/// Construction-time session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Default timeout for expect operations.
    pub timeout: Duration,

    /// Appended to every `sendline`.
    pub line_separator: String,

    /// Per-character pacing for devices that drop input.
    pub inter_char_delay: Option<Duration>,

    /// Shell prompt patterns (regex strings).
    pub prompts: Vec<String>,

    /// Bootloader prompt patterns for the pre-boot state.
    pub uboot_prompts: Vec<String>,

    /// Device tag used in transcripts and the debug mirror.
    pub tag: String,

    pub debug: DebugLevel,

    /// Whether post-expect error detectors run.
    pub detect_enabled: bool,

    /// Shared run start for relative timestamps.
    pub start: Option<Instant>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            line_separator: "\n".to_string(),
            inter_char_delay: None,
            prompts: vec![],
            uboot_prompts: vec![],
            tag: "session".to_string(),
            debug: DebugLevel::Off,
            detect_enabled: true,
            start: None,
        }
    }
}

impl SessionConfig {
    /// Session settings for a named device under the given run options.
    pub fn for_device(tag: impl Into<String>, options: &RunOptions) -> Self {
        Self {
            tag: tag.into(),
            debug: options.debug,
            detect_enabled: !options.disable_error_detect,
            ..Self::default()
        }
    }
}

/// Result of the most recent expect.
#[derive(Debug, Clone, Default)]
pub struct ExpectMatch {
    /// Index of the matched pattern in the supplied list.
    pub index: usize,
    /// Bytes consumed between the previous match and this one.
    pub before: String,
    /// The matched text itself.
    pub matched: String,
    groups: Vec<Option<String>>,
}

impl ExpectMatch {
    /// Numbered capture group: 0 is the whole match, 1.. are regex groups.
    pub fn group(&self, n: usize) -> Option<&str> {
        if n == 0 {
            Some(&self.matched)
        } else {
            self.groups.get(n - 1)?.as_deref()
        }
    }
}

/// An interactive console session.
pub struct Session {
    transport: Box<dyn Transport>,
    buffer: MatchBuffer,
    prompts: Vec<String>,
    uboot_prompts: Vec<String>,
    timeout: Duration,
    line_separator: String,
    inter_char_delay: Option<Duration>,
    transcript: Transcript,
    detectors: Vec<Box<dyn Detector>>,
    detect_enabled: bool,
    alive: bool,
    saw_eof: bool,
    last: ExpectMatch,
}

impl Session {
    pub fn new(transport: Box<dyn Transport>, config: SessionConfig) -> Self {
        Self {
            transport,
            buffer: MatchBuffer::new(),
            prompts: config.prompts,
            uboot_prompts: config.uboot_prompts,
            timeout: config.timeout,
            line_separator: config.line_separator,
            inter_char_delay: config.inter_char_delay,
            transcript: Transcript::new(config.tag, config.debug, config.start),
            detectors: default_detectors(),
            detect_enabled: config.detect_enabled,
            alive: true,
            saw_eof: false,
            last: ExpectMatch::default(),
        }
    }

    // --- writers ---

    /// Write bytes verbatim, honoring the inter-character delay.
    #[track_caller]
    pub fn send<'a>(&'a mut self, data: &[u8]) -> impl Future<Output = Result<()>> + 'a {
        let caller = Caller::here();
        let data = data.to_vec();
        async move { self.send_inner(&data, caller).await }
    }

    /// Write a line: the text plus the configured line separator.
    #[track_caller]
    pub fn sendline<'a>(&'a mut self, line: &str) -> impl Future<Output = Result<()>> + 'a {
        let caller = Caller::here();
        let payload = format!("{line}{}", self.line_separator);
        async move { self.send_inner(payload.as_bytes(), caller).await }
    }

    /// Write the control byte for `ch` (e.g. `'c'` sends 0x03).
    #[track_caller]
    pub fn sendcontrol<'a>(&'a mut self, ch: char) -> impl Future<Output = Result<()>> + 'a {
        let caller = Caller::here();
        async move {
            let byte = control_byte(ch)
                .ok_or_else(|| Error::Config(format!("no control character for {ch:?}")))?;
            self.send_inner(&[byte], caller).await
        }
    }

    async fn send_inner(&mut self, data: &[u8], caller: Caller) -> Result<()> {
        if !self.alive {
            return Err(Error::ConnectionLost);
        }
        self.transcript.record(
            Direction::Send,
            Some(caller),
            &String::from_utf8_lossy(data),
            None,
        );
        match self.inter_char_delay {
            Some(delay) => {
                for byte in data {
                    self.transport.write_all(std::slice::from_ref(byte)).await?;
                    tokio::time::sleep(delay).await;
                }
            }
            None => self.transport.write_all(data).await?,
        }
        Ok(())
    }

    // --- matchers ---

    /// Expect with the session's default timeout.
    #[track_caller]
    pub fn expect<'a>(
        &'a mut self,
        patterns: &[ExpectPattern],
    ) -> impl Future<Output = Result<usize>> + 'a {
        let caller = Caller::here();
        let timeout = self.timeout;
        let compiled = patterns::compile(patterns);
        let described = describe(patterns);
        async move { self.expect_core(compiled?, described, timeout, caller).await }
    }

    /// Expect with an explicit timeout.
    #[track_caller]
    pub fn expect_in<'a>(
        &'a mut self,
        patterns: &[ExpectPattern],
        timeout: Duration,
    ) -> impl Future<Output = Result<usize>> + 'a {
        let caller = Caller::here();
        let compiled = patterns::compile(patterns);
        let described = describe(patterns);
        async move { self.expect_core(compiled?, described, timeout, caller).await }
    }

    /// Literal-string expect (no regex interpretation).
    #[track_caller]
    pub fn expect_exact<'a>(
        &'a mut self,
        literals: &[&str],
    ) -> impl Future<Output = Result<usize>> + 'a {
        self.expect_exact_in(literals, self.timeout)
    }

    /// Literal-string expect with an explicit timeout.
    #[track_caller]
    pub fn expect_exact_in<'a>(
        &'a mut self,
        literals: &[&str],
        timeout: Duration,
    ) -> impl Future<Output = Result<usize>> + 'a {
        let caller = Caller::here();
        let patterns: Vec<ExpectPattern> = literals
            .iter()
            .map(|l| ExpectPattern::exact(*l))
            .collect();
        let compiled = patterns::compile(&patterns);
        let described = describe(&patterns);
        async move { self.expect_core(compiled?, described, timeout, caller).await }
    }

    /// Expect any configured shell prompt.
    #[track_caller]
    pub fn expect_prompt<'a>(&'a mut self) -> impl Future<Output = Result<usize>> + 'a {
        self.expect_prompt_in(self.timeout)
    }

    /// Expect any configured shell prompt, with an explicit timeout.
    #[track_caller]
    pub fn expect_prompt_in<'a>(
        &'a mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<usize>> + 'a {
        let caller = Caller::here();
        let compiled = if self.prompts.is_empty() {
            Err(Error::Config("no prompts configured for session".into()))
        } else {
            patterns::compile_regexes(&self.prompts)
        };
        let described = self.prompts.join(" | ");
        async move { self.expect_core(compiled?, described, timeout, caller).await }
    }

    async fn expect_core(
        &mut self,
        compiled: Vec<Compiled>,
        described: String,
        timeout: Duration,
        caller: Caller,
    ) -> Result<usize> {
        self.transcript
            .record(Direction::Expect, Some(caller), &described, None);

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(found) = self.buffer.find(&compiled) {
                let consumed = self.buffer.consume(&found);
                self.last = ExpectMatch {
                    index: found.index,
                    before: String::from_utf8_lossy(&consumed.before).into_owned(),
                    matched: String::from_utf8_lossy(&consumed.matched).into_owned(),
                    groups: consumed
                        .groups
                        .into_iter()
                        .map(|g| g.map(|b| String::from_utf8_lossy(&b).into_owned()))
                        .collect(),
                };
                self.transcript.record(
                    Direction::Match,
                    Some(caller),
                    &self.last.matched.clone(),
                    Some(&self.last.matched.clone()),
                );
                self.run_detectors().await?;
                return Ok(found.index);
            }

            if self.saw_eof || !self.alive {
                if let Some(index) = patterns::sentinel_index(&compiled, true) {
                    let before = self.buffer.take_all();
                    self.last = ExpectMatch {
                        index,
                        before: String::from_utf8_lossy(&before).into_owned(),
                        matched: String::new(),
                        groups: vec![],
                    };
                    self.alive = false;
                    return Ok(index);
                }
                self.alive = false;
                return Err(Error::ExpectEof);
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return self.timeout_result(&compiled, timeout);
            }
            match tokio::time::timeout(remaining, self.read_chunk()).await {
                Err(_) => return self.timeout_result(&compiled, timeout),
                Ok(Ok(0)) => {
                    self.saw_eof = true;
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    self.alive = false;
                    return Err(e.into());
                }
            }
        }
    }

    fn timeout_result(&mut self, compiled: &[Compiled], timeout: Duration) -> Result<usize> {
        if let Some(index) = patterns::sentinel_index(compiled, false) {
            // Sentinel: report what arrived but leave the buffer intact.
            self.last = ExpectMatch {
                index,
                before: String::from_utf8_lossy(self.buffer.as_slice()).into_owned(),
                matched: String::new(),
                groups: vec![],
            };
            return Ok(index);
        }
        Err(Error::ExpectTimeout(timeout))
    }

    async fn read_chunk(&mut self) -> std::io::Result<usize> {
        let mut chunk = [0u8; 4096];
        let n = self.transport.read(&mut chunk).await?;
        if n > 0 {
            self.buffer.extend(&chunk[..n]);
            self.transcript.record(
                Direction::Recv,
                None,
                &String::from_utf8_lossy(&chunk[..n]),
                None,
            );
        }
        Ok(n)
    }

    async fn run_detectors(&mut self) -> Result<()> {
        if !self.detect_enabled {
            return Ok(());
        }
        let text = format!("{}{}", self.last.before, self.last.matched);
        let tripped = self.detectors.iter().find_map(|d| match d.scan(&text) {
            Verdict::Raise(kind) => Some((d.name(), kind)),
            Verdict::Continue => None,
        });
        if let Some((name, kind)) = tripped {
            warn!("detector '{name}' tripped on {}", self.transcript.tag());
            match kind {
                FaultKind::KernelPanic => {
                    let _ = self.close().await;
                }
                FaultKind::Crashdump => {
                    // Interrupt whatever the loader is doing; the device
                    // layer follows up with the dump upload.
                    for _ in 0..3 {
                        let _ = self.transport.write_all(&[0x03]).await;
                    }
                }
            }
            return Err(Error::FatalDeviceFault(kind));
        }
        Ok(())
    }

    // --- compound operations ---

    /// Send a command, wait for its echo, then capture output up to the
    /// next prompt. Uses the session default timeout for the prompt.
    #[track_caller]
    pub fn check_output<'a>(&'a mut self, cmd: &str) -> impl Future<Output = Result<String>> + 'a {
        self.check_output_in(cmd, self.timeout)
    }

    /// [`Self::check_output`] with an explicit prompt timeout.
    #[track_caller]
    pub fn check_output_in<'a>(
        &'a mut self,
        cmd: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<String>> + 'a {
        let caller = Caller::here();
        let cmd = cmd.to_string();
        async move {
            let line = format!("{cmd}{}", self.line_separator);
            self.send_inner(line.as_bytes(), caller).await?;

            // The echo window is deliberately short and fixed: if the
            // device does not echo within 5s, the line never arrived.
            let echo = patterns::compile(&[ExpectPattern::exact(cmd.as_str())])?;
            self.expect_core(echo, format!("{cmd:?} (echo)"), ECHO_TIMEOUT, caller)
                .await?;

            let prompts = patterns::compile_regexes(&self.prompts)?;
            let described = self.prompts.join(" | ");
            match self.expect_core(prompts, described, timeout, caller).await {
                Ok(_) => Ok(clean_output(&self.last.before)),
                Err(Error::ExpectTimeout(_)) => {
                    debug!("command timeout, interrupting: {cmd}");
                    self.send_inner(&[0x03], caller).await?;
                    Err(Error::CommandTimeout {
                        command: cmd,
                        timeout,
                    })
                }
                Err(e) => Err(e),
            }
        }
    }

    /// Keep a long-running shell alive by sending an empty line.
    #[track_caller]
    pub fn touch<'a>(&'a mut self) -> impl Future<Output = Result<()>> + 'a {
        self.sendline("")
    }

    /// Hand the transport to the invoking terminal until `escape` is
    /// pressed. The transcript is suspended for the duration.
    pub async fn interact(&mut self, escape: u8) -> Result<()> {
        self.transcript.suspend();
        let result = self.interact_loop(escape).await;
        self.transcript.resume();
        result
    }

    async fn interact_loop(&mut self, escape: u8) -> Result<()> {
        let mut stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();

        // Show anything already buffered before going transparent.
        let pending = self.buffer.take_all();
        if !pending.is_empty() {
            stdout.write_all(&pending).await?;
            stdout.flush().await?;
        }

        let mut inbuf = [0u8; 1024];
        let mut outbuf = [0u8; 4096];
        loop {
            tokio::select! {
                n = stdin.read(&mut inbuf) => {
                    let n = n?;
                    if n == 0 {
                        break;
                    }
                    if let Some(pos) = inbuf[..n].iter().position(|b| *b == escape) {
                        self.transport.write_all(&inbuf[..pos]).await?;
                        break;
                    }
                    self.transport.write_all(&inbuf[..n]).await?;
                }
                n = self.transport.read(&mut outbuf) => {
                    let n = n?;
                    if n == 0 {
                        self.saw_eof = true;
                        break;
                    }
                    stdout.write_all(&outbuf[..n]).await?;
                    stdout.flush().await?;
                }
            }
        }
        Ok(())
    }

    /// Close the transport. Idempotent; the session is dead afterwards.
    pub async fn close(&mut self) -> Result<()> {
        if self.alive {
            self.alive = false;
            self.transport.close().await?;
        }
        Ok(())
    }

    // --- state accessors ---

    /// Bytes consumed between the previous match and the current one.
    pub fn before(&self) -> &str {
        &self.last.before
    }

    /// The text matched by the most recent expect.
    pub fn after(&self) -> &str {
        &self.last.matched
    }

    /// Capture group from the most recent expect (0 = whole match).
    pub fn match_group(&self, n: usize) -> Option<&str> {
        self.last.group(n)
    }

    /// Index returned by the most recent expect.
    pub fn match_index(&self) -> usize {
        self.last.index
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn set_inter_char_delay(&mut self, delay: Option<Duration>) {
        self.inter_char_delay = delay;
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn set_prompts(&mut self, prompts: Vec<String>) {
        self.prompts = prompts;
    }

    /// Extend the prompt set, e.g. with a hostname prompt learned at login.
    pub fn push_prompt(&mut self, prompt: impl Into<String>) {
        self.prompts.push(prompt.into());
    }

    pub fn uboot_prompts(&self) -> &[String] {
        &self.uboot_prompts
    }

    pub fn set_uboot_prompts(&mut self, prompts: Vec<String>) {
        self.uboot_prompts = prompts;
    }

    /// Expect any configured bootloader prompt.
    #[track_caller]
    pub fn expect_uboot_prompt_in<'a>(
        &'a mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<usize>> + 'a {
        let caller = Caller::here();
        let compiled = if self.uboot_prompts.is_empty() {
            Err(Error::Config("no bootloader prompts configured".into()))
        } else {
            patterns::compile_regexes(&self.uboot_prompts)
        };
        let described = self.uboot_prompts.join(" | ");
        async move { self.expect_core(compiled?, described, timeout, caller).await }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }

    /// Replace the detector list.
    pub fn set_detectors(&mut self, detectors: Vec<Box<dyn Detector>>) {
        self.detectors = detectors;
    }

    pub fn set_detect_enabled(&mut self, enabled: bool) {
        self.detect_enabled = enabled;
    }

    /// Swap in a fresh transport after a reconnect, discarding any
    /// unread bytes from the old stream.
    pub fn reconnect(&mut self, transport: Box<dyn Transport>) {
        self.transport = transport;
        self.buffer.clear();
        self.alive = true;
        self.saw_eof = false;
    }
}

/// Strip carriage returns and trim the captured command output.
fn clean_output(raw: &str) -> String {
    raw.replace('\r', "").trim().to_string()
}

fn describe(patterns: &[ExpectPattern]) -> String {
    patterns
        .iter()
        .map(ExpectPattern::describe)
        .collect::<Vec<_>>()
        .join(" | ")
}

fn control_byte(ch: char) -> Option<u8> {
    let upper = ch.to_ascii_uppercase();
    match upper {
        'A'..='Z' => Some(upper as u8 - b'A' + 1),
        '@' => Some(0),
        '[' => Some(27),
        '\\' => Some(28),
        ']' => Some(29),
        '^' => Some(30),
        '_' => Some(31),
        '?' => Some(127),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ScriptedTransport;

    const SHORT: Duration = Duration::from_millis(200);

    fn session(transport: ScriptedTransport) -> Session {
        let mut config = SessionConfig::default();
        config.prompts = vec![r"bash\$ ".to_string()];
        Session::new(Box::new(transport), config)
    }

    #[tokio::test]
    async fn test_expect_serialisation() {
        // Property 1: a later expect starts strictly after the bytes the
        // earlier expect matched.
        let transport = ScriptedTransport::new().say("aaa FIRST bbb SECOND ccc");
        let mut s = session(transport);

        s.expect_in(&[ExpectPattern::exact("FIRST")], SHORT).await.unwrap();
        assert_eq!(s.before(), "aaa ");

        s.expect_in(&[ExpectPattern::exact("SECOND")], SHORT).await.unwrap();
        assert_eq!(s.before(), " bbb ");
        assert!(!s.before().contains("FIRST"));
    }

    #[tokio::test]
    async fn test_timeout_leaves_buffer_intact() {
        // Property 2: timeout raises and the buffered bytes stay readable.
        let transport = ScriptedTransport::new().say("partial output");
        let mut s = session(transport);

        let err = s
            .expect_in(&[ExpectPattern::exact("never")], SHORT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExpectTimeout(_)));

        // The earlier bytes are still there for the next expect.
        let idx = s
            .expect_in(&[ExpectPattern::exact("partial")], SHORT)
            .await
            .unwrap();
        assert_eq!(idx, 0);
    }

    #[tokio::test]
    async fn test_timeout_sentinel_returns_index() {
        let transport = ScriptedTransport::new().say("some bytes");
        let mut s = session(transport);

        let idx = s
            .expect_in(
                &[ExpectPattern::exact("nope"), ExpectPattern::Timeout],
                SHORT,
            )
            .await
            .unwrap();
        assert_eq!(idx, 1);
        assert_eq!(s.before(), "some bytes");
        // Sentinel did not consume: a real match still works.
        let idx = s
            .expect_in(&[ExpectPattern::exact("bytes")], SHORT)
            .await
            .unwrap();
        assert_eq!(idx, 0);
    }

    #[tokio::test]
    async fn test_eof_sentinel_and_error() {
        let transport = ScriptedTransport::new().say("tail").eof_when_done();
        let mut s = session(transport);
        let idx = s
            .expect_in(&[ExpectPattern::exact("nope"), ExpectPattern::Eof], SHORT)
            .await
            .unwrap();
        assert_eq!(idx, 1);
        assert_eq!(s.before(), "tail");

        let transport = ScriptedTransport::new().eof_when_done();
        let mut s = session(transport);
        let err = s
            .expect_in(&[ExpectPattern::exact("nope")], SHORT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExpectEof));
        assert!(!s.is_alive());
    }

    #[tokio::test]
    async fn test_check_output_round_trip() {
        // Property 4: echo round-trip returns the echoed value.
        let transport = ScriptedTransport::new().on(
            "echo hello-world\n",
            "echo hello-world\r\nhello-world\r\nbash$ ",
        );
        let mut s = session(transport);

        let output = s.check_output_in("echo hello-world", SHORT).await.unwrap();
        assert_eq!(output, "hello-world");
    }

    #[tokio::test]
    async fn test_ctrl_c_on_command_timeout() {
        // Property 3: after a command timeout the prompt returns quickly,
        // proving CTRL-C was issued.
        let transport = ScriptedTransport::new()
            .on("sleep 1000\n", "sleep 1000\r\n")
            .on_bytes(&[0x03], "^C\r\nbash$ ");
        let mut s = session(transport);

        let err = s.check_output_in("sleep 1000", SHORT).await.unwrap_err();
        assert!(matches!(err, Error::CommandTimeout { .. }));

        let idx = s.expect_prompt_in(Duration::from_secs(5)).await.unwrap();
        assert_eq!(idx, 0);
    }

    #[tokio::test]
    async fn test_detector_raises_and_kills_session() {
        // Scenario F: panic text raises the fault and later sends fail.
        let transport = ScriptedTransport::new()
            .say("...\nKernel panic - not syncing: attempted to kill init\n");
        let mut s = session(transport);

        let err = s
            .expect_in(&[ExpectPattern::exact("kill init")], SHORT)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::FatalDeviceFault(FaultKind::KernelPanic)
        ));
        assert!(!s.is_alive());

        let err = s.sendline("echo still there").await.unwrap_err();
        assert!(matches!(err, Error::ConnectionLost));
    }

    #[tokio::test]
    async fn test_detectors_disabled_by_escape_hatch() {
        let transport = ScriptedTransport::new()
            .say("Kernel panic - not syncing: oops\nbash$ ");
        let mut s = session(transport);
        s.set_detect_enabled(false);

        let idx = s.expect_prompt_in(SHORT).await.unwrap();
        assert_eq!(idx, 0);
        assert!(s.is_alive());
    }

    #[tokio::test]
    async fn test_match_groups() {
        let transport = ScriptedTransport::new().say("Bytes transferred = 4096 (1000 hex)\n");
        let mut s = session(transport);

        s.expect_in(
            &[ExpectPattern::regex(r"Bytes transferred = (\d+) \((\w+) hex\)")],
            SHORT,
        )
        .await
        .unwrap();
        assert_eq!(s.match_group(1), Some("4096"));
        assert_eq!(s.match_group(2), Some("1000"));
        assert!(s.match_group(0).unwrap().starts_with("Bytes transferred"));
    }

    #[tokio::test]
    async fn test_learned_prompt_extends_set() {
        let transport = ScriptedTransport::new().say("OpenWrt:~# ");
        let mut s = session(transport);
        s.push_prompt(r"OpenWrt:~# ");

        let idx = s.expect_prompt_in(SHORT).await.unwrap();
        // Matched the learned prompt, not the default.
        assert_eq!(idx, 1);
    }

    #[tokio::test]
    async fn test_sendcontrol_rejects_unknown() {
        let transport = ScriptedTransport::new();
        let mut s = session(transport);
        assert!(s.sendcontrol('!').await.is_err());
        assert!(s.sendcontrol('c').await.is_ok());
    }

    #[tokio::test]
    async fn test_transcript_records_caller() {
        let transport = ScriptedTransport::new().say("ok\n");
        let mut s = session(transport);
        s.sendline("hi").await.unwrap();
        s.expect_in(&[ExpectPattern::exact("ok")], SHORT).await.unwrap();

        let entries = s.transcript().entries();
        assert!(entries.iter().any(|e| e.direction == Direction::Send));
        assert!(entries.iter().any(|e| e.direction == Direction::Match));
        let send = entries.iter().find(|e| e.direction == Direction::Send).unwrap();
        assert!(send.caller.unwrap().file.ends_with("mod.rs"));
    }
}
