//! 컨테이너 로그 전달
//!
//! [`LogStreamer`]는 실행 중인 컨테이너의 출력을 [`LogSink`]로 전달하는
//! best-effort 작업입니다. 에러는 호출자의 생명주기 연산을 실패시키지 않고
//! [`LogTask::join`]을 통해서만 관찰할 수 있습니다.
//!
//! # 스트림 형식
//!
//! - **TTY 컨테이너**: 채널 구분 없는 평문. 줄 단위로 잘라 stdout 채널로 보냅니다.
//! - **비 TTY 컨테이너**: 8바이트 헤더로 다중화된 스트림.
//!
//! ```text
//! ┌────────┬───────┬──────────────────┬─────────────┐
//! │ stream │ 0 0 0 │ length (u32, BE) │ payload ... │
//! └────────┴───────┴──────────────────┴─────────────┘
//!   0/1 = stdout, 2 = stderr, 3 = daemon error
//! ```

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use bytes::{BufMut, Bytes, BytesMut};
use futures::StreamExt;
use metrics::counter;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use stevedore_core::metrics as m;

use crate::docker::{LogOptions, RuntimeClient};
use crate::error::ComposeError;

/// 다중화 헤더 길이
pub const FRAME_HEADER_LEN: usize = 8;

/// 프레임 하나의 최대 payload 크기 (16 MiB)
const MAX_FRAME_LEN: usize = 1 << 24;

/// 다중화 스트림 식별자
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StdStream {
    Stdin = 0,
    Stdout = 1,
    Stderr = 2,
    /// 데몬이 보낸 에러 메시지
    System = 3,
}

impl StdStream {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Stdin),
            1 => Some(Self::Stdout),
            2 => Some(Self::Stderr),
            3 => Some(Self::System),
            _ => None,
        }
    }
}

/// payload 하나를 다중화 프레임으로 인코딩합니다.
pub fn encode_frame(stream: StdStream, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.put_u8(stream as u8);
    buf.put_bytes(0, 3);
    // payload는 런타임이 보낸 단일 청크이므로 u32 범위를 넘지 않는다
    buf.put_u32(u32::try_from(payload.len()).unwrap_or(u32::MAX));
    buf.put_slice(payload);
    buf.freeze()
}

/// 로그 출력 대상
///
/// 쓰기 실패는 무시됩니다. 로그 전달은 best-effort입니다.
pub trait LogSink: Send + Sync {
    /// stdout 채널로 바이트를 씁니다.
    fn out(&self, data: &[u8]);

    /// stderr 채널로 바이트를 씁니다.
    fn err(&self, data: &[u8]);
}

/// 컨테이너별 [`LogSink`] 생성기
pub trait LogSinkFactory: Send + Sync {
    fn create(&self, container: &str) -> Arc<dyn LogSink>;
}

/// 각 줄 앞에 `"<name> | "`를 붙여 프로세스 stdout/stderr로 쓰는 sink
///
/// 프레임 경계에서 잘린 줄은 채널별로 보관했다가 `\n`이 도착하면 한 줄로 씁니다.
/// 남은 조각은 sink가 drop될 때 내보냅니다.
pub struct PrefixedSink {
    prefix: String,
    out_pending: Mutex<Vec<u8>>,
    err_pending: Mutex<Vec<u8>>,
}

impl PrefixedSink {
    pub fn new(name: &str) -> Self {
        Self {
            prefix: format!("{name} | "),
            out_pending: Mutex::new(Vec::new()),
            err_pending: Mutex::new(Vec::new()),
        }
    }

    fn write_prefixed(&self, pending: &Mutex<Vec<u8>>, mut writer: impl Write, data: &[u8]) {
        let mut pending = pending.lock().unwrap_or_else(|e| e.into_inner());
        let lines = take_complete_lines(self.prefix.as_bytes(), &mut pending, data);
        if !lines.is_empty() {
            let _ = writer.write_all(&lines);
            let _ = writer.flush();
        }
    }

    fn flush_pending(&self, pending: &mut Mutex<Vec<u8>>, mut writer: impl Write) {
        let pending = pending.get_mut().unwrap_or_else(|e| e.into_inner());
        let rest = finish_partial_line(self.prefix.as_bytes(), pending);
        if !rest.is_empty() {
            let _ = writer.write_all(&rest);
            let _ = writer.flush();
        }
    }
}

impl LogSink for PrefixedSink {
    fn out(&self, data: &[u8]) {
        self.write_prefixed(&self.out_pending, io::stdout().lock(), data);
    }

    fn err(&self, data: &[u8]) {
        self.write_prefixed(&self.err_pending, io::stderr().lock(), data);
    }
}

impl Drop for PrefixedSink {
    fn drop(&mut self) {
        let mut out = std::mem::take(&mut self.out_pending);
        let mut err = std::mem::take(&mut self.err_pending);
        self.flush_pending(&mut out, io::stdout().lock());
        self.flush_pending(&mut err, io::stderr().lock());
    }
}

/// `data`를 `pending` 뒤에 붙이고, `\n`으로 끝난 줄만 접두어를 붙여 꺼냅니다.
fn take_complete_lines(prefix: &[u8], pending: &mut Vec<u8>, data: &[u8]) -> Vec<u8> {
    pending.extend_from_slice(data);
    let Some(last_newline) = pending.iter().rposition(|b| *b == b'\n') else {
        return Vec::new();
    };

    let complete: Vec<u8> = pending.drain(..=last_newline).collect();
    let mut out = Vec::with_capacity(complete.len() + prefix.len());
    for line in complete.split_inclusive(|b| *b == b'\n') {
        out.extend_from_slice(prefix);
        out.extend_from_slice(line);
    }
    out
}

/// 보관 중인 조각을 `\n`을 붙인 한 줄로 꺼냅니다.
fn finish_partial_line(prefix: &[u8], pending: &mut Vec<u8>) -> Vec<u8> {
    if pending.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(prefix.len() + pending.len() + 1);
    out.extend_from_slice(prefix);
    out.append(pending);
    out.push(b'\n');
    out
}

/// [`PrefixedSink`]를 만드는 기본 팩토리
#[derive(Debug, Default, Clone, Copy)]
pub struct PrefixedSinkFactory;

impl LogSinkFactory for PrefixedSinkFactory {
    fn create(&self, container: &str) -> Arc<dyn LogSink> {
        Arc::new(PrefixedSink::new(container))
    }
}

/// TTY 스트림을 줄 단위로 잘라 stdout 채널로 전달합니다.
///
/// 줄 끝의 `\n` 하나와 그 앞의 `\r` 하나까지만 제거한 뒤 `\n` 하나를 붙입니다.
pub async fn forward_lines<R>(reader: &mut R, sink: &dyn LogSink) -> Result<(), ComposeError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(|e| ComposeError::LogStream(e.to_string()))?;
        if n == 0 {
            return Ok(());
        }
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        line.push(b'\n');
        sink.out(&line);
    }
}

/// 다중화 스트림을 stdout/stderr 채널로 분리합니다.
///
/// 프레임 경계에서 스트림이 끝나면 정상 종료입니다.
pub async fn demux<R>(reader: &mut R, sink: &dyn LogSink) -> Result<(), ComposeError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    let mut payload = Vec::new();
    loop {
        match reader.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(ComposeError::LogStream(e.to_string())),
        }

        let stream = StdStream::from_byte(header[0]).ok_or_else(|| {
            ComposeError::LogStream(format!("unknown stream type {}", header[0]))
        })?;
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(ComposeError::LogStream(format!(
                "frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}"
            )));
        }

        payload.resize(len, 0);
        reader
            .read_exact(&mut payload)
            .await
            .map_err(|e| ComposeError::LogStream(format!("truncated frame: {e}")))?;

        match stream {
            StdStream::Stdin | StdStream::Stdout => sink.out(&payload),
            StdStream::Stderr => sink.err(&payload),
            StdStream::System => {
                return Err(ComposeError::LogStream(format!(
                    "daemon error: {}",
                    String::from_utf8_lossy(&payload).trim_end()
                )));
            }
        }
    }
}

/// 컨테이너 하나의 로그를 sink로 전달하는 작업
pub struct LogStreamer<C: RuntimeClient> {
    client: Arc<C>,
    container: String,
    tail: usize,
    sink: Arc<dyn LogSink>,
}

impl<C: RuntimeClient> LogStreamer<C> {
    pub fn new(client: Arc<C>, container: impl Into<String>, tail: usize, sink: Arc<dyn LogSink>) -> Self {
        Self {
            client,
            container: container.into(),
            tail,
            sink,
        }
    }

    /// 스트림이 닫히거나 읽기 에러가 날 때까지 로그를 전달합니다.
    ///
    /// 컨테이너가 없으면 아무것도 하지 않고 `Ok`를 반환합니다.
    pub async fn run(&self) -> Result<(), ComposeError> {
        let Some(summary) = self.client.find_by_name(&self.container).await? else {
            debug!(container = %self.container, "container absent, nothing to stream");
            return Ok(());
        };
        let info = self.client.inspect(&summary.id).await?;

        let options = LogOptions {
            follow: true,
            stdout: true,
            stderr: true,
            tail: self.tail,
        };
        let stream = self.client.stream_logs(&summary.id, &options).await?;
        let mut reader = StreamReader::new(stream.map(|chunk| chunk.map_err(io::Error::other)));

        debug!(container = %self.container, tty = info.tty, "streaming logs");

        if info.tty {
            forward_lines(&mut reader, self.sink.as_ref()).await
        } else {
            demux(&mut reader, self.sink.as_ref()).await
        }
    }

    /// 작업을 백그라운드로 실행하고 핸들을 반환합니다.
    pub fn spawn(self) -> LogTask {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let container = self.container.clone();

        let handle = tokio::spawn(async move {
            let result = tokio::select! {
                () = token.cancelled() => {
                    debug!(container = %self.container, "log stream cancelled");
                    Ok(())
                }
                result = self.run() => result,
            };

            match &result {
                Ok(()) => {
                    counter!(m::LOG_STREAMS_FINISHED_TOTAL, m::LABEL_RESULT => "success")
                        .increment(1);
                    debug!(container = %self.container, "log stream finished");
                }
                Err(e) => {
                    counter!(m::LOG_STREAMS_FINISHED_TOTAL, m::LABEL_RESULT => "failure")
                        .increment(1);
                    warn!(container = %self.container, error = %e, "log stream ended with error");
                }
            }
            result
        });

        LogTask {
            container,
            cancel,
            handle,
        }
    }
}

/// 백그라운드 로그 작업 핸들
///
/// 버려도 작업은 스트림이 끝날 때까지 계속됩니다.
pub struct LogTask {
    container: String,
    cancel: CancellationToken,
    handle: JoinHandle<Result<(), ComposeError>>,
}

impl LogTask {
    pub fn container(&self) -> &str {
        &self.container
    }

    /// 작업에 취소를 요청합니다.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 작업을 소유하지 않고 취소할 수 있는 토큰을 반환합니다.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// 작업 종료를 기다리고 결과를 반환합니다.
    pub async fn join(self) -> Result<(), ComposeError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(ComposeError::LogStream(format!("log task failed: {e}"))),
        }
    }
}

impl std::fmt::Debug for LogTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogTask")
            .field("container", &self.container)
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::docker::{MockContainer, MockRuntimeClient};

    #[derive(Default)]
    struct MemorySink {
        out: Mutex<Vec<u8>>,
        err: Mutex<Vec<u8>>,
    }

    impl MemorySink {
        fn stdout_bytes(&self) -> Vec<u8> {
            self.out.lock().unwrap().clone()
        }

        fn stderr_bytes(&self) -> Vec<u8> {
            self.err.lock().unwrap().clone()
        }
    }

    impl LogSink for MemorySink {
        fn out(&self, data: &[u8]) {
            self.out.lock().unwrap().extend_from_slice(data);
        }

        fn err(&self, data: &[u8]) {
            self.err.lock().unwrap().extend_from_slice(data);
        }
    }

    #[test]
    fn encode_frame_layout() {
        let frame = encode_frame(StdStream::Stderr, b"oops");
        assert_eq!(&frame[..], &[2, 0, 0, 0, 0, 0, 0, 4, b'o', b'o', b'p', b's']);
    }

    #[tokio::test]
    async fn forward_lines_normalises_line_endings() {
        let sink = MemorySink::default();
        let mut input: &[u8] = b"hello\r\nworld\nlast";
        forward_lines(&mut input, &sink).await.unwrap();
        assert_eq!(sink.stdout_bytes(), b"hello\nworld\nlast\n");
        assert!(sink.stderr_bytes().is_empty());
    }

    #[tokio::test]
    async fn forward_lines_keeps_inner_carriage_returns() {
        let sink = MemorySink::default();
        let mut input: &[u8] = b"a\r\r\nprogress\r";
        forward_lines(&mut input, &sink).await.unwrap();
        assert_eq!(sink.stdout_bytes(), b"a\r\nprogress\r\n");
    }

    #[tokio::test]
    async fn demux_splits_channels() {
        let mut input = Vec::new();
        input.extend_from_slice(&encode_frame(StdStream::Stdout, b"out-1\n"));
        input.extend_from_slice(&encode_frame(StdStream::Stderr, b"err-1\n"));
        input.extend_from_slice(&encode_frame(StdStream::Stdout, b"out-2\n"));

        let sink = MemorySink::default();
        demux(&mut input.as_slice(), &sink).await.unwrap();
        assert_eq!(sink.stdout_bytes(), b"out-1\nout-2\n");
        assert_eq!(sink.stderr_bytes(), b"err-1\n");
    }

    #[tokio::test]
    async fn demux_empty_stream_is_ok() {
        let sink = MemorySink::default();
        demux(&mut &b""[..], &sink).await.unwrap();
    }

    #[tokio::test]
    async fn demux_rejects_unknown_stream() {
        let sink = MemorySink::default();
        let input = [9u8, 0, 0, 0, 0, 0, 0, 1, b'x'];
        let err = demux(&mut &input[..], &sink).await.unwrap_err();
        assert!(matches!(err, ComposeError::LogStream(_)));
    }

    #[tokio::test]
    async fn demux_surfaces_daemon_errors() {
        let sink = MemorySink::default();
        let input = encode_frame(StdStream::System, b"container gone\n");
        let err = demux(&mut &input[..], &sink).await.unwrap_err();
        assert!(err.to_string().contains("container gone"));
    }

    #[tokio::test]
    async fn demux_rejects_truncated_payload() {
        let sink = MemorySink::default();
        let input = [1u8, 0, 0, 0, 0, 0, 0, 10, b'a', b'b'];
        assert!(demux(&mut &input[..], &sink).await.is_err());
    }

    #[tokio::test]
    async fn streamer_uses_line_mode_for_tty_containers() {
        let client = MockRuntimeClient::new()
            .with_container(MockContainer::new("a1", "shop_web_1", &[]).running().with_tty())
            .with_log_chunks(vec![Bytes::from_static(b"hel"), Bytes::from_static(b"lo\n")]);
        let sink = Arc::new(MemorySink::default());

        LogStreamer::new(Arc::new(client), "shop_web_1", 10, sink.clone())
            .run()
            .await
            .unwrap();
        assert_eq!(sink.stdout_bytes(), b"hello\n");
    }

    #[tokio::test]
    async fn streamer_demuxes_non_tty_containers() {
        let client = MockRuntimeClient::new()
            .with_container(MockContainer::new("a1", "shop_web_1", &[]).running())
            .with_log_chunks(vec![
                encode_frame(StdStream::Stdout, b"ready\n"),
                encode_frame(StdStream::Stderr, b"warning\n"),
            ]);
        let sink = Arc::new(MemorySink::default());

        LogStreamer::new(Arc::new(client), "shop_web_1", 10, sink.clone())
            .run()
            .await
            .unwrap();
        assert_eq!(sink.stdout_bytes(), b"ready\n");
        assert_eq!(sink.stderr_bytes(), b"warning\n");
    }

    #[tokio::test]
    async fn streamer_on_absent_container_is_ok() {
        let client = Arc::new(MockRuntimeClient::new());
        let sink = Arc::new(MemorySink::default());
        LogStreamer::new(client.clone(), "ghost", 10, sink)
            .run()
            .await
            .unwrap();
        assert_eq!(client.calls(), vec!["find:ghost".to_owned()]);
    }

    #[tokio::test]
    async fn cancelled_task_terminates() {
        let client = MockRuntimeClient::new()
            .with_container(MockContainer::new("a1", "shop_web_1", &[]).running().with_tty())
            .with_endless_logs();
        let sink = Arc::new(MemorySink::default());

        let task = LogStreamer::new(Arc::new(client), "shop_web_1", 10, sink).spawn();
        assert_eq!(task.container(), "shop_web_1");
        task.cancel();
        task.join().await.unwrap();
    }

    #[test]
    fn prefixed_sink_prefixes_every_line() {
        let sink = PrefixedSink::new("web");
        let mut buf = Vec::new();
        sink.write_prefixed(&sink.out_pending, &mut buf, b"one\ntwo\n");
        assert_eq!(buf, b"web | one\nweb | two\n");
    }

    #[test]
    fn prefixed_sink_joins_line_split_across_chunks() {
        let sink = PrefixedSink::new("web");
        let mut buf = Vec::new();
        sink.write_prefixed(&sink.out_pending, &mut buf, b"hel");
        assert!(buf.is_empty());
        sink.write_prefixed(&sink.out_pending, &mut buf, b"lo\nwor");
        sink.write_prefixed(&sink.out_pending, &mut buf, b"ld\n");
        assert_eq!(buf, b"web | hello\nweb | world\n");
    }

    #[test]
    fn prefixed_sink_keeps_channels_apart() {
        let sink = PrefixedSink::new("web");
        let mut out = Vec::new();
        let mut err = Vec::new();
        sink.write_prefixed(&sink.out_pending, &mut out, b"out-");
        sink.write_prefixed(&sink.err_pending, &mut err, b"err-1\n");
        sink.write_prefixed(&sink.out_pending, &mut out, b"1\n");
        assert_eq!(out, b"web | out-1\n");
        assert_eq!(err, b"web | err-1\n");
    }

    #[test]
    fn trailing_fragment_is_terminated_on_finish() {
        let mut pending = Vec::new();
        assert!(take_complete_lines(b"db | ", &mut pending, b"ready").is_empty());
        assert_eq!(finish_partial_line(b"db | ", &mut pending), b"db | ready\n");
        assert!(pending.is_empty());
        assert!(finish_partial_line(b"db | ", &mut pending).is_empty());
    }
}
