use crate::error::Result;
use crate::models::StreamEvent;
use crate::protocol::response::to_tool_call_result;
use crate::protocol::workers_ai::StructuredResponse;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, error, warn};

/// 帧内容无法解析时输出的标记文本
/// 单个坏帧不终止整个流，但要让下游看得到数据丢失
pub const DATA_LOSS_MARKER: &str = "DATALOSS";

const DONE_SENTINEL: &str = "[DONE]";

/// 帧载荷解析器，默认用 serde_json
pub trait PayloadParser: Send {
    fn parse(&self, payload: &str) -> std::result::Result<StructuredResponse, String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPayloadParser;

impl PayloadParser for JsonPayloadParser {
    fn parse(&self, payload: &str) -> std::result::Result<StructuredResponse, String> {
        serde_json::from_str(payload).map_err(|e| e.to_string())
    }
}

/// 增量 UTF-8 解码器
///
/// chunk 边界可能落在多字节字符中间，不完整的尾部字节留到下一个 chunk；
/// 非法序列替换为 U+FFFD
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut input = bytes.as_slice();

        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        None => {
                            // 不完整的字符，最多 3 个字节
                            self.pending = rest.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// 输入结束，残留字节按非法序列处理
    pub fn flush(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// 正在累积帧
    AwaitingFrame,
    /// 已收到空行，帧完整
    FrameReady,
    /// 已输出 finish，后续输入全部忽略
    Finished,
}

/// Workers AI SSE 流解码器，每个流一个实例
///
/// 输入格式: `data: {"response":"..."}\n\n` ... `data: [DONE]\n\n`
pub struct StreamDecoder<P = JsonPayloadParser> {
    state: DecoderState,
    utf8: Utf8Decoder,
    /// 未遇到换行的行片段
    line_buffer: String,
    /// 当前帧已收到的 data 行
    data_lines: Vec<String>,
    parser: P,
}

impl StreamDecoder<JsonPayloadParser> {
    pub fn new() -> Self {
        Self::with_parser(JsonPayloadParser)
    }
}

impl Default for StreamDecoder<JsonPayloadParser> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PayloadParser> StreamDecoder<P> {
    pub fn with_parser(parser: P) -> Self {
        Self {
            state: DecoderState::AwaitingFrame,
            utf8: Utf8Decoder::default(),
            line_buffer: String::new(),
            data_lines: Vec::new(),
            parser,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == DecoderState::Finished
    }

    /// 处理一个字节 chunk，返回这个 chunk 完成的所有事件
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.is_finished() {
            debug!("Stream already finished, ignoring {} bytes", chunk.len());
            return events;
        }

        let text = self.utf8.decode(chunk);
        self.line_buffer.push_str(&text);
        self.drain_lines(&mut events);
        events
    }

    /// 上游正常结束
    ///
    /// 处理残留的最后一帧；没有收到 [DONE] 时补一个 finish，保证恰好一个
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.is_finished() {
            return events;
        }

        if self.utf8.pending_len() > 0 {
            warn!(
                "Stream ended inside a UTF-8 sequence, replacing {} bytes",
                self.utf8.pending_len()
            );
        }
        let rest = self.utf8.flush();
        self.line_buffer.push_str(&rest);
        self.drain_lines(&mut events);

        if !self.is_finished() && !self.line_buffer.is_empty() {
            let line = std::mem::take(&mut self.line_buffer);
            self.handle_line(line.trim_end_matches('\r'), &mut events);
        }
        // 缺少结尾空行的帧
        if !self.is_finished() {
            self.handle_line("", &mut events);
        }

        if !self.is_finished() {
            debug!("Stream ended without [DONE], emitting finish");
            events.push(StreamEvent::finish_stop());
            self.state = DecoderState::Finished;
        }

        events
    }

    /// 取消或传输错误：丢弃缓冲，不输出 finish
    pub fn abort(&mut self) {
        self.state = DecoderState::Finished;
        self.line_buffer.clear();
        self.data_lines.clear();
        self.utf8 = Utf8Decoder::default();
    }

    /// 处理缓冲中所有完整的行，只把最后不完整的行留在缓冲里
    fn drain_lines(&mut self, events: &mut Vec<StreamEvent>) {
        let buffer = std::mem::take(&mut self.line_buffer);
        let mut rest = buffer.as_str();

        while let Some(pos) = rest.find('\n') {
            let line = rest[..pos].trim_end_matches('\r');
            rest = &rest[pos + 1..];
            self.handle_line(line, events);

            if self.is_finished() {
                self.data_lines.clear();
                return;
            }
        }

        self.line_buffer = rest.to_string();
    }

    fn handle_line(&mut self, line: &str, events: &mut Vec<StreamEvent>) {
        if line.is_empty() {
            // 空行结束一帧，没有 data 的帧直接跳过
            if !self.data_lines.is_empty() {
                self.state = DecoderState::FrameReady;
                let payload = self.data_lines.join("\n");
                self.data_lines.clear();
                self.dispatch(&payload, events);
            }
            return;
        }

        // 注释行
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.find(':') {
            Some(pos) => {
                let value = &line[pos + 1..];
                (&line[..pos], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };

        // event / id / retry 等字段后端不使用
        if field == "data" {
            self.data_lines.push(value.to_string());
        }
    }

    fn dispatch(&mut self, payload: &str, events: &mut Vec<StreamEvent>) {
        if payload.is_empty() {
            self.state = DecoderState::AwaitingFrame;
            return;
        }

        if payload.trim() == DONE_SENTINEL {
            events.push(StreamEvent::finish_stop());
            self.state = DecoderState::Finished;
            return;
        }

        match self.parser.parse(payload) {
            Ok(chunk) => {
                let mut emitted = false;

                if let Some(text) = chunk.response {
                    events.push(StreamEvent::text_delta(text));
                    emitted = true;
                }

                for call in chunk.tool_calls.unwrap_or_default() {
                    match to_tool_call_result(call) {
                        Ok(result) => {
                            events.push(StreamEvent::ToolCall(result));
                            emitted = true;
                        }
                        Err(e) => warn!("Failed to encode tool call arguments: {}", e),
                    }
                }

                if !emitted {
                    warn!("Stream frame has no response field, marking data loss");
                    events.push(StreamEvent::text_delta(DATA_LOSS_MARKER));
                }
            }
            Err(e) => {
                warn!("Failed to parse stream frame ({}), marking data loss", e);
                events.push(StreamEvent::text_delta(DATA_LOSS_MARKER));
            }
        }

        self.state = DecoderState::AwaitingFrame;
    }
}

/// 把后端字节流转换成事件流
pub fn decode_stream<S>(bytes: S) -> impl Stream<Item = StreamEvent> + Send + 'static
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    decode_stream_with(bytes, StreamDecoder::new())
}

/// 同 [`decode_stream`]，使用指定的解码器
///
/// 只在下游拉取时读取上游；收到 [DONE] 后不再读取；
/// 上游出错时输出 error 事件并结束，不补 finish
pub fn decode_stream_with<S, P>(
    bytes: S,
    mut decoder: StreamDecoder<P>,
) -> impl Stream<Item = StreamEvent> + Send + 'static
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
    P: PayloadParser + 'static,
{
    async_stream::stream! {
        let mut bytes = Box::pin(bytes);

        while let Some(chunk_result) = bytes.next().await {
            match chunk_result {
                Ok(chunk) => {
                    for event in decoder.push(&chunk) {
                        yield event;
                    }
                    if decoder.is_finished() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Backend stream failed: {}", e);
                    decoder.abort();
                    yield StreamEvent::Error { error: e.to_string() };
                    break;
                }
            }
        }

        for event in decoder.finish() {
            yield event;
        }
    }
}
