//! Bracketed-array decoder
//!
//! The stream is one JSON array delivered incrementally:
//! `[{...}\r\n,{...}\r\n]`. Elements are cut out by tracking brace depth,
//! ignoring brackets that appear inside string literals. Bytes after the last
//! complete element are kept for the next read.

use super::decoder::{RecordMapper, StreamDecoder, StreamDelta, log_skipped};
use crate::error::LlmError;

pub struct JsonArrayDecoder {
    label: &'static str,
    mapper: RecordMapper,
    buf: Vec<u8>,
    /// Next byte of `buf` to scan.
    pos: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    array_open: bool,
    closed: bool,
    elem_start: Option<usize>,
    skipped: usize,
}

impl JsonArrayDecoder {
    pub fn new(label: &'static str, mapper: RecordMapper) -> Self {
        Self {
            label,
            mapper,
            buf: Vec::new(),
            pos: 0,
            depth: 0,
            in_string: false,
            escaped: false,
            array_open: false,
            closed: false,
            elem_start: None,
            skipped: 0,
        }
    }

    /// Depth at which top-level elements live.
    fn base(&self) -> usize {
        usize::from(self.array_open)
    }

    fn scan(&mut self, out: &mut Vec<Result<StreamDelta, LlmError>>) {
        while self.pos < self.buf.len() && !self.closed {
            let b = self.buf[self.pos];
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
                self.pos += 1;
                continue;
            }
            match b {
                b'"' => self.in_string = true,
                b'[' if self.depth == 0 && !self.array_open => {
                    self.array_open = true;
                    self.depth = 1;
                }
                b'{' | b'[' => {
                    self.depth += 1;
                    if self.depth == self.base() + 1 {
                        self.elem_start = Some(self.pos);
                    }
                }
                b']' if self.array_open && self.depth == 1 => {
                    self.depth = 0;
                    self.closed = true;
                    out.push(Ok(StreamDelta::done()));
                }
                b'}' | b']' => {
                    if self.depth == 0 {
                        self.skip("unbalanced closing bracket", &[b]);
                    } else {
                        self.depth -= 1;
                        if self.depth == self.base()
                            && let Some(start) = self.elem_start.take()
                        {
                            let element = self.buf[start..=self.pos].to_vec();
                            self.emit(&element, out);
                        }
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
        self.compact();
    }

    fn compact(&mut self) {
        let keep_from = self.elem_start.unwrap_or(self.pos);
        self.buf.drain(..keep_from);
        self.pos -= keep_from;
        if let Some(start) = self.elem_start.as_mut() {
            *start = 0;
        }
    }

    fn emit(&mut self, element: &[u8], out: &mut Vec<Result<StreamDelta, LlmError>>) {
        match serde_json::from_slice::<serde_json::Value>(element) {
            Ok(value) => match (self.mapper)(&value) {
                Ok(Some(delta)) => out.push(Ok(delta)),
                Ok(None) => {}
                Err(LlmError::StreamParseError(reason)) => self.skip(&reason, element),
                Err(e) => out.push(Err(e)),
            },
            Err(e) => self.skip(&e.to_string(), element),
        }
    }

    fn skip(&mut self, reason: &str, raw: &[u8]) {
        self.skipped += 1;
        log_skipped(self.label, reason, &String::from_utf8_lossy(raw));
    }
}

impl StreamDecoder for JsonArrayDecoder {
    fn format(&self) -> &'static str {
        self.label
    }

    fn feed(&mut self, bytes: &[u8]) -> Vec<Result<StreamDelta, LlmError>> {
        if self.closed {
            return Vec::new();
        }
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        self.scan(&mut out);
        out
    }

    fn finish(&mut self) -> Vec<Result<StreamDelta, LlmError>> {
        if self.elem_start.is_some() {
            let tail = std::mem::take(&mut self.buf);
            self.skip("stream closed inside an array element", &tail);
            self.elem_start = None;
            self.pos = 0;
        }
        Vec::new()
    }

    fn skipped_records(&self) -> usize {
        self.skipped
    }
}
